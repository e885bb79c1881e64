use std::{fs, io};

use teloxide::types::UserId;

/// Where the database lives unless `MATCH_BOT_DATABASE` says otherwise.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:token_match.sqlite";

/// Settings read from the environment. A `.env` file in the working directory is
/// loaded first, if there is one.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite URL of the database, from `MATCH_BOT_DATABASE`.
    pub database_url: String,
    /// The operator allowed to see `/stats`, from `ADMIN_USER_ID`.
    pub owner_id: Option<UserId>,
    /// Whether matches are also sent privately to administrators of the projects'
    /// groups, from `MATCH_BOT_NOTIFY_GROUP_ADMINS`.
    pub notify_group_admins: bool,
}

impl Config {
    pub fn from_env() -> Config {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Failed to load .env file: {e}");
            }
        }

        let database_url = std::env::var("MATCH_BOT_DATABASE")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let owner_id = std::env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|x| match x.trim().parse::<u64>() {
                Ok(id) => Some(UserId(id)),
                Err(_) => {
                    log::warn!("ADMIN_USER_ID is not a user ID: {x}");
                    None
                }
            });

        let notify_group_admins = std::env::var("MATCH_BOT_NOTIFY_GROUP_ADMINS")
            .is_ok_and(|x| matches!(x.trim(), "1" | "true" | "yes"));

        Config {
            database_url,
            owner_id,
            notify_group_admins,
        }
    }
}

/// Reads the bot token from the `key` file, or `key_debug` in debug builds.
pub fn read_bot_key() -> io::Result<String> {
    let key = fs::read_to_string(match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    })?;
    Ok(key.trim().to_string())
}
