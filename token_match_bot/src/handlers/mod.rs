use std::{fmt::Write, sync::Arc};

use bot_commons::useful_methods::{split_command, MessageStuff};
use html_escape::encode_text;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    sugar::request::RequestLinkPreviewExt,
    types::{Me, ParseMode, User},
    RequestError,
};

use crate::{
    config::Config,
    database::{self, AdminInfo, Database, Project},
    matching::MatchPipeline,
    messenger::TelegramMessenger,
    notifications::{check_permission, recipient_for},
    token_info::TokenInfoClient,
};

pub mod browsing;
pub mod commands;
pub mod registration;

pub use browsing::handle_callback_query;
pub use commands::Command;

pub type Pipeline = MatchPipeline<TelegramMessenger>;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Database(#[from] database::Error),
}

/// Sends an HTML message.
pub async fn reply(bot: &Bot, chat: ChatId, text: &str) -> Result<(), RequestError> {
    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .disable_link_preview(true)
        .await?;
    Ok(())
}

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    pipeline: Arc<Pipeline>,
    token_info: Arc<TokenInfoClient>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    // Everything happens in private messages.
    if !message.chat.is_private() {
        return Ok(());
    }
    let Some(user) = &message.from else {
        return Ok(());
    };

    let result = handle_private_message(
        &bot,
        &me,
        &message,
        user,
        &database,
        &pipeline,
        &token_info,
        &config,
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(HandlerError::Request(e)) => Err(e),
        Err(HandlerError::Database(e)) => {
            log::error!("Database error while handling a message from {}: {e}", user.id);
            reply(&bot, message.chat.id, "Something went wrong. Try again later.").await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_private_message(
    bot: &Bot,
    me: &Me,
    message: &Message,
    user: &User,
    database: &Database,
    pipeline: &Pipeline,
    token_info: &TokenInfoClient,
    config: &Config,
) -> Result<(), HandlerError> {
    let chat = message.chat.id;
    let text = message.text_full().unwrap_or_default();

    let Some((command, params)) = split_command(text, me.username()) else {
        reply(bot, chat, "Send /help to see what I can do.").await?;
        return Ok(());
    };

    match command.as_str() {
        "/start" | "/help" => reply(bot, chat, &Command::generate_help()).await?,
        "/register" => register(bot, message, user, params, database, token_info).await?,
        "/browse" => browse(bot, chat, user, params, database).await?,
        "/matches" => matches(bot, chat, user, database).await?,
        "/status" => status(bot, chat, user, database).await?,
        "/botsetup" => bot_setup(bot, chat, user, database, pipeline).await?,
        "/unregister" => unregister(bot, chat, user, params, database).await?,
        "/stats" if config.owner_id == Some(user.id) => {
            let statistics = database.get_statistics().await?;
            reply(bot, chat, &statistics.to_string()).await?;
        }
        _ => reply(bot, chat, "Unknown command. Send /help for the list.").await?,
    }

    Ok(())
}

/// Projects this user runs.
async fn projects_of(database: &Database, user: &User) -> Result<Vec<Project>, HandlerError> {
    let mut projects = Vec::new();
    for admin in database.get_admins_by_user(user.id).await? {
        if let Some(project) = database.get_project(admin.project_id).await? {
            projects.push(project);
        }
    }
    Ok(projects)
}

async fn register(
    bot: &Bot,
    message: &Message,
    user: &User,
    params: &str,
    database: &Database,
    token_info: &TokenInfoClient,
) -> Result<(), HandlerError> {
    let chat = message.chat.id;
    if params.is_empty() {
        reply(bot, chat, &registration::registration_help()).await?;
        return Ok(());
    }

    let mut new = match registration::parse_registration(params) {
        Ok(x) => x,
        Err(e) => {
            let text = format!(
                "{}\n\nSend /register alone to see the form.",
                encode_text(&e.to_string())
            );
            reply(bot, chat, &text).await?;
            return Ok(());
        }
    };
    new.logo_file_id = message.biggest_photo_file_id();

    let existing = database.get_project_by_contract(&new.contract_address).await?;
    let is_admin = match &existing {
        Some(existing) => database.is_admin_of(user.id, existing.id).await?,
        None => false,
    };

    if existing.is_some() && !is_admin {
        reply(
            bot,
            chat,
            "This contract is already registered by someone else. \
            Ask one of its admins to register it again with you around.",
        )
        .await?;
        return Ok(());
    }

    let chain = new.chains.first().map(String::as_str);
    let market = token_info.fetch(&new.contract_address, chain).await;
    if market.is_none() {
        log::debug!("No market data for {}", new.contract_address);
    }
    new.market = market.unwrap_or_default();

    let project = match existing {
        Some(existing) => {
            new.admin_handles = existing.admin_handles.clone();
            if let Some(username) = &user.username {
                let handle = format!("@{username}");
                if !new.admin_handles.contains(&handle) {
                    new.admin_handles.push(handle);
                }
            }
            match database.update_project(existing.id, &new).await? {
                Some(x) => x,
                None => existing,
            }
        }
        None => {
            new.admin_handles = user
                .username
                .iter()
                .map(|x| format!("@{x}"))
                .collect();
            match database.create_project(&new).await {
                Ok(x) => x,
                // Someone else just registered it.
                Err(database::Error::DuplicateContract(_)) => {
                    reply(bot, chat, "This contract is already registered.").await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    database
        .create_or_update_admin(&AdminInfo::from(user), project.id)
        .await?;
    log::info!("User {} registered project {}: {}", user.id, project.id, project.name);

    let mut text = format!("✅ <b>{}</b> is registered!\n\n", encode_text(&project.name));
    text.push_str(&browsing::project_card(&project));
    if project.market.is_empty() {
        text.push_str("\n\nNo market data found for this token yet. That's normal for new tokens.");
    }
    text.push_str("\n\nSend /botsetup to get match announcements in your group and channel, ");
    text.push_str("and /browse to start matching.");
    reply(bot, chat, &text).await?;
    Ok(())
}

/// `/browse`, or `/browse <contract>` to pick which project to browse as.
async fn browse(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    params: &str,
    database: &Database,
) -> Result<(), HandlerError> {
    let projects = projects_of(database, user).await?;

    let project = if params.is_empty() {
        projects.first()
    } else {
        projects.iter().find(|x| x.contract_address == params)
    };

    let Some(project) = project else {
        let text = match projects.is_empty() {
            true => "You have no projects yet. Send /register first.",
            false => "You don't run a project with this contract.",
        };
        reply(bot, chat, text).await?;
        return Ok(());
    };

    if projects.len() > 1 && params.is_empty() {
        let text = format!(
            "Browsing as <b>{}</b>. Send <code>/browse &lt;contract&gt;</code> to browse as another one.",
            encode_text(&project.name)
        );
        reply(bot, chat, &text).await?;
    }

    browsing::show_next_project(bot, chat, database, project.id, None).await
}

async fn matches(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    database: &Database,
) -> Result<(), HandlerError> {
    let projects = projects_of(database, user).await?;
    if projects.is_empty() {
        reply(bot, chat, "You have no projects yet. Send /register first.").await?;
        return Ok(());
    }

    let mut text = String::from("💘 <b>Your matches</b>\n");
    for project in &projects {
        let _ = write!(text, "\n<b>{}</b>:\n", encode_text(&project.name));

        let project_matches = database.get_matches_by_project(project.id).await?;
        if project_matches.is_empty() {
            text.push_str("No matches yet. Keep browsing!\n");
        }
        for the_match in project_matches {
            let Some(other_id) = the_match.other_side(project.id) else {
                continue;
            };
            let Some(other) = database.get_project(other_id).await? else {
                continue;
            };
            let _ = write!(
                text,
                "• <b>{}</b>, matched {}\n  <code>{}</code>\n",
                encode_text(&other.name),
                the_match.created_at.format("%Y-%m-%d"),
                encode_text(&other.contract_address)
            );
            if let Some(link) = &the_match.private_group_invite_link {
                let _ = writeln!(text, "  Private room: {}", encode_text(link));
            }
            if !other.admin_handles.is_empty() {
                let _ = writeln!(
                    text,
                    "  Team: {}",
                    encode_text(&other.admin_handles.join(", "))
                );
            }
        }
    }

    reply(bot, chat, &text).await?;
    Ok(())
}

async fn status(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    database: &Database,
) -> Result<(), HandlerError> {
    let projects = projects_of(database, user).await?;
    if projects.is_empty() {
        reply(bot, chat, "You have no projects yet. Send /register first.").await?;
        return Ok(());
    }

    let mut text = String::from("📋 <b>Your projects</b>\n");
    for project in &projects {
        let match_count = database.get_matches_by_project(project.id).await?.len();
        let _ = write!(
            text,
            "\n<b>{}</b>{}\n<code>{}</code>\nActive: {}\nMatches: {match_count}\nRegistered: {}\n",
            encode_text(&project.name),
            if project.verified { " ✅" } else { "" },
            encode_text(&project.contract_address),
            if project.is_active { "yes" } else { "no" },
            project.created_at.format("%Y-%m-%d"),
        );
    }

    reply(bot, chat, &text).await?;
    Ok(())
}

/// Shows whether match announcements can be posted in each group and channel.
async fn bot_setup(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    database: &Database,
    pipeline: &Pipeline,
) -> Result<(), HandlerError> {
    let projects = projects_of(database, user).await?;
    if projects.is_empty() {
        reply(bot, chat, "You have no projects yet. Send /register first.").await?;
        return Ok(());
    }

    let mut text = String::from(concat!(
        "🔧 <b>Bot setup</b>\n\n",
        "To get match announcements, add me to your group and channel as an administrator, ",
        "and put public links to them in your registration.\n",
    ));

    for project in &projects {
        let _ = write!(text, "\n<b>{}</b>:\n", encode_text(&project.name));
        for (label, reference) in [
            ("Group", &project.telegram_group),
            ("Channel", &project.telegram_channel),
        ] {
            let Some(reference) = reference else {
                let _ = writeln!(text, "{label}: not set");
                continue;
            };
            let state = match recipient_for(reference) {
                Ok(chat) => match check_permission(pipeline.messenger(), chat).await {
                    Ok(_) => "✅ ready".to_string(),
                    Err(reason) => format!("❌ {reason}"),
                },
                Err(reason) => format!("❌ {reason}"),
            };
            let _ = writeln!(
                text,
                "{label} {}: {}",
                encode_text(reference),
                encode_text(&state)
            );
        }
    }

    reply(bot, chat, &text).await?;
    Ok(())
}

async fn unregister(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    params: &str,
    database: &Database,
) -> Result<(), HandlerError> {
    if params.is_empty() {
        reply(
            bot,
            chat,
            "Send <code>/unregister &lt;contract&gt;</code> to remove that project.",
        )
        .await?;
        return Ok(());
    }

    let project = database.get_project_by_contract(params).await?;
    let project = match project {
        Some(x) => x,
        None => {
            reply(bot, chat, "You don't run a project with this contract.").await?;
            return Ok(());
        }
    };
    if !database.is_admin_of(user.id, project.id).await? {
        reply(bot, chat, "You don't run a project with this contract.").await?;
        return Ok(());
    }

    database.delete_project(project.id).await?;
    log::info!("User {} unregistered project {}: {}", user.id, project.id, project.name);

    let text = format!(
        "🗑 <b>{}</b> is removed, along with its likes and matches.",
        encode_text(&project.name)
    );
    reply(bot, chat, &text).await?;
    Ok(())
}
