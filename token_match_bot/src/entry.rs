use std::sync::Arc;

use teloxide::{dptree::deps, prelude::*};

use crate::{
    config::{read_bot_key, Config},
    database::Database,
    handlers::{handle_callback_query, handle_message, Command},
    matching::MatchPipeline,
    messenger::TelegramMessenger,
    token_info::TokenInfoClient,
};

/// # Panics
///
/// Panics if there's no key file, or if the database or Telegram can't be reached on startup.
pub async fn entry() {
    let config = Arc::new(Config::from_env());

    let key = read_bot_key().expect("Could not load bot key file!");
    let bot = Bot::new(key);

    bot.set_my_commands(Command::generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let me = bot.get_me().await.expect("Failed to get info about the bot!");
    log::info!("Running as @{}", me.username());

    let database = Arc::new(
        Database::new(&config.database_url)
            .await
            .expect("Failed to open the database!"),
    );
    if !database.health_check().await {
        panic!("The database doesn't respond!");
    }

    let pipeline = Arc::new(MatchPipeline::new(
        database.clone(),
        TelegramMessenger::new(bot.clone(), me.id),
        config.notify_group_admins,
    ));

    // Matches that never got announced, like if we went down in the middle of one.
    // Done before taking updates, so a fresh match can't get announced twice.
    let reports = pipeline.announce_pending().await;
    if !reports.is_empty() {
        log::info!("Announced {} pending matches.", reports.len());
    }

    let token_info =
        Arc::new(TokenInfoClient::new().expect("Failed to create the market data client!"));

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database, pipeline, token_info, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
