//! Source code for the token matchmaking bot: projects register, browse each other,
//! like or pass, and get announcements when two of them like each other back.

use std::time::Duration;

/// Reading the environment and the bot key.
pub mod config;

/// The database of projects, their admins, likes and matches.
pub mod database;

/// Turning stored group/channel links into something we can send messages to.
pub mod chat_ref;

/// The small slice of the Telegram API that notifications go through.
pub mod messenger;

/// Composing and delivering match notifications.
pub mod notifications;

/// Fetching token prices and market caps.
pub mod token_info;

/// Likes turning into matches, and matches turning into notifications.
pub mod matching;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

#[cfg(test)]
mod test_support;

/// Pause between consecutive sends when going through a list of users,
/// so that Telegram doesn't rate limit us.
pub const DELAY_BETWEEN_SENDS: Duration = Duration::from_millis(100);
