//! Showing projects one by one with like/pass buttons, and handling those buttons.

use std::{fmt::Display, str::FromStr, sync::Arc};

use html_escape::encode_text;
use teloxide::{
    payloads::{SendMessageSetters, SendPhotoSetters},
    prelude::*,
    types::{FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
    RequestError,
};

use super::{reply, HandlerError, Pipeline};
use crate::{
    database::{Database, Project, ProjectId},
    matching::{LikeOutcome, MatchAnnouncement},
    notifications::templates,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrowseAction {
    Like,
    Pass,
}

/// Data of a like/pass button: which of the user's projects is browsing, and which project
/// it's looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackData {
    pub action: BrowseAction,
    pub liker: ProjectId,
    pub liked: ProjectId,
}

impl Display for CallbackData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self.action {
            BrowseAction::Like => "like",
            BrowseAction::Pass => "pass",
        };
        write!(f, "{action}:{}:{}", self.liker, self.liked)
    }
}

impl FromStr for CallbackData {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let action = match parts.next() {
            Some("like") => BrowseAction::Like,
            Some("pass") => BrowseAction::Pass,
            _ => return Err("unknown action"),
        };
        let liker = parts.next().ok_or("no liker")?;
        let liked = parts.next().ok_or("no liked")?;
        if parts.next().is_some() {
            return Err("too many parts");
        }

        Ok(CallbackData {
            action,
            liker: liker.parse().map_err(|_| "bad liker")?,
            liked: liked.parse().map_err(|_| "bad liked")?,
        })
    }
}

/// HTML description of a project, as shown while browsing.
pub fn project_card(project: &Project) -> String {
    let list = |x: &[String]| match x.is_empty() {
        true => "Not specified".to_string(),
        false => encode_text(&x.join(", ")).into_owned(),
    };

    let mut text = format!(
        "<b>{}</b>{}\n\n<b>Chains:</b> {}\n<b>Market cap:</b> {}\n<b>Categories:</b> {}\n",
        encode_text(&project.name),
        if project.verified { " ✅" } else { "" },
        list(&project.chains),
        encode_text(&project.market_cap),
        list(&project.categories),
    );
    if let Some(market) = templates::market_lines(&project.market) {
        text.push_str(&format!("\n{market}\n"));
    }
    if let Some(description) = &project.description {
        text.push_str(&format!("\n{}\n", encode_text(description)));
    }
    text.push_str(&format!(
        "\n<b>Contract:</b> <code>{}</code>",
        encode_text(&project.contract_address)
    ));
    text
}

fn card_keyboard(liker: ProjectId, liked: ProjectId) -> InlineKeyboardMarkup {
    let data = |action| {
        CallbackData {
            action,
            liker,
            liked,
        }
        .to_string()
    };
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("❤️ Like", data(BrowseAction::Like)),
        InlineKeyboardButton::callback("👎 Pass", data(BrowseAction::Pass)),
    ]])
}

/// Longest project name shown in a popup. Telegram cuts popups off at 200 characters.
const POPUP_NAME_LENGTH: usize = 64;

/// Shortens a project name to fit in a callback query popup.
fn popup_name(name: &str) -> String {
    match name.chars().nth(POPUP_NAME_LENGTH) {
        None => name.to_string(),
        Some(_) => {
            let mut short: String = name.chars().take(POPUP_NAME_LENGTH - 1).collect();
            short.push('…');
            short
        }
    }
}

/// Picks what to show next: the first candidate, or the one after `after` if it's there.
fn pick_next(candidates: &[Project], after: Option<ProjectId>) -> Option<&Project> {
    let Some(after) = after else {
        return candidates.first();
    };
    match candidates.iter().position(|x| x.id == after) {
        Some(index) => candidates.get(index + 1),
        None => candidates.first(),
    }
}

/// Shows the next project for `liker` to look at, or says there are none left.
pub async fn show_next_project(
    bot: &Bot,
    chat: ChatId,
    database: &Database,
    liker: ProjectId,
    after: Option<ProjectId>,
) -> Result<(), HandlerError> {
    let candidates = database.get_projects_not_liked_by(liker).await?;

    let Some(project) = pick_next(&candidates, after) else {
        reply(
            bot,
            chat,
            "That's everyone for now! Come back later for new projects, or check /matches.",
        )
        .await?;
        return Ok(());
    };

    let text = project_card(project);
    let keyboard = card_keyboard(liker, project.id);

    if let Some(logo) = &project.logo_file_id {
        let sent = bot
            .send_photo(chat, InputFile::file_id(FileId(logo.clone())))
            .caption(&text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await;
        match sent {
            Ok(_) => return Ok(()),
            Err(e) => log::warn!("Failed to send logo of project {}: {e}", project.id),
        }
    }

    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    database: Arc<Database>,
    pipeline: Arc<Pipeline>,
) -> Result<(), RequestError> {
    macro_rules! goodbye {
        ($text:expr) => {
            bot.answer_callback_query(query.id.clone()).text($text).await?;
            return Ok(());
        };
    }

    let Some(data) = query.data.as_deref().and_then(|x| x.parse::<CallbackData>().ok()) else {
        goodbye!("This button doesn't work anymore.");
    };

    match process_callback(&bot, &query, data, &database, &pipeline).await {
        Ok(text) => {
            goodbye!(text);
        }
        Err(HandlerError::Request(e)) => Err(e),
        Err(HandlerError::Database(e)) => {
            log::error!("Database error while handling {data}: {e}");
            goodbye!("Something went wrong. Try again later.");
        }
    }
}

/// Handles a like/pass press, returning the text to show in the popup.
async fn process_callback(
    bot: &Bot,
    query: &CallbackQuery,
    data: CallbackData,
    database: &Database,
    pipeline: &Pipeline,
) -> Result<String, HandlerError> {
    let user = &query.from;
    if !database.is_admin_of(user.id, data.liker).await? {
        return Ok("This is not your project.".to_string());
    }

    let chat = query
        .message
        .as_ref()
        .map(|x| x.chat().id)
        .unwrap_or(ChatId::from(user.id));

    let Some(liked) = database.get_project(data.liked).await? else {
        return Ok("This project is gone.".to_string());
    };
    let name = popup_name(&liked.name);

    // Liking again still goes through, so a match that failed halfway gets finished.
    let outcome = match data.action {
        BrowseAction::Like => {
            let liked_before = database.has_liked(data.liker, data.liked).await?;
            let outcome = pipeline.record_like(data.liker, data.liked).await?;
            if liked_before && outcome == LikeOutcome::Liked {
                return Ok(format!("You already liked {name}."));
            }
            Some(outcome)
        }
        BrowseAction::Pass => None,
    };

    // The decision is made, the buttons are no longer needed.
    if let Some(message) = &query.message {
        if let Err(e) = bot
            .edit_message_reply_markup(message.chat().id, message.id())
            .await
        {
            log::debug!("Failed to remove buttons: {e}");
        }
    }

    let popup = match outcome {
        None => {
            show_next_project(bot, chat, database, data.liker, Some(data.liked)).await?;
            return Ok(format!("Passed on {name}."));
        }
        Some(LikeOutcome::Liked) => {
            reply(
                bot,
                chat,
                &format!(
                    "❤️ You liked <b>{}</b>! If they like you back, it's a match.",
                    encode_text(&liked.name)
                ),
            )
            .await?;
            format!("Liked {name}!")
        }
        Some(LikeOutcome::AlreadyMatched(_)) => format!("You're already matched with {name}."),
        Some(LikeOutcome::Matched(the_match)) => {
            reply(
                bot,
                chat,
                &format!(
                    "⚡ <b>IT'S A MATCH!</b> You and <b>{}</b> like each other. \
                    Both teams are getting each other's details now.",
                    encode_text(&liked.name)
                ),
            )
            .await?;

            if let (Some(a), Some(b)) = (
                database.get_project(the_match.project_a).await?,
                database.get_project(the_match.project_b).await?,
            ) {
                pipeline
                    .process_match(&MatchAnnouncement::new(&the_match, &a, &b))
                    .await;
            }
            format!("It's a match with {name}!")
        }
    };

    show_next_project(bot, chat, database, data.liker, None).await?;
    Ok(popup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::MarketData, test_support::new_project};

    #[test]
    fn callback_data() {
        let data: CallbackData = "like:12:34".parse().unwrap();
        assert_eq!(
            data,
            CallbackData {
                action: BrowseAction::Like,
                liker: ProjectId(12),
                liked: ProjectId(34),
            }
        );
        assert_eq!(data.to_string(), "like:12:34");
        assert_eq!(
            "pass:1:2".parse::<CallbackData>().map(|x| x.action),
            Ok(BrowseAction::Pass)
        );

        for bad in ["", "like", "like:1", "like:1:x", "love:1:2", "like:1:2:3"] {
            assert!(bad.parse::<CallbackData>().is_err(), "{bad}");
        }
    }

    #[test]
    fn callback_data_fits_telegram() {
        // Telegram allows up to 64 bytes of callback data.
        let data = CallbackData {
            action: BrowseAction::Pass,
            liker: ProjectId(i64::MIN),
            liked: ProjectId(i64::MIN),
        };
        assert!(data.to_string().len() <= 64);
    }

    #[test]
    fn popup_names_are_short() {
        assert_eq!(popup_name("Alpha"), "Alpha");

        let exact = "a".repeat(POPUP_NAME_LENGTH);
        assert_eq!(popup_name(&exact), exact);

        let long = "ы".repeat(500);
        let short = popup_name(&long);
        assert_eq!(short.chars().count(), POPUP_NAME_LENGTH);
        assert!(short.ends_with('…'));
        let popup = format!("You're already matched with {short}.");
        assert!(popup.chars().count() <= 200);
    }

    #[tokio::test]
    async fn next_project_order() {
        let db = Database::new_in_memory().await.unwrap();
        let mut projects = Vec::new();
        for (name, contract) in [("A", "0x1"), ("B", "0x2"), ("C", "0x3")] {
            projects.push(db.create_project(&new_project(name, contract)).await.unwrap());
        }
        let candidates = db.get_projects_not_liked_by(projects[0].id).await.unwrap();
        let first = candidates[0].id;
        let second = candidates[1].id;

        assert_eq!(pick_next(&candidates, None).map(|x| x.id), Some(first));
        assert_eq!(pick_next(&candidates, Some(first)).map(|x| x.id), Some(second));
        assert_eq!(pick_next(&candidates, Some(second)).map(|x| x.id), None);
        assert_eq!(
            pick_next(&candidates, Some(ProjectId(404))).map(|x| x.id),
            Some(first)
        );
    }

    #[test]
    fn card_is_escaped() {
        let mut project = new_project("<b>", "0x1");
        project.description = Some("a & b".to_string());
        let project = Project {
            id: ProjectId(1),
            name: project.name,
            contract_address: project.contract_address,
            chains: project.chains,
            market_cap: project.market_cap,
            categories: project.categories,
            description: project.description,
            logo_file_id: None,
            telegram_group: None,
            telegram_channel: None,
            x_account: None,
            admin_handles: project.admin_handles,
            market: MarketData {
                price: Some(1.5),
                market_cap: Some(2_500_000.0),
                ..Default::default()
            },
            is_active: true,
            verified: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let card = project_card(&project);
        assert!(card.starts_with("<b>&lt;b&gt;</b> ✅"));
        assert!(card.contains("a &amp; b"));
        assert!(card.contains("• <b>Price:</b> $1.50\n• <b>Market Cap:</b> $2.50M"));
    }
}
