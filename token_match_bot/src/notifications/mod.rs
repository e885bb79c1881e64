pub mod templates;

use std::fmt::Display;

use teloxide::types::{ChatId, Recipient, UserId};

use crate::{
    chat_ref::{resolve_chat_reference, ChatHandle, ChatResolution},
    database::ProjectId,
    messenger::{ChatRole, Messenger},
    DELAY_BETWEEN_SENDS,
};

/// Logo pictures to attach to a notification, as Telegram file IDs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Logos<'a> {
    pub first: Option<&'a str>,
    pub second: Option<&'a str>,
}

impl<'a> Logos<'a> {
    #[must_use]
    pub fn new(first: Option<&'a str>, second: Option<&'a str>) -> Self {
        Self { first, second }
    }
}

/// Why a destination was not sent anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The link didn't look like any chat.
    Unresolved,
    /// The link is a chat, but not one the Bot API can send to, like an invite link.
    NotAddressable(ChatHandle),
    /// The bot is in the chat, but not as an administrator.
    NotAdmin(ChatRole),
    /// Telegram wouldn't tell us what the bot is in the chat. Usually it's not there.
    MembershipUnknown,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => f.write_str("link doesn't point to a chat"),
            Self::NotAddressable(handle) => write!(f, "{handle} can't be messaged by bots"),
            Self::NotAdmin(role) => write!(f, "bot is not an admin there ({role:?})"),
            Self::MembershipUnknown => f.write_str("bot is not in the chat"),
        }
    }
}

/// What happened with one notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Two logos and the text.
    Photos,
    /// One logo and the text.
    Photo,
    /// Just the text, as intended.
    Text,
    /// Sending with logos failed, but the text alone made it.
    FellBackToText,
    Skipped(SkipReason),
    /// Nothing made it.
    Failed(String),
}

impl DeliveryOutcome {
    /// Whether the notification text reached the destination.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            Self::Photos | Self::Photo | Self::Text | Self::FellBackToText
        )
    }
}

/// Where a notification was meant to go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Group { project: ProjectId, reference: String },
    Channel { project: ProjectId, reference: String },
    /// A registered admin of a project.
    Admin { project: ProjectId, user: UserId },
    /// An administrator of a project's group or channel.
    CommunityAdmin { reference: String, user: UserId },
}

/// A notification and what became of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub destination: Destination,
    pub outcome: DeliveryOutcome,
}

/// Sends the text with as many logos as there are, falling back to just the text if that
/// doesn't work out.
pub async fn deliver_with_ladder<M: Messenger>(
    messenger: &M,
    to: Recipient,
    text: &str,
    logos: Logos<'_>,
) -> DeliveryOutcome {
    let attempt = match (logos.first, logos.second) {
        (Some(first), Some(second)) => Some((
            DeliveryOutcome::Photos,
            messenger
                .send_photo_pair(to.clone(), first, second, text)
                .await,
        )),
        (Some(logo), None) | (None, Some(logo)) => Some((
            DeliveryOutcome::Photo,
            messenger.send_photo(to.clone(), logo, text).await,
        )),
        (None, None) => None,
    };

    let fallback = match attempt {
        Some((outcome, Ok(()))) => return outcome,
        Some((_, Err(e))) => {
            log::warn!("Failed to send logos to {to:?}, falling back to text: {e}");
            DeliveryOutcome::FellBackToText
        }
        None => DeliveryOutcome::Text,
    };

    match messenger.send_text(to.clone(), text).await {
        Ok(()) => fallback,
        Err(e) => {
            log::error!("Failed to send a notification to {to:?}: {e}");
            DeliveryOutcome::Failed(e.to_string())
        }
    }
}

/// Turns a group/channel link into something to send to.
pub fn recipient_for(reference: &str) -> Result<Recipient, SkipReason> {
    let ChatResolution::Resolved(handle) = resolve_chat_reference(reference) else {
        return Err(SkipReason::Unresolved);
    };
    handle
        .to_recipient()
        .ok_or(SkipReason::NotAddressable(handle))
}

/// Checks that the bot is an owner or administrator of the chat.
pub async fn check_permission<M: Messenger>(
    messenger: &M,
    chat: Recipient,
) -> Result<ChatRole, SkipReason> {
    match messenger.chat_role(chat.clone(), messenger.own_id()).await {
        Ok(role) if role.is_privileged() => Ok(role),
        Ok(role) => Err(SkipReason::NotAdmin(role)),
        Err(e) => {
            log::debug!("Failed to get own membership in {chat:?}: {e}");
            Err(SkipReason::MembershipUnknown)
        }
    }
}

/// Resolves the link and checks permissions, logging the reason if this chat is to be skipped.
async fn usable_chat<M: Messenger>(messenger: &M, reference: &str) -> Result<Recipient, SkipReason> {
    let result = match recipient_for(reference) {
        Ok(chat) => check_permission(messenger, chat.clone()).await.map(|_| chat),
        Err(reason) => Err(reason),
    };
    if let Err(reason) = &result {
        log::warn!("Skipping notification to {reference:?}: {reason}");
    }
    result
}

/// Posts a notification into a group or channel, given the link to it.
///
/// Skips chats that can't be resolved or where the bot isn't an admin.
pub async fn deliver_to_chat<M: Messenger>(
    messenger: &M,
    reference: &str,
    text: &str,
    logos: Logos<'_>,
) -> DeliveryOutcome {
    match usable_chat(messenger, reference).await {
        Ok(chat) => deliver_with_ladder(messenger, chat, text, logos).await,
        Err(reason) => DeliveryOutcome::Skipped(reason),
    }
}

/// Sends a notification privately to every human administrator of a group or channel.
///
/// Bots can't list regular members, so administrators are the best we can do.
pub async fn deliver_to_chat_admins<M: Messenger>(
    messenger: &M,
    reference: &str,
    text: &str,
    logos: Logos<'_>,
) -> Vec<DeliveryReport> {
    let chat = match usable_chat(messenger, reference).await {
        Ok(chat) => chat,
        Err(_) => return Vec::new(),
    };

    let admins = match messenger.chat_administrators(chat.clone()).await {
        Ok(admins) => admins,
        Err(e) => {
            log::warn!("Failed to get administrators of {chat:?}: {e}");
            return Vec::new();
        }
    };

    let mut reports = Vec::new();
    let humans = admins
        .into_iter()
        .filter(|x| !x.is_bot && x.user != messenger.own_id())
        .map(|x| x.user);
    for user in humans {
        if !reports.is_empty() {
            tokio::time::sleep(DELAY_BETWEEN_SENDS).await;
        }
        let outcome = deliver_with_ladder(messenger, Recipient::Id(ChatId::from(user)), text, logos).await;
        reports.push(DeliveryReport {
            destination: Destination::CommunityAdmin {
                reference: reference.to_string(),
                user,
            },
            outcome,
        });
    }
    reports
}
