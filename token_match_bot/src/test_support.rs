//! Fakes and helpers shared by tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use teloxide::{
    types::{Recipient, UserId},
    ApiError, RequestError,
};

use crate::{
    database::{AdminInfo, Database, NewProject, Project},
    messenger::{ChatAdmin, ChatRole, Messenger},
};

pub const BOT_ID: UserId = UserId(777);

/// `-100123` for chat IDs, `@name` for usernames.
pub fn recipient_key(recipient: &Recipient) -> String {
    #[allow(unreachable_patterns)]
    match recipient {
        Recipient::Id(id) => id.0.to_string(),
        Recipient::ChannelUsername(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SentKind {
    Text,
    Photo,
    PhotoPair,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub to: String,
    pub kind: SentKind,
    pub text: String,
    pub photos: Vec<String>,
}

/// A [`Messenger`] that records everything successfully sent through it.
#[derive(Default)]
pub struct FakeMessenger {
    /// Role of the bot in chats, by [`recipient_key`]. Unknown chats fail the lookup.
    roles: HashMap<String, ChatRole>,
    admins: HashMap<String, Vec<ChatAdmin>>,
    failing: HashSet<SentKind>,
    pub sent: Mutex<Vec<Sent>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, chat: &str, role: ChatRole) -> Self {
        self.roles.insert(chat.to_string(), role);
        self
    }

    /// Adds human administrators of a chat. [`BOT_ID`] is added as a bot.
    pub fn with_admins(self, chat: &str, admins: &[u64]) -> Self {
        self.add_admins(chat, admins, |id| id == BOT_ID)
    }

    /// Adds bot administrators of a chat.
    pub fn with_bot_admins(self, chat: &str, admins: &[u64]) -> Self {
        self.add_admins(chat, admins, |_| true)
    }

    fn add_admins(mut self, chat: &str, admins: &[u64], is_bot: impl Fn(UserId) -> bool) -> Self {
        let list = self.admins.entry(chat.to_string()).or_default();
        for id in admins {
            let user = UserId(*id);
            list.push(ChatAdmin {
                user,
                is_bot: is_bot(user),
            });
        }
        self
    }

    /// Makes every send of this kind fail.
    pub fn failing(mut self, kind: SentKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<Sent> {
        self.sent().into_iter().filter(|x| x.to == to).collect()
    }

    fn record(
        &self,
        to: &Recipient,
        kind: SentKind,
        text: &str,
        photos: &[&str],
    ) -> Result<(), RequestError> {
        if self.failing.contains(&kind) {
            return Err(RequestError::Api(ApiError::BotBlocked));
        }
        self.sent.lock().unwrap().push(Sent {
            to: recipient_key(to),
            kind,
            text: text.to_string(),
            photos: photos.iter().map(|x| x.to_string()).collect(),
        });
        Ok(())
    }
}

impl Messenger for FakeMessenger {
    fn own_id(&self) -> UserId {
        BOT_ID
    }

    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), RequestError> {
        self.record(&to, SentKind::Text, text, &[])
    }

    async fn send_photo(
        &self,
        to: Recipient,
        photo: &str,
        caption: &str,
    ) -> Result<(), RequestError> {
        self.record(&to, SentKind::Photo, caption, &[photo])
    }

    async fn send_photo_pair(
        &self,
        to: Recipient,
        first: &str,
        second: &str,
        caption: &str,
    ) -> Result<(), RequestError> {
        self.record(&to, SentKind::PhotoPair, caption, &[first, second])
    }

    async fn chat_role(&self, chat: Recipient, user: UserId) -> Result<ChatRole, RequestError> {
        assert_eq!(user, BOT_ID, "only the bot's own role is ever checked");
        self.roles
            .get(&recipient_key(&chat))
            .copied()
            .ok_or(RequestError::Api(ApiError::ChatNotFound))
    }

    async fn chat_administrators(&self, chat: Recipient) -> Result<Vec<ChatAdmin>, RequestError> {
        self.admins
            .get(&recipient_key(&chat))
            .cloned()
            .ok_or(RequestError::Api(ApiError::ChatNotFound))
    }
}

pub fn new_project(name: &str, contract_address: &str) -> NewProject {
    NewProject {
        name: name.to_string(),
        contract_address: contract_address.to_string(),
        chains: vec!["Ethereum".to_string()],
        market_cap: "1-5M".to_string(),
        categories: vec!["DeFi".to_string()],
        description: Some(format!("{name} does things.")),
        admin_handles: vec![format!("@{}_dev", name.to_lowercase())],
        ..Default::default()
    }
}

/// Creates a project run by these users.
pub async fn register(db: &Database, name: &str, contract_address: &str, admins: &[u64]) -> Project {
    let project = db
        .create_project(&new_project(name, contract_address))
        .await
        .unwrap();
    for id in admins {
        let info = AdminInfo {
            user_id: UserId(*id),
            username: Some(format!("user{id}")),
            first_name: Some(format!("User {id}")),
            last_name: None,
        };
        db.create_or_update_admin(&info, project.id).await.unwrap();
    }
    project
}
