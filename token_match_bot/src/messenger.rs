use std::future::Future;

use teloxide::{
    payloads::{SendMessageSetters, SendPhotoSetters},
    prelude::Requester,
    types::{
        ChatMember, FileId, InputFile, InputMedia, InputMediaPhoto, ParseMode, Recipient, UserId,
    },
    Bot, RequestError,
};

/// What some user is in some chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    Owner,
    Administrator,
    Member,
    /// Left, was kicked, or was never there.
    Absent,
}

impl ChatRole {
    /// Owners and administrators.
    #[must_use]
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

impl From<&ChatMember> for ChatRole {
    fn from(member: &ChatMember) -> Self {
        if member.kind.is_owner() {
            Self::Owner
        } else if member.kind.is_administrator() {
            Self::Administrator
        } else if member.kind.is_present() {
            Self::Member
        } else {
            Self::Absent
        }
    }
}

/// An owner or administrator of a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatAdmin {
    pub user: UserId,
    pub is_bot: bool,
}

/// Everything match notifications need from Telegram.
///
/// All text is sent with HTML formatting. Photos are Telegram file IDs.
pub trait Messenger: Send + Sync {
    /// User ID of the bot itself.
    fn own_id(&self) -> UserId;

    fn send_text(
        &self,
        to: Recipient,
        text: &str,
    ) -> impl Future<Output = Result<(), RequestError>> + Send;

    fn send_photo(
        &self,
        to: Recipient,
        photo: &str,
        caption: &str,
    ) -> impl Future<Output = Result<(), RequestError>> + Send;

    /// Sends two photos as one album, with the caption on the first one.
    fn send_photo_pair(
        &self,
        to: Recipient,
        first: &str,
        second: &str,
        caption: &str,
    ) -> impl Future<Output = Result<(), RequestError>> + Send;

    fn chat_role(
        &self,
        chat: Recipient,
        user: UserId,
    ) -> impl Future<Output = Result<ChatRole, RequestError>> + Send;

    /// Owner and administrators of a chat, bots included.
    fn chat_administrators(
        &self,
        chat: Recipient,
    ) -> impl Future<Output = Result<Vec<ChatAdmin>, RequestError>> + Send;
}

/// [`Messenger`] that talks to the real Telegram.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    me: UserId,
}

impl TelegramMessenger {
    /// `me` is the bot's own ID, from [`Requester::get_me`].
    #[must_use]
    pub fn new(bot: Bot, me: UserId) -> Self {
        Self { bot, me }
    }
}

fn photo_file(file_id: &str) -> InputFile {
    InputFile::file_id(FileId(file_id.to_string()))
}

impl Messenger for TelegramMessenger {
    fn own_id(&self) -> UserId {
        self.me
    }

    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), RequestError> {
        self.bot
            .send_message(to, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        to: Recipient,
        photo: &str,
        caption: &str,
    ) -> Result<(), RequestError> {
        self.bot
            .send_photo(to, photo_file(photo))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_photo_pair(
        &self,
        to: Recipient,
        first: &str,
        second: &str,
        caption: &str,
    ) -> Result<(), RequestError> {
        let mut first = InputMediaPhoto::new(photo_file(first));
        first.caption = Some(caption.to_string());
        first.parse_mode = Some(ParseMode::Html);
        let second = InputMediaPhoto::new(photo_file(second));

        self.bot
            .send_media_group(to, [InputMedia::Photo(first), InputMedia::Photo(second)])
            .await?;
        Ok(())
    }

    async fn chat_role(&self, chat: Recipient, user: UserId) -> Result<ChatRole, RequestError> {
        let member = self.bot.get_chat_member(chat, user).await?;
        Ok(ChatRole::from(&member))
    }

    async fn chat_administrators(&self, chat: Recipient) -> Result<Vec<ChatAdmin>, RequestError> {
        let admins = self.bot.get_chat_administrators(chat).await?;
        Ok(admins
            .into_iter()
            .map(|x| ChatAdmin {
                user: x.user.id,
                is_bot: x.user.is_bot,
            })
            .collect())
    }
}
