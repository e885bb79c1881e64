use teloxide::types::{Message, PhotoSize};

pub trait MessageStuff {
    /// Text of the message, or its caption if it's a media message.
    fn text_full(&self) -> Option<&str>;
    fn find_biggest_photo(&self) -> Option<&PhotoSize>;
    /// File ID of the biggest version of the attached photo, suitable for sending it again later.
    fn biggest_photo_file_id(&self) -> Option<String>;
}

impl MessageStuff for Message {
    fn text_full(&self) -> Option<&str> {
        self.text().or_else(|| self.caption())
    }
    fn find_biggest_photo(&self) -> Option<&PhotoSize> {
        if let Some(photo_sizes) = self.photo() {
            photo_sizes.iter().max_by_key(|x| x.width + x.height)
        } else {
            None
        }
    }
    fn biggest_photo_file_id(&self) -> Option<String> {
        self.find_biggest_photo().map(|x| x.file.id.0.clone())
    }
}

/// Splits a command message like `/register@Some_Bot name: Hi` into the lowercased command
/// without the bot's username (`/register`) and the parameters after it (`name: Hi`).
///
/// Returns [`None`] if the text is not a command, or if it's addressed to some other bot.
#[must_use]
pub fn split_command<'a>(text: &'a str, bot_username: &str) -> Option<(String, &'a str)> {
    if !text.starts_with('/') {
        return None;
    }

    let command = text.split_whitespace().next()?;
    let params = text[command.len()..].trim();

    let command = match command.split_once('@') {
        // Bot usernames are ASCII, so comparing ignoring ASCII case is fine.
        Some((command, username)) if username.eq_ignore_ascii_case(bot_username) => command,
        Some(_) => return None,
        None => command,
    };

    Some((command.to_lowercase(), params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_without_username() {
        assert_eq!(
            split_command("/Browse", "Match_Bot"),
            Some(("/browse".to_string(), ""))
        );
        assert_eq!(
            split_command("/register name: Hi\ncontract: 0x1", "Match_Bot"),
            Some(("/register".to_string(), "name: Hi\ncontract: 0x1"))
        );
    }

    #[test]
    fn command_with_username() {
        assert_eq!(
            split_command("/matches@match_bot  ", "Match_Bot"),
            Some(("/matches".to_string(), ""))
        );
        assert_eq!(split_command("/matches@other_bot", "Match_Bot"), None);
    }

    #[test]
    fn not_a_command() {
        assert_eq!(split_command("hello /start", "Match_Bot"), None);
        assert_eq!(split_command("", "Match_Bot"), None);
    }
}
