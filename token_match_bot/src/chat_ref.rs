use std::fmt::Display;

use teloxide::types::{ChatId, Recipient};
use url::Url;

/// A chat, as written in a project's group/channel link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatHandle {
    /// Full chat ID, like `-1001234567890`.
    NumericId(String),
    /// ID from a `t.me/c/...` message link, like `4629301903`. Lacks the `-100` prefix.
    InternalId(String),
    /// Invite link path, like `+AbCdEf` or `joinchat/AbCdEf`.
    Invite(String),
    /// Public username without the `@`, like `mygroup`.
    Public(String),
}

impl ChatHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NumericId(x) | Self::InternalId(x) | Self::Invite(x) | Self::Public(x) => x,
        }
    }

    /// Converts this into something the Bot API can send to.
    ///
    /// Returns [`None`] for invite links, which the Bot API can't address, and for anything
    /// that doesn't parse.
    #[must_use]
    pub fn to_recipient(&self) -> Option<Recipient> {
        match self {
            Self::NumericId(id) => id.parse().ok().map(|id| Recipient::Id(ChatId(id))),
            Self::InternalId(id) => format!("-100{id}")
                .parse()
                .ok()
                .map(|id| Recipient::Id(ChatId(id))),
            Self::Invite(_) => None,
            Self::Public(name) => {
                is_username(name).then(|| Recipient::ChannelUsername(format!("@{name}")))
            }
        }
    }
}

impl Display for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public(name) => write!(f, "@{name}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of [`resolve_chat_reference`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatResolution {
    Resolved(ChatHandle),
    Unresolved,
}

impl ChatResolution {
    #[must_use]
    pub fn handle(&self) -> Option<&ChatHandle> {
        match self {
            Self::Resolved(handle) => Some(handle),
            Self::Unresolved => None,
        }
    }
}

/// Whether this looks like a Telegram username: starts with a letter, then letters, digits
/// and underscores.
fn is_username(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses a URL like Telegram does, accepting things like `t.me/amogus` without a scheme.
fn parse_url_like_telegram(text: &str) -> Result<Url, url::ParseError> {
    match Url::parse(text) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{text}")),
        other => other,
    }
}

/// Picks a chat out of the path of a `t.me` link.
fn resolve_t_me_path(path: &str) -> ChatResolution {
    let first_segment = path.split('/').next().unwrap_or_default();

    let handle = if first_segment.starts_with('-') {
        ChatHandle::NumericId(first_segment.to_string())
    } else if first_segment.starts_with('+') {
        ChatHandle::Invite(first_segment.to_string())
    } else if path.starts_with("joinchat/") {
        ChatHandle::Invite(path.to_string())
    } else if path == "c" {
        return ChatResolution::Unresolved;
    } else if let Some(rest) = path.strip_prefix("c/") {
        let id = rest.split('/').next().unwrap_or_default();
        if id.is_empty() {
            return ChatResolution::Unresolved;
        }
        // Old links carry the full negative group ID.
        match id.starts_with('-') {
            true => ChatHandle::NumericId(id.to_string()),
            false => ChatHandle::InternalId(id.to_string()),
        }
    } else {
        ChatHandle::Public(first_segment.to_string())
    };

    ChatResolution::Resolved(handle)
}

/// Turns a stored group or channel link into a chat handle.
///
/// Understands `@name`, bare `name`, `-100...` IDs, and `t.me` / `telegram.me` links
/// (public names, numeric IDs, `+` and `joinchat/` invites, and `c/` message links).
/// Anything else is [`ChatResolution::Unresolved`].
#[must_use]
pub fn resolve_chat_reference(reference: &str) -> ChatResolution {
    let reference = reference.trim();
    let reference = reference.strip_prefix('@').unwrap_or(reference);

    if is_username(reference) {
        return ChatResolution::Resolved(ChatHandle::Public(reference.to_string()));
    }
    if reference.starts_with('-') && reference.parse::<i64>().is_ok() {
        return ChatResolution::Resolved(ChatHandle::NumericId(reference.to_string()));
    }

    let Ok(url) = parse_url_like_telegram(reference) else {
        return ChatResolution::Unresolved;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return ChatResolution::Unresolved;
    }
    let Some(host) = url.host_str() else {
        return ChatResolution::Unresolved;
    };

    // Query and fragment are already split off by the parser.
    let path = url.path().trim_start_matches('/').trim_end_matches('/');
    if path.is_empty() {
        return ChatResolution::Unresolved;
    }

    match host.strip_prefix("www.").unwrap_or(host) {
        "t.me" => resolve_t_me_path(path),
        "telegram.me" => ChatResolution::Resolved(ChatHandle::Public(path.to_string())),
        _ => ChatResolution::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(text: &str) -> Option<ChatHandle> {
        resolve_chat_reference(text).handle().cloned()
    }

    #[test]
    fn known_shapes() {
        assert_eq!(
            resolved("https://t.me/-1001234567890"),
            Some(ChatHandle::NumericId("-1001234567890".into()))
        );
        assert_eq!(
            resolved("https://t.me/c/4629301903/"),
            Some(ChatHandle::InternalId("4629301903".into()))
        );
        assert_eq!(resolved("@mygroup"), Some(ChatHandle::Public("mygroup".into())));
        assert_eq!(resolve_chat_reference("https://example.com/x"), ChatResolution::Unresolved);
    }

    #[test]
    fn public_names() {
        for text in [
            "mygroup",
            "  @mygroup ",
            "t.me/mygroup",
            "https://t.me/mygroup/",
            "https://t.me/mygroup?start=hi",
            "https://t.me/mygroup/1234",
            "https://www.t.me/mygroup",
            "https://telegram.me/mygroup",
        ] {
            assert_eq!(
                resolved(text),
                Some(ChatHandle::Public("mygroup".into())),
                "{text}"
            );
        }
    }

    #[test]
    fn invites() {
        assert_eq!(
            resolved("https://t.me/+AbCdEf123"),
            Some(ChatHandle::Invite("+AbCdEf123".into()))
        );
        assert_eq!(
            resolved("https://t.me/joinchat/AbCdEf123"),
            Some(ChatHandle::Invite("joinchat/AbCdEf123".into()))
        );
    }

    #[test]
    fn message_links() {
        assert_eq!(
            resolved("https://t.me/c/4629301903/55"),
            Some(ChatHandle::InternalId("4629301903".into()))
        );
        assert_eq!(
            resolved("https://t.me/c/-4629301903"),
            Some(ChatHandle::NumericId("-4629301903".into()))
        );
        assert_eq!(resolve_chat_reference("https://t.me/c/"), ChatResolution::Unresolved);
    }

    #[test]
    fn garbage() {
        for text in [
            "",
            "@",
            "   ",
            "https://t.me/",
            "https://notat.me/mygroup",
            "ftp://t.me/mygroup",
            "not a link at all",
            "12345",
        ] {
            assert_eq!(resolve_chat_reference(text), ChatResolution::Unresolved, "{text:?}");
        }
    }

    #[test]
    fn recipients() {
        let recipient = |text: &str| resolved(text).and_then(|x| x.to_recipient());

        assert_eq!(
            recipient("https://t.me/-1001234567890"),
            Some(Recipient::Id(ChatId(-1001234567890)))
        );
        assert_eq!(
            recipient("https://t.me/c/4629301903/"),
            Some(Recipient::Id(ChatId(-1004629301903)))
        );
        assert_eq!(
            recipient("https://t.me/c/-4629301903"),
            Some(Recipient::Id(ChatId(-4629301903)))
        );
        assert_eq!(
            recipient("@mygroup"),
            Some(Recipient::ChannelUsername("@mygroup".into()))
        );
        assert_eq!(recipient("https://t.me/+AbCdEf123"), None);
        assert_eq!(recipient("https://telegram.me/joinchat/AbCdEf123"), None);
    }
}
