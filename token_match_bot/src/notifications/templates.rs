//! Texts of match notifications. Everything here is HTML, with user-provided text escaped.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use html_escape::encode_text;

use crate::{
    database::{Admin, MarketData, Match, Project},
    token_info::{format_change, format_price, format_usd},
};

fn date(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}

fn list_or(list: &[String], fallback: &str) -> String {
    if list.is_empty() {
        fallback.to_string()
    } else {
        encode_text(&list.join(", ")).into_owned()
    }
}

/// Bullet points of fetched market data, or [`None`] if there's none.
#[must_use]
pub fn market_lines(market: &MarketData) -> Option<String> {
    if market.is_empty() {
        return None;
    }

    let mut text = String::new();
    if let Some(symbol) = &market.symbol {
        let _ = writeln!(text, "• <b>Symbol:</b> {}", encode_text(symbol));
    }
    if let Some(price) = market.price {
        let _ = write!(text, "• <b>Price:</b> {}", format_price(price));
        if let Some(change) = market.price_change_24h {
            let _ = write!(text, " ({} 24h)", format_change(change));
        }
        text.push('\n');
    }
    if let Some(market_cap) = market.market_cap {
        let _ = writeln!(text, "• <b>Market Cap:</b> {}", format_usd(market_cap));
    }
    if let Some(volume) = market.volume_24h {
        let _ = writeln!(text, "• <b>24h Volume:</b> {}", format_usd(volume));
    }
    text.pop();
    Some(text)
}

fn announcement_header(text: &mut String, a: &Project, b: &Project, the_match: &Match) {
    let _ = writeln!(text, "💕 <b>NEW MATCH!</b>\n");
    let _ = writeln!(
        text,
        "<b>{}</b> ↔️ <b>{}</b>",
        encode_text(&a.name),
        encode_text(&b.name)
    );
    let _ = writeln!(text, "Matched: {}", date(&the_match.created_at));
    for project in [a, b] {
        let _ = writeln!(
            text,
            "{} contract: <code>{}</code>",
            encode_text(&project.name),
            encode_text(&project.contract_address)
        );
    }
}

/// Announcement posted in the projects' groups and channels.
#[must_use]
pub fn group_announcement(a: &Project, b: &Project, the_match: &Match) -> String {
    let mut text = String::new();
    announcement_header(&mut text, a, b, the_match);

    let room = the_match.private_group_invite_link.as_ref();
    if let Some(link) = room {
        let _ = writeln!(
            text,
            "<a href=\"{}\">Private Room</a>",
            html_escape::encode_double_quoted_attribute(link)
        );
    }

    text.push_str("\n<b>What's Next?</b>\n");
    if room.is_some() {
        text.push_str("• Join the private coordination room\n");
    }
    text.push_str("• Plan your AMA collaboration details\n");
    text.push_str("• Schedule and promote your joint session\n\n");
    text.push_str("💕 <b>Congratulations on your match!</b>");
    text
}

/// Announcement sent privately to administrators of the projects' groups and channels.
#[must_use]
pub fn community_announcement(a: &Project, b: &Project, the_match: &Match) -> String {
    let mut text = String::new();
    announcement_header(&mut text, a, b, the_match);

    text.push_str("\n<b>What's Next?</b>\n");
    text.push_str("• Admins will coordinate AMA details\n");
    text.push_str("• Joint announcement will be made\n");
    text.push_str("• Stay tuned for the collaboration!\n\n");
    text.push_str("<b>Congratulations to both projects!</b>");
    text
}

/// Private message to an admin of one project, telling them about the `other` project they
/// matched with.
#[must_use]
pub fn admin_notification(other: &Project, other_admins: &[Admin]) -> String {
    let name = encode_text(&other.name);
    let mut text = String::new();

    let _ = writeln!(text, "⚡ <b>IT'S A MATCH!</b> They're ready to collaborate!\n");
    let _ = writeln!(text, "💕 <b>Token:</b> {name}\n");

    text.push_str("💕 <b>Project Info:</b>\n");
    let _ = writeln!(text, "• <b>Chains:</b> {}", list_or(&other.chains, "Not specified"));
    let _ = writeln!(
        text,
        "• <b>Categories:</b> {}",
        list_or(&other.categories, "Not specified")
    );
    let _ = writeln!(
        text,
        "• <b>Market cap:</b> {}",
        encode_text(&other.market_cap)
    );
    let _ = writeln!(
        text,
        "• <b>Description:</b> {}\n",
        other
            .description
            .as_deref()
            .map(encode_text)
            .unwrap_or("No description available".into())
    );

    if let Some(market) = market_lines(&other.market) {
        let _ = writeln!(text, "💞 <b>Live Market Data:</b>\n{market}\n");
    }

    let community: Vec<String> = [
        ("Telegram Group", &other.telegram_group),
        ("Telegram Channel", &other.telegram_channel),
        ("X (Twitter)", &other.x_account),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value
            .as_ref()
            .map(|value| format!("• <b>{label}:</b> {}", encode_text(value)))
    })
    .collect();
    if !community.is_empty() {
        text.push_str("💕 <b>Community:</b>\n");
        text.push_str(&community.join("\n"));
        text.push_str("\n\n");
    }

    let _ = writeln!(text, "<b>Registered:</b> {}", date(&other.created_at));
    let _ = writeln!(
        text,
        "<b>Contract:</b> <code>{}</code>\n",
        encode_text(&other.contract_address)
    );

    let _ = writeln!(
        text,
        "🗨️ <b>Ready to collab?</b> The {name} team is waiting for your DM.\n"
    );

    let team = if !other_admins.is_empty() {
        other_admins
            .iter()
            .map(Admin::mention)
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        list_or(&other.admin_handles, "unknown")
    };
    let _ = writeln!(text, "🐺 <b>{name} Team:</b> {team}\n");

    text.push_str("💕 <b>More matches are waiting!</b> Use /browse to keep matching, ");
    text.push_str("or /matches to see all of yours.");
    text
}
