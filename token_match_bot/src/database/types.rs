use std::{fmt::Display, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::UserId;

use super::Error;

/// ID of a registered project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub i64);

/// ID of a match between two projects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub i64);

impl Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for ProjectId {
    type Err = ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ProjectId)
    }
}

impl Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Market data of a project's token, as last fetched. Everything is in USD.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketData {
    pub symbol: Option<String>,
    pub price: Option<f64>,
    /// Percent, like `-3.5`.
    pub price_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

impl MarketData {
    /// Whether there's nothing worth showing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.volume_24h.is_none() && self.market_cap.is_none()
    }

    fn from_sqlite_row(row: &SqliteRow) -> Result<MarketData, Error> {
        Ok(MarketData {
            symbol: row.try_get("token_symbol")?,
            price: row.try_get("token_price")?,
            price_change_24h: row.try_get("token_price_change_24h")?,
            volume_24h: row.try_get("token_volume_24h")?,
            market_cap: row.try_get("token_market_cap")?,
        })
    }
}

/// Everything a project provides when registering or editing its profile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub contract_address: String,
    pub chains: Vec<String>,
    pub market_cap: String,
    pub categories: Vec<String>,
    pub description: Option<String>,
    /// Telegram file ID of the logo picture.
    pub logo_file_id: Option<String>,
    /// Link to the project's Telegram group, as the project wrote it.
    pub telegram_group: Option<String>,
    /// Link to the project's Telegram channel, as the project wrote it.
    pub telegram_channel: Option<String>,
    pub x_account: Option<String>,
    /// `@usernames` of the people running this project.
    pub admin_handles: Vec<String>,
    /// Fetched from market data APIs on registration, not typed in.
    pub market: MarketData,
}

/// A registered project.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub contract_address: String,
    pub chains: Vec<String>,
    pub market_cap: String,
    pub categories: Vec<String>,
    pub description: Option<String>,
    pub logo_file_id: Option<String>,
    pub telegram_group: Option<String>,
    pub telegram_channel: Option<String>,
    pub x_account: Option<String>,
    pub admin_handles: Vec<String>,
    pub market: MarketData,
    pub is_active: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub(super) fn from_sqlite_row(row: &SqliteRow) -> Result<Project, Error> {
        Ok(Project {
            id: ProjectId(row.try_get("id")?),
            name: row.try_get("name")?,
            contract_address: row.try_get("contract_address")?,
            chains: serde_json::from_str(row.try_get::<&str, _>("chains")?)?,
            market_cap: row.try_get("market_cap")?,
            categories: serde_json::from_str(row.try_get::<&str, _>("categories")?)?,
            description: row.try_get("description")?,
            logo_file_id: row.try_get("logo_file_id")?,
            telegram_group: row.try_get("telegram_group")?,
            telegram_channel: row.try_get("telegram_channel")?,
            x_account: row.try_get("x_account")?,
            admin_handles: serde_json::from_str(row.try_get::<&str, _>("admin_handles")?)?,
            market: MarketData::from_sqlite_row(row)?,
            is_active: row.try_get("is_active")?,
            verified: row.try_get("verified")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Who a Telegram user is, as far as admin records are concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminInfo {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&teloxide::types::User> for AdminInfo {
    fn from(user: &teloxide::types::User) -> Self {
        AdminInfo {
            user_id: user.id,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
        }
    }
}

/// A Telegram user running a project. A user running several projects has one of these per
/// project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admin {
    pub info: AdminInfo,
    pub project_id: ProjectId,
    pub created_at: DateTime<Utc>,
}

impl Admin {
    pub(super) fn from_sqlite_row(row: &SqliteRow) -> Result<Admin, Error> {
        Ok(Admin {
            info: AdminInfo {
                // SQLite has no u64.
                user_id: UserId(row.try_get::<i64, _>("user_id")? as u64),
                username: row.try_get("username")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
            },
            project_id: ProjectId(row.try_get("project_id")?),
            created_at: row.try_get("created_at")?,
        })
    }

    /// How to mention this admin in a message: `@username` if there is one,
    /// otherwise an HTML link with their name.
    #[must_use]
    pub fn mention(&self) -> String {
        if let Some(username) = &self.info.username {
            return format!("@{username}");
        }

        let mut name = self.info.first_name.clone().unwrap_or_default();
        if let Some(last_name) = &self.info.last_name {
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(last_name);
        }
        if name.is_empty() {
            name = format!("user {}", self.info.user_id);
        }

        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            self.info.user_id,
            html_escape::encode_text(&name)
        )
    }
}

/// A directed "like" from one project to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Like {
    pub liker: ProjectId,
    pub liked: ProjectId,
    pub created_at: DateTime<Utc>,
}

/// Two projects that liked each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub project_a: ProjectId,
    pub project_b: ProjectId,
    /// Whether the announcement in groups and channels was attempted.
    pub announced: bool,
    pub private_group_id: Option<String>,
    pub private_group_invite_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub(super) fn from_sqlite_row(row: &SqliteRow) -> Result<Match, Error> {
        Ok(Match {
            id: MatchId(row.try_get("id")?),
            project_a: ProjectId(row.try_get("project_a_id")?),
            project_b: ProjectId(row.try_get("project_b_id")?),
            announced: row.try_get("announced")?,
            private_group_id: row.try_get("private_group_id")?,
            private_group_invite_link: row.try_get("private_group_invite_link")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Given one side of this match, returns the other one.
    /// Returns [`None`] if the project is not a part of this match.
    #[must_use]
    pub fn other_side(&self, project: ProjectId) -> Option<ProjectId> {
        if project == self.project_a {
            Some(self.project_b)
        } else if project == self.project_b {
            Some(self.project_a)
        } else {
            None
        }
    }
}

/// Private coordination chat created for a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchGroup {
    pub id: i64,
    pub match_id: MatchId,
    pub telegram_group_id: String,
    pub invite_link: String,
    pub created_at: DateTime<Utc>,
}

/// Result of [`Database::create_match`].
///
/// [`Database::create_match`]: super::Database::create_match
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateMatchResult {
    /// A new match was inserted.
    Created(Match),
    /// These two projects were already matched. Nothing was inserted.
    AlreadyMatched(Match),
}

impl CreateMatchResult {
    /// Returns the match, whether it's new or not.
    #[must_use]
    pub fn into_match(self) -> Match {
        match self {
            Self::Created(m) | Self::AlreadyMatched(m) => m,
        }
    }
}

/// Counts of everything in the database, for the operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_projects: i64,
    pub active_projects: i64,
    pub verified_projects: i64,
    pub total_admins: i64,
    pub total_likes: i64,
    pub total_matches: i64,
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "<b>Projects</b>: {}", self.total_projects)?;
        writeln!(f, "<b>Active projects</b>: {}", self.active_projects)?;
        writeln!(f, "<b>Verified projects</b>: {}", self.verified_projects)?;
        writeln!(f, "<b>Admins</b>: {}", self.total_admins)?;
        writeln!(f, "<b>Likes</b>: {}", self.total_likes)?;
        write!(f, "<b>Matches</b>: {}", self.total_matches)
    }
}
