mod types;

use std::{str::FromStr, time::Duration};

use chrono::Utc;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite,
};
use teloxide::types::UserId;

pub use types::*;

type Pool = sqlx::Pool<Sqlite>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("malformed list in the database: {0}")]
    MalformedList(#[from] serde_json::Error),
    #[error("a project cannot like itself")]
    SelfLike,
    #[error("a project cannot match with itself")]
    SelfMatch,
    #[error("contract address {0} is already registered")]
    DuplicateContract(String),
}

/// Maps a uniqueness violation on insert into [`Error::DuplicateContract`].
fn contract_conflict(error: sqlx::Error, contract_address: &str) -> Error {
    match &error {
        sqlx::Error::Database(e) if e.is_unique_violation() => {
            Error::DuplicateContract(contract_address.to_string())
        }
        _ => Error::Sqlx(error),
    }
}

fn encode_list(list: &[String]) -> Result<String, Error> {
    Ok(serde_json::to_string(list)?)
}

pub struct Database {
    pool: Pool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database at this URL, like `sqlite:matches.sqlite`.
    pub async fn new(url: &str) -> Result<Database, Error> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::from_str(url)?
                    .pragma("cache_size", "-32768")
                    .busy_timeout(Duration::from_secs(600)),
            )
            .await?;

        Self::with_pool(pool).await
    }

    /// Opens a fresh database that only lives in memory.
    pub async fn new_in_memory() -> Result<Database, Error> {
        // Every connection to ":memory:" is its own database, so keep exactly one around forever.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: Pool) -> Result<Database, Error> {
        // PROJECTS:
        // id (key, i64)
        // name, contract_address (unique), market_cap (strings)
        // chains, categories, admin_handles (JSON arrays of strings)
        // description, logo_file_id, telegram_group, telegram_channel, x_account (may be NULL)
        // token_symbol, token_price, token_price_change_24h, token_volume_24h,
        //   token_market_cap (market data in USD, may be NULL)
        // is_active, verified (0 for no, 1 for yes)
        // created_at, updated_at (date+time in UTC)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                contract_address TEXT NOT NULL UNIQUE,
                chains TEXT NOT NULL,
                market_cap TEXT NOT NULL,
                categories TEXT NOT NULL,
                description TEXT NULL,
                logo_file_id TEXT NULL,
                telegram_group TEXT NULL,
                telegram_channel TEXT NULL,
                x_account TEXT NULL,
                admin_handles TEXT NOT NULL,
                token_symbol TEXT NULL,
                token_price REAL NULL,
                token_price_change_24h REAL NULL,
                token_volume_24h REAL NULL,
                token_market_cap REAL NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            ) STRICT;",
        ))
        .await?;

        // Transparent database migration for databases from before market data.
        // Each one fails harmlessly if the column already exists.
        for column in [
            "token_symbol TEXT NULL",
            "token_price REAL NULL",
            "token_price_change_24h REAL NULL",
            "token_volume_24h REAL NULL",
            "token_market_cap REAL NULL",
        ] {
            let _ = pool
                .execute(sqlx::query(&format!(
                    "ALTER TABLE projects ADD COLUMN {column};"
                )))
                .await;
        }

        // ADMINS:
        // user_id (i64 because sqlite doesn't support u64)
        // username, first_name, last_name (may be NULL)
        // project_id (i64)
        // One row per (user, project) pair.
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS admins (
                user_id INTEGER NOT NULL,
                username TEXT NULL,
                first_name TEXT NULL,
                last_name TEXT NULL,
                project_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, project_id)
            ) STRICT;",
        ))
        .await?;

        // LIKES:
        // liker_project_id, liked_project_id (i64, unique as a pair, never equal)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS likes (
                liker_project_id INTEGER NOT NULL,
                liked_project_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (liker_project_id, liked_project_id),
                CHECK (liker_project_id != liked_project_id)
            ) STRICT;",
        ))
        .await?;

        // MATCHES:
        // id (key, i64)
        // project_a_id, project_b_id (i64, never equal)
        // announced (0 for no, 1 for yes)
        // private_group_id, private_group_invite_link (may be NULL)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY NOT NULL,
                project_a_id INTEGER NOT NULL,
                project_b_id INTEGER NOT NULL,
                announced INTEGER NOT NULL DEFAULT 0,
                private_group_id TEXT NULL,
                private_group_invite_link TEXT NULL,
                created_at TEXT NOT NULL,
                CHECK (project_a_id != project_b_id)
            ) STRICT;",
        ))
        .await?;

        // At most one match per pair, no matter who liked first.
        pool.execute(sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS matches_pair ON matches(
                min(project_a_id, project_b_id),
                max(project_a_id, project_b_id)
            );",
        ))
        .await?;

        // MATCH_GROUPS:
        // id (key, i64)
        // match_id (i64)
        // telegram_group_id, invite_link (strings)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS match_groups (
                id INTEGER PRIMARY KEY NOT NULL,
                match_id INTEGER NOT NULL,
                telegram_group_id TEXT NOT NULL,
                invite_link TEXT NOT NULL,
                created_at TEXT NOT NULL
            ) STRICT;",
        ))
        .await?;

        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS projects_is_active ON projects(is_active);")
            .execute(&pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS admins_project ON admins(project_id);")
            .execute(&pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS likes_liked ON likes(liked_project_id);")
            .execute(&pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS matches_announced ON matches(announced);")
            .execute(&pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS match_groups_match ON match_groups(match_id);")
            .execute(&pool)
            .await;

        Ok(Database { pool })
    }

    /// Returns `true` if the database answers queries.
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1;").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("Database health check failed: {e}");
                false
            }
        }
    }

    /////////////////////////// PROJECTS

    /// Registers a new project.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateContract`] if a project with this contract address exists.
    pub async fn create_project(&self, project: &NewProject) -> Result<Project, Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO projects(name, contract_address, chains, market_cap, categories,
                description, logo_file_id, telegram_group, telegram_channel, x_account,
                admin_handles, token_symbol, token_price, token_price_change_24h,
                token_volume_24h, token_market_cap, is_active, verified, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?);",
        )
        .bind(&project.name)
        .bind(&project.contract_address)
        .bind(encode_list(&project.chains)?)
        .bind(&project.market_cap)
        .bind(encode_list(&project.categories)?)
        .bind(&project.description)
        .bind(&project.logo_file_id)
        .bind(&project.telegram_group)
        .bind(&project.telegram_channel)
        .bind(&project.x_account)
        .bind(encode_list(&project.admin_handles)?)
        .bind(&project.market.symbol)
        .bind(project.market.price)
        .bind(project.market.price_change_24h)
        .bind(project.market.volume_24h)
        .bind(project.market.market_cap)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| contract_conflict(e, &project.contract_address))?;

        let id = ProjectId(result.last_insert_rowid());
        self.get_project(id)
            .await?
            .ok_or(Error::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Overwrites a project's profile with new data. The logo and market data are kept if the
    /// new data has none. Returns [`None`] if there's no such project.
    pub async fn update_project(
        &self,
        id: ProjectId,
        project: &NewProject,
    ) -> Result<Option<Project>, Error> {
        sqlx::query(
            "UPDATE projects SET name=?, contract_address=?, chains=?, market_cap=?,
                categories=?, description=?, logo_file_id=COALESCE(?, logo_file_id),
                telegram_group=?, telegram_channel=?, x_account=?, admin_handles=?,
                token_symbol=COALESCE(?, token_symbol),
                token_price=COALESCE(?, token_price),
                token_price_change_24h=COALESCE(?, token_price_change_24h),
                token_volume_24h=COALESCE(?, token_volume_24h),
                token_market_cap=COALESCE(?, token_market_cap),
                updated_at=?
            WHERE id=?;",
        )
        .bind(&project.name)
        .bind(&project.contract_address)
        .bind(encode_list(&project.chains)?)
        .bind(&project.market_cap)
        .bind(encode_list(&project.categories)?)
        .bind(&project.description)
        .bind(&project.logo_file_id)
        .bind(&project.telegram_group)
        .bind(&project.telegram_channel)
        .bind(&project.x_account)
        .bind(encode_list(&project.admin_handles)?)
        .bind(&project.market.symbol)
        .bind(project.market.price)
        .bind(project.market.price_change_24h)
        .bind(project.market.volume_24h)
        .bind(project.market.market_cap)
        .bind(Utc::now())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| contract_conflict(e, &project.contract_address))?;

        self.get_project(id).await
    }

    /// Returns [`None`] if there's no project with this ID.
    pub async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, Error> {
        sqlx::query("SELECT * FROM projects WHERE id=?;")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Project::from_sqlite_row)
            .transpose()
    }

    /// Returns [`None`] if there's no project with this contract address.
    pub async fn get_project_by_contract(
        &self,
        contract_address: &str,
    ) -> Result<Option<Project>, Error> {
        sqlx::query("SELECT * FROM projects WHERE contract_address=?;")
            .bind(contract_address)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Project::from_sqlite_row)
            .transpose()
    }

    /// Active projects this project hasn't liked yet, excluding itself. Newest first.
    pub async fn get_projects_not_liked_by(
        &self,
        project: ProjectId,
    ) -> Result<Vec<Project>, Error> {
        sqlx::query(
            "SELECT * FROM projects
            WHERE is_active=1 AND id!=?
                AND id NOT IN (SELECT liked_project_id FROM likes WHERE liker_project_id=?)
            ORDER BY created_at DESC, id DESC;",
        )
        .bind(project.0)
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Project::from_sqlite_row)
        .collect()
    }

    /// Deletes the project along with its likes (both ways), matches, match groups and admin
    /// records. Returns `false` if there was no such project.
    pub async fn delete_project(&self, id: ProjectId) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM match_groups WHERE match_id IN
                (SELECT id FROM matches WHERE project_a_id=? OR project_b_id=?);",
        )
        .bind(id.0)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM matches WHERE project_a_id=? OR project_b_id=?;")
            .bind(id.0)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM likes WHERE liker_project_id=? OR liked_project_id=?;")
            .bind(id.0)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM admins WHERE project_id=?;")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM projects WHERE id=?;")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    /////////////////////////// ADMINS

    /// Records this user as an admin of this project, or refreshes their names if they
    /// already are one.
    pub async fn create_or_update_admin(
        &self,
        info: &AdminInfo,
        project: ProjectId,
    ) -> Result<Admin, Error> {
        sqlx::query(
            "INSERT INTO admins(user_id, username, first_name, last_name, project_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, project_id) DO
            UPDATE SET username=excluded.username, first_name=excluded.first_name,
                last_name=excluded.last_name;",
        )
        .bind(info.user_id.0 as i64)
        .bind(&info.username)
        .bind(&info.first_name)
        .bind(&info.last_name)
        .bind(project.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query("SELECT * FROM admins WHERE user_id=? AND project_id=?;")
            .bind(info.user_id.0 as i64)
            .bind(project.0)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::from)
            .and_then(|row| Admin::from_sqlite_row(&row))
    }

    /// All admin records of this user, one per project they run. Oldest first.
    pub async fn get_admins_by_user(&self, user: UserId) -> Result<Vec<Admin>, Error> {
        sqlx::query("SELECT * FROM admins WHERE user_id=? ORDER BY created_at, project_id;")
            .bind(user.0 as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Admin::from_sqlite_row)
            .collect()
    }

    /// Everyone running this project.
    pub async fn get_admins_by_project(&self, project: ProjectId) -> Result<Vec<Admin>, Error> {
        sqlx::query("SELECT * FROM admins WHERE project_id=? ORDER BY created_at, user_id;")
            .bind(project.0)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Admin::from_sqlite_row)
            .collect()
    }

    /// Convenience function to check if this user runs this project.
    pub async fn is_admin_of(&self, user: UserId, project: ProjectId) -> Result<bool, Error> {
        Ok(sqlx::query("SELECT 1 FROM admins WHERE user_id=? AND project_id=?;")
            .bind(user.0 as i64)
            .bind(project.0)
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }

    /////////////////////////// LIKES

    /// Records that `liker` likes `liked`. Liking the same project again changes nothing and
    /// returns the original like.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SelfLike`] if both are the same project.
    pub async fn create_like(&self, liker: ProjectId, liked: ProjectId) -> Result<Like, Error> {
        if liker == liked {
            return Err(Error::SelfLike);
        }

        sqlx::query(
            "INSERT INTO likes(liker_project_id, liked_project_id, created_at)
            VALUES (?, ?, ?)
        ON CONFLICT DO NOTHING;",
        )
        .bind(liker.0)
        .bind(liked.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let created_at = sqlx::query(
            "SELECT created_at FROM likes WHERE liker_project_id=? AND liked_project_id=?;",
        )
        .bind(liker.0)
        .bind(liked.0)
        .fetch_one(&self.pool)
        .await?
        .try_get("created_at")?;

        Ok(Like {
            liker,
            liked,
            created_at,
        })
    }

    pub async fn has_liked(&self, liker: ProjectId, liked: ProjectId) -> Result<bool, Error> {
        Ok(sqlx::query("SELECT 1 FROM likes WHERE liker_project_id=? AND liked_project_id=?;")
            .bind(liker.0)
            .bind(liked.0)
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }

    /// Returns `true` only if both projects liked each other.
    ///
    /// This never fails: a broken query is logged and counts as "no".
    pub async fn check_mutual_like(&self, a: ProjectId, b: ProjectId) -> bool {
        if a == b {
            return false;
        }

        let count = sqlx::query(
            "SELECT COUNT(*) FROM likes
            WHERE (liker_project_id=? AND liked_project_id=?)
                OR (liker_project_id=? AND liked_project_id=?);",
        )
        .bind(a.0)
        .bind(b.0)
        .bind(b.0)
        .bind(a.0)
        .map(|row: SqliteRow| row.get::<i64, _>(0))
        .fetch_one(&self.pool)
        .await;

        match count {
            Ok(count) => count == 2,
            Err(e) => {
                log::error!("Failed to check mutual like of {a} and {b}: {e}");
                false
            }
        }
    }

    /////////////////////////// MATCHES

    /// Creates a match between these two projects, unless there already is one between them,
    /// in either order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SelfMatch`] if both are the same project.
    pub async fn create_match(
        &self,
        a: ProjectId,
        b: ProjectId,
    ) -> Result<CreateMatchResult, Error> {
        if a == b {
            return Err(Error::SelfMatch);
        }

        let result = sqlx::query(
            "INSERT INTO matches(project_a_id, project_b_id, announced, created_at)
            VALUES (?, ?, 0, ?)
        ON CONFLICT DO NOTHING;",
        )
        .bind(a.0)
        .bind(b.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;

        let the_match = sqlx::query(
            "SELECT * FROM matches
            WHERE min(project_a_id, project_b_id)=min(?, ?)
                AND max(project_a_id, project_b_id)=max(?, ?);",
        )
        .bind(a.0)
        .bind(b.0)
        .bind(a.0)
        .bind(b.0)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
        .and_then(|row| Match::from_sqlite_row(&row))?;

        Ok(match inserted {
            true => CreateMatchResult::Created(the_match),
            false => CreateMatchResult::AlreadyMatched(the_match),
        })
    }

    /// Returns [`None`] if there's no match with this ID.
    pub async fn get_match(&self, id: MatchId) -> Result<Option<Match>, Error> {
        sqlx::query("SELECT * FROM matches WHERE id=?;")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Match::from_sqlite_row)
            .transpose()
    }

    /// All matches this project is a part of. Newest first.
    pub async fn get_matches_by_project(&self, project: ProjectId) -> Result<Vec<Match>, Error> {
        sqlx::query(
            "SELECT * FROM matches WHERE project_a_id=? OR project_b_id=?
            ORDER BY created_at DESC, id DESC;",
        )
        .bind(project.0)
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Match::from_sqlite_row)
        .collect()
    }

    /// Returns [`None`] if there's no match with this ID.
    pub async fn update_match_announced(
        &self,
        id: MatchId,
        announced: bool,
    ) -> Result<Option<Match>, Error> {
        sqlx::query("UPDATE matches SET announced=? WHERE id=?;")
            .bind(announced)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        self.get_match(id).await
    }

    /// Remembers the private coordination chat of a match.
    /// Returns [`None`] if there's no match with this ID.
    pub async fn update_match_private_group(
        &self,
        id: MatchId,
        group_id: &str,
        invite_link: &str,
    ) -> Result<Option<Match>, Error> {
        sqlx::query("UPDATE matches SET private_group_id=?, private_group_invite_link=? WHERE id=?;")
            .bind(group_id)
            .bind(invite_link)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        self.get_match(id).await
    }

    /// Matches whose announcement was never attempted. Oldest first.
    pub async fn get_unannounced_matches(&self) -> Result<Vec<Match>, Error> {
        sqlx::query("SELECT * FROM matches WHERE announced=0 ORDER BY created_at, id;")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Match::from_sqlite_row)
            .collect()
    }

    pub async fn create_match_group(
        &self,
        match_id: MatchId,
        telegram_group_id: &str,
        invite_link: &str,
    ) -> Result<MatchGroup, Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO match_groups(match_id, telegram_group_id, invite_link, created_at)
            VALUES (?, ?, ?, ?);",
        )
        .bind(match_id.0)
        .bind(telegram_group_id)
        .bind(invite_link)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(MatchGroup {
            id: result.last_insert_rowid(),
            match_id,
            telegram_group_id: telegram_group_id.to_string(),
            invite_link: invite_link.to_string(),
            created_at: now,
        })
    }

    /////////////////////////// MISC

    pub async fn get_statistics(&self) -> Result<Statistics, Error> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM projects WHERE is_active=1),
                (SELECT COUNT(*) FROM projects WHERE verified=1),
                (SELECT COUNT(*) FROM admins),
                (SELECT COUNT(*) FROM likes),
                (SELECT COUNT(*) FROM matches);",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Statistics {
            total_projects: row.try_get(0)?,
            active_projects: row.try_get(1)?,
            verified_projects: row.try_get(2)?,
            total_admins: row.try_get(3)?,
            total_likes: row.try_get(4)?,
            total_matches: row.try_get(5)?,
        })
    }
}
