use anyhow::{Context as _, Result};
use std::sync::Arc;

use futures::lock::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serenity::model::id::UserId;

use crate::compliance::normalize_call_sign;

/// Row id of a tracked member
pub type MemberId = i64;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    discord_id     INTEGER     NOT NULL UNIQUE,
    call_sign      VARCHAR(64),
    call_sign_key  VARCHAR(64) UNIQUE,
    steam_id       VARCHAR(32),
    curator_id     INTEGER     REFERENCES users(id) ON DELETE SET NULL,
    black_mark     INTEGER     NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_users_curator ON users(curator_id);

CREATE TABLE IF NOT EXISTS rp_entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER   NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    amount     INTEGER   NOT NULL,
    reason     TEXT      NOT NULL,
    issued_by  INTEGER   REFERENCES users(id) ON DELETE SET NULL,
    issued_at  TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rp_entries_user ON rp_entries(user_id);

CREATE TABLE IF NOT EXISTS activity_reports (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    duties      INTEGER NOT NULL DEFAULT 0,
    interviews  INTEGER NOT NULL DEFAULT 0,
    date        DATE    NOT NULL,
    thread_id   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_activity_reports_user_date ON activity_reports(user_id, date);
CREATE INDEX IF NOT EXISTS idx_activity_reports_thread ON activity_reports(thread_id);

CREATE TABLE IF NOT EXISTS interrogation_reports (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    date       DATE    NOT NULL,
    thread_id  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_interrogation_reports_user_date ON interrogation_reports(user_id, date);
CREATE INDEX IF NOT EXISTS idx_interrogation_reports_thread ON interrogation_reports(thread_id);

CREATE TABLE IF NOT EXISTS warnings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER   NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    level      INTEGER   NOT NULL CHECK (level BETWEEN 1 AND 3),
    issued_by  INTEGER   REFERENCES users(id) ON DELETE SET NULL,
    issued_at  TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_warnings_user ON warnings(user_id);

CREATE TABLE IF NOT EXISTS vacations (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id   INTEGER   NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    start_at  TIMESTAMP NOT NULL,
    end_at    TIMESTAMP NOT NULL,
    active    INTEGER   NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_vacations_user ON vacations(user_id);
";

/// A tracked member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    /// Row id
    pub id: MemberId,
    /// Discord account
    pub discord_id: UserId,
    /// Call sign as the member wrote it
    pub call_sign: Option<String>,
    /// `STEAM_X:Y:Z`
    pub steam_id: Option<String>,
    /// Row id of the curator
    pub curator: Option<MemberId>,
    /// Stored black-mark flag
    pub black_mark: bool,
}

/// SQLite store shared by every handler
#[derive(Clone)]
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (and creates if needed) the database file
    pub fn open(path: &str) -> Result<Database> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open the database: {}", path))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Database> {
        Self::init(Connection::open_in_memory().context("Failed to open an in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Database> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create the database schema")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_member(row: &Row<'_>) -> rusqlite::Result<MemberRecord> {
        let discord_id: i64 = row.get(1)?;
        let black_mark: i64 = row.get(5)?;
        Ok(MemberRecord {
            id: row.get(0)?,
            discord_id: UserId(discord_id as u64),
            call_sign: row.get(2)?,
            steam_id: row.get(3)?,
            curator: row.get(4)?,
            black_mark: black_mark != 0,
        })
    }

    const MEMBER_COLUMNS: &'static str =
        "id, discord_id, call_sign, steam_id, curator_id, black_mark";

    /// Row id for a Discord user, inserting a bare row the first time
    pub async fn ensure_user(&self, discord_id: UserId) -> Result<MemberId> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO users (discord_id) VALUES (?1)",
            params!(discord_id.0 as i64),
        )
        .with_context(|| format!("Failed to register member: {}", discord_id))?;
        let id = conn
            .query_row(
                "SELECT id FROM users WHERE discord_id = ?1",
                params!(discord_id.0 as i64),
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to look up member: {}", discord_id))?;
        Ok(id)
    }

    pub async fn member(&self, discord_id: UserId) -> Result<Option<MemberRecord>> {
        let query = format!(
            "SELECT {} FROM users WHERE discord_id = ?1",
            Self::MEMBER_COLUMNS
        );
        self.conn
            .lock()
            .await
            .query_row(&query, params!(discord_id.0 as i64), Self::row_to_member)
            .optional()
            .with_context(|| format!("Failed to read member: {}", discord_id))
    }

    pub async fn member_by_id(&self, id: MemberId) -> Result<Option<MemberRecord>> {
        let query = format!("SELECT {} FROM users WHERE id = ?1", Self::MEMBER_COLUMNS);
        self.conn
            .lock()
            .await
            .query_row(&query, params!(id), Self::row_to_member)
            .optional()
            .with_context(|| format!("Failed to read member #{}", id))
    }

    /// Case-insensitive lookup by call sign
    pub async fn find_by_call_sign(&self, call_sign: &str) -> Result<Option<MemberRecord>> {
        let query = format!(
            "SELECT {} FROM users WHERE call_sign_key = ?1",
            Self::MEMBER_COLUMNS
        );
        self.conn
            .lock()
            .await
            .query_row(
                &query,
                params!(normalize_call_sign(call_sign)),
                Self::row_to_member,
            )
            .optional()
            .with_context(|| format!("Failed to look up call sign: {}", call_sign))
    }

    /// Stores the call sign; `false` when another member already holds it
    pub async fn set_call_sign(&self, member: MemberId, call_sign: &str) -> Result<bool> {
        let key = normalize_call_sign(call_sign);
        let conn = self.conn.lock().await;
        let holder: Option<MemberId> = conn
            .query_row(
                "SELECT id FROM users WHERE call_sign_key = ?1",
                params!(key),
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check call sign ownership")?;
        if holder.map_or(false, |holder| holder != member) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE users SET call_sign = ?1, call_sign_key = ?2 WHERE id = ?3",
            params!(call_sign.trim(), key, member),
        )
        .with_context(|| format!("Failed to store call sign: {}", call_sign))?;
        Ok(true)
    }

    /// Sets or clears the Steam id; returns whether a row changed
    pub async fn set_steam_id(&self, member: MemberId, steam_id: Option<&str>) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .await
            .execute(
                "UPDATE users SET steam_id = ?1 WHERE id = ?2 AND steam_id IS NOT ?1",
                params!(steam_id, member),
            )
            .context("Failed to store Steam id")?;
        Ok(changed > 0)
    }

    pub async fn set_black_mark(&self, member: MemberId, black_mark: bool) -> Result<()> {
        self.conn
            .lock()
            .await
            .execute(
                "UPDATE users SET black_mark = ?1 WHERE id = ?2",
                params!(black_mark, member),
            )
            .context("Failed to update black mark")?;
        Ok(())
    }

    pub async fn assign_curator(&self, member: MemberId, curator: MemberId) -> Result<()> {
        self.conn
            .lock()
            .await
            .execute(
                "UPDATE users SET curator_id = ?1 WHERE id = ?2",
                params!(curator, member),
            )
            .context("Failed to assign curator")?;
        Ok(())
    }

    /// `false` when the member had no curator
    pub async fn remove_curator(&self, member: MemberId) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .await
            .execute(
                "UPDATE users SET curator_id = NULL WHERE id = ?1 AND curator_id IS NOT NULL",
                params!(member),
            )
            .context("Failed to remove curator")?;
        Ok(changed > 0)
    }

    /// Discord ids of the members a curator looks after
    pub async fn mentees(&self, curator: MemberId) -> Result<Vec<UserId>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT discord_id FROM users WHERE curator_id = ?1 ORDER BY id")
            .context("Failed to prepare mentee query")?;
        let mentees = stmt
            .query_map(params!(curator), |row| row.get::<_, i64>(0))
            .context("Failed to read mentees")?
            .filter_map(|row| row.ok())
            .map(|id| UserId(id as u64))
            .collect();
        Ok(mentees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = db.ensure_user(UserId(42)).await.unwrap();
        let second = db.ensure_user(UserId(42)).await.unwrap();
        assert_eq!(first, second);

        let member = db.member(UserId(42)).await.unwrap().unwrap();
        assert_eq!(member.id, first);
        assert_eq!(member.call_sign, None);
        assert!(!member.black_mark);
        assert!(db.member(UserId(43)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn call_signs_are_unique_ignoring_case() {
        let db = Database::open_in_memory().unwrap();
        let alpha = db.ensure_user(UserId(1)).await.unwrap();
        let other = db.ensure_user(UserId(2)).await.unwrap();

        assert!(db.set_call_sign(alpha, " Альфа ").await.unwrap());
        assert!(!db.set_call_sign(other, "АЛЬФА").await.unwrap());
        // re-claiming your own call sign is fine
        assert!(db.set_call_sign(alpha, "АльФа").await.unwrap());

        let found = db.find_by_call_sign("альфа").await.unwrap().unwrap();
        assert_eq!(found.discord_id, UserId(1));
        assert_eq!(found.call_sign.as_deref(), Some("АльФа"));
    }

    #[tokio::test]
    async fn steam_id_bind_and_unbind() {
        let db = Database::open_in_memory().unwrap();
        let member = db.ensure_user(UserId(1)).await.unwrap();
        assert!(db.set_steam_id(member, Some("STEAM_0:1:42")).await.unwrap());
        assert_eq!(
            db.member(UserId(1)).await.unwrap().unwrap().steam_id.as_deref(),
            Some("STEAM_0:1:42")
        );
        assert!(db.set_steam_id(member, None).await.unwrap());
        assert!(!db.set_steam_id(member, None).await.unwrap());
    }

    #[tokio::test]
    async fn curators_and_mentees() {
        let db = Database::open_in_memory().unwrap();
        let curator = db.ensure_user(UserId(10)).await.unwrap();
        let first = db.ensure_user(UserId(11)).await.unwrap();
        let second = db.ensure_user(UserId(12)).await.unwrap();
        db.assign_curator(first, curator).await.unwrap();
        db.assign_curator(second, curator).await.unwrap();

        assert_eq!(
            db.mentees(curator).await.unwrap(),
            vec![UserId(11), UserId(12)]
        );
        assert_eq!(
            db.member(UserId(11)).await.unwrap().unwrap().curator,
            Some(curator)
        );

        assert!(db.remove_curator(first).await.unwrap());
        assert!(!db.remove_curator(first).await.unwrap());
        assert_eq!(db.mentees(curator).await.unwrap(), vec![UserId(12)]);
    }

    #[tokio::test]
    async fn deleting_a_curator_keeps_mentees() {
        let db = Database::open_in_memory().unwrap();
        let curator = db.ensure_user(UserId(10)).await.unwrap();
        let mentee = db.ensure_user(UserId(11)).await.unwrap();
        db.assign_curator(mentee, curator).await.unwrap();

        db.conn
            .lock()
            .await
            .execute("DELETE FROM users WHERE id = ?1", params!(curator))
            .unwrap();

        let record = db.member_by_id(mentee).await.unwrap().unwrap();
        assert_eq!(record.curator, None);
    }
}
