use anyhow::{Context as _, Result};
use rusqlite::params;
use serenity::model::id::UserId;

use crate::database::{Database, MemberId};

/// An open leave of absence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVacation {
    pub discord_id: UserId,
    /// Unix seconds
    pub end_at: i64,
}

impl Database {
    /// Records RP points and returns the member's new balance
    pub async fn add_rp(
        &self,
        member: MemberId,
        issuer: MemberId,
        amount: i64,
        reason: &str,
        issued_at: i64,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO rp_entries (user_id, amount, reason, issued_by, issued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params!(member, amount, reason, issuer, issued_at),
        )
        .with_context(|| format!("Failed to record {} RP for member #{}", amount, member))?;
        conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM rp_entries WHERE user_id = ?1",
            params!(member),
            |row| row.get(0),
        )
        .context("Failed to read RP balance")
    }

    pub async fn rp_total(&self, member: MemberId) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COALESCE(SUM(amount), 0) FROM rp_entries WHERE user_id = ?1",
                params!(member),
                |row| row.get(0),
            )
            .context("Failed to read RP balance")
    }

    pub async fn add_warning(
        &self,
        member: MemberId,
        issuer: MemberId,
        level: i64,
        issued_at: i64,
    ) -> Result<()> {
        self.conn
            .lock()
            .await
            .execute(
                "INSERT INTO warnings (user_id, level, issued_by, issued_at)
                VALUES (?1, ?2, ?3, ?4)",
                params!(member, level, issuer, issued_at),
            )
            .with_context(|| format!("Failed to record WARN {}/3 for member #{}", level, member))?;
        Ok(())
    }

    /// Deletes the most recent warning of a level; `false` if there was none
    pub async fn remove_latest_warning(&self, member: MemberId, level: i64) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .await
            .execute(
                "DELETE FROM warnings WHERE id = (
                    SELECT id FROM warnings
                    WHERE user_id = ?1 AND level = ?2
                    ORDER BY issued_at DESC, id DESC
                    LIMIT 1
                )",
                params!(member, level),
            )
            .with_context(|| format!("Failed to delete WARN {}/3 of member #{}", level, member))?;
        Ok(deleted > 0)
    }

    /// Highest recorded warning level, 0 without warnings
    pub async fn highest_warning(&self, member: MemberId) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COALESCE(MAX(level), 0) FROM warnings WHERE user_id = ?1",
                params!(member),
                |row| row.get(0),
            )
            .context("Failed to read warning level")
    }

    pub async fn open_vacation(&self, member: MemberId, start_at: i64, end_at: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO vacations (user_id, start_at, end_at, active) VALUES (?1, ?2, ?3, 1)",
            params!(member, start_at, end_at),
        )
        .with_context(|| format!("Failed to open vacation for member #{}", member))?;
        Ok(conn.last_insert_rowid())
    }

    /// Closes the most recent active vacation; `false` if none was open
    pub async fn close_vacation(&self, member: MemberId, closed_at: i64) -> Result<bool> {
        let closed = self
            .conn
            .lock()
            .await
            .execute(
                "UPDATE vacations SET active = 0, end_at = ?2 WHERE id = (
                    SELECT id FROM vacations
                    WHERE user_id = ?1 AND active = 1
                    ORDER BY start_at DESC, id DESC
                    LIMIT 1
                )",
                params!(member, closed_at),
            )
            .with_context(|| format!("Failed to close vacation of member #{}", member))?;
        Ok(closed > 0)
    }

    pub async fn on_vacation(&self, member: MemberId) -> Result<bool> {
        let count: i64 = self
            .conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(id) FROM vacations WHERE user_id = ?1 AND active = 1",
                params!(member),
                |row| row.get(0),
            )
            .context("Failed to read vacation status")?;
        Ok(count > 0)
    }

    /// Every open vacation, latest end per member
    pub async fn active_vacations(&self) -> Result<Vec<ActiveVacation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT users.discord_id, MAX(vacations.end_at)
                FROM vacations JOIN users ON users.id = vacations.user_id
                WHERE vacations.active = 1
                GROUP BY users.discord_id",
            )
            .context("Failed to prepare vacation query")?;
        let vacations = stmt
            .query_map(params!(), |row| {
                let discord_id: i64 = row.get(0)?;
                Ok(ActiveVacation {
                    discord_id: UserId(discord_id as u64),
                    end_at: row.get(1)?,
                })
            })
            .context("Failed to read active vacations")?
            .filter_map(|row| row.ok())
            .collect();
        Ok(vacations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rp_balance_accumulates() {
        let db = Database::open_in_memory().unwrap();
        let member = db.ensure_user(UserId(1)).await.unwrap();
        let issuer = db.ensure_user(UserId(2)).await.unwrap();
        assert_eq!(db.add_rp(member, issuer, 5, "patrol", 1).await.unwrap(), 5);
        assert_eq!(db.add_rp(member, issuer, 3, "report", 2).await.unwrap(), 8);
        assert_eq!(db.rp_total(member).await.unwrap(), 8);
        assert_eq!(db.rp_total(issuer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn warnings_by_level() {
        let db = Database::open_in_memory().unwrap();
        let member = db.ensure_user(UserId(1)).await.unwrap();
        let issuer = db.ensure_user(UserId(2)).await.unwrap();
        db.add_warning(member, issuer, 1, 10).await.unwrap();
        db.add_warning(member, issuer, 2, 20).await.unwrap();
        assert_eq!(db.highest_warning(member).await.unwrap(), 2);

        assert!(db.remove_latest_warning(member, 2).await.unwrap());
        assert!(!db.remove_latest_warning(member, 2).await.unwrap());
        assert_eq!(db.highest_warning(member).await.unwrap(), 1);
        assert!(db.add_warning(member, issuer, 4, 30).await.is_err());
    }

    #[tokio::test]
    async fn vacation_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let member = db.ensure_user(UserId(7)).await.unwrap();
        assert!(!db.on_vacation(member).await.unwrap());

        db.open_vacation(member, 100, 500).await.unwrap();
        assert!(db.on_vacation(member).await.unwrap());
        assert_eq!(
            db.active_vacations().await.unwrap(),
            vec![ActiveVacation {
                discord_id: UserId(7),
                end_at: 500
            }]
        );

        assert!(db.close_vacation(member, 200).await.unwrap());
        assert!(!db.close_vacation(member, 300).await.unwrap());
        assert!(!db.on_vacation(member).await.unwrap());
        assert!(db.active_vacations().await.unwrap().is_empty());
    }
}
