use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serenity::model::id::{ChannelId, UserId};

use crate::compliance::WeeklyWindow;
use crate::database::{Database, MemberId};

/// Identity of a stored report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportId {
    Activity(i64),
    Interrogation(i64),
}

impl ReportId {
    fn table(&self) -> &'static str {
        match self {
            ReportId::Activity(_) => "activity_reports",
            ReportId::Interrogation(_) => "interrogation_reports",
        }
    }

    fn row_id(&self) -> i64 {
        match self {
            ReportId::Activity(id) | ReportId::Interrogation(id) => *id,
        }
    }
}

/// Activity report after its interview count changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub report: ReportId,
    pub duties: i64,
    pub interviews: i64,
    pub thread: Option<ChannelId>,
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Database {
    /// Appends an activity report; repeated submissions become separate rows
    pub async fn insert_activity_report(
        &self,
        member: MemberId,
        duties: u32,
        interviews: i64,
        date: NaiveDate,
    ) -> Result<ReportId> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO activity_reports (user_id, duties, interviews, date)
            VALUES (?1, ?2, ?3, ?4)",
            params!(member, duties, interviews, date_key(date)),
        )
        .with_context(|| format!("Failed to store activity report of member #{}", member))?;
        Ok(ReportId::Activity(conn.last_insert_rowid()))
    }

    pub async fn insert_interrogation_report(
        &self,
        member: MemberId,
        date: NaiveDate,
    ) -> Result<ReportId> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO interrogation_reports (user_id, date) VALUES (?1, ?2)",
            params!(member, date_key(date)),
        )
        .with_context(|| {
            format!(
                "Failed to store interrogation report of member #{}",
                member
            )
        })?;
        Ok(ReportId::Interrogation(conn.last_insert_rowid()))
    }

    /// Remembers the discussion thread opened for a report
    pub async fn attach_thread(&self, report: ReportId, thread: ChannelId) -> Result<()> {
        let query = format!("UPDATE {} SET thread_id = ?1 WHERE id = ?2", report.table());
        self.conn
            .lock()
            .await
            .execute(&query, params!(thread.0 as i64, report.row_id()))
            .with_context(|| format!("Failed to attach thread {} to {:?}", thread, report))?;
        Ok(())
    }

    pub async fn sum_duties_in_range(&self, member: MemberId, window: &WeeklyWindow) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COALESCE(SUM(duties), 0) FROM activity_reports
                WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
                params!(member, date_key(window.start), date_key(window.end)),
                |row| row.get(0),
            )
            .context("Failed to sum duties")
    }

    pub async fn count_interrogations_in_range(
        &self,
        member: MemberId,
        window: &WeeklyWindow,
    ) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(id) FROM interrogation_reports
                WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
                params!(member, date_key(window.start), date_key(window.end)),
                |row| row.get(0),
            )
            .context("Failed to count interrogations")
    }

    pub async fn total_duties(&self, member: MemberId) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COALESCE(SUM(duties), 0) FROM activity_reports WHERE user_id = ?1",
                params!(member),
                |row| row.get(0),
            )
            .context("Failed to sum all duties")
    }

    pub async fn total_interrogations(&self, member: MemberId) -> Result<i64> {
        self.conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(id) FROM interrogation_reports WHERE user_id = ?1",
                params!(member),
                |row| row.get(0),
            )
            .context("Failed to count all interrogations")
    }

    /// Deletes a report; a report that no longer exists is left alone
    pub async fn delete_report(&self, report: ReportId) -> Result<bool> {
        let query = format!("DELETE FROM {} WHERE id = ?1", report.table());
        let deleted = self
            .conn
            .lock()
            .await
            .execute(&query, params!(report.row_id()))
            .with_context(|| format!("Failed to delete {:?}", report))?;
        Ok(deleted > 0)
    }

    /// Report a discussion thread was opened for
    pub async fn find_by_thread_id(&self, thread: ChannelId) -> Result<Option<ReportId>> {
        let conn = self.conn.lock().await;
        let activity: Option<i64> = conn
            .query_row(
                "SELECT id FROM activity_reports WHERE thread_id = ?1",
                params!(thread.0 as i64),
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up activity thread")?;
        if let Some(id) = activity {
            return Ok(Some(ReportId::Activity(id)));
        }
        let interrogation: Option<i64> = conn
            .query_row(
                "SELECT id FROM interrogation_reports WHERE thread_id = ?1",
                params!(thread.0 as i64),
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up interrogation thread")?;
        Ok(interrogation.map(ReportId::Interrogation))
    }

    /// Discord id of the member owning a report
    pub async fn report_owner(&self, report: ReportId) -> Result<Option<UserId>> {
        let query = format!(
            "SELECT users.discord_id FROM {table} JOIN users ON users.id = {table}.user_id
            WHERE {table}.id = ?1",
            table = report.table()
        );
        let owner: Option<i64> = self
            .conn
            .lock()
            .await
            .query_row(&query, params!(report.row_id()), |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read owner of {:?}", report))?;
        Ok(owner.map(|id| UserId(id as u64)))
    }

    /// Bumps the cached interview count of the member's most recently submitted activity report of the week
    pub async fn record_late_interrogation(
        &self,
        member: MemberId,
        window: &WeeklyWindow,
    ) -> Result<Option<ActivitySnapshot>> {
        let conn = self.conn.lock().await;
        let latest: Option<i64> = conn
            .query_row(
                "SELECT id FROM activity_reports
                WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3
                ORDER BY id DESC
                LIMIT 1",
                params!(member, date_key(window.start), date_key(window.end)),
                |row| row.get(0),
            )
            .optional()
            .context("Failed to find the week's activity report")?;
        let id = match latest {
            Some(id) => id,
            None => return Ok(None),
        };
        conn.execute(
            "UPDATE activity_reports SET interviews = interviews + 1 WHERE id = ?1",
            params!(id),
        )
        .context("Failed to update interview count")?;
        let snapshot = conn
            .query_row(
                "SELECT duties, interviews, thread_id FROM activity_reports WHERE id = ?1",
                params!(id),
                |row| {
                    let thread: Option<i64> = row.get(2)?;
                    Ok(ActivitySnapshot {
                        report: ReportId::Activity(id),
                        duties: row.get(0)?,
                        interviews: row.get(1)?,
                        thread: thread.map(|thread| ChannelId(thread as u64)),
                    })
                },
            )
            .context("Failed to read the updated activity report")?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn member(db: &Database, id: u64) -> MemberId {
        db.ensure_user(UserId(id)).await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_submissions_are_kept() {
        let db = Database::open_in_memory().unwrap();
        let alpha = member(&db, 1).await;
        let first = db
            .insert_activity_report(alpha, 2, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        let second = db
            .insert_activity_report(alpha, 2, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        assert_ne!(first, second);
        let window = WeeklyWindow::containing(ymd(2024, 3, 4));
        assert_eq!(db.sum_duties_in_range(alpha, &window).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn retraction_by_thread_removes_only_that_row() {
        let db = Database::open_in_memory().unwrap();
        let alpha = member(&db, 1).await;
        let kept = db
            .insert_activity_report(alpha, 3, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        let retracted = db
            .insert_activity_report(alpha, 5, 0, ymd(2024, 3, 5))
            .await
            .unwrap();
        let interrogation = db
            .insert_interrogation_report(alpha, ymd(2024, 3, 5))
            .await
            .unwrap();
        db.attach_thread(kept, ChannelId(100)).await.unwrap();
        db.attach_thread(retracted, ChannelId(101)).await.unwrap();
        db.attach_thread(interrogation, ChannelId(102)).await.unwrap();

        let found = db.find_by_thread_id(ChannelId(101)).await.unwrap();
        assert_eq!(found, Some(retracted));
        assert_eq!(
            db.find_by_thread_id(ChannelId(102)).await.unwrap(),
            Some(interrogation)
        );
        assert_eq!(db.report_owner(retracted).await.unwrap(), Some(UserId(1)));

        assert!(db.delete_report(retracted).await.unwrap());
        let window = WeeklyWindow::containing(ymd(2024, 3, 4));
        assert_eq!(db.sum_duties_in_range(alpha, &window).await.unwrap(), 3);
        assert_eq!(
            db.count_interrogations_in_range(alpha, &window).await.unwrap(),
            1
        );
        assert_eq!(db.find_by_thread_id(ChannelId(101)).await.unwrap(), None);
        assert_eq!(
            db.find_by_thread_id(ChannelId(100)).await.unwrap(),
            Some(kept)
        );

        // retracting again is a no-op
        assert!(!db.delete_report(retracted).await.unwrap());
        assert_eq!(db.find_by_thread_id(ChannelId(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn late_interrogation_updates_last_submitted_report_of_the_week() {
        let db = Database::open_in_memory().unwrap();
        let alpha = member(&db, 1).await;
        db.insert_activity_report(alpha, 1, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        let latest = db
            .insert_activity_report(alpha, 4, 0, ymd(2024, 3, 6))
            .await
            .unwrap();
        db.attach_thread(latest, ChannelId(55)).await.unwrap();
        // next week's report must not be touched
        db.insert_activity_report(alpha, 9, 0, ymd(2024, 3, 11))
            .await
            .unwrap();

        let window = WeeklyWindow::containing(ymd(2024, 3, 7));
        let snapshot = db
            .record_late_interrogation(alpha, &window)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot,
            ActivitySnapshot {
                report: latest,
                duties: 4,
                interviews: 1,
                thread: Some(ChannelId(55)),
            }
        );

        // a backdated report submitted later takes the next bump
        let backdated = db
            .insert_activity_report(alpha, 2, 0, ymd(2024, 3, 5))
            .await
            .unwrap();
        let snapshot = db
            .record_late_interrogation(alpha, &window)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.report, backdated);
        assert_eq!(snapshot.interviews, 1);

        let empty_week = WeeklyWindow::containing(ymd(2024, 4, 1));
        assert_eq!(
            db.record_late_interrogation(alpha, &empty_week).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn totals_span_all_weeks() {
        let db = Database::open_in_memory().unwrap();
        let alpha = member(&db, 1).await;
        db.insert_activity_report(alpha, 2, 0, ymd(2024, 1, 1))
            .await
            .unwrap();
        db.insert_activity_report(alpha, 3, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        db.insert_interrogation_report(alpha, ymd(2024, 2, 2))
            .await
            .unwrap();
        assert_eq!(db.total_duties(alpha).await.unwrap(), 5);
        assert_eq!(db.total_interrogations(alpha).await.unwrap(), 1);
    }
}
