use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use serenity::model::id::UserId;

use crate::database::{Database, MemberId};

/// Duties needed per week
pub const REQUIRED_DUTIES: i64 = 3;
/// Interrogations needed per week
pub const REQUIRED_INTERVIEWS: i64 = 1;

/// Monday to Sunday span, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyWindow {
    /// Monday
    pub start: NaiveDate,
    /// Sunday
    pub end: NaiveDate,
}

impl WeeklyWindow {
    /// The week containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// `dd.mm.yyyy–dd.mm.yyyy`
    pub fn label(&self) -> String {
        format!(
            "{}–{}",
            self.start.format("%d.%m.%Y"),
            self.end.format("%d.%m.%Y")
        )
    }
}

/// Weekly totals and whether they meet the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceVerdict {
    pub duties: i64,
    pub interviews: i64,
    pub pass: bool,
}

impl ComplianceVerdict {
    pub fn new(duties: i64, interviews: i64) -> Self {
        Self {
            duties,
            interviews,
            pass: duties >= REQUIRED_DUTIES && interviews >= REQUIRED_INTERVIEWS,
        }
    }

    pub fn emoji(&self) -> &'static str {
        if self.pass {
            "✅"
        } else {
            "❌"
        }
    }
}

/// Trimmed, lowercased call sign used for lookups
pub fn normalize_call_sign(call_sign: &str) -> String {
    call_sign.trim().to_lowercase()
}

/// Verdict for a stored member over the week containing `as_of`
pub async fn evaluate_member(
    db: &Database,
    member: MemberId,
    as_of: NaiveDate,
) -> Result<ComplianceVerdict> {
    let window = WeeklyWindow::containing(as_of);
    let duties = db.sum_duties_in_range(member, &window).await?;
    let interviews = db.count_interrogations_in_range(member, &window).await?;
    Ok(ComplianceVerdict::new(duties, interviews))
}

/// Verdict for a call sign; an unknown call sign has nothing reported
pub async fn evaluate(db: &Database, call_sign: &str, as_of: NaiveDate) -> Result<ComplianceVerdict> {
    match db.find_by_call_sign(call_sign).await? {
        Some(member) => evaluate_member(db, member.id, as_of).await,
        None => Ok(ComplianceVerdict::new(0, 0)),
    }
}

/// Names a guild member is known by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub handle: String,
}

/// Resolves a call sign: stored call sign, then display name, then handle
pub fn resolve_owner(
    call_sign: &str,
    stored: Option<UserId>,
    guild_members: &[GuildIdentity],
) -> Option<UserId> {
    if stored.is_some() {
        return stored;
    }
    let key = normalize_call_sign(call_sign);
    guild_members
        .iter()
        .find(|member| member.display_name.to_lowercase() == key)
        .or_else(|| {
            guild_members
                .iter()
                .find(|member| member.handle.to_lowercase() == key)
        })
        .map(|member| member.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_store::ReportId;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_is_monday_aligned() {
        // 2024-03-06 is a Wednesday
        let window = WeeklyWindow::containing(ymd(2024, 3, 6));
        assert_eq!(window.start, ymd(2024, 3, 4));
        assert_eq!(window.end, ymd(2024, 3, 10));
        assert_eq!(WeeklyWindow::containing(ymd(2024, 3, 4)), window);
        assert_eq!(WeeklyWindow::containing(ymd(2024, 3, 10)), window);
        assert_eq!(window.label(), "04.03.2024–10.03.2024");
    }

    #[test]
    fn sunday_and_next_monday_are_different_weeks() {
        let sunday = WeeklyWindow::containing(ymd(2024, 3, 10));
        let monday = WeeklyWindow::containing(ymd(2024, 3, 11));
        assert_ne!(sunday, monday);
        assert_eq!(sunday.end, ymd(2024, 3, 10));
        assert_eq!(monday.start, ymd(2024, 3, 11));
    }

    #[test]
    fn quota_boundaries() {
        assert!(!ComplianceVerdict::new(2, 1).pass);
        assert!(!ComplianceVerdict::new(3, 0).pass);
        assert!(ComplianceVerdict::new(3, 1).pass);
        assert!(ComplianceVerdict::new(10, 4).pass);
    }

    #[test]
    fn resolution_priority() {
        let members = vec![
            GuildIdentity {
                user_id: UserId(1),
                display_name: "Someone".to_string(),
                handle: "alpha".to_string(),
            },
            GuildIdentity {
                user_id: UserId(2),
                display_name: "ALPHA".to_string(),
                handle: "other".to_string(),
            },
        ];
        assert_eq!(resolve_owner(" Alpha ", None, &members), Some(UserId(2)));
        assert_eq!(
            resolve_owner("Alpha", Some(UserId(9)), &members),
            Some(UserId(9))
        );
        assert_eq!(resolve_owner("someone", None, &members), Some(UserId(1)));
        assert_eq!(resolve_owner("nobody", None, &members), None);
    }

    #[tokio::test]
    async fn evaluates_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        let alpha = db.ensure_user(UserId(1)).await.unwrap();
        db.set_call_sign(alpha, "Alpha").await.unwrap();
        db.insert_activity_report(alpha, 4, 0, ymd(2024, 3, 4))
            .await
            .unwrap();

        let verdict = evaluate(&db, "alpha", ymd(2024, 3, 4)).await.unwrap();
        assert_eq!(
            verdict,
            ComplianceVerdict {
                duties: 4,
                interviews: 0,
                pass: false
            }
        );
        // deterministic
        assert_eq!(evaluate(&db, "alpha", ymd(2024, 3, 4)).await.unwrap(), verdict);
        assert_eq!(
            evaluate(&db, "ghost", ymd(2024, 3, 4)).await.unwrap(),
            ComplianceVerdict::new(0, 0)
        );
    }

    #[tokio::test]
    async fn aggregates_only_inside_the_week() {
        let db = Database::open_in_memory().unwrap();
        let member = db.ensure_user(UserId(1)).await.unwrap();
        db.set_call_sign(member, "Alpha").await.unwrap();
        db.insert_activity_report(member, 2, 0, ymd(2024, 3, 10))
            .await
            .unwrap();
        db.insert_activity_report(member, 1, 0, ymd(2024, 3, 4))
            .await
            .unwrap();
        db.insert_activity_report(member, 5, 0, ymd(2024, 3, 11))
            .await
            .unwrap();
        let interrogation = db
            .insert_interrogation_report(member, ymd(2024, 3, 7))
            .await
            .unwrap();
        assert!(matches!(interrogation, ReportId::Interrogation(_)));

        let week = evaluate_member(&db, member, ymd(2024, 3, 6)).await.unwrap();
        assert_eq!(week, ComplianceVerdict::new(3, 1));
        assert!(week.pass);

        let next = evaluate_member(&db, member, ymd(2024, 3, 11)).await.unwrap();
        assert_eq!(next, ComplianceVerdict::new(5, 0));
    }
}
