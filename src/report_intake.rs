use anyhow::Result;
use log::warn;
use serenity::model::id::UserId;

use crate::compliance::{evaluate, evaluate_member, resolve_owner, ComplianceVerdict, GuildIdentity, WeeklyWindow};
use crate::database::{Database, MemberId};
use crate::report_parser::ParsedReport;
use crate::report_store::{ActivitySnapshot, ReportId};

/// Outcome of storing a parsed report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intake {
    Activity {
        report: ReportId,
        owner: UserId,
        verdict: ComplianceVerdict,
    },
    Interrogation {
        report: ReportId,
        owner: UserId,
        /// Activity report of the same week whose interview count went up
        updated: Option<ActivitySnapshot>,
        verdict: ComplianceVerdict,
    },
}

impl Intake {
    pub fn report(&self) -> ReportId {
        match self {
            Intake::Activity { report, .. } | Intake::Interrogation { report, .. } => *report,
        }
    }
}

/// Member a report belongs to, falling back to whoever posted it
pub async fn resolve_report_owner(
    db: &Database,
    call_sign: &str,
    guild_members: &[GuildIdentity],
    author: UserId,
) -> Result<UserId> {
    let stored = db
        .find_by_call_sign(call_sign)
        .await?
        .map(|member| member.discord_id);
    Ok(resolve_owner(call_sign, stored, guild_members).unwrap_or(author))
}

/// Owner row, and whether the owner now holds the report's call sign
async fn register_owner(db: &Database, owner: UserId, call_sign: &str) -> Result<(MemberId, bool)> {
    let member = db.ensure_user(owner).await?;
    let claimed = db.set_call_sign(member, call_sign).await?;
    if !claimed {
        warn!(
            "Call sign {} is held by another member, kept for {} unchanged",
            call_sign, owner
        );
    }
    Ok((member, claimed))
}

/// The call sign's week, or the owner's when someone else holds the call sign
async fn week_verdict(
    db: &Database,
    member: MemberId,
    claimed: bool,
    parsed: &ParsedReport,
) -> Result<ComplianceVerdict> {
    if claimed {
        evaluate(db, parsed.call_sign(), parsed.date()).await
    } else {
        evaluate_member(db, member, parsed.date()).await
    }
}

/// Stores a parsed report for its owner and evaluates the owner's week
pub async fn accept_report(db: &Database, owner: UserId, parsed: &ParsedReport) -> Result<Intake> {
    let (member, claimed) = register_owner(db, owner, parsed.call_sign()).await?;
    let window = WeeklyWindow::containing(parsed.date());
    match parsed {
        ParsedReport::Activity { duties, date, .. } => {
            let interviews = db.count_interrogations_in_range(member, &window).await?;
            let report = db
                .insert_activity_report(member, *duties, interviews, *date)
                .await?;
            let verdict = week_verdict(db, member, claimed, parsed).await?;
            Ok(Intake::Activity {
                report,
                owner,
                verdict,
            })
        }
        ParsedReport::Interrogation { date, .. } => {
            let report = db.insert_interrogation_report(member, *date).await?;
            let updated = db.record_late_interrogation(member, &window).await?;
            let verdict = week_verdict(db, member, claimed, parsed).await?;
            Ok(Intake::Interrogation {
                report,
                owner,
                updated,
                verdict,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_parser::{ReportKind, ReportParser};
    use chrono::NaiveDate;
    use serenity::model::id::ChannelId;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn activity_without_interrogation_fails_the_week() {
        let db = Database::open_in_memory().unwrap();
        let parsed = ReportParser::new()
            .unwrap()
            .parse(
                "[Ваш позывной]\nAlpha\n[Количество Активных Дежурств в течении Недели]\n4\n[Дата заполнения]\n2024-03-04",
                ReportKind::Activity,
            )
            .unwrap();

        let owner = resolve_report_owner(&db, "Alpha", &[], UserId(5)).await.unwrap();
        assert_eq!(owner, UserId(5));

        let intake = accept_report(&db, owner, &parsed).await.unwrap();
        match intake {
            Intake::Activity { verdict, .. } => {
                assert_eq!(verdict, ComplianceVerdict::new(4, 0));
                assert!(!verdict.pass);
            }
            other => panic!("unexpected intake: {:?}", other),
        }
        let verdict = crate::compliance::evaluate(&db, "alpha", ymd(2024, 3, 4))
            .await
            .unwrap();
        assert_eq!(verdict, ComplianceVerdict::new(4, 0));

        // the stored call sign now wins over the author
        let owner = resolve_report_owner(&db, "ALPHA", &[], UserId(6)).await.unwrap();
        assert_eq!(owner, UserId(5));
    }

    #[tokio::test]
    async fn late_interrogation_completes_the_week() {
        let db = Database::open_in_memory().unwrap();
        let activity = ParsedReport::Activity {
            call_sign: "Alpha".to_string(),
            duties: 3,
            date: ymd(2024, 3, 4),
        };
        let intake = accept_report(&db, UserId(5), &activity).await.unwrap();
        db.attach_thread(intake.report(), ChannelId(77)).await.unwrap();

        let interrogation = ParsedReport::Interrogation {
            call_sign: "Alpha".to_string(),
            date: ymd(2024, 3, 8),
        };
        match accept_report(&db, UserId(5), &interrogation).await.unwrap() {
            Intake::Interrogation {
                owner,
                updated,
                verdict,
                ..
            } => {
                assert_eq!(owner, UserId(5));
                let updated = updated.unwrap();
                assert_eq!(updated.report, intake.report());
                assert_eq!(updated.interviews, 1);
                assert_eq!(updated.thread, Some(ChannelId(77)));
                assert!(verdict.pass);
            }
            other => panic!("unexpected intake: {:?}", other),
        }
    }

    #[tokio::test]
    async fn interrogation_first_is_cached_on_activity() {
        let db = Database::open_in_memory().unwrap();
        let interrogation = ParsedReport::Interrogation {
            call_sign: "Bravo".to_string(),
            date: ymd(2024, 3, 5),
        };
        match accept_report(&db, UserId(8), &interrogation).await.unwrap() {
            Intake::Interrogation { updated, .. } => assert_eq!(updated, None),
            other => panic!("unexpected intake: {:?}", other),
        }

        let activity = ParsedReport::Activity {
            call_sign: "bravo".to_string(),
            duties: 2,
            date: ymd(2024, 3, 6),
        };
        let intake = accept_report(&db, UserId(8), &activity).await.unwrap();
        let window = WeeklyWindow::containing(ymd(2024, 3, 6));
        let member = db.ensure_user(UserId(8)).await.unwrap();
        let snapshot = db
            .record_late_interrogation(member, &window)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.report, intake.report());
        // one cached at insert plus the bump above
        assert_eq!(snapshot.interviews, 2);
    }

    #[tokio::test]
    async fn taken_call_sign_stays_with_its_holder() {
        let db = Database::open_in_memory().unwrap();
        let holder = db.ensure_user(UserId(1)).await.unwrap();
        db.set_call_sign(holder, "Alpha").await.unwrap();

        let report = ParsedReport::Interrogation {
            call_sign: "Alpha".to_string(),
            date: ymd(2024, 3, 5),
        };
        match accept_report(&db, UserId(2), &report).await.unwrap() {
            // the poster's own week, not the holder's
            Intake::Interrogation { verdict, .. } => {
                assert_eq!(verdict, ComplianceVerdict::new(0, 1))
            }
            other => panic!("unexpected intake: {:?}", other),
        }
        let holder = db.find_by_call_sign("alpha").await.unwrap().unwrap();
        assert_eq!(holder.discord_id, UserId(1));
        let poster = db.member(UserId(2)).await.unwrap().unwrap();
        assert_eq!(poster.call_sign, None);
    }
}
