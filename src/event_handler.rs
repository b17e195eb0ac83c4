use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use futures::lock::Mutex;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::builder::CreateEmbed;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, RoleId, UserId};
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use crate::app_config::AppConfig;
use crate::commands;
use crate::compliance::{ComplianceVerdict, GuildIdentity};
use crate::database::Database;
use crate::embeds::Embeds;
use crate::formats::Formats;
use crate::report_intake::{accept_report, resolve_report_owner, Intake};
use crate::report_parser::{ReportKind, ReportParser};
use crate::report_store::ActivitySnapshot;
use crate::role_timer::RoleTimers;

/// Threads close after a day without messages
const THREAD_ARCHIVE_MINUTES: u16 = 1440;
const THREAD_NAME_MAX_CHARS: usize = 100;

/// Event listener
pub struct Handler {
    /// Settings
    pub(crate) app_config: AppConfig,
    pub(crate) db: Database,
    pub(crate) parser: ReportParser,
    pub(crate) formats: Formats,
    pub(crate) embeds: Embeds,
    /// Pending role expirations
    pub(crate) timers: RoleTimers,
    /// Roles taken by `/fullclearroles`, kept until `/returnroles`
    pub(crate) cleared_roles: Mutex<HashMap<UserId, Vec<RoleId>>>,
}

/// Message body plus the first embed's description and fields
pub fn report_text(msg: &Message) -> String {
    let mut raw = msg.content.clone();
    if let Some(embed) = msg.embeds.first() {
        if let Some(description) = &embed.description {
            raw.push('\n');
            raw.push_str(description);
        }
        for field in &embed.fields {
            raw.push('\n');
            raw.push_str(&field.name);
            raw.push('\n');
            raw.push_str(&field.value);
        }
    }
    raw
}

/// Verdict posted in an activity thread
pub fn verdict_text(owner: UserId, verdict: &ComplianceVerdict) -> String {
    format!(
        "{} Недельная норма для {} {}.\n• Дежурств – {}\n• Допросов – {}",
        verdict.emoji(),
        owner.mention(),
        if verdict.pass { "выполнена" } else { "не выполнена" },
        verdict.duties,
        verdict.interviews
    )
}

/// Status posted in an activity thread after a later interrogation
pub fn status_text(owner: UserId, verdict: &ComplianceVerdict) -> String {
    format!(
        "{} Текущий статус по норме для {}:\n• Дежурств – {}\n• Допросов – {}",
        verdict.emoji(),
        owner.mention(),
        verdict.duties,
        verdict.interviews
    )
}

impl Handler {
    pub fn new(app_config: AppConfig) -> Result<Self> {
        Ok(Self {
            db: Database::open(&app_config.database.path)?,
            parser: ReportParser::new()?,
            formats: Formats::new()?,
            embeds: Embeds::new(&app_config.discord.emblem_url),
            timers: RoleTimers::new(),
            cleared_roles: Mutex::new(HashMap::new()),
            app_config,
        })
    }

    fn report_kind(&self, channel: ChannelId) -> Option<ReportKind> {
        let discord = &self.app_config.discord;
        if channel == discord.activity_channel {
            Some(ReportKind::Activity)
        } else if channel == discord.interrogation_channel {
            Some(ReportKind::Interrogation)
        } else {
            None
        }
    }

    /// Names of the cached guild members
    fn guild_identities(&self, ctx: &Context) -> Vec<GuildIdentity> {
        self.app_config
            .discord
            .guild_id
            .to_guild_cached(&ctx.cache)
            .map(|guild| {
                guild
                    .members
                    .values()
                    .map(|member| GuildIdentity {
                        user_id: member.user.id,
                        display_name: member.display_name().to_string(),
                        handle: member.user.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn post(&self, ctx: &Context, channel: ChannelId, embed: CreateEmbed) -> Result<()> {
        channel
            .send_message(&ctx.http, |message| message.set_embed(embed))
            .await
            .with_context(|| format!("Failed to post into {}", channel))?;
        Ok(())
    }

    /// Stores a report, opens its thread and posts the verdict
    async fn handle_report(&self, ctx: &Context, msg: &Message, kind: ReportKind) -> Result<()> {
        let parsed = match self.parser.parse(&report_text(msg), kind) {
            Ok(parsed) => parsed,
            Err(failure) => {
                info!("Ignored {:?} message {}: {:?}", kind, msg.id, failure);
                return Ok(());
            }
        };
        let call_sign = parsed.call_sign().to_owned();

        let members = self.guild_identities(ctx);
        let owner = resolve_report_owner(&self.db, &call_sign, &members, msg.author.id).await?;
        let intake = accept_report(&self.db, owner, &parsed)
            .await
            .with_context(|| format!("Failed to store the report of {}", call_sign))?;
        info!("Stored {:?} of {} ({})", intake.report(), call_sign, owner);

        let thread_name = match intake {
            Intake::Activity { .. } => format!("Оценка {}", call_sign),
            Intake::Interrogation { .. } => format!("Допрос {}", call_sign),
        }
        .chars()
        .take(THREAD_NAME_MAX_CHARS)
        .collect::<String>();
        let thread = match msg
            .channel_id
            .create_public_thread(&ctx.http, msg.id, |thread| {
                thread
                    .name(thread_name)
                    .auto_archive_duration(THREAD_ARCHIVE_MINUTES)
            })
            .await
        {
            Ok(thread) => {
                self.db.attach_thread(intake.report(), thread.id).await?;
                Some(thread.id)
            }
            Err(why) => {
                error!("Failed to open a thread for {}: {:?}", msg.id, why);
                None
            }
        };

        match &intake {
            Intake::Activity { verdict, .. } => {
                if let Some(thread) = thread {
                    self.post(ctx, thread, self.embeds.base(format!("{} {}", owner.mention(), verdict.emoji())))
                        .await?;
                    self.post(ctx, thread, self.embeds.base(verdict_text(owner, verdict)))
                        .await?;
                }
            }
            Intake::Interrogation { updated, verdict, .. } => {
                let acknowledgement = format!("✅ Учёл отчёт допроса для {}", owner.mention());
                if let Some(thread) = thread {
                    self.post(ctx, thread, self.embeds.base(&acknowledgement)).await?;
                }
                if let Some(ActivitySnapshot {
                    thread: Some(activity_thread),
                    ..
                }) = updated
                {
                    self.post(ctx, *activity_thread, self.embeds.base(&acknowledgement))
                        .await?;
                    self.post(ctx, *activity_thread, self.embeds.base(status_text(owner, verdict)))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Puts open vacations back on the timer after a restart
    async fn reschedule_vacations(&self, ctx: &Context) -> Result<()> {
        let now = Utc::now().timestamp();
        let vacations = self.db.active_vacations().await?;
        for vacation in &vacations {
            let delay = Duration::from_secs((vacation.end_at - now).max(0) as u64);
            self.schedule_role_expiry(
                ctx.http.clone(),
                vacation.discord_id,
                self.app_config.roles.vacation,
                delay,
            )
            .await;
        }
        info!("Rescheduled {} vacations", vacations.len());
        Ok(())
    }
}

#[async_trait]
impl EventHandler for Handler {
    /// Called once the gateway is ready
    async fn ready(&self, ctx: Context, data_about_bot: Ready) {
        info!("Connected as {}", data_about_bot.user.tag());

        let registered = self
            .app_config
            .discord
            .guild_id
            .set_application_commands(&ctx.http, commands::register_all)
            .await;
        match registered {
            Ok(registered) => info!("Registered {} slash commands", registered.len()),
            Err(why) => error!("Failed to register slash commands: {:?}", why),
        }

        if let Err(why) = self.reschedule_vacations(&ctx).await {
            error!("Failed to reschedule vacations: {:?}", why);
        }
    }

    /// Called for every new message
    async fn message(&self, ctx: Context, msg: Message) {
        // reports may arrive through form bots, only our own posts are skipped
        if msg.author.id == ctx.cache.current_user_id() {
            return;
        }
        let kind = match self.report_kind(msg.channel_id) {
            Some(kind) => kind,
            None => return,
        };

        if let Err(why) = self.handle_report(&ctx, &msg, kind).await {
            error!("Failed to process report {}: {:?}", msg.id, why);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::ApplicationCommand(command) => {
                self.dispatch_command(&ctx, &command).await
            }
            Interaction::MessageComponent(component) => {
                self.dispatch_component(&ctx, &component).await
            }
            other => warn!("Unhandled interaction: {:?}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_mentions_owner_and_breakdown() {
        let text = verdict_text(UserId(5), &ComplianceVerdict::new(4, 0));
        assert_eq!(
            text,
            "❌ Недельная норма для <@5> не выполнена.\n• Дежурств – 4\n• Допросов – 0"
        );
        let text = verdict_text(UserId(5), &ComplianceVerdict::new(3, 1));
        assert!(text.starts_with("✅ Недельная норма для <@5> выполнена."));
    }

    #[test]
    fn report_text_merges_the_first_embed() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "id": "1",
            "channel_id": "200",
            "author": {
                "id": "5",
                "username": "forms",
                "discriminator": "0001",
                "avatar": null,
                "bot": true
            },
            "content": "[Ваш позывной]",
            "timestamp": "2024-03-04T10:00:00+00:00",
            "edited_timestamp": null,
            "tts": false,
            "mention_everyone": false,
            "mentions": [],
            "mention_roles": [],
            "attachments": [],
            "embeds": [
                {
                    "description": "Alpha",
                    "fields": [
                        { "name": "[Дата]", "value": "2024-03-04", "inline": false }
                    ]
                },
                { "description": "ignored" }
            ],
            "pinned": false,
            "type": 0
        }))
        .unwrap();
        assert_eq!(
            report_text(&msg),
            "[Ваш позывной]\nAlpha\n[Дата]\n2024-03-04"
        );
    }

    #[test]
    fn status_after_interrogation() {
        assert_eq!(
            status_text(UserId(9), &ComplianceVerdict::new(3, 1)),
            "✅ Текущий статус по норме для <@9>:\n• Дежурств – 3\n• Допросов – 1"
        );
    }
}
