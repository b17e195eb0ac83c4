use anyhow::{Context as _, Result};
use log::info;
use serenity::builder::CreateApplicationCommands;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::channel::Channel;
use serenity::model::guild::Guild;
use serenity::model::id::{RoleId, UserId};
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use super::options::Options;
use super::{option, Reply};
use crate::compliance::{evaluate_member, ComplianceVerdict, WeeklyWindow};
use crate::event_handler::Handler;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command
            .name("results")
            .description("Сводка по недельной норме и отпускникам")
    });
    commands.create_application_command(|command| {
        command
            .name("denied")
            .description("Отклонить отчёт этой ветки");
        option(command, CommandOptionType::String, "reason", "Причина отказа", true)
    });
}

/// One line of the weekly summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub user_id: UserId,
    pub verdict: ComplianceVerdict,
}

/// A tracked role and its members' verdicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySection {
    pub title: String,
    pub rows: Vec<SummaryRow>,
}

/// Renders the weekly summary body
pub fn render_summary(window: &WeeklyWindow, sections: &[SummarySection], on_vacation: &[UserId]) -> String {
    let mut lines = vec![format!("**Результаты за {}:**", window.label())];
    for section in sections {
        lines.push(format!("\n__{}__", section.title));
        for row in &section.rows {
            lines.push(format!(
                "{}: дежурств {}, допросов {} {}",
                row.user_id.mention(),
                row.verdict.duties,
                row.verdict.interviews,
                row.verdict.emoji()
            ));
        }
    }
    if !on_vacation.is_empty() {
        lines.push("\n**В отпуске:**".to_string());
        lines.extend(on_vacation.iter().map(|user| user.mention().to_string()));
    }
    lines.join("\n")
}

/// Guild members holding a role, ordered by display name
fn holders(guild: &Guild, role: RoleId) -> Vec<UserId> {
    let mut members = guild
        .members
        .values()
        .filter(|member| member.roles.contains(&role))
        .collect::<Vec<_>>();
    members.sort_by_key(|member| member.display_name().to_lowercase());
    members.into_iter().map(|member| member.user.id).collect()
}

impl Handler {
    /// `/results`
    pub(crate) async fn results(&self, ctx: &Context) -> Result<Reply> {
        let guild = self
            .app_config
            .discord
            .guild_id
            .to_guild_cached(&ctx.cache)
            .context("Guild is not cached yet")?;
        let today = self.app_config.today();

        let mut sections = Vec::new();
        for role in &self.app_config.roles.report_roles {
            let title = match guild.roles.get(role) {
                Some(role) => role.name.clone(),
                None => continue,
            };
            let mut rows = Vec::new();
            for user_id in holders(&guild, *role) {
                let verdict = match self.db.member(user_id).await? {
                    Some(member) => evaluate_member(&self.db, member.id, today).await?,
                    None => ComplianceVerdict::new(0, 0),
                };
                rows.push(SummaryRow { user_id, verdict });
            }
            sections.push(SummarySection { title, rows });
        }
        let on_vacation = holders(&guild, self.app_config.roles.vacation);

        let description = render_summary(&WeeklyWindow::containing(today), &sections, &on_vacation);
        Ok(Reply::public(self.embeds.titled(
            "Judgement Investigation — Итоги недели",
            description,
        )))
    }

    /// `/denied reason`, run inside a report thread
    pub(crate) async fn denied(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let reason = Options::new(&command.data.options).required_string("reason")?;
        let discord = &self.app_config.discord;

        let parent = match command
            .channel_id
            .to_channel(ctx)
            .await
            .context("Failed to fetch the command channel")?
        {
            Channel::Guild(channel) => channel.parent_id,
            _ => None,
        };
        if parent != Some(discord.activity_channel) && parent != Some(discord.interrogation_channel) {
            return Ok(Reply::private(
                self.embeds
                    .notice("Команду можно использовать только в ветке отчёта."),
            ));
        }

        let report = match self.db.find_by_thread_id(command.channel_id).await? {
            Some(report) => report,
            None => {
                return Ok(Reply::private(
                    self.embeds.notice("Отчёт для этой ветки не найден."),
                ))
            }
        };
        let owner = self.db.report_owner(report).await?;
        self.db.delete_report(report).await?;
        info!("Report {:?} denied by {}: {}", report, command.user.id, reason);

        let mut embed = self.embeds.error(format!(
            "Отчёт {} отклонён.",
            owner
                .map(|owner| owner.mention().to_string())
                .unwrap_or_default()
        ));
        embed.title("❌ Отчёт отклонён");
        embed.field("📝 Причина", reason, false);
        embed.field("👤 Проверяющий", command.user.id.mention(), false);
        command
            .channel_id
            .send_message(&ctx.http, |message| message.set_embed(embed))
            .await
            .context("Failed to post the denial")?;

        Ok(Reply::private(self.embeds.base("✅ Отчёт удалён.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn summary_lists_sections_and_vacations() {
        let window = WeeklyWindow::containing(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        let sections = vec![SummarySection {
            title: "Следователи".to_string(),
            rows: vec![
                SummaryRow {
                    user_id: UserId(1),
                    verdict: ComplianceVerdict::new(3, 1),
                },
                SummaryRow {
                    user_id: UserId(2),
                    verdict: ComplianceVerdict::new(4, 0),
                },
            ],
        }];
        let text = render_summary(&window, &sections, &[UserId(3)]);
        assert_eq!(
            text,
            "**Результаты за 04.03.2024–10.03.2024:**\n\
             \n__Следователи__\n\
             <@1>: дежурств 3, допросов 1 ✅\n\
             <@2>: дежурств 4, допросов 0 ❌\n\
             \n**В отпуске:**\n\
             <@3>"
        );
    }

    #[test]
    fn summary_without_vacations_has_no_vacation_block() {
        let window = WeeklyWindow::containing(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        let text = render_summary(&window, &[], &[]);
        assert!(!text.contains("В отпуске"));
    }
}
