use anyhow::Result;
use serenity::builder::{CreateApplicationCommands, CreateEmbed};
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::id::{RoleId, UserId};
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use super::options::Options;
use super::{option, Reply};
use crate::app_config::NamedRole;
use crate::compliance::{evaluate_member, ComplianceVerdict, WeeklyWindow};
use crate::event_handler::Handler;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command
            .name("info")
            .description("Показать информацию о пользователе");
        option(command, CommandOptionType::User, "member", "Пользователь", true)
    });
    commands.create_application_command(|command| {
        command.name("myinfo").description("Показать мою информацию")
    });
    commands.create_application_command(|command| {
        command
            .name("jltinfo")
            .description("Полезные материалы и инструкции для стажёров")
    });
}

/// Titles of the configured roles a member holds, in configured order
pub fn held_titles<'a>(held: &[RoleId], roles: &'a [NamedRole]) -> Vec<&'a str> {
    roles
        .iter()
        .filter(|role| held.contains(&role.id))
        .map(|role| role.title.as_str())
        .collect()
}

/// Everything a profile card shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    /// RP total
    pub rp: i64,
    /// Vacation role or an open vacation record
    pub on_vacation: bool,
    /// Highest warning level, 0 when clean
    pub warn_level: i64,
    /// Role or stored flag
    pub black_mark: bool,
    /// First configured rank held
    pub rank: Option<String>,
    pub posts: Vec<String>,
    pub corps: Vec<String>,
    pub steam_id: Option<String>,
    pub curator: Option<UserId>,
    /// Totals since the first report
    pub all_time: ComplianceVerdict,
    /// Totals of the current week
    pub week: ComplianceVerdict,
    pub window: WeeklyWindow,
}

impl Profile {
    pub fn fill(&self, embed: &mut CreateEmbed) {
        let listed = |values: &[String], fallback: &str| {
            if values.is_empty() {
                fallback.to_string()
            } else {
                values.join(", ")
            }
        };
        embed.field("✅ Баллы", self.rp, true);
        embed.field(
            "🏖️ Отпуск",
            if self.on_vacation { "В отпуске" } else { "Не в отпуске" },
            true,
        );
        embed.field("⚠️ Выговоры", format!("{}/3", self.warn_level), true);
        embed.field("⚫ Черная метка", if self.black_mark { "Да" } else { "Нет" }, true);
        embed.field("🎖️ Звание", self.rank.as_deref().unwrap_or("Нет"), true);
        embed.field("✏️ Должность", listed(&self.posts, "Нет"), true);
        embed.field("🏛️ Корпус", listed(&self.corps, "Не назначен"), true);
        embed.field("🆔 ID", self.user_id.0, true);
        embed.field("🔗 SteamID", self.steam_id.as_deref().unwrap_or("Не привязан"), true);
        embed.field(
            "🕵 Куратор",
            self.curator
                .map(|curator| curator.mention().to_string())
                .unwrap_or_else(|| "Не назначен".to_string()),
            true,
        );
        embed.field("\u{200b}", "**Отчетность за всё время:**", false);
        embed.field("• Дежурств", self.all_time.duties, true);
        embed.field("• Допросов", self.all_time.interviews, true);
        embed.field("\u{200b}", format!("**За {}:**", self.window.label()), false);
        embed.field("• Дежурств", self.week.duties, true);
        embed.field("• Допросов", self.week.interviews, true);
        embed.field("• Норма", self.week.emoji(), true);
    }
}

impl Handler {
    async fn profile(&self, ctx: &Context, user_id: UserId) -> Result<Profile> {
        let roles = &self.app_config.roles;
        let held = self.member_roles(ctx, user_id).await?;
        let today = self.app_config.today();
        let window = WeeklyWindow::containing(today);

        let mut profile = Profile {
            user_id,
            rp: 0,
            on_vacation: held.contains(&roles.vacation),
            warn_level: 0,
            black_mark: held.contains(&roles.black_mark),
            rank: held_titles(&held, &roles.ranks)
                .first()
                .map(|title| title.to_string()),
            posts: held_titles(&held, &roles.posts)
                .into_iter()
                .map(str::to_string)
                .collect(),
            corps: held_titles(&held, &roles.corps)
                .into_iter()
                .map(str::to_string)
                .collect(),
            steam_id: None,
            curator: None,
            all_time: ComplianceVerdict::new(0, 0),
            week: ComplianceVerdict::new(0, 0),
            window,
        };

        let record = match self.db.member(user_id).await? {
            Some(record) => record,
            None => return Ok(profile),
        };
        profile.rp = self.db.rp_total(record.id).await?;
        profile.on_vacation |= self.db.on_vacation(record.id).await?;
        profile.warn_level = self.db.highest_warning(record.id).await?;
        profile.black_mark |= record.black_mark;
        profile.steam_id = record.steam_id.clone();
        if let Some(curator) = record.curator {
            profile.curator = self
                .db
                .member_by_id(curator)
                .await?
                .map(|curator| curator.discord_id);
        }
        profile.all_time = ComplianceVerdict::new(
            self.db.total_duties(record.id).await?,
            self.db.total_interrogations(record.id).await?,
        );
        profile.week = evaluate_member(&self.db, record.id, today).await?;
        Ok(profile)
    }

    /// `/info member` publicly, `/myinfo` to the invoker only
    pub(crate) async fn info(&self, ctx: &Context, command: &ApplicationCommandInteraction, own: bool) -> Result<Reply> {
        let user_id = if own {
            command.user.id
        } else {
            Options::new(&command.data.options)
                .required_user("member")?
                .id
        };
        let profile = self.profile(ctx, user_id).await?;

        let mut embed = self.embeds.titled(
            "Judgement Investigation",
            format!("Статистика пользователя {}", user_id.mention()),
        );
        profile.fill(&mut embed);
        Ok(if own {
            Reply::private(embed)
        } else {
            Reply::public(embed)
        })
    }

    /// `/jltinfo`
    pub(crate) fn jlt_info(&self) -> Reply {
        let links = &self.app_config.links;
        Reply::public(self.embeds.base(format!(
            "📄 [Информация стажерам]({})",
            links.trainee_info
        )))
        .and(self.embeds.base(format!(
            "📄 [Курс Молодого Следователя]({})",
            links.trainee_course
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(title: &str, id: u64) -> NamedRole {
        NamedRole {
            title: title.to_string(),
            id: RoleId(id),
        }
    }

    #[test]
    fn titles_follow_configured_order() {
        let ranks = vec![
            named("Полковник", 1),
            named("Майор", 2),
            named("Капитан", 3),
        ];
        let held = [RoleId(3), RoleId(2), RoleId(99)];
        assert_eq!(held_titles(&held, &ranks), vec!["Майор", "Капитан"]);
        assert!(held_titles(&[RoleId(99)], &ranks).is_empty());
    }
}
