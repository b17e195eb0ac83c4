use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use log::{error, info};
use serenity::builder::CreateApplicationCommands;
use serenity::http::Http;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::id::{RoleId, UserId};
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use super::options::Options;
use super::{option, Reply};
use crate::event_handler::Handler;
use crate::formats::DurationStyle;
use crate::role_timer::TimerKey;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command.name("addrole").description("Выдать роль");
        option(command, CommandOptionType::Role, "role", "Роль", true);
        option(command, CommandOptionType::User, "member", "Участник (по умолчанию вы)", false)
    });
    commands.create_application_command(|command| {
        command.name("removerole").description("Снять роль");
        option(command, CommandOptionType::Role, "role", "Роль", true);
        option(command, CommandOptionType::User, "member", "Участник (по умолчанию вы)", false)
    });
    commands.create_application_command(|command| {
        command
            .name("tempaddrole")
            .description("Выдать роль на время");
        option(command, CommandOptionType::Role, "role", "Роль", true);
        option(
            command,
            CommandOptionType::String,
            "duration",
            "Срок, например 1d2h30m или 45m",
            true,
        );
        option(command, CommandOptionType::User, "member", "Участник", true)
    });
    commands.create_application_command(|command| {
        command
            .name("fullclearroles")
            .description("Снять все роли с участника");
        option(command, CommandOptionType::User, "member", "Участник", true);
        option(command, CommandOptionType::String, "comment", "Комментарий", true)
    });
    commands.create_application_command(|command| {
        command
            .name("returnroles")
            .description("Вернуть роли, снятые /fullclearroles");
        option(command, CommandOptionType::User, "member", "Участник", true)
    });
}

/// `<t:..:f>` rendering of a unix instant
pub fn discord_time(unix: i64) -> String {
    format!("<t:{}:f>", unix)
}

impl Handler {
    /// Revokes `role` from `user` after `delay`, closing the vacation if it is one
    pub(crate) async fn schedule_role_expiry(&self, http: Arc<Http>, user: UserId, role: RoleId, delay: Duration) {
        let guild_id = self.app_config.discord.guild_id;
        let is_vacation = role == self.app_config.roles.vacation;
        let db = self.db.clone();
        let task = async move {
            info!("Role {} of {} expired", role, user);
            if let Err(why) = http
                .remove_member_role(guild_id.0, user.0, role.0, Some("Срок роли истёк"))
                .await
            {
                error!("Failed to revoke expired role {} from {}: {:?}", role, user, why);
            }
            if !is_vacation {
                return;
            }
            let closed = match db.member(user).await {
                Ok(Some(member)) => db.close_vacation(member.id, Utc::now().timestamp()).await,
                Ok(None) => Ok(false),
                Err(why) => Err(why),
            };
            if let Err(why) = closed {
                error!("Failed to close vacation of {}: {:?}", user, why);
            }
        };
        self.timers
            .schedule(
                TimerKey {
                    user_id: user,
                    role_id: role,
                },
                delay,
                task,
            )
            .await;
    }

    fn manageable_or_notice(&self, role: RoleId) -> Option<Reply> {
        if self.app_config.roles.is_manageable(role) {
            return None;
        }
        Some(Reply::private(self.embeds.notice(format!(
            "Роль {} нельзя выдавать или снимать командами.",
            role.mention()
        ))))
    }

    /// `/addrole role [member]`
    pub(crate) async fn add_role(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let role = Options::new(&command.data.options).required_role("role")?.id;
        let target = self.target_or_self(command);
        if let Some(notice) = self.manageable_or_notice(role) {
            return Ok(notice);
        }
        if self.member_roles(ctx, target).await?.contains(&role) {
            return Ok(Reply::private(self.embeds.notice(format!(
                "{} уже имеет роль {}.",
                target.mention(),
                role.mention()
            ))));
        }

        self.grant_role(ctx, target, role, &format!("Выдана {}", command.user.tag()))
            .await?;
        info!("{} granted {} to {}", command.user.id, role, target);

        let mut embed = self.embeds.base("✅ Роль выдана");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🎖️ Роль", role.mention(), true);
        Ok(Reply::public(embed))
    }

    /// `/removerole role [member]`
    pub(crate) async fn remove_role(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let role = Options::new(&command.data.options).required_role("role")?.id;
        let target = self.target_or_self(command);
        if let Some(notice) = self.manageable_or_notice(role) {
            return Ok(notice);
        }
        if !self.member_roles(ctx, target).await?.contains(&role) {
            return Ok(Reply::private(self.embeds.notice(format!(
                "У {} нет роли {}.",
                target.mention(),
                role.mention()
            ))));
        }

        self.revoke_role(ctx, target, role, &format!("Снята {}", command.user.tag()))
            .await?;
        self.timers
            .cancel(&TimerKey {
                user_id: target,
                role_id: role,
            })
            .await;
        if role == self.app_config.roles.vacation {
            if let Some(member) = self.db.member(target).await? {
                self.db
                    .close_vacation(member.id, Utc::now().timestamp())
                    .await?;
            }
        }
        info!("{} revoked {} from {}", command.user.id, role, target);

        let mut embed = self.embeds.base("✅ Роль снята");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🎖️ Роль", role.mention(), true);
        Ok(Reply::public(embed))
    }

    /// `/tempaddrole role duration member`
    pub(crate) async fn temp_add_role(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let role = options.required_role("role")?.id;
        let target = options.required_user("member")?.id;
        let text = options.required_string("duration")?;
        let duration = match self.formats.duration(text, DurationStyle::Latin) {
            Some(duration) => duration,
            None => {
                return Ok(Reply::private(self.embeds.error(
                    "Неверный формат срока. Пример: `1d2h30m`, `3h`, `45m`.",
                )))
            }
        };
        if let Some(notice) = self.manageable_or_notice(role) {
            return Ok(notice);
        }

        self.grant_role(
            ctx,
            target,
            role,
            &format!("Выдана на {} {}", text, command.user.tag()),
        )
        .await?;
        let start = Utc::now().timestamp();
        let end = start + duration.as_secs() as i64;
        if role == self.app_config.roles.vacation {
            let member = self.db.ensure_user(target).await?;
            self.db.open_vacation(member, start, end).await?;
        }
        self.schedule_role_expiry(ctx.http.clone(), target, role, duration)
            .await;
        info!("{} granted {} to {} for {}", command.user.id, role, target, text);

        let mut embed = self.embeds.base("✅ Роль выдана временно");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🎖️ Роль", role.mention(), true);
        embed.field("⏳ До", discord_time(end), false);
        Ok(Reply::public(embed))
    }

    /// `/fullclearroles member comment`
    pub(crate) async fn full_clear_roles(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let target = options.required_user("member")?.id;
        let comment = options.required_string("comment")?;
        let guild_id = self.app_config.discord.guild_id;

        let mut member = guild_id
            .member(ctx, target)
            .await
            .with_context(|| format!("Failed to fetch guild member {}", target))?;
        let everyone = RoleId(guild_id.0);
        let roles = member
            .roles
            .iter()
            .copied()
            .filter(|role| *role != everyone)
            .collect::<Vec<_>>();
        if roles.is_empty() {
            return Ok(Reply::private(
                self.embeds
                    .notice(format!("У {} нет ролей для снятия.", target.mention())),
            ));
        }

        member
            .remove_roles(&ctx.http, &roles)
            .await
            .with_context(|| format!("Failed to clear roles of {}", target))?;
        {
            let mut cleared = self.cleared_roles.lock().await;
            let saved = cleared.entry(target).or_default();
            for role in &roles {
                if !saved.contains(role) {
                    saved.push(*role);
                }
            }
        }
        info!("{} cleared {} roles of {}: {}", command.user.id, roles.len(), target, comment);

        let mut embed = self.embeds.base("✅ Все роли сняты");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🧹 Снято ролей", roles.len(), true);
        embed.field("📝 Комментарий", comment, false);
        Ok(Reply::public(embed))
    }

    /// `/returnroles member`
    pub(crate) async fn return_roles(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = Options::new(&command.data.options)
            .required_user("member")?
            .id;
        let roles = match self.cleared_roles.lock().await.remove(&target) {
            Some(roles) => roles,
            None => {
                return Ok(Reply::private(self.embeds.notice(format!(
                    "Нет сохранённых ролей для {}.",
                    target.mention()
                ))))
            }
        };

        let restored = self.restore_roles(ctx, target, &roles).await;
        if restored.is_err() {
            self.cleared_roles.lock().await.insert(target, roles.clone());
        }
        restored?;
        info!("{} returned {} roles to {}", command.user.id, roles.len(), target);

        let mut embed = self.embeds.base("✅ Роли возвращены");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field(
            "🎖️ Роли",
            roles
                .iter()
                .map(|role| role.mention().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            false,
        );
        Ok(Reply::public(embed))
    }

    async fn restore_roles(&self, ctx: &Context, target: UserId, roles: &[RoleId]) -> Result<()> {
        let mut member = self
            .app_config
            .discord
            .guild_id
            .member(ctx, target)
            .await
            .with_context(|| format!("Failed to fetch guild member {}", target))?;
        member
            .add_roles(&ctx.http, roles)
            .await
            .with_context(|| format!("Failed to return roles to {}", target))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_timestamps() {
        assert_eq!(discord_time(1_700_000_000), "<t:1700000000:f>");
    }
}
