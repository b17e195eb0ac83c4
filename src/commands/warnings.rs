use anyhow::Result;
use chrono::Utc;
use log::info;
use serenity::builder::CreateApplicationCommands;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use super::options::Options;
use super::{option, Reply};
use crate::event_handler::Handler;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command
            .name("warn")
            .description("Выдать WARN-роль пользователю (1–3)")
            .create_option(|option| {
                option
                    .name("count")
                    .description("Уровень WARN (1, 2 или 3)")
                    .kind(CommandOptionType::Integer)
                    .min_int_value(1)
                    .max_int_value(3)
                    .required(true)
            });
        option(command, CommandOptionType::User, "member", "Пользователь", true);
        option(command, CommandOptionType::String, "reason", "Причина", true)
    });
    commands.create_application_command(|command| {
        command
            .name("removewarn")
            .description("Снять WARN-роль и, при необходимости, чёрную метку")
            .create_option(|option| {
                option
                    .name("count")
                    .description("Уровень WARN (1, 2 или 3)")
                    .kind(CommandOptionType::Integer)
                    .min_int_value(1)
                    .max_int_value(3)
                    .required(true)
            });
        option(command, CommandOptionType::User, "member", "Пользователь", true);
        option(command, CommandOptionType::String, "reason", "Причина", true);
        option(
            command,
            CommandOptionType::Boolean,
            "remove_black",
            "Снять чёрную метку",
            false,
        )
    });
}

impl Handler {
    fn invalid_level(&self) -> Reply {
        let mut embed = self.embeds.error("Неверный уровень WARN");
        embed.field("🛑 Допустимые уровни", "1, 2 или 3", false);
        Reply::private(embed)
    }

    /// `/warn count member reason`
    pub(crate) async fn warn(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let level = options.required_integer("count")?;
        let target = options.required_user("member")?.id;
        let reason = options.required_string("reason")?;
        let roles = &self.app_config.roles;
        let role = match roles.warn_role(level) {
            Some(role) => role,
            None => return Ok(self.invalid_level()),
        };

        let held = self.member_roles(ctx, target).await?;
        for other in roles.warn_levels.iter().filter(|other| **other != role) {
            if held.contains(other) {
                self.revoke_role(ctx, target, *other, &format!("Обновление WARN до {}/3", level))
                    .await?;
            }
        }
        self.grant_role(ctx, target, role, &format!("Выдан WARN {}/3: {}", level, reason))
            .await?;

        let member = self.db.ensure_user(target).await?;
        let issuer = self.db.ensure_user(command.user.id).await?;
        self.db
            .add_warning(member, issuer, level, Utc::now().timestamp())
            .await?;
        info!("{} issued WARN {}/3 to {}: {}", command.user.id, level, target, reason);

        let mut embed = self.embeds.base(format!("✅ Выдан WARN {}/3", level));
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🛑 Варнов", format!("{}/3", level), true);
        embed.field("📝 Причина", reason, false);
        Ok(Reply::public(embed))
    }

    /// `/removewarn count member reason [remove_black]`
    pub(crate) async fn remove_warn(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let level = options.required_integer("count")?;
        let target = options.required_user("member")?.id;
        let reason = options.required_string("reason")?;
        let remove_black = options.boolean("remove_black").unwrap_or(false);
        let roles = &self.app_config.roles;
        let role = match roles.warn_role(level) {
            Some(role) => role,
            None => return Ok(self.invalid_level()),
        };

        let held = self.member_roles(ctx, target).await?;
        if !held.contains(&role) {
            return Ok(Reply::private(self.embeds.notice(format!(
                "У {} нет WARN {}/3.",
                target.mention(),
                level
            ))));
        }
        self.revoke_role(ctx, target, role, &format!("Снят WARN {}/3: {}", level, reason))
            .await?;

        let member = self.db.ensure_user(target).await?;
        self.db.remove_latest_warning(member, level).await?;

        let mut black_mark = None;
        if remove_black {
            let had_role = held.contains(&roles.black_mark);
            if had_role {
                self.revoke_role(ctx, target, roles.black_mark, "Снята чёрная метка")
                    .await?;
            }
            let flagged = self
                .db
                .member_by_id(member)
                .await?
                .map(|record| record.black_mark)
                .unwrap_or(false);
            self.db.set_black_mark(member, false).await?;
            black_mark = Some(had_role || flagged);
        }
        info!("{} removed WARN {}/3 from {}: {}", command.user.id, level, target, reason);

        let mut embed = self.embeds.base(format!("✅ Снят WARN {}/3", level));
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("📝 Причина", reason, false);
        if let Some(removed) = black_mark {
            embed.field(
                "⚫ Чёрная метка",
                if removed { "Снята" } else { "Не найдена" },
                false,
            );
        }
        Ok(Reply::public(embed))
    }
}
