use anyhow::Result;
use chrono::Utc;
use log::info;
use serenity::builder::CreateApplicationCommands;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::mention::Mentionable;
use serenity::prelude::*;

use super::options::Options;
use super::roles::discord_time;
use super::{option, Reply};
use crate::event_handler::Handler;
use crate::formats::DurationStyle;
use crate::role_timer::TimerKey;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command.name("vacation").description("Отправить участника в отпуск");
        option(command, CommandOptionType::User, "member", "Участник", true);
        option(
            command,
            CommandOptionType::String,
            "duration",
            "Срок, например 7д или 1д12ч30м",
            true,
        )
    });
    commands.create_application_command(|command| {
        command
            .name("removevacation")
            .description("Досрочно завершить отпуск");
        option(command, CommandOptionType::User, "member", "Участник", true)
    });
}

impl Handler {
    /// `/vacation member duration`
    pub(crate) async fn vacation(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let target = options.required_user("member")?.id;
        let text = options.required_string("duration")?;
        let duration = match self.formats.duration(text, DurationStyle::Cyrillic) {
            Some(duration) => duration,
            None => {
                return Ok(Reply::private(self.embeds.error(
                    "Неверный формат срока. Пример: `7д`, `1д12ч`, `30м`.",
                )))
            }
        };

        let member = self.db.ensure_user(target).await?;
        if self.db.on_vacation(member).await? {
            return Ok(Reply::private(
                self.embeds
                    .notice(format!("{} уже в отпуске.", target.mention())),
            ));
        }

        let vacation = self.app_config.roles.vacation;
        self.grant_role(
            ctx,
            target,
            vacation,
            &format!("Отпуск на {} от {}", text, command.user.tag()),
        )
        .await?;
        let start = Utc::now().timestamp();
        let end = start + duration.as_secs() as i64;
        self.db.open_vacation(member, start, end).await?;
        self.schedule_role_expiry(ctx.http.clone(), target, vacation, duration)
            .await;
        info!("{} sent {} on vacation for {}", command.user.id, target, text);

        let mut embed = self.embeds.base("🌴 Отпуск оформлен");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("⏳ До", discord_time(end), true);
        embed.field("👮 Выдал", command.user.id.mention(), false);
        Ok(Reply::public(embed))
    }

    /// `/removevacation member`
    pub(crate) async fn remove_vacation(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = Options::new(&command.data.options)
            .required_user("member")?
            .id;
        let vacation = self.app_config.roles.vacation;

        let has_role = self.member_roles(ctx, target).await?.contains(&vacation);
        if has_role {
            self.revoke_role(
                ctx,
                target,
                vacation,
                &format!("Отпуск завершён {}", command.user.tag()),
            )
            .await?;
        }
        self.timers
            .cancel(&TimerKey {
                user_id: target,
                role_id: vacation,
            })
            .await;
        let closed = match self.db.member(target).await? {
            Some(member) => {
                self.db
                    .close_vacation(member.id, Utc::now().timestamp())
                    .await?
            }
            None => false,
        };
        if !has_role && !closed {
            return Ok(Reply::private(
                self.embeds
                    .notice(format!("{} не в отпуске.", target.mention())),
            ));
        }
        info!("{} ended the vacation of {}", command.user.id, target);

        let mut embed = self.embeds.base("✅ Отпуск завершён");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("👮 Снял", command.user.id.mention(), true);
        Ok(Reply::public(embed))
    }
}
