use anyhow::Result;
use chrono::Utc;
use log::info;
use serenity::builder::CreateApplicationCommands;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::mention::Mentionable;

use super::options::Options;
use super::{option, Reply};
use crate::event_handler::Handler;

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command
            .name("addrp")
            .description("Выдать RP-поинты");
        option(command, CommandOptionType::User, "member", "Пользователь", true);
        command.create_option(|option| {
            option
                .name("amount")
                .description("Количество RP-поинтов")
                .kind(CommandOptionType::Integer)
                .min_int_value(1)
                .required(true)
        });
        option(command, CommandOptionType::String, "reason", "Причина", true)
    });
}

impl Handler {
    /// `/addrp member amount reason`
    pub(crate) async fn add_rp(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let target = options.required_user("member")?.id;
        let amount = options.required_integer("amount")?;
        let reason = options.required_string("reason")?;
        if amount <= 0 {
            return Ok(Reply::private(
                self.embeds
                    .error("Количество RP-поинтов должно быть больше нуля."),
            ));
        }

        let member = self.db.ensure_user(target).await?;
        let issuer = self.db.ensure_user(command.user.id).await?;
        let total = self
            .db
            .add_rp(member, issuer, amount, reason, Utc::now().timestamp())
            .await?;
        info!("{} gave {} RP to {}: {}", command.user.id, amount, target, reason);

        let mut embed = self.embeds.titled(
            "Judgement Investigation — Обновление RP-поинтов",
            format!("{} получает RP-поинты.", target.mention()),
        );
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("💠 Выдал", command.user.id.mention(), true);
        embed.field("➕ Выдано RP-поинтов", amount, true);
        embed.field("📝 Причина", reason, false);
        embed.field("🏅 Всего RP-поинтов", total, true);
        embed.footer(|footer| footer.text("— Всегда на страже ваших заслуг"));
        Ok(Reply::public(embed))
    }
}
