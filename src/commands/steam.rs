use anyhow::Result;
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
            .name("bindsteam")
            .description("Привязать SteamID");
        option(
            command,
            CommandOptionType::String,
            "steamid",
            "SteamID в формате STEAM_X:Y:Z",
            true,
        );
        option(command, CommandOptionType::User, "member", "Участник (по умолчанию вы)", false)
    });
    commands.create_application_command(|command| {
        command.name("steamid").description("Показать привязанный SteamID");
        option(command, CommandOptionType::User, "member", "Участник (по умолчанию вы)", false)
    });
    commands.create_application_command(|command| {
        command
            .name("unbindsteam")
            .description("Отвязать SteamID");
        option(command, CommandOptionType::User, "member", "Участник (по умолчанию вы)", false)
    });
}

impl Handler {
    /// `/bindsteam steamid [member]`
    pub(crate) async fn bind_steam(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let steam_id = Options::new(&command.data.options)
            .required_string("steamid")?
            .trim();
        if !self.formats.is_steam_id(steam_id) {
            return Ok(Reply::private(
                self.embeds.error("Неверный формат SteamID: STEAM_X:Y:Z"),
            ));
        }
        let target = self.target_or_self(command);

        let member = self.db.ensure_user(target).await?;
        if !self.db.set_steam_id(member, Some(steam_id)).await? {
            return Ok(Reply::private(self.embeds.notice(format!(
                "У {} уже привязан SteamID `{}`.",
                target.mention(),
                steam_id
            ))));
        }
        info!("{} bound {} to {}", command.user.id, steam_id, target);

        let mut embed = self.embeds.base("✅ SteamID привязан");
        embed.field("👤 Пользователь", target.mention(), true);
        embed.field("🔗 SteamID", format!("`{}`", steam_id), true);
        Ok(Reply::private(embed))
    }

    /// `/steamid [member]`
    pub(crate) async fn steam_id(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = self.target_or_self(command);
        let steam_id = self
            .db
            .member(target)
            .await?
            .and_then(|member| member.steam_id);
        let embed = match steam_id {
            Some(steam_id) => self.embeds.base(format!(
                "🔗 SteamID {}: `{}`",
                target.mention(),
                steam_id
            )),
            None => self
                .embeds
                .notice(format!("У {} SteamID не привязан.", target.mention())),
        };
        Ok(Reply::private(embed))
    }

    /// `/unbindsteam [member]`
    pub(crate) async fn unbind_steam(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = self.target_or_self(command);
        let removed = match self.db.member(target).await? {
            Some(member) => self.db.set_steam_id(member.id, None).await?,
            None => false,
        };
        if !removed {
            return Ok(Reply::private(
                self.embeds
                    .notice(format!("У {} SteamID не привязан.", target.mention())),
            ));
        }
        info!("{} unbound the SteamID of {}", command.user.id, target);

        Ok(Reply::private(self.embeds.base(format!(
            "✅ SteamID {} отвязан.",
            target.mention()
        ))))
    }
}
