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
            .name("assigncurator")
            .description("Назначить куратора");
        option(command, CommandOptionType::User, "member", "Кому назначаем куратора", true);
        option(command, CommandOptionType::User, "curator", "Кто станет куратором", true)
    });
    commands.create_application_command(|command| {
        command
            .name("removecurator")
            .description("Удалить куратора");
        option(command, CommandOptionType::User, "member", "У кого удаляем куратора", true)
    });
    commands.create_application_command(|command| {
        command
            .name("whoiscurator")
            .description("Узнать куратора пользователя");
        option(
            command,
            CommandOptionType::User,
            "member",
            "Пользователь (по умолчанию вы)",
            false,
        )
    });
}

impl Handler {
    /// `/assigncurator member curator`
    pub(crate) async fn assign_curator(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let target = options.required_user("member")?.id;
        let curator = options.required_user("curator")?.id;
        if target == curator {
            return Ok(Reply::private(
                self.embeds.notice("Нельзя назначить участника куратором самому себе."),
            ));
        }

        let member = self.db.ensure_user(target).await?;
        let curator_id = self.db.ensure_user(curator).await?;
        self.db.assign_curator(member, curator_id).await?;
        info!("{} assigned curator {} to {}", command.user.id, curator, target);

        Ok(Reply::public(self.embeds.titled(
            "✅ Куратор назначен",
            format!("{} теперь куратор для {}.", curator.mention(), target.mention()),
        )))
    }

    /// `/removecurator member`
    pub(crate) async fn remove_curator(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = Options::new(&command.data.options)
            .required_user("member")?
            .id;
        let removed = match self.db.member(target).await? {
            Some(member) => self.db.remove_curator(member.id).await?,
            None => false,
        };
        if !removed {
            return Ok(Reply::private(self.embeds.notice(format!(
                "У {} куратор не назначен.",
                target.mention()
            ))));
        }
        info!("{} removed the curator of {}", command.user.id, target);

        Ok(Reply::public(self.embeds.titled(
            "✅ Куратор удалён",
            format!("Куратор для {} успешно удалён.", target.mention()),
        )))
    }

    /// `/whoiscurator [member]`, with the member's own mentees
    pub(crate) async fn who_is_curator(&self, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let target = self.target_or_self(command);
        let record = self.db.member(target).await?;

        let curator = match record.as_ref().and_then(|record| record.curator) {
            Some(curator) => self.db.member_by_id(curator).await?,
            None => None,
        };
        let mentees = match &record {
            Some(record) => self.db.mentees(record.id).await?,
            None => Vec::new(),
        };

        let description = match curator {
            Some(curator) => format!(
                "🔹 Куратор для {}: {}",
                target.mention(),
                curator.discord_id.mention()
            ),
            None => format!("ℹ️ Для {} куратор не назначен.", target.mention()),
        };
        let mut embed = self.embeds.titled("ℹ️ Информация о кураторе", description);
        if !mentees.is_empty() {
            embed.field(
                "🎓 Подопечные",
                mentees
                    .iter()
                    .map(|mentee| mentee.mention().to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
                false,
            );
        }
        Ok(Reply::private(embed))
    }
}
