pub mod auth;
pub mod curator;
pub mod info;
pub mod options;
pub mod points;
pub mod reports;
pub mod roles;
pub mod steam;
pub mod vacation;
pub mod warnings;

use anyhow::{Context as _, Result};
use log::{error, info, warn};
use serenity::builder::{CreateApplicationCommand, CreateApplicationCommands, CreateEmbed};
use serenity::http::error::Error as HttpError;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::id::{RoleId, UserId};
use serenity::prelude::*;
use serenity::Error as SerenityError;

use crate::event_handler::Handler;

/// What a command answers with
pub struct Reply {
    pub embeds: Vec<CreateEmbed>,
    /// Only the invoking member sees it
    pub ephemeral: bool,
}

impl Reply {
    pub fn public(embed: CreateEmbed) -> Self {
        Self {
            embeds: vec![embed],
            ephemeral: false,
        }
    }

    pub fn private(embed: CreateEmbed) -> Self {
        Self {
            embeds: vec![embed],
            ephemeral: true,
        }
    }

    pub fn and(mut self, embed: CreateEmbed) -> Self {
        self.embeds.push(embed);
        self
    }
}

/// Whether a failure was Discord answering 403
pub fn is_forbidden(why: &anyhow::Error) -> bool {
    why.chain()
        .filter_map(|cause| cause.downcast_ref::<SerenityError>())
        .any(|cause| match cause {
            SerenityError::Http(http) => match **http {
                HttpError::UnsuccessfulRequest(ref response) => {
                    response.status_code.as_u16() == 403
                }
                _ => false,
            },
            _ => false,
        })
}

/// Whether a member holds at least one of the allowed roles
pub fn has_any_role(held: &[RoleId], allowed: &[RoleId]) -> bool {
    allowed.iter().any(|role| held.contains(role))
}

/// Adds one option to a command
pub(crate) fn option<'a>(
    command: &'a mut CreateApplicationCommand,
    kind: CommandOptionType,
    name: &str,
    description: &str,
    required: bool,
) -> &'a mut CreateApplicationCommand {
    command.create_option(|option| {
        option
            .name(name)
            .description(description)
            .kind(kind)
            .required(required)
    })
}

/// Every slash command the bot answers
pub fn register_all(commands: &mut CreateApplicationCommands) -> &mut CreateApplicationCommands {
    reports::register(commands);
    roles::register(commands);
    vacation::register(commands);
    warnings::register(commands);
    points::register(commands);
    auth::register(commands);
    steam::register(commands);
    curator::register(commands);
    info::register(commands);
    commands
}

impl Handler {
    /// Runs a slash command and answers it
    pub(crate) async fn dispatch_command(&self, ctx: &Context, command: &ApplicationCommandInteraction) {
        let name = command.data.name.as_str();
        info!("/{} by {} ({})", name, command.user.tag(), command.user.id);

        let reply = match self.permission_denial(command) {
            Some(denial) => {
                warn!("/{} denied for {}", name, command.user.id);
                denial
            }
            None => match self.run_command(ctx, command).await {
                Ok(reply) => reply,
                Err(why) if is_forbidden(&why) => {
                    error!("/{} rejected by Discord: {:?}", name, why);
                    Reply::private(self.embeds.forbidden())
                }
                Err(why) => {
                    error!("/{} failed: {:?}", name, why);
                    Reply::private(self.embeds.error("Произошла ошибка при выполнении команды."))
                }
            },
        };

        if let Err(why) = respond(ctx, command, reply).await {
            error!("Failed to answer /{}: {:?}", name, why);
        }
    }

    fn permission_denial(&self, command: &ApplicationCommandInteraction) -> Option<Reply> {
        let allowed = self.app_config.allowed_roles(&command.data.name)?;
        let held = command
            .member
            .as_ref()
            .map(|member| member.roles.as_slice())
            .unwrap_or_default();
        if has_any_role(held, allowed) {
            return None;
        }
        Some(Reply::private(self.embeds.denied(allowed)))
    }

    async fn run_command(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        match command.data.name.as_str() {
            "results" => self.results(ctx).await,
            "denied" => self.denied(ctx, command).await,
            "addrole" => self.add_role(ctx, command).await,
            "removerole" => self.remove_role(ctx, command).await,
            "tempaddrole" => self.temp_add_role(ctx, command).await,
            "fullclearroles" => self.full_clear_roles(ctx, command).await,
            "returnroles" => self.return_roles(ctx, command).await,
            "vacation" => self.vacation(ctx, command).await,
            "removevacation" => self.remove_vacation(ctx, command).await,
            "warn" => self.warn(ctx, command).await,
            "removewarn" => self.remove_warn(ctx, command).await,
            "addrp" => self.add_rp(command).await,
            "auth" => self.auth(ctx, command).await,
            "bindsteam" => self.bind_steam(command).await,
            "steamid" => self.steam_id(command).await,
            "unbindsteam" => self.unbind_steam(command).await,
            "assigncurator" => self.assign_curator(command).await,
            "removecurator" => self.remove_curator(command).await,
            "whoiscurator" => self.who_is_curator(command).await,
            "info" => self.info(ctx, command, false).await,
            "myinfo" => self.info(ctx, command, true).await,
            "jltinfo" => Ok(self.jlt_info()),
            other => Ok(Reply::private(
                self.embeds.error(format!("Неизвестная команда: {}", other)),
            )),
        }
    }

    /// Member named by an optional `member` option, else the invoker
    pub(crate) fn target_or_self(&self, command: &ApplicationCommandInteraction) -> UserId {
        options::Options::new(&command.data.options)
            .user("member")
            .map(|user| user.id)
            .unwrap_or(command.user.id)
    }

    pub(crate) async fn grant_role(&self, ctx: &Context, user: UserId, role: RoleId, reason: &str) -> Result<()> {
        ctx.http
            .add_member_role(self.app_config.discord.guild_id.0, user.0, role.0, Some(reason))
            .await
            .with_context(|| format!("Failed to grant role {} to {}", role, user))
    }

    pub(crate) async fn revoke_role(&self, ctx: &Context, user: UserId, role: RoleId, reason: &str) -> Result<()> {
        ctx.http
            .remove_member_role(self.app_config.discord.guild_id.0, user.0, role.0, Some(reason))
            .await
            .with_context(|| format!("Failed to revoke role {} from {}", role, user))
    }

    /// Roles a guild member currently holds
    pub(crate) async fn member_roles(&self, ctx: &Context, user: UserId) -> Result<Vec<RoleId>> {
        let member = self
            .app_config
            .discord
            .guild_id
            .member(ctx, user)
            .await
            .with_context(|| format!("Failed to fetch guild member {}", user))?;
        Ok(member.roles)
    }
}

async fn respond(ctx: &Context, command: &ApplicationCommandInteraction, reply: Reply) -> Result<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| {
                    message.set_embeds(reply.embeds).ephemeral(reply.ephemeral)
                })
        })
        .await
        .context("Failed to send the interaction response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_listed_role_is_enough() {
        let allowed = [RoleId(1), RoleId(2)];
        assert!(has_any_role(&[RoleId(5), RoleId(2)], &allowed));
        assert!(!has_any_role(&[RoleId(5)], &allowed));
        assert!(!has_any_role(&[], &allowed));
    }

    #[test]
    fn plain_errors_are_not_forbidden() {
        let why = anyhow::anyhow!("database is locked").context("Failed to store report");
        assert!(!is_forbidden(&why));
        let why = anyhow::Error::new(SerenityError::Other("nope")).context("Failed to grant role");
        assert!(!is_forbidden(&why));
    }
}
