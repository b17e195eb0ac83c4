use anyhow::{Context as _, Result};
use log::{error, info, warn};
use serenity::builder::{CreateApplicationCommands, CreateEmbed};
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::component::ButtonStyle;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::message_component::MessageComponentInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::id::UserId;
use serenity::model::mention::Mentionable;
use serenity::prelude::*;
use serenity::utils::Colour;

use super::options::Options;
use super::{has_any_role, is_forbidden, option, Reply};
use crate::event_handler::Handler;

/// Permission entry for the review buttons
pub const REVIEW_PERMISSION: &str = "auth_review";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    Reject,
}

/// `auth:<accept|reject>:<applicant id>`
pub fn review_button_id(decision: AuthDecision, applicant: UserId) -> String {
    let action = match decision {
        AuthDecision::Accept => "accept",
        AuthDecision::Reject => "reject",
    };
    format!("auth:{}:{}", action, applicant.0)
}

pub fn parse_review_button(custom_id: &str) -> Option<(AuthDecision, UserId)> {
    let mut parts = custom_id.split(':');
    if parts.next()? != "auth" {
        return None;
    }
    let decision = match parts.next()? {
        "accept" => AuthDecision::Accept,
        "reject" => AuthDecision::Reject,
        _ => return None,
    };
    let applicant = parts.next()?.parse::<u64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((decision, UserId(applicant)))
}

pub fn register(commands: &mut CreateApplicationCommands) {
    commands.create_application_command(|command| {
        command
            .name("auth")
            .description("Подать заявку на авторизацию в JI");
        option(command, CommandOptionType::String, "callsign", "Ваш позывной", true);
        option(
            command,
            CommandOptionType::String,
            "steamid",
            "Ваш SteamID (формат STEAM_X:Y:Z)",
            true,
        );
        option(
            command,
            CommandOptionType::String,
            "comment",
            "Комментарий для проверяющего",
            false,
        )
    });
}

impl Handler {
    /// `/auth callsign steamid [comment]`
    pub(crate) async fn auth(&self, ctx: &Context, command: &ApplicationCommandInteraction) -> Result<Reply> {
        let options = Options::new(&command.data.options);
        let steam_id = options.required_string("steamid")?.trim();
        let comment = options
            .string("comment")
            .map(str::trim)
            .filter(|comment| !comment.is_empty())
            .unwrap_or("—");
        if !self.formats.is_steam_id(steam_id) {
            return Ok(Reply::private(
                self.embeds.error("Неверный формат SteamID: STEAM_X:Y:Z"),
            ));
        }
        let call_sign = match self.formats.call_sign(options.required_string("callsign")?) {
            Some(call_sign) => call_sign,
            None => {
                return Ok(Reply::private(
                    self.embeds.error("Позывной должен быть 1–64 символа."),
                ))
            }
        };

        let applicant = command.user.id;
        let member = self.db.ensure_user(applicant).await?;
        if !self.db.set_call_sign(member, &call_sign).await? {
            return Ok(Reply::private(
                self.embeds.error("Этот позывной уже используется."),
            ));
        }
        self.db.set_steam_id(member, Some(steam_id)).await?;
        info!("{} applied for authorization as {}", applicant, call_sign);

        let mut card = self.embeds.titled(
            "⏳ Заявка на рассмотрении",
            format!("👤 Пользователь: {}", applicant.mention()),
        );
        card.field("🎖️ Позывной", &call_sign, true);
        card.field("🔗 SteamID", steam_id, true);
        card.field("📝 Комментарий", comment, false);
        self.app_config
            .discord
            .auth_review_channel
            .send_message(&ctx.http, |message| {
                message.set_embed(card).components(|components| {
                    components.create_action_row(|row| {
                        row.create_button(|button| {
                            button
                                .custom_id(review_button_id(AuthDecision::Accept, applicant))
                                .label("Принять")
                                .style(ButtonStyle::Success)
                        })
                        .create_button(|button| {
                            button
                                .custom_id(review_button_id(AuthDecision::Reject, applicant))
                                .label("Отклонить")
                                .style(ButtonStyle::Danger)
                        })
                    })
                })
            })
            .await
            .context("Failed to post the authorization card")?;

        let mut embed = self.embeds.titled(
            "✅ Ваша заявка отправлена на рассмотрение",
            format!("🎖️ Позывной: `{}`\n🔗 SteamID: `{}`\n📝 Комментарий: {}", call_sign, steam_id, comment),
        );
        embed.colour(Colour::DARK_GREEN);
        Ok(Reply::private(embed))
    }

    /// Accept/Reject buttons on an authorization card
    pub(crate) async fn dispatch_component(&self, ctx: &Context, component: &MessageComponentInteraction) {
        let (decision, applicant) = match parse_review_button(&component.data.custom_id) {
            Some(parsed) => parsed,
            None => {
                warn!("Unknown component: {}", component.data.custom_id);
                return;
            }
        };

        if let Some(allowed) = self.app_config.allowed_roles(REVIEW_PERMISSION) {
            let held = component
                .member
                .as_ref()
                .map(|member| member.roles.as_slice())
                .unwrap_or_default();
            if !has_any_role(held, allowed) {
                let denial = Reply::private(self.embeds.denied(allowed));
                if let Err(why) = respond_privately(ctx, component, denial).await {
                    error!("Failed to deny the review: {:?}", why);
                }
                return;
            }
        }

        if let Err(why) = self.review(ctx, component, decision, applicant).await {
            error!("Authorization review of {} failed: {:?}", applicant, why);
            let embed = if is_forbidden(&why) {
                self.embeds.forbidden()
            } else {
                self.embeds
                    .error("Не удалось обработать заявку. Возможно, пользователь ушёл с сервера.")
            };
            if let Err(why) = respond_privately(ctx, component, Reply::private(embed)).await {
                error!("Failed to report the review failure: {:?}", why);
            }
        }
    }

    async fn review(
        &self,
        ctx: &Context,
        component: &MessageComponentInteraction,
        decision: AuthDecision,
        applicant: UserId,
    ) -> Result<()> {
        let roles = &self.app_config.roles;
        let reviewer = component.user.id;
        match decision {
            AuthDecision::Accept => {
                self.revoke_role(ctx, applicant, roles.needs_auth, "Авторизация пройдена")
                    .await?;
                for role in &roles.onboarding {
                    self.grant_role(ctx, applicant, *role, &format!("Авторизация одобрена {}", reviewer))
                        .await?;
                }
            }
            AuthDecision::Reject => {
                self.grant_role(
                    ctx,
                    applicant,
                    roles.needs_auth,
                    &format!("Заявка отклонена {}", reviewer),
                )
                .await?;
            }
        }
        info!("{} reviewed {}: {:?}", reviewer, applicant, decision);

        let fields = component
            .message
            .embeds
            .first()
            .map(|card| card.fields.clone())
            .unwrap_or_default();
        let (title, colour, verdict) = match decision {
            AuthDecision::Accept => ("✅ Заявка принята", Colour::DARK_GREEN, "поздравляем, вы авторизованы!"),
            AuthDecision::Reject => ("❌ Заявка отклонена", Colour::RED, "к сожалению, вы не прошли авторизацию."),
        };
        let decorate = |embed: &mut CreateEmbed| {
            embed.colour(colour);
            for field in &fields {
                embed.field(&field.name, &field.value, field.inline);
            }
            embed.field("👤 Проверяющий", reviewer.mention(), false);
        };

        let mut card = self
            .embeds
            .titled(title, format!("👤 Пользователь: {}", applicant.mention()));
        decorate(&mut card);
        component
            .create_interaction_response(&ctx.http, |response| {
                response
                    .kind(InteractionResponseType::UpdateMessage)
                    .interaction_response_data(|message| {
                        message.set_embed(card).components(|components| components)
                    })
            })
            .await
            .context("Failed to update the authorization card")?;

        let mut notice = self.embeds.titled(
            match decision {
                AuthDecision::Accept => "✅ Ваша заявка принята",
                AuthDecision::Reject => "❌ Ваша заявка отклонена",
            },
            format!("{}, {}", applicant.mention(), verdict),
        );
        decorate(&mut notice);
        self.app_config
            .discord
            .auth_submit_channel
            .send_message(&ctx.http, |message| message.set_embed(notice))
            .await
            .context("Failed to notify the applicant")?;
        Ok(())
    }
}

async fn respond_privately(ctx: &Context, component: &MessageComponentInteraction, reply: Reply) -> Result<()> {
    component
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| {
                    message.set_embeds(reply.embeds).ephemeral(reply.ephemeral)
                })
        })
        .await
        .context("Failed to answer the component interaction")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_buttons_carry_the_applicant() {
        let id = review_button_id(AuthDecision::Accept, UserId(42));
        assert_eq!(id, "auth:accept:42");
        assert_eq!(
            parse_review_button(&id),
            Some((AuthDecision::Accept, UserId(42)))
        );
        assert_eq!(
            parse_review_button("auth:reject:7"),
            Some((AuthDecision::Reject, UserId(7)))
        );
    }

    #[test]
    fn foreign_buttons_are_ignored() {
        assert_eq!(parse_review_button("auth:accept"), None);
        assert_eq!(parse_review_button("auth:maybe:1"), None);
        assert_eq!(parse_review_button("vote:accept:1"), None);
        assert_eq!(parse_review_button("auth:accept:x"), None);
        assert_eq!(parse_review_button("auth:accept:1:2"), None);
    }
}
