use serenity::builder::CreateEmbed;
use serenity::model::id::RoleId;
use serenity::model::mention::Mentionable;
use serenity::model::Timestamp;
use serenity::utils::Colour;

/// Builds the bot's embeds with a shared look
#[derive(Debug, Clone)]
pub struct Embeds {
    emblem_url: String,
}

impl Embeds {
    pub fn new(emblem_url: &str) -> Self {
        Self {
            emblem_url: emblem_url.to_owned(),
        }
    }

    fn styled(&self, colour: Colour) -> CreateEmbed {
        let mut embed = CreateEmbed::default();
        embed.colour(colour);
        embed.timestamp(Timestamp::now());
        if !self.emblem_url.is_empty() {
            embed.thumbnail(&self.emblem_url);
        }
        embed
    }

    /// White embed with the emblem
    pub fn base(&self, description: impl ToString) -> CreateEmbed {
        let mut embed = self.styled(Colour::from_rgb(255, 255, 255));
        embed.description(description);
        embed
    }

    pub fn titled(&self, title: impl ToString, description: impl ToString) -> CreateEmbed {
        let mut embed = self.base(description);
        embed.title(title);
        embed
    }

    /// Red embed for failed or rejected operations
    pub fn error(&self, description: impl ToString) -> CreateEmbed {
        let mut embed = self.styled(Colour::RED);
        embed.title("❗ Ошибка");
        embed.description(description);
        embed
    }

    /// Orange embed for no-op outcomes
    pub fn notice(&self, description: impl ToString) -> CreateEmbed {
        let mut embed = self.styled(Colour::ORANGE);
        embed.description(description);
        embed
    }

    /// Red embed listing the roles that may run a command
    pub fn denied(&self, allowed: &[RoleId]) -> CreateEmbed {
        let roles = allowed
            .iter()
            .map(|role| role.mention().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let mut embed = self.styled(Colour::RED);
        embed.title("❌ Доступ запрещён");
        embed.description("У вас нет доступа к этой команде.");
        embed.field(
            "Доступ имеют следующие роли:",
            if roles.is_empty() { "—".to_string() } else { roles },
            false,
        );
        embed
    }

    /// Platform refused the operation
    pub fn forbidden(&self) -> CreateEmbed {
        let mut embed = self.styled(Colour::RED);
        embed.title("❗ Нет прав");
        embed.description("У бота нет прав на это действие.");
        embed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn base_embed_carries_emblem() {
        let embeds = Embeds::new("https://example.com/emblem.png");
        let embed = embeds.base("hello");
        assert_eq!(embed.0.get("description"), Some(&Value::from("hello")));
        assert_eq!(
            embed.0.get("thumbnail"),
            Some(&serde_json::json!({ "url": "https://example.com/emblem.png" }))
        );
        assert_eq!(embed.0.get("color"), Some(&Value::from(0xFFFFFFu64)));
    }

    #[test]
    fn no_thumbnail_without_emblem() {
        let embed = Embeds::new("").notice("nothing changed");
        assert!(embed.0.get("thumbnail").is_none());
    }

    #[test]
    fn denial_lists_allowed_roles() {
        let embed = Embeds::new("").denied(&[RoleId(1), RoleId(2)]);
        let fields = embed.0.get("fields").unwrap();
        assert_eq!(fields[0]["value"], Value::from("<@&1> <@&2>"));
    }
}
