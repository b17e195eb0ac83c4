use std::collections::HashMap;

use anyhow::{Context as _, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use config::Config;
use serenity::model::id::{ChannelId, GuildId, RoleId};

/// Discord settings
#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct DiscordConfig {
    /// Guild the slash commands are registered in
    pub guild_id: GuildId,
    /// Channel receiving weekly activity reports
    pub activity_channel: ChannelId,
    /// Channel receiving interrogation reports
    pub interrogation_channel: ChannelId,
    /// Channel where applicants get their authorization verdict
    pub auth_submit_channel: ChannelId,
    /// Channel where reviewers accept or reject applications
    pub auth_review_channel: ChannelId,
    /// Thumbnail attached to every embed
    #[serde(default)]
    pub emblem_url: String,
}

/// A configured role with the title shown in profiles
#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct NamedRole {
    /// Shown in profile cards
    pub title: String,
    pub id: RoleId,
}

/// Role settings
#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct RolesConfig {
    /// Ranks, highest first
    #[serde(default)]
    pub ranks: Vec<NamedRole>,
    /// Corps a member serves in
    #[serde(default)]
    pub corps: Vec<NamedRole>,
    /// Posts such as curator
    #[serde(default)]
    pub posts: Vec<NamedRole>,
    /// Held while on vacation
    pub vacation: RoleId,
    /// Black mark
    pub black_mark: RoleId,
    /// Held until an authorization is accepted
    pub needs_auth: RoleId,
    /// WARN 1/3, 2/3, 3/3 in that order
    pub warn_levels: Vec<RoleId>,
    /// Roles listed by the weekly summary
    #[serde(default)]
    pub report_roles: Vec<RoleId>,
    /// Roles granted when an authorization is accepted
    #[serde(default)]
    pub onboarding: Vec<RoleId>,
}

impl RolesConfig {
    /// Roles that role commands are allowed to grant and revoke
    pub fn is_manageable(&self, role_id: RoleId) -> bool {
        role_id == self.vacation
            || self
                .ranks
                .iter()
                .chain(self.corps.iter())
                .chain(self.posts.iter())
                .any(|role| role.id == role_id)
    }

    /// Role for a warning level (1..=3)
    pub fn warn_role(&self, level: i64) -> Option<RoleId> {
        if !(1..=3).contains(&level) {
            return None;
        }
        self.warn_levels.get((level - 1) as usize).copied()
    }
}

/// Database settings
#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct DatabaseConfig {
    /// SQLite file
    pub path: String,
}

#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct LinksConfig {
    /// Trainee information document
    pub trainee_info: String,
    /// Young investigator course
    pub trainee_course: String,
}

/// Application settings
#[derive(Debug, Default, serde::Deserialize, PartialEq, Clone)]
pub struct AppConfig {
    /// Discord settings
    pub discord: DiscordConfig,
    /// Role settings
    pub roles: RolesConfig,
    /// Command name -> roles allowed to run it
    #[serde(default)]
    pub permissions: HashMap<String, Vec<RoleId>>,
    /// Database settings
    pub database: DatabaseConfig,
    /// Links posted by `/jltinfo`
    #[serde(default)]
    pub links: LinksConfig,
    /// IANA zone that decides what "today" is
    pub timezone: String,
}

impl AppConfig {
    /// Reads `bot/config.toml` layered with `APP_*` environment variables
    pub fn load_config() -> Result<AppConfig> {
        Self::layered(config::File::with_name("bot/config.toml"))
    }

    fn layered<S>(file: S) -> Result<AppConfig>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            // Eg.. `APP_DATABASE__PATH=/tmp/ji.db ./target/app`
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let app_config = config
            .try_deserialize::<AppConfig>()
            .context("Failed to read the configuration file")?;
        app_config.timezone()?;
        Ok(app_config)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Unknown timezone: {}", self.timezone))
    }

    /// Calendar day in the configured timezone
    pub fn today(&self) -> NaiveDate {
        let tz = self.timezone().unwrap_or(Tz::UTC);
        Utc::now().with_timezone(&tz).date_naive()
    }

    /// Roles allowed to run a command, `None` when the command is open
    pub fn allowed_roles(&self, command: &str) -> Option<&[RoleId]> {
        self.permissions
            .get(command)
            .map(Vec::as_slice)
            .filter(|roles| !roles.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SAMPLE: &str = r#"
timezone = "Europe/Moscow"

[discord]
guild_id = "100"
activity_channel = "200"
interrogation_channel = "201"
auth_submit_channel = "202"
auth_review_channel = "203"

[roles]
vacation = "10"
black_mark = "11"
needs_auth = "12"
warn_levels = ["21", "22", "23"]
report_roles = ["31", "32"]

[[roles.ranks]]
title = "Майор"
id = "41"

[[roles.posts]]
title = "Куратор"
id = "51"

[permissions]
results = ["41", "51"]
jltinfo = []

[database]
path = "ji.db"
"#;

    fn sample() -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(SAMPLE, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap()
    }

    #[test]
    fn reads_sections() {
        let config = sample();
        assert_eq!(config.discord.activity_channel, ChannelId(200));
        assert_eq!(config.roles.ranks[0].title, "Майор");
        assert_eq!(config.database.path, "ji.db");
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Moscow);
    }

    #[test]
    fn environment_overrides_the_file() {
        std::env::set_var("APP_DATABASE__PATH", "/tmp/override.db");
        let config = AppConfig::layered(config::File::from_str(SAMPLE, FileFormat::Toml));
        std::env::remove_var("APP_DATABASE__PATH");

        let config = config.unwrap();
        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.discord.activity_channel, ChannelId(200));
    }

    #[test]
    fn warn_levels_are_one_based() {
        let roles = sample().roles;
        assert_eq!(roles.warn_role(1), Some(RoleId(21)));
        assert_eq!(roles.warn_role(3), Some(RoleId(23)));
        assert_eq!(roles.warn_role(0), None);
        assert_eq!(roles.warn_role(4), None);
    }

    #[test]
    fn manageable_roles_cover_ranks_posts_and_vacation() {
        let roles = sample().roles;
        assert!(roles.is_manageable(RoleId(41)));
        assert!(roles.is_manageable(RoleId(51)));
        assert!(roles.is_manageable(RoleId(10)));
        assert!(!roles.is_manageable(RoleId(21)));
    }

    #[test]
    fn empty_permission_list_means_open() {
        let config = sample();
        assert_eq!(
            config.allowed_roles("results"),
            Some(&[RoleId(41), RoleId(51)][..])
        );
        assert_eq!(config.allowed_roles("jltinfo"), None);
        assert_eq!(config.allowed_roles("myinfo"), None);
    }
}
