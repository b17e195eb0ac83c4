use anyhow::{anyhow, Result};
use serenity::model::application::interaction::application_command::{
    CommandDataOption, CommandDataOptionValue,
};
use serenity::model::guild::Role;
use serenity::model::user::User;

/// Typed access to the resolved options of a slash command
pub struct Options<'a> {
    options: &'a [CommandDataOption],
}

impl<'a> Options<'a> {
    pub fn new(options: &'a [CommandDataOption]) -> Self {
        Self { options }
    }

    fn resolved(&self, name: &str) -> Option<&'a CommandDataOptionValue> {
        self.options
            .iter()
            .find(|option| option.name == name)
            .and_then(|option| option.resolved.as_ref())
    }

    pub fn string(&self, name: &str) -> Option<&'a str> {
        match self.resolved(name)? {
            CommandDataOptionValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.resolved(name)? {
            CommandDataOptionValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.resolved(name)? {
            CommandDataOptionValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn user(&self, name: &str) -> Option<&'a User> {
        match self.resolved(name)? {
            CommandDataOptionValue::User(user, _) => Some(user),
            _ => None,
        }
    }

    pub fn role(&self, name: &str) -> Option<&'a Role> {
        match self.resolved(name)? {
            CommandDataOptionValue::Role(role) => Some(role),
            _ => None,
        }
    }

    pub fn required_string(&self, name: &str) -> Result<&'a str> {
        self.string(name)
            .ok_or_else(|| anyhow!("Missing option: {}", name))
    }

    pub fn required_integer(&self, name: &str) -> Result<i64> {
        self.integer(name)
            .ok_or_else(|| anyhow!("Missing option: {}", name))
    }

    pub fn required_user(&self, name: &str) -> Result<&'a User> {
        self.user(name).ok_or_else(|| anyhow!("Missing option: {}", name))
    }

    pub fn required_role(&self, name: &str) -> Result<&'a Role> {
        self.role(name).ok_or_else(|| anyhow!("Missing option: {}", name))
    }
}
