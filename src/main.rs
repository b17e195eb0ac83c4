mod app_config;
mod commands;
mod compliance;
mod database;
mod embeds;
mod event_handler;
mod formats;
mod ledger;
mod report_intake;
mod report_parser;
mod report_store;
mod role_timer;

use std::env;

use anyhow::{Context as _, Result};
use log::{error, info};
use serenity::prelude::*;

use crate::app_config::AppConfig;
use crate::event_handler::Handler;

#[tokio::main]
async fn main() -> Result<()> {
    log4rs::init_file("bot/log4rs.yml", Default::default())
        .context("Failed to read bot/log4rs.yml")?;

    // Settings
    let app_config = AppConfig::load_config().context("Failed to load the configuration")?;
    // Login with a bot token from the environment
    let token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;

    let handler = Handler::new(app_config).context("Failed to initialize the handler")?;
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create the client")?;

    info!("Starting the bot");
    if let Err(why) = client.start().await {
        error!("Client stopped: {:?}", why);
        return Err(why).context("The client stopped with an error");
    }
    Ok(())
}
