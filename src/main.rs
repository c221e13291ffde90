#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod discord;
mod engine;
mod utils;

use cli::Cli;
use config::Config;
use db::JsonSnapshotStore;
use discord::DiscordClient;
use engine::{EngineSettings, NotifyEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load_from_file(&cli.config)?);
    utils::logging::init_tracing(&config.logging);
    info!("voice-notify starting up");

    let store = Arc::new(JsonSnapshotStore::new(&config.persistence.file));
    let discord_client = Arc::new(DiscordClient::new(config.clone()));
    let engine = NotifyEngine::start(
        EngineSettings::from_config(&config),
        store,
        discord_client.clone(),
    )
    .await;
    discord_client.set_engine(engine.clone()).await;

    tokio::select! {
        result = discord_client.start() => {
            if let Err(err) = result {
                error!("discord client error: {err}");
            }
            tokio::signal::ctrl_c().await?;
        }
        result = tokio::signal::ctrl_c() => result?,
    }

    info!("voice-notify shutting down");
    if let Err(err) = engine.shutdown().await {
        error!("failed to save state on shutdown: {err}");
    }
    discord_client.stop().await?;
    Ok(())
}
