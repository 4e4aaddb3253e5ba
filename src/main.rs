mod config;
mod digest;
mod filters;
mod format;
mod logging;
mod scheduler;
mod storage;
mod tg;
mod tmdb;

#[cfg(test)]
mod test_support;

use crate::config::Config;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    info!("🎬 Trending digest bot starting...");
    info!(?config, "Configuration loaded");

    let bot = Bot::new(config.bot_token.clone());
    let tmdb = tmdb::TmdbClient::with_base_url(config.tmdb_auth.clone(), config.tmdb_base_url.clone());
    let storage = storage::Storage::new(config.store_path.clone()).await?;

    // еженедельная подборка и ежедневная чистка живут рядом с диспетчером
    let mut scheduler =
        scheduler::start(bot.clone(), tmdb.clone(), storage.clone(), config.timezone).await?;

    tg::run(bot, Arc::new(config), tmdb, storage).await;

    info!("Shutting down gracefully...");
    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler did not stop cleanly");
    }
    info!("Shutdown complete");
    Ok(())
}
