use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::{info, warn};

use gateway::{AppConfig, EdgeApplicationServer, Logger, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and keep the sentry client around
    let _guards = Logger::init(&config);

    info!("logger and env prepped...");

    // redis is optional, the file tier carries everything when it's missing
    let redis_db = match config.redis_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            info!("connecting to redis...");
            match RedisDatabase::connect(url).await {
                Ok(db) => {
                    info!("redis connection ok");
                    Some(db)
                }
                Err(e) => {
                    warn!("redis unavailable, running on the file cache only: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    info!("starting gateway server...");

    EdgeApplicationServer::serve(config, redis_db)
        .await
        .context("gateway server failed to start")?;

    Ok(())
}
