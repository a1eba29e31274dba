use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::{Duration, Instant};
use tracing::info;

use crate::database::tiered_cache::FastTierTrait;

/// how long startup waits on redis before giving up and running file only
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub connection: MultiplexedConnection,
}

impl RedisDatabase {
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client = Client::open(connection_string).context("Failed to create Redis client")?;

        let connection = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.get_multiplexed_tokio_connection(),
        )
        .await
        .context("Timed out connecting to Redis")?
        .context("Failed to connect to Redis database")?;

        let db = Self { connection };
        db.health_check().await?;

        info!("Redis connection established");

        Ok(db)
    }

    /// does a ping health check, used on connect and by the health endpoint
    pub async fn health_check(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        let elapsed = start.elapsed();
        Ok(elapsed.as_secs_f64() * 1000.0) // milliseconds
    }
}

#[async_trait]
impl FastTierTrait for RedisDatabase {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> anyhow::Result<()> {
        let mut conn = self.connection.clone();
        match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.connection.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn ping(&self) -> anyhow::Result<f64> {
        self.health_check().await
    }
}
