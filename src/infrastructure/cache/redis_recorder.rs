use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, aio::ConnectionManager};
use tracing::info;

use crate::application::services::recorder::SentRecorder;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PORT: u16 = 6379;
pub const SENT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    /// Connection parameters for `addr` (`host` or `host:port`). The password
    /// is passed as is, so it may contain any character.
    pub fn connection_info(&self) -> anyhow::Result<ConnectionInfo> {
        let (host, port) = match self.addr.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .with_context(|| format!("invalid redis port in {:?}", self.addr))?,
            ),
            None => (self.addr.as_str(), DEFAULT_PORT),
        };
        if host.is_empty() {
            anyhow::bail!("missing redis host in {:?}", self.addr);
        }

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        })
    }
}

pub fn sent_key(remote_id: &str) -> String {
    format!("sent:{remote_id}")
}

/// Keeps `sent:<remote id>` → send time for a month. Nothing reads it back
/// in this service.
pub struct RedisSentRecorder {
    redis: ConnectionManager,
}

impl RedisSentRecorder {
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Arc<Self>> {
        let client =
            redis::Client::open(config.connection_info()?).context("invalid redis address")?;
        let mut redis = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .context("redis connect timed out")?
            .context("redis connect error")?;

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            redis::cmd("PING").query_async::<_, String>(&mut redis),
        )
        .await
        .context("redis ping timed out")?
        .context("redis ping error")?;

        info!(addr = %config.addr, db = config.db, "redis connected");
        Ok(Arc::new(Self { redis }))
    }
}

#[async_trait]
impl SentRecorder for RedisSentRecorder {
    async fn record_sent(&self, remote_id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(sent_key(remote_id))
            .arg(at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .arg("EX")
            .arg(SENT_TTL.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .context("failed to record sent message in redis")?;
        Ok(())
    }
}
