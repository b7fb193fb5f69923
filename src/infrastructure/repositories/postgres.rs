use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, postgres::PgPoolOptions};
use tracing::info;

use crate::domain::{
    errors::StorageError,
    models::{Message, MessageId, MessageStatus},
    repositories::MessageRepository,
};

pub type PgPool = Pool<Postgres>;

const MESSAGE_COLUMNS: &str = "id, recipient, content, status, created_at, updated_at, sent_at, \
                               remote_message_id, last_error";

/// Opens the pool and brings the schema up to date.
pub async fn connect(dsn: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database connected and migrated");
    Ok(pool)
}

impl From<sqlx::Error> for StorageError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::PoolTimedOut => StorageError::Timeout,
            other => StorageError::Backend(other.into()),
        }
    }
}

#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(
        &self,
        recipient: &str,
        content: &str,
        status: MessageStatus,
    ) -> Result<Message, StorageError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (recipient, content, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(recipient)
        .bind(content)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        record.try_into()
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED lets concurrent claimers take disjoint rows instead of
        // blocking on each other.
        let ids: Vec<MessageId> = sqlx::query_scalar(
            r#"
            SELECT id FROM messages
            WHERE status = 'pending'
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages
            SET status = 'processing', updated_at = NOW()
            WHERE id = ANY($1)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut messages = records
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not preserve the SELECT order.
        messages.sort_by_key(|message| message.id);
        Ok(messages)
    }

    async fn mark_sent(
        &self,
        id: MessageId,
        remote_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'sent',
                sent_at = $2,
                remote_message_id = $3,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: MessageId, reason: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'failed',
                last_error = $2,
                remote_message_id = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_sent(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE status = 'sent'
            ORDER BY sent_at DESC, id DESC
            LIMIT $1
            "#
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Message::try_from).transpose()
    }

    async fn fail_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<MessageId>, StorageError> {
        let ids = sqlx::query_scalar(
            r#"
            UPDATE messages
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE status = 'processing'
              AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(older_than)
        .bind(reason)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: i64,
    recipient: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    remote_message_id: Option<String>,
    last_error: Option<String>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = StorageError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let status = MessageStatus::from_str(&value.status).ok_or_else(|| {
            StorageError::Backend(anyhow::anyhow!("unknown message status {}", value.status))
        })?;
        Ok(Self {
            id: value.id,
            recipient: value.recipient,
            content: value.content,
            status,
            created_at: value.created_at,
            updated_at: value.updated_at,
            sent_at: value.sent_at,
            remote_message_id: value.remote_message_id,
            last_error: value.last_error,
        })
    }
}
