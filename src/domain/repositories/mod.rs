use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    errors::StorageError,
    models::{Message, MessageId, MessageStatus},
};

/// Transactional access to message records.
///
/// Implementations must make `claim_pending` atomic: a message returned by
/// one claim is never returned by another, concurrent or not, because the
/// claim itself moves it out of `pending`.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(
        &self,
        recipient: &str,
        content: &str,
        status: MessageStatus,
    ) -> Result<Message, StorageError>;

    /// Moves up to `limit` pending messages to `processing`, lowest id first,
    /// and returns them in ascending id order.
    async fn claim_pending(&self, limit: u32) -> Result<Vec<Message>, StorageError>;

    /// Moves a `processing` message to `sent`. Returns `false`, changing
    /// nothing, when the message is in any other state.
    async fn mark_sent(
        &self,
        id: MessageId,
        remote_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Moves a `processing` message to `failed`. Returns `false`, changing
    /// nothing, when the message is in any other state.
    async fn mark_failed(&self, id: MessageId, reason: &str) -> Result<bool, StorageError>;

    async fn list_sent(&self, limit: u32) -> Result<Vec<Message>, StorageError>;

    async fn get(&self, id: MessageId) -> Result<Option<Message>, StorageError>;

    /// Fails every `processing` message last touched before `older_than` and
    /// returns their ids.
    async fn fail_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<MessageId>, StorageError>;
}
