use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    errors::StorageError,
    models::{Message, MessageId, MessageStatus},
    repositories::MessageRepository,
};

#[derive(Default)]
struct Store {
    last_id: MessageId,
    messages: BTreeMap<MessageId, Message>,
}

impl Store {
    fn processing_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .get_mut(&id)
            .filter(|m| m.status == MessageStatus::Processing)
    }
}

/// Process-local repository. Every operation runs under one lock, which gives
/// claims the same exclusivity the database transaction provides.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    store: Mutex<Store>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, keeping its id. Used to seed fixtures.
    pub async fn insert(&self, message: Message) {
        let mut store = self.store.lock().await;
        store.last_id = store.last_id.max(message.id);
        store.messages.insert(message.id, message);
    }

    pub async fn all(&self) -> Vec<Message> {
        let store = self.store.lock().await;
        store.messages.values().cloned().collect()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(
        &self,
        recipient: &str,
        content: &str,
        status: MessageStatus,
    ) -> Result<Message, StorageError> {
        let now = Utc::now();
        let mut store = self.store.lock().await;
        store.last_id += 1;
        let message = Message {
            id: store.last_id,
            recipient: recipient.to_string(),
            content: content.to_string(),
            status,
            created_at: now,
            updated_at: now,
            sent_at: None,
            remote_message_id: None,
            last_error: None,
        };
        store.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        let now = Utc::now();
        let mut store = self.store.lock().await;
        let claimed = store
            .messages
            .values_mut()
            .filter(|m| m.status == MessageStatus::Pending)
            .take(limit as usize)
            .map(|m| {
                m.status = MessageStatus::Processing;
                m.updated_at = now;
                m.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_sent(
        &self,
        id: MessageId,
        remote_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut store = self.store.lock().await;
        let Some(message) = store.processing_mut(id) else {
            return Ok(false);
        };
        message.status = MessageStatus::Sent;
        message.sent_at = Some(sent_at);
        message.remote_message_id = Some(remote_id.to_string());
        message.last_error = None;
        message.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(&self, id: MessageId, reason: &str) -> Result<bool, StorageError> {
        let mut store = self.store.lock().await;
        let Some(message) = store.processing_mut(id) else {
            return Ok(false);
        };
        message.status = MessageStatus::Failed;
        message.last_error = Some(reason.to_string());
        message.remote_message_id = None;
        message.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_sent(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        let store = self.store.lock().await;
        let mut sent: Vec<Message> = store
            .messages
            .values()
            .filter(|m| m.status == MessageStatus::Sent)
            .cloned()
            .collect();
        sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        sent.truncate(limit as usize);
        Ok(sent)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        let store = self.store.lock().await;
        Ok(store.messages.get(&id).cloned())
    }

    async fn fail_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<MessageId>, StorageError> {
        let now = Utc::now();
        let mut store = self.store.lock().await;
        let ids = store
            .messages
            .values_mut()
            .filter(|m| m.status == MessageStatus::Processing && m.updated_at < older_than)
            .map(|m| {
                m.status = MessageStatus::Failed;
                m.last_error = Some(reason.to_string());
                m.updated_at = now;
                m.id
            })
            .collect();
        Ok(ids)
    }
}
