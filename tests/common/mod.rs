//! Test doubles shared by the integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::{
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_dispatch::{
    application::services::{
        delivery::{DeliveryClient, DeliveryReceipt},
        recorder::SentRecorder,
    },
    domain::{
        errors::{DeliveryError, StorageError},
        models::{Message, MessageId, MessageStatus},
        repositories::MessageRepository,
    },
    infrastructure::repositories::InMemoryMessageRepository,
};

pub const RECIPIENT: &str = "+905551111111";

type Responder = dyn Fn(&Message) -> Result<DeliveryReceipt, DeliveryError> + Send + Sync;

/// Delivery client answering from a closure and remembering who it saw.
pub struct StubDelivery {
    calls: Mutex<Vec<MessageId>>,
    delay: Duration,
    respond: Box<Responder>,
}

impl StubDelivery {
    pub fn with(
        respond: impl Fn(&Message) -> Result<DeliveryReceipt, DeliveryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            respond: Box::new(respond),
        }
    }

    /// Accepts everything with remote id `remote-<id>`.
    pub fn accepting() -> Self {
        Self::with(|message| {
            Ok(DeliveryReceipt {
                remote_id: format!("remote-{}", message.id),
                status: 202,
                body: String::new(),
            })
        })
    }

    pub fn rejecting(status: u16, body: &'static str) -> Self {
        Self::with(move |_| {
            Err(DeliveryError::UnexpectedStatus {
                status,
                body: body.to_string(),
            })
        })
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<MessageId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for StubDelivery {
    async fn deliver(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        self.calls.lock().unwrap().push(message.id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(message)
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    records: Mutex<Vec<String>>,
}

impl RecordingRecorder {
    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SentRecorder for RecordingRecorder {
    async fn record_sent(&self, remote_id: &str, _at: DateTime<Utc>) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }
}

pub struct FailingRecorder;

#[async_trait]
impl SentRecorder for FailingRecorder {
    async fn record_sent(&self, _remote_id: &str, _at: DateTime<Utc>) -> anyhow::Result<()> {
        anyhow::bail!("redis unavailable")
    }
}

/// In-memory store that counts claims and can be told to fail.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryMessageRepository,
    claims: AtomicUsize,
    pub fail_claims: AtomicBool,
    pub fail_mark_sent: AtomicBool,
}

impl FlakyRepository {
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }
}

fn unavailable() -> StorageError {
    StorageError::Backend(anyhow::anyhow!("connection refused"))
}

#[async_trait]
impl MessageRepository for FlakyRepository {
    async fn create(
        &self,
        recipient: &str,
        content: &str,
        status: MessageStatus,
    ) -> Result<Message, StorageError> {
        self.inner.create(recipient, content, status).await
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.claim_pending(limit).await
    }

    async fn mark_sent(
        &self,
        id: MessageId,
        remote_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if self.fail_mark_sent.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.mark_sent(id, remote_id, sent_at).await
    }

    async fn mark_failed(&self, id: MessageId, reason: &str) -> Result<bool, StorageError> {
        self.inner.mark_failed(id, reason).await
    }

    async fn list_sent(&self, limit: u32) -> Result<Vec<Message>, StorageError> {
        self.inner.list_sent(limit).await
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        self.inner.get(id).await
    }

    async fn fail_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<MessageId>, StorageError> {
        self.inner.fail_stale_processing(older_than, reason).await
    }
}

pub async fn seed_pending(repo: &dyn MessageRepository, contents: &[&str]) -> Vec<MessageId> {
    let mut ids = Vec::new();
    for content in contents {
        let message = repo
            .create(RECIPIENT, content, MessageStatus::Pending)
            .await
            .unwrap();
        ids.push(message.id);
    }
    ids
}

pub async fn status_of(repo: &dyn MessageRepository, id: MessageId) -> MessageStatus {
    repo.get(id).await.unwrap().unwrap().status
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
