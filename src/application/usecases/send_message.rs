use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    application::services::{
        delivery::DeliveryClient,
        recorder::{SentRecorder, record_sent_detached},
    },
    domain::{
        errors::{DeliveryError, DomainError},
        models::{MessageId, MessageStatus},
        repositories::MessageRepository,
        value_objects::{CharLimit, MessageDraft},
    },
};

pub struct SendMessageConfig {
    pub char_limit: CharLimit,
    /// Budget for the webhook call on the request path.
    pub delivery_timeout: Duration,
}

impl Default for SendMessageConfig {
    fn default() -> Self {
        Self {
            char_limit: CharLimit(160),
            delivery_timeout: Duration::from_secs(15),
        }
    }
}

pub struct SendMessageRequest {
    pub recipient: String,
    pub content: String,
}

#[derive(Debug)]
pub struct SendMessageResponse {
    pub message_id: MessageId,
    pub remote_id: String,
}

/// Sends one message immediately, bypassing the scheduler.
///
/// The record is created straight in `processing`, so no scheduler claim can
/// pick it up while this request is delivering it.
pub struct SendMessageUseCase {
    repo: Arc<dyn MessageRepository>,
    client: Arc<dyn DeliveryClient>,
    recorder: Option<Arc<dyn SentRecorder>>,
    config: SendMessageConfig,
}

impl SendMessageUseCase {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        client: Arc<dyn DeliveryClient>,
        recorder: Option<Arc<dyn SentRecorder>>,
        config: SendMessageConfig,
    ) -> Self {
        Self {
            repo,
            client,
            recorder,
            config,
        }
    }

    pub async fn execute(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, DomainError> {
        let draft = MessageDraft::new(request.recipient, request.content, self.config.char_limit)?;

        let message = self
            .repo
            .create(&draft.recipient, &draft.content, MessageStatus::Processing)
            .await?;

        let delivery = tokio::time::timeout(
            self.config.delivery_timeout,
            self.client.deliver(&message),
        )
        .await
        .unwrap_or_else(|_| {
            Err(DeliveryError::Timeout {
                timeout_seconds: self.config.delivery_timeout.as_secs(),
            })
        });

        let receipt = match delivery {
            Ok(receipt) => receipt,
            Err(err) => {
                match self
                    .repo
                    .mark_failed(message.id, &err.failure_reason())
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        message_id = message.id,
                        "message is no longer processing, failure not recorded"
                    ),
                    Err(store_err) => {
                        warn!(message_id = message.id, error = %store_err, "mark failed error");
                    }
                }
                return Err(err.into());
            }
        };

        let sent_at = Utc::now();
        match self
            .repo
            .mark_sent(message.id, &receipt.remote_id, sent_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                message_id = message.id,
                remote_id = %receipt.remote_id,
                "delivered, but message is no longer processing; sent status not recorded"
            ),
            Err(err) => warn!(message_id = message.id, error = %err, "mark sent error"),
        }
        record_sent_detached(self.recorder.as_ref(), &receipt.remote_id, sent_at);
        info!(
            message_id = message.id,
            remote_id = %receipt.remote_id,
            status = receipt.status,
            "sent directly"
        );
        debug!(message_id = message.id, body = %receipt.body, "webhook response");

        Ok(SendMessageResponse {
            message_id: message.id,
            remote_id: receipt.remote_id,
        })
    }
}
