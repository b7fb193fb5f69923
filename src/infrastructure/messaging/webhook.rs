use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    application::services::delivery::{DeliveryClient, DeliveryReceipt},
    domain::{errors::DeliveryError, models::Message},
};

pub const AUTH_HEADER: &str = "x-ins-auth-key";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub url: String,
    pub auth_key: Option<String>,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>, auth_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            auth_key: auth_key.filter(|key| !key.is_empty()),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Posts messages to the provider webhook. Only `202 Accepted` with a
/// non-empty `messageId` counts as delivered.
pub struct WebhookClient {
    http: Client,
    config: WebhookConfig,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Arc<Self>> {
        let http = Client::builder()
            .user_agent("message-dispatch/webhook")
            .timeout(config.timeout)
            .build()
            .context("failed to build webhook client")?;
        Ok(Arc::new(Self { http, config }))
    }

    fn transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout {
                timeout_seconds: self.config.timeout.as_secs(),
            }
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl DeliveryClient for WebhookClient {
    async fn deliver(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        let mut request = self.http.post(&self.config.url).json(&WebhookRequest {
            to: &message.recipient,
            content: &message.content,
        });
        if let Some(key) = &self.config.auth_key {
            request = request.header(AUTH_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();
        // An unreadable body is recorded as empty; the status still decides.
        let body = response.text().await.unwrap_or_default();

        if status != StatusCode::ACCEPTED {
            return Err(DeliveryError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: WebhookResponse = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(err) => {
                return Err(DeliveryError::MalformedResponse {
                    status: status.as_u16(),
                    body,
                    reason: err.to_string(),
                });
            }
        };
        if payload.message_id.trim().is_empty() {
            return Err(DeliveryError::MissingMessageId {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            message_id = message.id,
            remote_id = %payload.message_id,
            remote_message = %payload.message,
            "webhook accepted message"
        );
        Ok(DeliveryReceipt {
            remote_id: payload.message_id,
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    to: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    message: String,
    #[serde(rename = "messageId", default)]
    message_id: String,
}
