use async_trait::async_trait;

use crate::domain::{errors::DeliveryError, models::Message};

/// What the webhook returned for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub remote_id: String,
    pub status: u16,
    pub body: String,
}

/// Hands a single message to the downstream provider. One call is exactly
/// one attempt; retrying is never the client's business.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError>;
}
