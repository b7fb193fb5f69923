use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation timed out")]
    Timeout,
    #[error("storage failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Failure of a single webhook delivery attempt.
///
/// Variants that saw an HTTP response keep its status and raw body so the
/// failure can be recorded on the message verbatim.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timeout after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },
    #[error("unexpected status: {status}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("decode error: {reason}")]
    MalformedResponse {
        status: u16,
        body: String,
        reason: String,
    },
    #[error("empty messageId in response")]
    MissingMessageId { status: u16, body: String },
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::UnexpectedStatus { status, .. }
            | DeliveryError::MalformedResponse { status, .. }
            | DeliveryError::MissingMessageId { status, .. } => Some(*status),
            DeliveryError::Transport(_) | DeliveryError::Timeout { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            DeliveryError::UnexpectedStatus { body, .. }
            | DeliveryError::MalformedResponse { body, .. }
            | DeliveryError::MissingMessageId { body, .. } => Some(body),
            DeliveryError::Transport(_) | DeliveryError::Timeout { .. } => None,
        }
    }

    /// Text recorded as `last_error`: the remote body when it says anything,
    /// otherwise the error itself.
    pub fn failure_reason(&self) -> String {
        match self.body().map(str::trim) {
            Some(body) if !body.is_empty() => body.to_string(),
            _ => self.to_string(),
        }
    }
}
