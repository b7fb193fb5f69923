use std::sync::Arc;

use crate::domain::{errors::StorageError, models::Message, repositories::MessageRepository};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

pub struct ListSentMessagesUseCase {
    repo: Arc<dyn MessageRepository>,
}

impl ListSentMessagesUseCase {
    pub fn new(repo: Arc<dyn MessageRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, limit: Option<u32>) -> Result<Vec<Message>, StorageError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.repo.list_sent(limit).await
    }
}
