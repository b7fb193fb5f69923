use crate::domain::errors::DomainError;

/// Upper bound on message length, counted in characters. Zero disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharLimit(pub usize);

impl CharLimit {
    pub fn is_exceeded_by(&self, text: &str) -> bool {
        self.0 > 0 && text.chars().count() > self.0
    }
}

/// A message request that passed input validation.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub recipient: String,
    pub content: String,
}

impl MessageDraft {
    pub fn new(recipient: String, content: String, limit: CharLimit) -> Result<Self, DomainError> {
        if recipient.trim().is_empty() || content.trim().is_empty() {
            return Err(DomainError::Validation(
                "missing 'to' or 'content'".to_string(),
            ));
        }
        if limit.is_exceeded_by(&recipient) {
            return Err(DomainError::Validation(
                "recipient exceeds character limit".to_string(),
            ));
        }
        if limit.is_exceeded_by(&content) {
            return Err(DomainError::Validation(
                "content exceeds character limit".to_string(),
            ));
        }
        Ok(Self { recipient, content })
    }
}
