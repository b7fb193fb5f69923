use poem_openapi::Enum;

use crate::domain::models::MessageStatus;

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[oai(rename_all = "lowercase")]
pub enum MessageStatusDto {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl From<MessageStatus> for MessageStatusDto {
    fn from(value: MessageStatus) -> Self {
        match value {
            MessageStatus::Pending => MessageStatusDto::Pending,
            MessageStatus::Processing => MessageStatusDto::Processing,
            MessageStatus::Sent => MessageStatusDto::Sent,
            MessageStatus::Failed => MessageStatusDto::Failed,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[oai(rename_all = "lowercase")]
pub enum SchedulerStateDto {
    Started,
    Stopped,
}
