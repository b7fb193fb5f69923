use crate::{domain::models::Message, presentation::http::responses::MessageDto};

pub fn map_message(message: &Message) -> MessageDto {
    MessageDto {
        id: message.id,
        to: message.recipient.clone(),
        content: message.content.clone(),
        status: message.status.into(),
        created_at: message.created_at.to_rfc3339(),
        updated_at: message.updated_at.to_rfc3339(),
        sent_at: message.sent_at.map(|at| at.to_rfc3339()),
        remote_message_id: message.remote_message_id.clone(),
        last_error: message.last_error.clone(),
    }
}
