pub mod list_sent_messages;
pub mod send_message;
