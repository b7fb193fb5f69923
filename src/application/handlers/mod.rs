pub mod message_dispatcher;
pub mod scheduler;
