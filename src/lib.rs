//! Scheduled and on-demand delivery of queued messages to a provider
//! webhook, with every message's lifecycle kept in storage for auditing.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
