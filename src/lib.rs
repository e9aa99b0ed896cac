//! Inbox sweep: drafts threaded replies to unread mail, never sends.

pub mod auth;
pub mod config;
pub mod error;
pub mod gmail;
pub mod llm;
pub mod pipeline;
pub mod server;
