//! Mail gateway: the thin call surface over the mail provider.
//!
//! The pipeline only talks to [`MailGateway`]. [`GmailClient`] is the
//! production implementation over the Gmail REST API.

pub mod client;
pub mod message;

pub use client::GmailClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::GatewayError;

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// A single message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Headers and snippet of a message.
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: String,
    pub snippet: String,
    /// Provider receive time, if reported.
    pub internal_date: Option<DateTime<Utc>>,
    pub headers: Vec<Header>,
}

impl MessageMetadata {
    /// First header with the given name (case-insensitive), trimmed.
    /// Blank values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Headers, snippet and readable body of a message.
#[derive(Debug, Clone, Default)]
pub struct FullMessage {
    pub metadata: MessageMetadata,
    pub body_text: String,
}

/// A created draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRef {
    pub draft_id: String,
    /// Id of the message backing the draft.
    pub message_id: String,
}

/// A provider label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Operations the sweep consumes from the mail provider.
///
/// Every call may fail with a transient network or provider error; callers
/// must not assume success.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Make sure a usable access token is available.
    async fn authenticate(&self) -> Result<(), GatewayError>;

    /// Search messages, returning at most `max_results` hits in provider order.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GatewayError>;

    /// Fetch the snippet and the named headers of a message.
    async fn get_metadata(
        &self,
        id: &str,
        header_names: &[&str],
    ) -> Result<MessageMetadata, GatewayError>;

    /// Fetch headers, snippet and body of a message.
    async fn get_full(&self, id: &str) -> Result<FullMessage, GatewayError>;

    /// Address of the authenticated mailbox.
    async fn sender_address(&self) -> Result<String, GatewayError>;

    /// Create an unsent draft from a raw RFC822 message in the given thread.
    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<DraftRef, GatewayError>;

    async fn list_labels(&self) -> Result<Vec<Label>, GatewayError>;

    async fn create_label(&self, name: &str) -> Result<Label, GatewayError>;

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), GatewayError>;
}
