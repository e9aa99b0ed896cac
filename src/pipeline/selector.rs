//! Candidate selection.
//!
//! One search with a fixed triage query, then one metadata fetch per hit.
//! Already-processed messages are excluded by the query itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::gmail::message::decode_html_entities;
use crate::gmail::{MailGateway, MessageMetadata, MessageRef};
use crate::pipeline::tracker::PROCESSED_LABEL;
use crate::pipeline::types::{Candidate, ThreadingHeaders};

pub const MIN_RESULTS: u32 = 1;
pub const MAX_RESULTS_LIMIT: u32 = 25;

/// Sender local parts that never get a reply.
pub const NO_REPLY_SENDERS: &[&str] = &["noreply", "no-reply", "donotreply", "do-not-reply"];

/// Subject keywords that mark automated mail.
pub const JUNK_SUBJECT_KEYWORDS: &[&str] = &["receipt", "invoice", "confirmation", "unsubscribe"];

/// Headers fetched for every candidate.
pub const METADATA_HEADERS: &[&str] = &[
    "From",
    "Reply-To",
    "Subject",
    "Date",
    "Message-ID",
    "References",
];

/// Clamp a caller-supplied limit into `[1, 25]`.
pub fn clamp_max_results(requested: i64) -> u32 {
    requested.clamp(i64::from(MIN_RESULTS), i64::from(MAX_RESULTS_LIMIT)) as u32
}

/// The fixed triage query.
pub fn build_query() -> String {
    format!(
        "is:unread category:primary -label:{} -from:({}) -subject:({})",
        PROCESSED_LABEL,
        NO_REPLY_SENDERS.join(" OR "),
        JUNK_SUBJECT_KEYWORDS.join(" OR "),
    )
}

/// Turns search hits into candidate snapshots.
pub struct CandidateSelector {
    gateway: Arc<dyn MailGateway>,
}

impl CandidateSelector {
    pub fn new(gateway: Arc<dyn MailGateway>) -> Self {
        Self { gateway }
    }

    /// Select up to `max_results` candidates in provider order.
    ///
    /// Only a failed search is an error. A hit whose metadata cannot be
    /// fetched is dropped and logged.
    pub async fn select_candidates(
        &self,
        max_results: i64,
    ) -> Result<Vec<Candidate>, GatewayError> {
        let limit = clamp_max_results(max_results);
        let query = build_query();

        let hits = self.gateway.search(&query, limit).await?;
        debug!(hits = hits.len(), limit, "Search returned");

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().take(limit as usize) {
            match self.gateway.get_metadata(&hit.id, METADATA_HEADERS).await {
                Ok(metadata) => candidates.push(candidate_from_metadata(&hit, metadata)),
                Err(e) => warn!(id = %hit.id, error = %e, "Metadata fetch failed, dropping hit"),
            }
        }
        Ok(candidates)
    }
}

/// Build a candidate snapshot from a search hit and its metadata.
pub fn candidate_from_metadata(hit: &MessageRef, metadata: MessageMetadata) -> Candidate {
    let owned = |name: &str| metadata.header(name).map(str::to_string);

    let thread_id = if metadata.thread_id.is_empty() {
        hit.thread_id.clone()
    } else {
        metadata.thread_id.clone()
    };
    let date_received = metadata
        .header("Date")
        .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
        .map(|d| d.with_timezone(&Utc))
        .or(metadata.internal_date);

    Candidate {
        id: hit.id.clone(),
        thread_id,
        snippet: decode_html_entities(&metadata.snippet),
        from_address: owned("From").unwrap_or_default(),
        subject: owned("Subject").unwrap_or_default(),
        date_received,
        threading: ThreadingHeaders {
            reply_to: owned("Reply-To"),
            message_id: owned("Message-ID"),
            references: owned("References"),
        },
    }
}
