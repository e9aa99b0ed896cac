//! Shared types for the sweep pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::gmail::DraftRef;
use crate::pipeline::composer::ThreadedReply;

// ── Candidate ───────────────────────────────────────────────────────

/// Original headers the composer needs to thread a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadingHeaders {
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub references: Option<String>,
}

/// An unread, not-yet-processed message eligible for a reply.
///
/// Snapshot taken at selection time. Never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub thread_id: String,
    /// Entity-decoded provider snippet.
    pub snippet: String,
    pub from_address: String,
    pub subject: String,
    pub date_received: Option<DateTime<Utc>>,
    pub threading: ThreadingHeaders,
}

impl Candidate {
    /// Where a reply goes: Reply-To if present, else From.
    pub fn reply_destination(&self) -> Option<&str> {
        self.threading
            .reply_to
            .as_deref()
            .or(Some(self.from_address.as_str()))
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Outcome of the reply decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoReplyNeeded,
    /// Non-empty reply text.
    Reply(String),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::NoReplyNeeded => "no_reply",
            Decision::Reply(_) => "reply",
        }
    }
}

// ── Per-candidate state machine ─────────────────────────────────────

/// Where a candidate is in its sweep.
///
/// `Selected → Decided → Composed → Drafted → Marked`. `Decided(NoReplyNeeded)`
/// and `Marked` are terminal. A failed transition abandons the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateStage {
    Selected,
    Decided(Decision),
    Composed(ThreadedReply),
    Drafted(DraftRef),
    Marked(DraftRef),
}

impl CandidateStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateStage::Decided(Decision::NoReplyNeeded) | CandidateStage::Marked(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            CandidateStage::Selected => "selected",
            CandidateStage::Decided(_) => "decided",
            CandidateStage::Composed(_) => "composed",
            CandidateStage::Drafted(_) => "drafted",
            CandidateStage::Marked(_) => "marked",
        }
    }
}

// ── Sweep outcome ───────────────────────────────────────────────────

/// A candidate that was drafted and marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftedMessage {
    pub message_id: String,
    pub draft_id: String,
}

/// Result of one sweep. Only successfully drafted candidates are listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub sweep_id: Uuid,
    /// How many candidates were selected.
    pub candidates: usize,
    /// Drafted candidates, in selection order.
    pub drafted: Vec<DraftedMessage>,
}
