//! The sweep pipeline.
//!
//! Every sweep flows through:
//! 1. `CandidateSelector::select_candidates()`: triage query plus metadata
//! 2. `ReplyDecisionEngine::decide()`: LLM reply or `NO_REPLY`
//! 3. `compose()`: threaded RFC 822 reply
//! 4. `MailGateway::create_draft()`: unsent draft in the original thread
//! 5. `ProcessedStateTracker::mark_processed()`: marker label
//!
//! **Nothing is ever sent.** Replies only ever land as drafts.

pub mod composer;
pub mod decision;
pub mod orchestrator;
pub mod scheduler;
pub mod selector;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod fakes;

pub use orchestrator::{SweepContext, Sweeper};
pub use types::{Candidate, CandidateStage, Decision, DraftedMessage, SweepOutcome};
