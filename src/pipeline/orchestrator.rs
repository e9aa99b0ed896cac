//! Sweep orchestration.
//!
//! A sweep resolves the credential, the marker label and the sender mailbox,
//! selects candidates, then walks each candidate through its stages one at
//! a time:
//!
//! ```text
//! Selected → Decided ─┬─ NoReplyNeeded (done)
//!                     └─ Reply → Composed → Drafted → Marked (done)
//! ```
//!
//! A failed stage abandons that candidate only. It stays unmarked, so the
//! next sweep picks it up again.

use std::sync::Arc;

use lettre::message::Mailbox;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::auth::CredentialStore;
use crate::error::{CandidateError, GatewayError, SweepError};
use crate::gmail::{DraftRef, MailGateway};
use crate::pipeline::composer::compose;
use crate::pipeline::decision::ReplyDecisionEngine;
use crate::pipeline::selector::CandidateSelector;
use crate::pipeline::tracker::ProcessedStateTracker;
use crate::pipeline::types::{Candidate, CandidateStage, Decision, DraftedMessage, SweepOutcome};

/// Environment keys that configure the decision engine.
const DECISION_CREDENTIAL_KEYS: &str = "OPENAI_API_KEY or ANTHROPIC_API_KEY";

/// Values resolved once per sweep and shared by every candidate.
#[derive(Debug, Clone)]
pub struct SweepContext {
    pub label_id: String,
    pub sender: Mailbox,
}

/// Runs sweeps. One sweep at a time per process.
pub struct Sweeper {
    credentials: Arc<CredentialStore>,
    gateway: Arc<dyn MailGateway>,
    selector: CandidateSelector,
    decision: ReplyDecisionEngine,
    tracker: ProcessedStateTracker,
    include_body: bool,
    sender: Option<Mailbox>,
    running: Mutex<()>,
}

impl Sweeper {
    pub fn new(
        credentials: Arc<CredentialStore>,
        gateway: Arc<dyn MailGateway>,
        decision: ReplyDecisionEngine,
    ) -> Self {
        Self {
            credentials,
            selector: CandidateSelector::new(gateway.clone()),
            tracker: ProcessedStateTracker::new(gateway.clone()),
            gateway,
            decision,
            include_body: false,
            sender: None,
            running: Mutex::new(()),
        }
    }

    /// Fetch each candidate's body and add an excerpt to the decision prompt.
    pub fn with_body_excerpts(mut self, include_body: bool) -> Self {
        self.include_body = include_body;
        self
    }

    /// Draft replies from this mailbox instead of the account's own address.
    pub fn with_sender(mut self, sender: Option<Mailbox>) -> Self {
        self.sender = sender;
        self
    }

    /// Run one sweep over at most `max_results` candidates (clamped to [1, 25]).
    ///
    /// Sweep-level failures return immediately. Per-candidate failures are
    /// logged and leave the candidate out of the outcome.
    pub async fn run_sweep(&self, max_results: i64) -> Result<SweepOutcome, SweepError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SweepError::AlreadyRunning)?;

        let sweep_id = Uuid::new_v4();
        self.sweep(sweep_id, max_results)
            .instrument(info_span!("sweep", %sweep_id))
            .await
    }

    async fn sweep(&self, sweep_id: Uuid, max_results: i64) -> Result<SweepOutcome, SweepError> {
        let context = self.prepare().await?;

        let candidates = self
            .selector
            .select_candidates(max_results)
            .await
            .map_err(SweepError::CandidateFetchFailed)?;
        info!(count = candidates.len(), "Candidates selected");

        let mut drafted = Vec::new();
        for candidate in &candidates {
            match self.process_candidate(candidate, &context).await {
                Ok(Some(draft)) => drafted.push(DraftedMessage {
                    message_id: candidate.id.clone(),
                    draft_id: draft.draft_id,
                }),
                Ok(None) => debug!(id = %candidate.id, "No reply needed"),
                Err(e) => warn!(
                    id = %candidate.id,
                    stage = e.stage(),
                    error = %e,
                    "Candidate skipped"
                ),
            }
        }

        info!(
            candidates = candidates.len(),
            drafted = drafted.len(),
            "Sweep complete"
        );
        Ok(SweepOutcome {
            sweep_id,
            candidates: candidates.len(),
            drafted,
        })
    }

    /// Resolve everything a sweep needs before touching candidates.
    pub async fn prepare(&self) -> Result<SweepContext, SweepError> {
        self.credentials
            .ensure_valid_credential()
            .await
            .map_err(|e| SweepError::Unauthenticated(e.to_string()))?;

        if !self.decision.is_configured() {
            return Err(SweepError::ConfigurationMissing {
                key: DECISION_CREDENTIAL_KEYS.into(),
            });
        }

        self.gateway
            .authenticate()
            .await
            .map_err(|e| SweepError::Unauthenticated(e.to_string()))?;

        let label_id = self
            .tracker
            .ensure_marker_label()
            .await
            .map_err(SweepError::MarkerUnavailable)?;

        let sender = self
            .resolve_sender()
            .await
            .map_err(SweepError::SenderUnavailable)?;
        debug!(sender = %sender, "Sender resolved");

        Ok(SweepContext { label_id, sender })
    }

    async fn resolve_sender(&self) -> Result<Mailbox, GatewayError> {
        if let Some(sender) = &self.sender {
            return Ok(sender.clone());
        }
        let address = self.gateway.sender_address().await?;
        address
            .parse::<Mailbox>()
            .map_err(|e| GatewayError::InvalidResponse {
                operation: "users.getProfile".into(),
                reason: format!("unusable address {address:?}: {e}"),
            })
    }

    /// Drive one candidate to a terminal stage.
    ///
    /// Returns the draft if the candidate ended `Marked`, `None` if no reply
    /// was needed.
    async fn process_candidate(
        &self,
        candidate: &Candidate,
        context: &SweepContext,
    ) -> Result<Option<DraftRef>, CandidateError> {
        let mut stage = CandidateStage::Selected;
        while !stage.is_terminal() {
            stage = self.advance(candidate, context, stage).await?;
        }

        Ok(match stage {
            CandidateStage::Marked(draft) => Some(draft),
            _ => None,
        })
    }

    /// Perform exactly one stage transition.
    ///
    /// Terminal stages are returned unchanged.
    pub async fn advance(
        &self,
        candidate: &Candidate,
        context: &SweepContext,
        stage: CandidateStage,
    ) -> Result<CandidateStage, CandidateError> {
        let next = match stage {
            CandidateStage::Selected => {
                let body = self.fetch_body(candidate).await?;
                CandidateStage::Decided(self.decision.decide(candidate, body.as_deref()).await)
            }
            CandidateStage::Decided(Decision::Reply(text)) => {
                CandidateStage::Composed(compose(candidate, &text, &context.sender)?)
            }
            CandidateStage::Composed(reply) => {
                let raw = reply.to_rfc822()?;
                let draft = self
                    .gateway
                    .create_draft(&raw, &reply.thread_id)
                    .await
                    .map_err(CandidateError::DraftCreate)?;
                info!(id = %candidate.id, draft_id = %draft.draft_id, "Draft created");
                CandidateStage::Drafted(draft)
            }
            CandidateStage::Drafted(draft) => {
                self.tracker
                    .mark_processed(&candidate.id, &context.label_id)
                    .await
                    .map_err(CandidateError::MarkProcessed)?;
                CandidateStage::Marked(draft)
            }
            terminal @ (CandidateStage::Decided(Decision::NoReplyNeeded)
            | CandidateStage::Marked(_)) => terminal,
        };
        Ok(next)
    }

    async fn fetch_body(&self, candidate: &Candidate) -> Result<Option<String>, CandidateError> {
        if !self.include_body {
            return Ok(None);
        }
        let full = self
            .gateway
            .get_full(&candidate.id)
            .await
            .map_err(CandidateError::BodyFetch)?;
        Ok(Some(full.body_text))
    }
}
