//! Reply decision: ask the model whether a candidate deserves a reply, and
//! if so, for the reply text.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Candidate, Decision};

/// Exact model output meaning "no reply needed".
pub const NO_REPLY_SENTINEL: &str = "NO_REPLY";

/// Body excerpts longer than this are cut before prompting.
pub const BODY_EXCERPT_CHARS: usize = 1500;

const DECISION_MAX_TOKENS: u32 = 512;

const DECISION_TEMPERATURE: f32 = 0.3;

/// Decides per candidate between a reply and [`Decision::NoReplyNeeded`].
pub struct ReplyDecisionEngine {
    llm: Option<Arc<dyn LlmProvider>>,
    signature: String,
}

impl ReplyDecisionEngine {
    /// `llm` is `None` when no completion credential is configured; sweeps
    /// then fail before selecting candidates.
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, signature: impl Into<String>) -> Self {
        Self {
            llm,
            signature: signature.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Decide for one candidate. Never fails: a failed or unusable
    /// completion is logged and treated as no reply.
    pub async fn decide(&self, candidate: &Candidate, body: Option<&str>) -> Decision {
        match self.try_decide(candidate, body).await {
            Ok(decision) => {
                debug!(id = %candidate.id, decision = decision.label(), "Reply decided");
                decision
            }
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "Decision failed, skipping candidate");
                Decision::NoReplyNeeded
            }
        }
    }

    /// Decide for one candidate, surfacing completion errors.
    pub async fn try_decide(
        &self,
        candidate: &Candidate,
        body: Option<&str>,
    ) -> Result<Decision, LlmError> {
        let llm = self.llm.as_ref().ok_or(LlmError::NotConfigured)?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(build_user_prompt(candidate, body)),
        ])
        .with_temperature(DECISION_TEMPERATURE)
        .with_max_tokens(DECISION_MAX_TOKENS);

        let response = llm.complete(request).await?;
        debug!(
            id = %candidate.id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Decision completed"
        );

        Ok(parse_decision(&response.content))
    }

    fn system_prompt(&self) -> String {
        format!(
            "You draft email replies on behalf of the mailbox owner.\n\
             \n\
             Rules:\n\
             - Be concise and professional.\n\
             - If the request is ambiguous, ask exactly one clarifying question.\n\
             - Never reveal or hint that the reply was written automatically.\n\
             - Do not promise anything or state facts you cannot verify from the message.\n\
             - End the reply with this exact signature line: {signature}\n\
             \n\
             If the message does not need a reply (newsletters, notifications, \
             automated mail, FYIs, or anything already resolved), respond with \
             exactly {sentinel} and nothing else.\n\
             \n\
             Otherwise respond with only the reply body. No subject line, no greeting \
             placeholders, no commentary.",
            signature = self.signature,
            sentinel = NO_REPLY_SENTINEL,
        )
    }
}

/// Interpret raw model output.
pub fn parse_decision(output: &str) -> Decision {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == NO_REPLY_SENTINEL {
        Decision::NoReplyNeeded
    } else {
        Decision::Reply(trimmed.to_string())
    }
}

/// The per-candidate prompt: sender, subject, snippet, optional body excerpt.
pub fn build_user_prompt(candidate: &Candidate, body: Option<&str>) -> String {
    let mut prompt = format!(
        "From: {}\nSubject: {}\nSnippet: {}",
        candidate.from_address, candidate.subject, candidate.snippet
    );

    if let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) {
        let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        prompt.push_str("\n\nBody excerpt:\n");
        prompt.push_str(&excerpt);
        if body.chars().count() > BODY_EXCERPT_CHARS {
            prompt.push_str("\n[...]");
        }
    }
    prompt
}
