//! Bridges a rig-core completion model to [`LlmProvider`].

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message};

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};
use crate::error::LlmError;

/// Wraps any rig completion model behind the crate's provider trait.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let turns = split_turns(self.provider, request.messages)?;

        let mut builder = self
            .model
            .completion_request(turns.prompt)
            .messages(turns.history);
        if let Some(preamble) = turns.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(self.provider, &e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

/// A chat transcript in rig's shape: preamble, prior turns, final prompt.
struct Turns {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

fn split_turns(provider: &str, messages: Vec<ChatMessage>) -> Result<Turns, LlmError> {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            _ => rest.push(message),
        }
    }

    let last = rest.pop().filter(|m| m.role == Role::User).ok_or_else(|| {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: "request must end with a user message".into(),
        }
    })?;

    let history = rest
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content),
            _ => Message::user(m.content),
        })
        .collect();

    Ok(Turns {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history,
        prompt: Message::user(last.content),
    })
}

fn classify_error(provider: &str, error: &CompletionError) -> LlmError {
    classify_failure(provider, &error.to_string())
}

/// Map a rig failure message onto the crate's error kinds.
fn classify_failure(provider: &str, message: &str) -> LlmError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lowered.contains("401")
        || lowered.contains("403")
        || lowered.contains("api key")
        || lowered.contains("api-key")
        || lowered.contains("unauthorized")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: message.chars().take(200).collect(),
        }
    }
}
