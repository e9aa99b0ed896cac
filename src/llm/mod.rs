//! LLM integration for the reply decision.
//!
//! Supports:
//! - **Anthropic**: via rig-core's Anthropic client
//! - **OpenAI**: via rig-core's OpenAI client
//!
//! Both backends sit behind the [`LlmProvider`] trait so the decision engine
//! never sees provider types.

pub mod provider;
pub mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Parse a backend name (`openai`, `anthropic`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::NotConfigured);
    }

    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;
    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "anthropic")))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;
    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_anthropic_provider() {
        // rig-core clients accept any string as API key at construction time
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn test_blank_model_is_not_configured() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: SecretString::from("sk-test"),
            model: "  ".to_string(),
        };
        assert!(matches!(
            create_provider(&config),
            Err(LlmError::NotConfigured)
        ));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(LlmBackend::parse("OpenAI"), Some(LlmBackend::OpenAi));
        assert_eq!(LlmBackend::parse(" anthropic "), Some(LlmBackend::Anthropic));
        assert_eq!(LlmBackend::parse("gemini"), None);
    }
}
