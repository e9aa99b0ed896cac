//! Error types for inbox-sweep.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Credential lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No refresh credential configured")]
    Unauthenticated,

    #[error("Token exchange failed: {reason}")]
    ExchangeFailed { reason: String },

    #[error("Token endpoint rejected the refresh credential ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Invalid token response: {reason}")]
    InvalidResponse { reason: String },
}

/// Mail provider errors. Any gateway call may fail with one of these.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{operation} request failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("{operation} returned HTTP {status}: {body}")]
    Provider {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl GatewayError {
    /// HTTP status returned by the provider, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("No decision engine configured")]
    NotConfigured,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reply composition errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Original message has neither Reply-To nor From")]
    MissingRecipient,

    #[error("Reply text is empty")]
    EmptyBody,

    #[error("Invalid recipient address {address:?}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),
}

/// Failure of a single candidate. Recovered locally by the sweep.
#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    #[error("Body fetch failed: {0}")]
    BodyFetch(#[source] GatewayError),

    #[error("Compose failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("Draft creation failed: {0}")]
    DraftCreate(#[source] GatewayError),

    #[error("Marking processed failed: {0}")]
    MarkProcessed(#[source] GatewayError),
}

impl CandidateError {
    /// Pipeline stage the failure happened in, for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::BodyFetch(_) => "fetch_body",
            Self::Compose(_) => "compose",
            Self::DraftCreate(_) => "create_draft",
            Self::MarkProcessed(_) => "mark_processed",
        }
    }
}

/// Sweep-level failures. Each one aborts the whole sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Missing configuration: {key}")]
    ConfigurationMissing { key: String },

    #[error("Candidate fetch failed: {0}")]
    CandidateFetchFailed(#[source] GatewayError),

    #[error("Processed marker unavailable: {0}")]
    MarkerUnavailable(#[source] GatewayError),

    #[error("Sender address unavailable: {0}")]
    SenderUnavailable(#[source] GatewayError),

    #[error("A sweep is already running")]
    AlreadyRunning,
}

impl SweepError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::CandidateFetchFailed(_) => "candidate_fetch_failed",
            Self::MarkerUnavailable(_) => "marker_unavailable",
            Self::SenderUnavailable(_) => "sender_unavailable",
            Self::AlreadyRunning => "sweep_in_progress",
        }
    }
}
