//! Configuration, read from the environment.
//!
//! [`AppConfig::from_env`] delegates to [`AppConfig::from_lookup`], which
//! takes any key lookup so tests never touch the process environment.
//! Blank values count as unset.

use std::path::PathBuf;

use cron::Schedule;
use lettre::message::Mailbox;
use secrecy::SecretString;

use crate::auth::oauth::GOOGLE_TOKEN_URL;
use crate::error::ConfigError;
use crate::gmail::client::GMAIL_API_BASE;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::scheduler::parse_schedule;
use crate::pipeline::selector::clamp_max_results;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_RESULTS: i64 = 10;
pub const DEFAULT_SIGNATURE: &str = "\u{2014} Nathan";

/// OAuth client and mailbox endpoints.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Absent until supplied; sweeps fail `Unauthenticated` without it.
    pub refresh_token: Option<SecretString>,
    pub token_url: String,
    pub api_base: String,
}

/// Sweep behavior and trigger surfaces.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Shared bearer secret. The HTTP trigger is disabled without it.
    pub trigger_secret: Option<SecretString>,
    pub port: u16,
    /// Used when a caller does not pass `max`. Already clamped.
    pub default_max_results: i64,
    pub schedule: Option<Schedule>,
    pub include_body: bool,
    pub signature: String,
    /// Draft `From`. The mailbox's own address is looked up when unset.
    pub sender: Option<Mailbox>,
    pub log_dir: Option<PathBuf>,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub google: GoogleConfig,
    /// `None` when no completion credential is set.
    pub llm: Option<LlmConfig>,
    pub sweep: SweepConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let google = GoogleConfig {
            client_id: get("GOOGLE_CLIENT_ID")
                .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".into()))?,
            client_secret: get("GOOGLE_CLIENT_SECRET")
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_CLIENT_SECRET".into()))?,
            refresh_token: get("GOOGLE_REFRESH_TOKEN").map(SecretString::from),
            token_url: get("GOOGLE_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            api_base: get("GMAIL_API_BASE").unwrap_or_else(|| GMAIL_API_BASE.to_string()),
        };

        let llm = resolve_llm(&get)?;

        let port = match get("SWEEP_PORT") {
            Some(raw) => parse_number::<u16>("SWEEP_PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let default_max_results = match get("SWEEP_MAX_RESULTS") {
            Some(raw) => parse_number::<i64>("SWEEP_MAX_RESULTS", &raw)?,
            None => DEFAULT_MAX_RESULTS,
        };
        let include_body = match get("SWEEP_INCLUDE_BODY") {
            Some(raw) => parse_flag("SWEEP_INCLUDE_BODY", &raw)?,
            None => false,
        };
        let sender = get("SWEEP_FROM_ADDRESS")
            .map(|raw| {
                raw.parse::<Mailbox>().map_err(|e| ConfigError::InvalidValue {
                    key: "SWEEP_FROM_ADDRESS".into(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let sweep = SweepConfig {
            trigger_secret: get("SWEEP_TRIGGER_SECRET").map(SecretString::from),
            port,
            default_max_results: i64::from(clamp_max_results(default_max_results)),
            schedule: get("SWEEP_SCHEDULE")
                .map(|expr| parse_schedule(&expr))
                .transpose()?,
            include_body,
            signature: get("REPLY_SIGNATURE").unwrap_or_else(|| DEFAULT_SIGNATURE.to_string()),
            sender,
            log_dir: get("SWEEP_LOG_DIR").map(PathBuf::from),
        };

        Ok(Self { google, llm, sweep })
    }
}

/// Pick the completion backend. An explicit `SWEEP_LLM_BACKEND` wins;
/// otherwise the first backend with a key set (OpenAI, then Anthropic).
fn resolve_llm(get: &impl Fn(&str) -> Option<String>) -> Result<Option<LlmConfig>, ConfigError> {
    let backend = match get("SWEEP_LLM_BACKEND") {
        Some(raw) => Some(LlmBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "SWEEP_LLM_BACKEND".into(),
            message: format!("unknown backend {raw:?}, expected openai or anthropic"),
        })?),
        None if get("OPENAI_API_KEY").is_some() => Some(LlmBackend::OpenAi),
        None if get("ANTHROPIC_API_KEY").is_some() => Some(LlmBackend::Anthropic),
        None => None,
    };
    let Some(backend) = backend else {
        return Ok(None);
    };

    let key_var = match backend {
        LlmBackend::OpenAi => "OPENAI_API_KEY",
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
    };
    let Some(api_key) = get(key_var) else {
        return Ok(None);
    };

    Ok(Some(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model: get("SWEEP_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
    }))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{raw:?} is not a boolean"),
        }),
    }
}
