//! HTTP trigger surface.
//!
//! `GET /health` is open. `/api/sweep` requires `Authorization: Bearer <secret>`
//! and is rejected before any sweep logic runs when the secret is wrong.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::SweepError;
use crate::pipeline::{SweepOutcome, Sweeper};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sweeper: Arc<Sweeper>,
    /// Shared bearer secret for `/api/sweep`.
    pub trigger_secret: SecretString,
    /// `max` used when the caller omits it.
    pub default_max: i64,
}

#[derive(Debug, Deserialize)]
pub struct SweepParams {
    max: Option<String>,
}

/// Build the router with health and sweep routes.
pub fn sweep_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sweep", get(trigger_sweep).post(trigger_sweep))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "inbox-sweep",
    }))
}

async fn trigger_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SweepParams>,
) -> Response {
    if !is_authorized(&headers, &state.trigger_secret) {
        warn!("Sweep trigger rejected: bad or missing bearer token");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        );
    }

    let max = match params.max.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        None => state.default_max,
        Some(raw) => match parse_max(raw) {
            Some(max) => max,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_max",
                    &format!("max must be an integer, got {raw:?}"),
                );
            }
        },
    };

    let result = state.sweeper.run_sweep(max).await;
    match &result {
        Ok(outcome) => info!(
            sweep_id = %outcome.sweep_id,
            drafted = outcome.drafted.len(),
            "Sweep triggered over HTTP"
        ),
        Err(e) => warn!(code = e.code(), error = %e, "Sweep failed"),
    }
    let (status, body) = sweep_report(&result);
    (status, Json(body)).into_response()
}

/// Status and JSON body reporting a sweep result. Shared by the HTTP
/// trigger and the one-shot command.
pub fn sweep_report(result: &Result<SweepOutcome, SweepError>) -> (StatusCode, Value) {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            json!({
                "ok": true,
                "sweepId": outcome.sweep_id,
                "candidates": outcome.candidates,
                "drafted": outcome.drafted,
            }),
        ),
        Err(e) => (status_for(e), error_body(e.code(), &e.to_string())),
    }
}

fn error_body(code: &str, message: &str) -> Value {
    json!({
        "ok": false,
        "error": code,
        "message": message,
    })
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(error_body(code, message))).into_response()
}

/// HTTP status for a sweep-level failure.
pub fn status_for(error: &SweepError) -> StatusCode {
    match error {
        SweepError::Unauthenticated(_) | SweepError::ConfigurationMissing { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SweepError::CandidateFetchFailed(_)
        | SweepError::MarkerUnavailable(_)
        | SweepError::SenderUnavailable(_) => StatusCode::BAD_GATEWAY,
        SweepError::AlreadyRunning => StatusCode::CONFLICT,
    }
}

fn is_authorized(headers: &HeaderMap, secret: &SecretString) -> bool {
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let expected = format!("Bearer {}", secret.expose_secret());
    constant_time_eq(provided, &expected)
}

/// Compare without returning early on the first mismatch.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = u64::try_from(a.len() ^ b.len()).unwrap_or(u64::MAX);
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= u64::from(x ^ y);
    }
    diff == 0
}

/// Parse `max`. Integers beyond `i64` saturate; they get clamped later anyway.
fn parse_max(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let all_digits = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    all_digits.then_some(if negative { i64::MIN } else { i64::MAX })
}
