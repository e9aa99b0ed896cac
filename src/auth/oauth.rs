//! Refresh-token exchange against an OAuth2 token endpoint.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::credentials::TokenGrant;
use crate::error::AuthError;

/// Google OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth2 client credentials plus the token endpoint to exchange against.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self::with_token_url(client_id, client_secret, GOOGLE_TOKEN_URL)
    }

    /// Use a custom token endpoint (tests, alternate providers).
    pub fn with_token_url(
        client_id: impl Into<String>,
        client_secret: SecretString,
        token_url: &str,
    ) -> Self {
        Self {
            http: Client::new(),
            token_url: token_url.to_string(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError> {
        debug!(token_url = %self.token_url, "Refreshing access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::ExchangeFailed {
            reason: format!("failed to read token response: {e}"),
        })?;

        if !status.is_success() {
            let reason = describe_token_error(&body);
            warn!(status = status.as_u16(), reason = %reason, "Token refresh rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        parse_token_response(&body)
    }
}

/// Parse a successful token endpoint body into a [`TokenGrant`].
fn parse_token_response(body: &str) -> Result<TokenGrant, AuthError> {
    let payload: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse {
            reason: format!("JSON parse error: {e}"),
        })?;

    let access_token = payload
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse {
            reason: "missing access_token".into(),
        })?;

    Ok(TokenGrant {
        access_token: SecretString::from(access_token),
        expires_in_secs: payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        refresh_token: payload
            .refresh_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from),
    })
}

/// Best-effort human-readable reason from an error body.
fn describe_token_error(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => err
            .error_description
            .or(err.error)
            .unwrap_or_else(|| "unknown error".into()),
        Err(_) => body.chars().take(200).collect(),
    }
}
