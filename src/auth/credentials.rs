//! Credential store: owns the refresh credential and the cached access token.
//!
//! The store never talks to the network. The mail gateway performs the
//! refresh exchange and hands the result back via [`CredentialStore::record_grant`],
//! which is the only way the cached access token changes.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::AuthError;

/// Access tokens expiring within this window are treated as expired.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Current credential snapshot.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Short-lived access token, absent until the first exchange.
    pub access_token: Option<SecretString>,
    /// Long-lived refresh token.
    pub refresh_token: SecretString,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    fn from_refresh_token(refresh_token: SecretString) -> Self {
        Self {
            access_token: None,
            refresh_token,
            expires_at: None,
        }
    }

    /// The cached access token, if it is still usable at `now`.
    pub fn fresh_access_token(&self, now: DateTime<Utc>) -> Option<&SecretString> {
        let token = self.access_token.as_ref()?;
        let expires_at = self.expires_at?;
        (now < expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS)).then_some(token)
    }
}

/// Result of a successful refresh exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Lifetime of the access token in seconds.
    pub expires_in_secs: i64,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<SecretString>,
}

/// Holds the refresh credential for the lifetime of the process.
///
/// Passed by `Arc` into every component that needs authentication.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Create an empty store. Every request fails `Unauthenticated` until a
    /// refresh token is installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a refresh token from configuration.
    pub fn with_refresh_token(refresh_token: Option<SecretString>) -> Self {
        let credential = refresh_token
            .filter(|t| !t.expose_secret().trim().is_empty())
            .map(Credential::from_refresh_token);
        Self {
            inner: RwLock::new(credential),
        }
    }

    /// Install a freshly obtained refresh token. It is authoritative from now
    /// on, and any cached access token is discarded.
    pub async fn install_refresh_token(
        &self,
        refresh_token: SecretString,
    ) -> Result<(), AuthError> {
        if refresh_token.expose_secret().trim().is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        *self.inner.write().await = Some(Credential::from_refresh_token(refresh_token));
        info!("Refresh credential installed");
        Ok(())
    }

    /// Whether a refresh credential is present.
    pub async fn is_configured(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Return the current credential, or `Unauthenticated` if none was ever
    /// configured.
    pub async fn ensure_valid_credential(&self) -> Result<Credential, AuthError> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or(AuthError::Unauthenticated)
    }

    /// Record the outcome of a successful refresh exchange.
    pub async fn record_grant(&self, grant: TokenGrant) -> Result<Credential, AuthError> {
        let mut guard = self.inner.write().await;
        let credential = guard.as_mut().ok_or(AuthError::Unauthenticated)?;

        credential.access_token = Some(grant.access_token);
        credential.expires_at = Some(Utc::now() + Duration::seconds(grant.expires_in_secs.max(0)));
        if let Some(rotated) = grant.refresh_token {
            debug!("Refresh token rotated by provider");
            credential.refresh_token = rotated;
        }

        Ok(credential.clone())
    }
}
