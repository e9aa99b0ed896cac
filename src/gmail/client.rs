//! Gmail REST client.
//!
//! Every request carries a bearer token obtained from the shared
//! [`CredentialStore`]. When the cached access token is missing or about to
//! expire, the client performs the refresh exchange and records the grant.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::message::{decode_raw, encode_raw, parse_message};
use super::{DraftRef, FullMessage, Header, Label, MailGateway, MessageMetadata, MessageRef};
use crate::auth::{CredentialStore, OAuthClient};
use crate::error::{AuthError, GatewayError};

/// Gmail API root for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Provider error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 300;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<WireMessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessageRef {
    id: String,
    #[serde(default)]
    thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    /// Milliseconds since the epoch, as a decimal string.
    internal_date: Option<String>,
    payload: Option<WirePayload>,
    raw: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePayload {
    #[serde(default)]
    headers: Vec<WireHeader>,
}

#[derive(Debug, Deserialize)]
struct WireHeader {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProfile {
    email_address: String,
}

#[derive(Debug, Serialize)]
struct CreateDraftRequest<'a> {
    message: DraftMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftMessage<'a> {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WireDraft {
    id: String,
    message: Option<WireMessageRef>,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<WireLabel>,
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'a str,
    message_list_visibility: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyMessageRequest<'a> {
    add_label_ids: [&'a str; 1],
}

impl From<WireMessageRef> for MessageRef {
    fn from(wire: WireMessageRef) -> Self {
        Self {
            id: wire.id,
            thread_id: wire.thread_id,
        }
    }
}

impl From<WireLabel> for Label {
    fn from(wire: WireLabel) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
        }
    }
}

fn parse_internal_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw?.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn metadata_from_wire(wire: WireMessage) -> MessageMetadata {
    let internal_date = parse_internal_date(wire.internal_date.as_deref());
    let headers = wire
        .payload
        .unwrap_or_default()
        .headers
        .into_iter()
        .map(|h| Header::new(h.name, h.value))
        .collect();

    MessageMetadata {
        id: wire.id,
        thread_id: wire.thread_id,
        snippet: wire.snippet,
        internal_date,
        headers,
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

// ── Client ──────────────────────────────────────────────────────────

/// [`MailGateway`] over the Gmail v1 REST API.
pub struct GmailClient {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    oauth: OAuthClient,
}

impl GmailClient {
    pub fn new(credentials: Arc<CredentialStore>, oauth: OAuthClient) -> Self {
        Self::with_base_url(credentials, oauth, GMAIL_API_BASE)
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(
        credentials: Arc<CredentialStore>,
        oauth: OAuthClient,
        base_url: &str,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            oauth,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// A usable access token, refreshing through the token endpoint when the
    /// cached one is missing or stale.
    async fn access_token(&self) -> Result<SecretString, GatewayError> {
        let credential = self.credentials.ensure_valid_credential().await?;
        if let Some(token) = credential.fresh_access_token(Utc::now()) {
            return Ok(token.clone());
        }

        let grant = self.oauth.refresh(&credential.refresh_token).await?;
        let refreshed = self.credentials.record_grant(grant).await?;
        info!("Access token refreshed");

        refreshed.access_token.ok_or_else(|| {
            GatewayError::Auth(AuthError::InvalidResponse {
                reason: "no access token after refresh".into(),
            })
        })
    }

    /// Send an authorized request and decode the JSON response body.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let token = self.access_token().await?;

        let response = request
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                operation: operation.to_string(),
                reason: format!("failed to read response: {e}"),
            })?;

        if !status.is_success() {
            return Err(GatewayError::Provider {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse {
            operation: operation.to_string(),
            reason: format!("JSON parse error: {e}"),
        })
    }
}

#[async_trait]
impl MailGateway for GmailClient {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        self.access_token().await.map(|_| ())
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GatewayError> {
        debug!(query = %query, max_results, "Searching messages");
        let max = max_results.to_string();
        let request = self
            .http
            .get(self.url("messages"))
            .query(&[("q", query), ("maxResults", max.as_str())]);

        let response: ListMessagesResponse = self.send("messages.list", request).await?;
        Ok(response.messages.into_iter().map(MessageRef::from).collect())
    }

    async fn get_metadata(
        &self,
        id: &str,
        header_names: &[&str],
    ) -> Result<MessageMetadata, GatewayError> {
        let mut params: Vec<(&str, &str)> = vec![("format", "metadata")];
        params.extend(header_names.iter().map(|name| ("metadataHeaders", *name)));

        let request = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .query(&params);

        let wire: WireMessage = self.send("messages.get", request).await?;
        Ok(metadata_from_wire(wire))
    }

    async fn get_full(&self, id: &str) -> Result<FullMessage, GatewayError> {
        let request = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .query(&[("format", "raw")]);

        let mut wire: WireMessage = self.send("messages.get", request).await?;
        let encoded = wire.raw.take().ok_or_else(|| GatewayError::InvalidResponse {
            operation: "messages.get".into(),
            reason: "raw payload missing".into(),
        })?;
        let raw = decode_raw(&encoded).map_err(|e| GatewayError::InvalidResponse {
            operation: "messages.get".into(),
            reason: format!("raw payload is not base64url: {e}"),
        })?;

        let parsed = parse_message(&raw).unwrap_or_default();
        let mut metadata = metadata_from_wire(wire);
        metadata.headers = parsed.headers;

        Ok(FullMessage {
            metadata,
            body_text: parsed.body_text,
        })
    }

    async fn sender_address(&self) -> Result<String, GatewayError> {
        let request = self.http.get(self.url("profile"));
        let profile: WireProfile = self.send("users.getProfile", request).await?;
        Ok(profile.email_address)
    }

    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<DraftRef, GatewayError> {
        let body = CreateDraftRequest {
            message: DraftMessage {
                raw: encode_raw(raw),
                thread_id: Some(thread_id).filter(|t| !t.is_empty()),
            },
        };
        let request = self.http.post(self.url("drafts")).json(&body);

        let draft: WireDraft = self.send("drafts.create", request).await?;
        Ok(DraftRef {
            draft_id: draft.id,
            message_id: draft.message.map(|m| m.id).unwrap_or_default(),
        })
    }

    async fn list_labels(&self) -> Result<Vec<Label>, GatewayError> {
        let request = self.http.get(self.url("labels"));
        let response: ListLabelsResponse = self.send("labels.list", request).await?;
        Ok(response.labels.into_iter().map(Label::from).collect())
    }

    async fn create_label(&self, name: &str) -> Result<Label, GatewayError> {
        let body = CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        };
        let request = self.http.post(self.url("labels")).json(&body);

        let label: WireLabel = self.send("labels.create", request).await?;
        info!(label_id = %label.id, name = %label.name, "Label created");
        Ok(label.into())
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), GatewayError> {
        let body = ModifyMessageRequest {
            add_label_ids: [label_id],
        };
        let request = self
            .http
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&body);

        let _: IgnoredAny = self.send("messages.modify", request).await?;
        Ok(())
    }
}
