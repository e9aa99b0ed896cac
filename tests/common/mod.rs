//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use inbox_sweep::error::{GatewayError, LlmError};
use inbox_sweep::gmail::{
    DraftRef, FullMessage, Header, Label, MailGateway, MessageMetadata, MessageRef,
};
use inbox_sweep::llm::{CompletionRequest, CompletionResponse, LlmProvider};

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `app` on a random local port.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Stub LLM provider (no real API calls). Always answers the same text.
pub struct StubLlm {
    pub reply: String,
}

impl StubLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: self.reply.clone(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

struct StubMessage {
    id: String,
    from: String,
    subject: String,
    labels: HashSet<String>,
}

#[derive(Default)]
struct StubState {
    messages: Vec<StubMessage>,
    labels: Vec<Label>,
    drafts: usize,
    searches: usize,
    last_limit: Option<u32>,
    fail_search: bool,
}

/// In-memory mailbox. Search excludes messages carrying a `-label:` label.
#[derive(Default)]
pub struct StubMailbox {
    state: Mutex<StubState>,
}

fn injected(operation: &str) -> GatewayError {
    GatewayError::Provider {
        operation: operation.into(),
        status: 500,
        body: "injected failure".into(),
    }
}

impl StubMailbox {
    pub fn with_messages(ids: &[&str]) -> Self {
        let mailbox = Self::default();
        {
            let mut state = mailbox.state.lock().unwrap();
            for id in ids {
                state.messages.push(StubMessage {
                    id: id.to_string(),
                    from: format!("{id}@example.com"),
                    subject: format!("Question {id}"),
                    labels: HashSet::new(),
                });
            }
        }
        mailbox
    }

    pub fn fail_search(&self) {
        self.state.lock().unwrap().fail_search = true;
    }

    pub fn searches(&self) -> usize {
        self.state.lock().unwrap().searches
    }

    pub fn last_limit(&self) -> Option<u32> {
        self.state.lock().unwrap().last_limit
    }

    pub fn drafts(&self) -> usize {
        self.state.lock().unwrap().drafts
    }
}

#[async_trait]
impl MailGateway for StubMailbox {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.searches += 1;
        state.last_limit = Some(max_results);
        if state.fail_search {
            return Err(injected("messages.list"));
        }
        let excluded: HashSet<String> = state
            .labels
            .iter()
            .filter(|l| query.contains(&format!("-label:{}", l.name)))
            .map(|l| l.id.clone())
            .collect();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.labels.is_disjoint(&excluded))
            .take(max_results as usize)
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: format!("t-{}", m.id),
            })
            .collect())
    }

    async fn get_metadata(
        &self,
        id: &str,
        _header_names: &[&str],
    ) -> Result<MessageMetadata, GatewayError> {
        let state = self.state.lock().unwrap();
        let m = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| injected("messages.get"))?;
        Ok(MessageMetadata {
            id: m.id.clone(),
            thread_id: format!("t-{}", m.id),
            snippet: "Can we talk?".into(),
            internal_date: None,
            headers: vec![
                Header::new("From", &m.from),
                Header::new("Subject", &m.subject),
                Header::new("Message-ID", format!("<{}@mail>", m.id)),
            ],
        })
    }

    async fn get_full(&self, id: &str) -> Result<FullMessage, GatewayError> {
        let metadata = self.get_metadata(id, &[]).await?;
        Ok(FullMessage {
            metadata,
            body_text: "Can we talk tomorrow?".into(),
        })
    }

    async fn sender_address(&self) -> Result<String, GatewayError> {
        Ok("me@example.com".into())
    }

    async fn create_draft(&self, _raw: &[u8], _thread_id: &str) -> Result<DraftRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.drafts += 1;
        Ok(DraftRef {
            draft_id: format!("d{}", state.drafts),
            message_id: format!("dm{}", state.drafts),
        })
    }

    async fn list_labels(&self) -> Result<Vec<Label>, GatewayError> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let label = Label {
            id: format!("Label_{}", state.labels.len() + 1),
            name: name.into(),
        };
        state.labels.push(label.clone());
        Ok(label)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        let m = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| injected("messages.modify"))?;
        m.labels.insert(label_id.into());
        Ok(())
    }
}
