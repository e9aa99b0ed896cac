//! In-memory gateway and LLM doubles for pipeline tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{GatewayError, LlmError};
use crate::gmail::{DraftRef, FullMessage, Header, Label, MailGateway, MessageMetadata, MessageRef};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, Role};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub message_id: Option<String>,
    pub references: Option<String>,
    pub snippet: String,
    pub body: String,
    pub label_ids: HashSet<String>,
}

impl FakeMessage {
    pub fn new(id: &str, from: &str, subject: &str) -> Self {
        Self {
            id: id.into(),
            thread_id: format!("t-{id}"),
            from: from.into(),
            reply_to: None,
            subject: subject.into(),
            message_id: Some(format!("<{id}@mail>")),
            references: None,
            snippet: format!("snippet for {id}"),
            body: format!("body of {id}"),
            label_ids: HashSet::new(),
        }
    }

    fn headers(&self) -> Vec<Header> {
        let mut headers = vec![
            Header::new("From", &self.from),
            Header::new("Subject", &self.subject),
        ];
        if let Some(reply_to) = &self.reply_to {
            headers.push(Header::new("Reply-To", reply_to));
        }
        if let Some(message_id) = &self.message_id {
            headers.push(Header::new("Message-ID", message_id));
        }
        if let Some(references) = &self.references {
            headers.push(Header::new("References", references));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct CreatedDraft {
    pub draft_id: String,
    pub thread_id: String,
    pub raw: String,
}

#[derive(Default)]
struct State {
    messages: Vec<FakeMessage>,
    labels: Vec<Label>,
    drafts: Vec<CreatedDraft>,
    fail_auth: bool,
    fail_search: bool,
    fail_list_labels: bool,
    fail_profile: bool,
    fail_metadata: HashSet<String>,
    fail_full: HashSet<String>,
    fail_draft_threads: HashSet<String>,
    fail_apply: HashSet<String>,
    last_search_limit: Option<u32>,
    create_label_calls: usize,
    race_label_creation: bool,
}

/// Mailbox double. Search honors `-label:<name>` exclusion like the provider.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<State>,
}

fn provider_error(operation: &str) -> GatewayError {
    GatewayError::Provider {
        operation: operation.into(),
        status: 500,
        body: "injected failure".into(),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, message: FakeMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(Label {
            id: id.into(),
            name: name.into(),
        });
    }

    pub fn fail_auth(&self) {
        self.state.lock().unwrap().fail_auth = true;
    }

    pub fn fail_search(&self) {
        self.state.lock().unwrap().fail_search = true;
    }

    pub fn fail_list_labels(&self) {
        self.state.lock().unwrap().fail_list_labels = true;
    }

    pub fn fail_profile(&self) {
        self.state.lock().unwrap().fail_profile = true;
    }

    /// Another writer creates the label just before our create call lands.
    pub fn race_label_creation(&self) {
        self.state.lock().unwrap().race_label_creation = true;
    }

    pub fn fail_metadata_for(&self, id: &str) {
        self.state.lock().unwrap().fail_metadata.insert(id.into());
    }

    pub fn fail_full_for(&self, id: &str) {
        self.state.lock().unwrap().fail_full.insert(id.into());
    }

    /// Fail draft creation for the thread of message `id`.
    pub fn fail_draft_for(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_draft_threads
            .insert(format!("t-{id}"));
    }

    pub fn fail_apply_for(&self, id: &str) {
        self.state.lock().unwrap().fail_apply.insert(id.into());
    }

    pub fn drafts(&self) -> Vec<CreatedDraft> {
        self.state.lock().unwrap().drafts.clone()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn last_search_limit(&self) -> Option<u32> {
        self.state.lock().unwrap().last_search_limit
    }

    pub fn create_label_calls(&self) -> usize {
        self.state.lock().unwrap().create_label_calls
    }

    pub fn has_label(&self, message_id: &str, label_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .any(|m| m.id == message_id && m.label_ids.contains(label_id))
    }
}

#[async_trait]
impl MailGateway for FakeGateway {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        if self.state.lock().unwrap().fail_auth {
            return Err(GatewayError::Auth(crate::error::AuthError::Rejected {
                status: 400,
                reason: "invalid_grant".into(),
            }));
        }
        Ok(())
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.last_search_limit = Some(max_results);
        if state.fail_search {
            return Err(provider_error("messages.list"));
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
            .filter(|m| m.label_ids.is_disjoint(&excluded))
            .take(max_results as usize)
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_metadata(
        &self,
        id: &str,
        _header_names: &[&str],
    ) -> Result<MessageMetadata, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_metadata.contains(id) {
            return Err(provider_error("messages.get"));
        }
        let message = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| provider_error("messages.get"))?;

        Ok(MessageMetadata {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            snippet: message.snippet.clone(),
            internal_date: None,
            headers: message.headers(),
        })
    }

    async fn get_full(&self, id: &str) -> Result<FullMessage, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_full.contains(id) {
            return Err(provider_error("messages.get"));
        }
        let message = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| provider_error("messages.get"))?;

        Ok(FullMessage {
            metadata: MessageMetadata {
                id: message.id.clone(),
                thread_id: message.thread_id.clone(),
                snippet: message.snippet.clone(),
                internal_date: None,
                headers: message.headers(),
            },
            body_text: message.body.clone(),
        })
    }

    async fn sender_address(&self) -> Result<String, GatewayError> {
        if self.state.lock().unwrap().fail_profile {
            return Err(provider_error("users.getProfile"));
        }
        Ok("me@example.com".into())
    }

    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<DraftRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_draft_threads.contains(thread_id) {
            return Err(provider_error("drafts.create"));
        }
        let n = state.drafts.len() + 1;
        let draft = CreatedDraft {
            draft_id: format!("d{n}"),
            thread_id: thread_id.into(),
            raw: String::from_utf8_lossy(raw).into_owned(),
        };
        state.drafts.push(draft);
        Ok(DraftRef {
            draft_id: format!("d{n}"),
            message_id: format!("dm{n}"),
        })
    }

    async fn list_labels(&self) -> Result<Vec<Label>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_list_labels {
            return Err(provider_error("labels.list"));
        }
        Ok(state.labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.create_label_calls += 1;
        if std::mem::take(&mut state.race_label_creation) {
            let id = format!("Label_{}", state.labels.len() + 1);
            state.labels.push(Label {
                id,
                name: name.into(),
            });
        }
        if state.labels.iter().any(|l| l.name == name) {
            return Err(GatewayError::Provider {
                operation: "labels.create".into(),
                status: 409,
                body: "Label name exists or conflicts".into(),
            });
        }
        let label = Label {
            id: format!("Label_{}", state.labels.len() + 1),
            name: name.into(),
        };
        state.labels.push(label.clone());
        Ok(label)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_apply.contains(message_id) {
            return Err(provider_error("messages.modify"));
        }
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| provider_error("messages.modify"))?;
        message.label_ids.insert(label_id.into());
        Ok(())
    }
}

/// LLM double that answers by matching substrings of the user prompt.
pub struct ScriptedLlm {
    default_reply: String,
    rules: Vec<(String, Result<String, String>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            default_reply: text.into(),
            rules: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// When the user prompt contains `needle`, answer with `reply`.
    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.into(), Ok(reply.into())));
        self
    }

    /// When the user prompt contains `needle`, fail the call.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.rules.push((needle.into(), Err("connection reset".into())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt.clone());

        let outcome = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| Ok(self.default_reply.clone()));

        match outcome {
            Ok(content) => Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
            }),
            Err(reason) => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason,
            }),
        }
    }
}
