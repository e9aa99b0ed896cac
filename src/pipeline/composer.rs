//! Thread-aware reply composition.
//!
//! A reply is threaded two ways: by RFC 5322 headers (`In-Reply-To`,
//! `References`) for mail clients, and by the provider's own thread id,
//! which travels beside the raw message to the draft-create call.

use lettre::message::{Mailbox, SinglePart};
use lettre::{Address, Message};

use crate::error::ComposeError;
use crate::pipeline::types::Candidate;

/// A reply ready to be serialized and drafted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadedReply {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub body: String,
    /// Provider thread the draft belongs to.
    pub thread_id: String,
}

/// Build a threaded reply from `from` to `candidate` carrying `reply_text`.
pub fn compose(
    candidate: &Candidate,
    reply_text: &str,
    from: &Mailbox,
) -> Result<ThreadedReply, ComposeError> {
    let destination = candidate
        .reply_destination()
        .ok_or(ComposeError::MissingRecipient)?;
    if reply_text.trim().is_empty() {
        return Err(ComposeError::EmptyBody);
    }
    let to = recipient_mailbox(destination)?;

    let (in_reply_to, references) = match candidate.threading.message_id.as_deref() {
        Some(message_id) => (
            Some(message_id.to_string()),
            Some(references_chain(
                candidate.threading.references.as_deref(),
                message_id,
            )),
        ),
        None => (None, None),
    };

    Ok(ThreadedReply {
        from: from.clone(),
        to,
        subject: reply_subject(&candidate.subject),
        in_reply_to,
        references,
        body: format!("{reply_text}\n"),
        thread_id: candidate.thread_id.clone(),
    })
}

/// Prefix `Re: ` unless the subject already starts with `re:` in any case.
pub fn reply_subject(original: &str) -> String {
    let trimmed = original.trim();
    let already_reply = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));

    if already_reply {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        "Re:".to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

/// Original `References` with the original `Message-ID` appended.
pub fn references_chain(original: Option<&str>, message_id: &str) -> String {
    match original.map(str::trim).filter(|r| !r.is_empty()) {
        Some(existing) => format!("{existing} {message_id}"),
        None => message_id.to_string(),
    }
}

/// Parse a `From`/`Reply-To` value into a mailbox.
///
/// Falls back to splitting `Name <addr>` by hand for display names the
/// strict parser rejects, such as unquoted UTF-8.
fn recipient_mailbox(value: &str) -> Result<Mailbox, ComposeError> {
    let value = sanitize_header(value);
    if let Ok(mailbox) = value.parse::<Mailbox>() {
        return Ok(mailbox);
    }

    let (name, address) = match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => (
            value[..open].trim().trim_matches('"').trim(),
            &value[open + 1..close],
        ),
        _ => ("", value.as_str()),
    };
    let email = address
        .trim()
        .parse::<Address>()
        .map_err(|e| ComposeError::InvalidRecipient {
            address: value.clone(),
            reason: e.to_string(),
        })?;
    Ok(Mailbox::new(
        (!name.is_empty()).then(|| name.to_string()),
        email,
    ))
}

impl ThreadedReply {
    /// Serialize to RFC 5322 bytes: a single `text/plain; charset=utf-8`
    /// part with `MIME-Version: 1.0`. Non-ASCII headers are encoded and
    /// long headers folded.
    pub fn to_rfc822(&self) -> Result<Vec<u8>, ComposeError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(sanitize_header(&self.subject));
        if let Some(in_reply_to) = &self.in_reply_to {
            builder = builder.in_reply_to(sanitize_header(in_reply_to));
        }
        if let Some(references) = &self.references {
            builder = builder.references(sanitize_header(references));
        }

        let message = builder
            .singlepart(SinglePart::plain(self.body.clone()))
            .map_err(|e| ComposeError::Build(e.to_string()))?;
        Ok(message.formatted())
    }
}

/// Header values must stay on one logical line.
fn sanitize_header(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
