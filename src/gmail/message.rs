//! Raw message helpers for base64url payloads, header listing and plain-text
//! body extraction.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mail_parser::{Message, MessageParser, MimeHeaders};

use super::Header;

/// Encode raw RFC822 bytes the way the provider expects them.
pub fn encode_raw(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a base64url payload, with or without padding.
pub fn decode_raw(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(data.trim().trim_end_matches('='))
}

/// Headers and readable body of a raw message.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub headers: Vec<Header>,
    pub body_text: String,
}

/// Parse a raw RFC822 message once, keeping every header in wire order and
/// the readable body. Returns `None` if the bytes do not parse as a message.
pub fn parse_message(raw: &[u8]) -> Option<ParsedMessage> {
    let parsed = MessageParser::default().parse(raw)?;
    let headers = parsed
        .headers()
        .iter()
        .map(|h| {
            let value = raw
                .get(h.offset_start as usize..h.offset_end as usize)
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            Header::new(h.name.as_str(), unfold(&value))
        })
        .collect();

    Some(ParsedMessage {
        headers,
        body_text: body_text(&parsed),
    })
}

/// Join folded continuation lines into one.
fn unfold(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prefers the first `text/plain` body, then tag-stripped HTML, then any
/// textual attachment.
fn body_text(parsed: &Message<'_>) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    decode_html_entities(&result.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Decode the HTML entities the provider leaves in snippets
/// (`&#39;`, `&amp;`, `&quot;`, ...). Unknown entities are kept verbatim.
pub fn decode_html_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let decoded = after
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&after[..end]).map(|c| (c, end)));

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
