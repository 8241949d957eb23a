use google_gmail1::api::{Message, MessagePart, Thread};
use regex::Regex;

lazy_static::lazy_static!(
    static ref RE_EMAIL_ADDRESS: Regex = Regex::new(r"[\w\.-]+@[\w\.-]+\.\w+").unwrap();
);

/// Threading identifiers needed to send a reply that lands in the same
/// conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplyHeaders {
    pub thread_id: String,
    /// Raw Message-ID header value of the inbound message, empty when absent.
    pub message_id: String,
}

/// A normalized inbound message, built fresh each poll cycle and discarded
/// once the orchestration loop is done with it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender_address: String,
    pub body: String,
    /// Body of the first message in the thread, populated only when this
    /// message is the second in its thread and the first was sent by our own
    /// mailbox identity.
    pub prior_context_body: Option<String>,
    pub reply: ReplyHeaders,
}

/// Case-insensitive header lookup on a FULL-format message payload.
pub fn header_value<'a>(msg: &'a Message, name: &str) -> Option<&'a str> {
    msg.payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .and_then(|h| h.value.as_deref())
}

/// Pulls the text/plain body out of a message, concatenating the decoded
/// content of every plain-text part in encounter order. Returns None when no
/// plain-text representation exists anywhere in the part tree; that is the
/// caller's skip condition, not an error.
pub fn extract_plain_text_body(msg: &Message) -> Option<String> {
    let payload = msg.payload.as_ref()?;
    let mut body = String::new();
    collect_plain_text(payload, &mut body);

    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

fn collect_plain_text(part: &MessagePart, out: &mut String) {
    if let Some(parts) = part.parts.as_ref() {
        for child in parts {
            collect_plain_text(child, out);
        }
        return;
    }

    if part.mime_type.as_deref() == Some("text/plain") {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            out.push_str(&String::from_utf8_lossy(data));
        }
    }
}

/// Extracts the sender address from the From header: the first
/// email-address-shaped substring, falling back to the trimmed raw header.
pub fn extract_sender_address(msg: &Message) -> String {
    let from = header_value(msg, "From").unwrap_or_default();
    RE_EMAIL_ADDRESS
        .find(from)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| from.trim().to_string())
}

/// 1-based position of a message within its thread, by identifier match.
pub fn thread_position(thread: &Thread, message_id: &str) -> Option<usize> {
    thread
        .messages
        .as_ref()?
        .iter()
        .position(|m| m.id.as_deref() == Some(message_id))
        .map(|idx| idx + 1)
}
