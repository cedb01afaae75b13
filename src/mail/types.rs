//! Mail data types.

use serde::{Deserialize, Serialize};

/// Placeholder used wherever a message has no subject.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Normalized view of one inbound message.
///
/// Built once per notification record and discarded after dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEmail {
    /// Message-ID header, if present.
    pub message_id: Option<String>,
    /// First address of the From header.
    pub from: Option<String>,
    /// To addresses, in header order.
    pub to: Vec<String>,
    /// Cc addresses, in header order.
    pub cc: Vec<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// First text/plain part.
    pub text_body: Option<String>,
    /// First text/html part.
    pub html_body: Option<String>,
    /// Relay address the message was delivered to. Set by the ingestion
    /// processor, never by the parser.
    pub original_recipient: Option<String>,
}

impl ParsedEmail {
    /// Subject or the `(No Subject)` placeholder.
    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or(NO_SUBJECT)
    }

    /// Set the relay address the message was delivered to.
    pub fn with_original_recipient(mut self, relay_address: impl Into<String>) -> Self {
        self.original_recipient = Some(relay_address.into());
        self
    }
}

/// The body content of an outbound email.
///
/// Forwarded mail always carries a text part, so there is no HTML-only form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailBody {
    /// Plain text only.
    Text(String),
    /// Both plain text and HTML.
    Mixed { text: String, html: String },
}

impl EmailBody {
    /// Plain-text part.
    pub fn text(&self) -> &str {
        match self {
            EmailBody::Text(text) | EmailBody::Mixed { text, .. } => text,
        }
    }

    /// HTML part, if any.
    pub fn html(&self) -> Option<&str> {
        match self {
            EmailBody::Mixed { html, .. } => Some(html),
            EmailBody::Text(_) => None,
        }
    }
}

/// A message ready for the outbound transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    /// Sender identity.
    pub from: String,
    /// Recipients.
    pub destination: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: EmailBody,
}

impl OutboundEmail {
    /// Create a message for a single recipient.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: EmailBody,
    ) -> Self {
        Self {
            from: from.into(),
            destination: vec![to.into()],
            subject: subject.into(),
            body,
        }
    }
}
