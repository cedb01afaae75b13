//! Construction of forwarded messages.

use async_trait::async_trait;

use super::types::{EmailBody, OutboundEmail, ParsedEmail, NO_SUBJECT};
use crate::Result;

/// Text shown in place of a summary until a real summarizer is plugged in.
pub const PLACEHOLDER_SUMMARY: &str = "A summary of this message is not available yet.";

const UNKNOWN_SENDER: &str = "(Unknown Sender)";

/// Produces a short summary of a message body.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Summarizer that always returns [`PLACEHOLDER_SUMMARY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSummarizer;

#[async_trait]
impl Summarizer for PlaceholderSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String> {
        Ok(PLACEHOLDER_SUMMARY.to_string())
    }
}

/// Builds the message sent to the primary address.
#[derive(Debug, Clone)]
pub struct ForwardBuilder {
    service_name: String,
    from: String,
}

impl ForwardBuilder {
    /// Create a builder. `from` is the outbound sender identity.
    pub fn new(service_name: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            from: from.into(),
        }
    }

    /// `"[{service}] {subject}"`, with a placeholder for a missing subject.
    pub fn build_subject(&self, original: Option<&str>) -> String {
        format!("[{}] {}", self.service_name, original.unwrap_or(NO_SUBJECT))
    }

    /// Plain-text body: summary banner, forwarded headers, original text.
    pub fn build_text_body(&self, parsed: &ParsedEmail, summary: &str) -> String {
        let mut body = String::new();

        body.push_str("========== Summary ==========\n");
        body.push_str(summary);
        body.push_str("\n=============================\n\n");

        body.push_str("---------- Forwarded Message ----------\n");
        body.push_str(&format!("From: {}\n", sender(parsed)));
        body.push_str(&format!("To: {}\n", recipient(parsed)));
        if !parsed.cc.is_empty() {
            body.push_str(&format!("CC: {}\n", parsed.cc.join(", ")));
        }
        body.push_str(&format!("Subject: {}\n", parsed.subject_or_default()));
        body.push_str("---------------------------------------\n\n");

        body.push_str(parsed.text_body.as_deref().unwrap_or(""));
        body
    }

    /// HTML body: the same sections as styled blocks, with the original
    /// HTML embedded unchanged.
    pub fn build_html_body(&self, parsed: &ParsedEmail, summary: &str) -> String {
        let mut html = String::new();

        html.push_str(
            "<div style=\"background-color: #f0f9f0; border-left: 4px solid #4caf50; \
             padding: 12px 16px; margin-bottom: 16px;\">\n",
        );
        html.push_str("<strong>Summary</strong>\n");
        html.push_str(&format!(
            "<p style=\"white-space: pre-wrap; margin: 8px 0 0 0;\">{}</p>\n",
            escape_html(summary)
        ));
        html.push_str("</div>\n");

        html.push_str(
            "<div style=\"color: #555555; font-size: 13px; border-bottom: 1px solid #dddddd; \
             padding-bottom: 8px; margin-bottom: 16px;\">\n",
        );
        html.push_str("<strong>---------- Forwarded Message ----------</strong><br>\n");
        html.push_str(&format!("From: {}<br>\n", escape_html(sender(parsed))));
        html.push_str(&format!("To: {}<br>\n", escape_html(&recipient(parsed))));
        if !parsed.cc.is_empty() {
            html.push_str(&format!("CC: {}<br>\n", escape_html(&parsed.cc.join(", "))));
        }
        html.push_str(&format!(
            "Subject: {}\n",
            escape_html(parsed.subject_or_default())
        ));
        html.push_str("</div>\n");

        html.push_str("<div>\n");
        html.push_str(parsed.html_body.as_deref().unwrap_or(""));
        html.push_str("\n</div>\n");
        html
    }

    /// Assemble the outbound message for `primary_email`.
    ///
    /// An HTML part is added only when the original message had one.
    pub fn build(&self, parsed: &ParsedEmail, summary: &str, primary_email: &str) -> OutboundEmail {
        let text = self.build_text_body(parsed, summary);
        let body = match parsed.html_body {
            Some(_) => EmailBody::Mixed {
                text,
                html: self.build_html_body(parsed, summary),
            },
            None => EmailBody::Text(text),
        };

        OutboundEmail::new(
            self.from.clone(),
            primary_email,
            self.build_subject(parsed.subject.as_deref()),
            body,
        )
    }
}

fn sender(parsed: &ParsedEmail) -> &str {
    parsed.from.as_deref().unwrap_or(UNKNOWN_SENDER)
}

/// The relay address the message was delivered to, else the To header.
fn recipient(parsed: &ParsedEmail) -> String {
    match &parsed.original_recipient {
        Some(relay) => relay.clone(),
        None => parsed.to.join(", "),
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
