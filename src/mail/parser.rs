//! MIME decoding of inbound messages.

use mail_parser::{Address, MessageParser, MimeHeaders, PartType};

use super::types::ParsedEmail;
use crate::{RelayError, Result};

/// Maximum multipart nesting followed while looking for bodies.
const MAX_PART_DEPTH: usize = 16;

/// Decode a raw RFC 5322 message.
///
/// Bodies come from a depth-first walk of the part tree: the first
/// `text/plain` part becomes the text body and the first `text/html` part
/// the HTML body. A single-part message yields only a text body. Nested
/// messages and binary parts are skipped.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::EmailFetchOrParseFailed(
            "message is empty".to_string(),
        ));
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| RelayError::EmailFetchOrParseFailed("invalid MIME message".to_string()))?;

    let mut email = ParsedEmail {
        message_id: message.message_id().map(str::to_string),
        from: address_list(message.from()).into_iter().next(),
        to: address_list(message.to()),
        cc: address_list(message.cc()),
        subject: message.subject().map(str::to_string),
        ..ParsedEmail::default()
    };

    match message.parts.first().map(|part| &part.body) {
        Some(PartType::Multipart(_)) => {
            let mut bodies = Bodies::default();
            bodies.collect(&message, 0, 0);
            email.text_body = bodies.text;
            email.html_body = bodies.html;
        }
        Some(PartType::Text(text)) | Some(PartType::Html(text)) => {
            email.text_body = Some(text.to_string());
        }
        _ => {}
    }

    Ok(email)
}

#[derive(Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
}

impl Bodies {
    fn collect(&mut self, message: &mail_parser::Message<'_>, part_id: usize, depth: usize) {
        if depth > MAX_PART_DEPTH || (self.text.is_some() && self.html.is_some()) {
            return;
        }
        let Some(part) = message.parts.get(part_id) else {
            return;
        };

        match &part.body {
            PartType::Multipart(children) => {
                for &child in children {
                    self.collect(message, child, depth + 1);
                }
            }
            PartType::Text(contents) | PartType::Html(contents) => {
                match mime_subtype(part).as_deref() {
                    Some("plain") if self.text.is_none() => {
                        self.text = Some(contents.to_string());
                    }
                    Some("html") if self.html.is_none() => {
                        self.html = Some(contents.to_string());
                    }
                    _ => {}
                }
            }
            // Binary parts and attached messages are not forwarded.
            _ => {}
        }
    }
}

/// Subtype of a `text/*` part, lowercased. Parts without a Content-Type
/// default to `text/plain`.
fn mime_subtype(part: &mail_parser::MessagePart<'_>) -> Option<String> {
    match part.content_type() {
        Some(ct) if ct.ctype().eq_ignore_ascii_case("text") => {
            Some(ct.subtype().unwrap_or("plain").to_ascii_lowercase())
        }
        Some(_) => None,
        None => Some("plain".to_string()),
    }
}

/// Flatten an address header into bare addresses, groups included.
fn address_list(address: Option<&Address<'_>>) -> Vec<String> {
    let Some(address) = address else {
        return Vec::new();
    };

    let addrs: Vec<&mail_parser::Addr<'_>> = match address {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    };

    addrs
        .into_iter()
        .filter_map(|addr| addr.address.as_deref())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Alice <alice@example.com>\r\n\
To: shop@relay.test, Bob <bob@example.com>\r\n\
Cc: carol@example.com\r\n\
Subject: Order shipped\r\n\
Message-ID: <abc123@example.com>\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Your order is on its way.\r\n";

    const ALTERNATIVE: &str = "From: news@example.com\r\n\
To: shop@relay.test\r\n\
Subject: Weekly\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain version\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html version</p>\r\n\
--b1--\r\n";

    const NESTED: &str = "From: news@example.com\r\n\
To: shop@relay.test\r\n\
Subject: With attachment\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
first plain\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<b>first html</b>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer\r\n\
Content-Type: text/plain\r\n\
\r\n\
second plain\r\n\
--outer--\r\n";

    const HTML_ONLY: &str = "From: promo@example.com\r\n\
To: shop@relay.test\r\n\
Subject: Sale\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b2\"\r\n\
\r\n\
--b2\r\n\
Content-Type: text/html\r\n\
\r\n\
<h1>Sale</h1>\r\n\
--b2--\r\n";

    #[test]
    fn test_parse_plain_headers() {
        let email = parse_email(PLAIN.as_bytes()).unwrap();

        assert_eq!(email.message_id.as_deref(), Some("abc123@example.com"));
        assert_eq!(email.from.as_deref(), Some("alice@example.com"));
        assert_eq!(email.to, vec!["shop@relay.test", "bob@example.com"]);
        assert_eq!(email.cc, vec!["carol@example.com"]);
        assert_eq!(email.subject.as_deref(), Some("Order shipped"));
        assert!(email
            .text_body
            .as_deref()
            .unwrap()
            .contains("Your order is on its way."));
        assert!(email.html_body.is_none());
        assert!(email.original_recipient.is_none());
    }

    #[test]
    fn test_missing_cc_is_empty_list() {
        let email = parse_email(ALTERNATIVE.as_bytes()).unwrap();
        assert!(email.cc.is_empty());
    }

    #[test]
    fn test_parse_alternative_bodies() {
        let email = parse_email(ALTERNATIVE.as_bytes()).unwrap();
        assert!(email.text_body.as_deref().unwrap().contains("plain version"));
        assert!(email
            .html_body
            .as_deref()
            .unwrap()
            .contains("<p>html version</p>"));
    }

    #[test]
    fn test_depth_first_takes_first_parts() {
        let email = parse_email(NESTED.as_bytes()).unwrap();
        let text = email.text_body.unwrap();
        assert!(text.contains("first plain"));
        assert!(!text.contains("second plain"));
        assert!(email.html_body.unwrap().contains("first html"));
    }

    #[test]
    fn test_html_only_message() {
        let email = parse_email(HTML_ONLY.as_bytes()).unwrap();
        assert!(email.text_body.is_none());
        assert!(email.html_body.unwrap().contains("<h1>Sale</h1>"));
    }

    #[test]
    fn test_missing_subject() {
        let raw = "From: a@example.com\r\nTo: b@relay.test\r\n\r\nbody\r\n";
        let email = parse_email(raw.as_bytes()).unwrap();
        assert!(email.subject.is_none());
        assert_eq!(email.subject_or_default(), "(No Subject)");
        assert!(email.text_body.unwrap().contains("body"));
    }

    #[test]
    fn test_empty_message_fails() {
        let result = parse_email(b"  \r\n");
        assert!(matches!(result, Err(RelayError::EmailFetchOrParseFailed(_))));
    }
}
