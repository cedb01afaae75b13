//! Mail module.
//!
//! This module provides:
//! - Fetching and MIME decoding of inbound messages
//! - Construction of forwarded messages
//! - The outbound transport and summarizer seams

mod builder;
mod fetch;
mod mailer;
mod parser;
mod types;

pub use builder::{escape_html, ForwardBuilder, PlaceholderSummarizer, Summarizer, PLACEHOLDER_SUMMARY};
pub use fetch::{EmailFetcher, FsObjectStore, ObjectStore};
pub use mailer::{Mailer, OutboxMailer};
pub use parser::parse_email;
pub use types::{EmailBody, OutboundEmail, ParsedEmail, NO_SUBJECT};
