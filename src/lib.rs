//! MailRelay - relay-address email forwarding
//!
//! Inbound mail addressed to a generated relay address is resolved to the
//! owner's primary address, annotated with a summary, and forwarded. Primary
//! addresses are confirmed with short-lived verification codes.

pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod mail;
pub mod relay;
pub mod verification;

pub use cache::{Cache, MemoryCache};
pub use config::Config;
pub use error::{ErrorCategory, RelayError, Result};
pub use ingest::{
    BatchSummary, EventEnvelope, EventRecord, IngestionProcessor, MessageQueue, QueueMessage,
    QueuePoller, SpoolQueue,
};
pub use mail::{
    EmailBody, EmailFetcher, ForwardBuilder, FsObjectStore, Mailer, ObjectStore, OutboundEmail,
    OutboxMailer, ParsedEmail, PlaceholderSummarizer, Summarizer,
};
pub use relay::{
    FileRelayStore, MemoryRelayStore, RelayDirectory, RelayMapping, RelayStore, UsernameGenerator,
    ValidationError,
};
pub use verification::{CodeGenerator, VerificationService};
