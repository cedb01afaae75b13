//! Inbound event ingestion.
//!
//! This module provides:
//! - Decoding of notification envelopes
//! - The per-message processor (resolve, fetch, build, dispatch)
//! - The queue contract and a directory-backed queue with dead letters
//! - The polling worker pool

mod event;
mod poller;
mod processor;
mod queue;

pub use event::{
    decode_object_key, BucketRef, EventEnvelope, EventRecord, MailMetadata, MailRecord,
    ObjectLocation, ObjectRef, StorageRecord,
};
pub use poller::{BatchSummary, QueuePoller};
pub use processor::IngestionProcessor;
pub use queue::{
    MessageQueue, QueueMessage, SpoolQueue, DEFAULT_MAX_RECEIVES, DEFAULT_VISIBILITY_TIMEOUT,
};
