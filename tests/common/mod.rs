//! Test helpers for integration tests.
//!
//! Provides in-memory collaborators and a wired-up relay for pipeline tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mailrelay::cache::Cache;
use mailrelay::{
    EmailFetcher, ForwardBuilder, IngestionProcessor, Mailer, MemoryCache, MemoryRelayStore,
    MessageQueue, ObjectStore, OutboundEmail, PlaceholderSummarizer, QueueMessage,
    RelayDirectory, RelayError, Result,
};

pub const SERVICE_NAME: &str = "MailRelay";
pub const DOMAIN: &str = "relay.test";
pub const FROM: &str = "no-reply@relay.test";
pub const BUCKET: &str = "inbound-mail";

pub const PLAIN_EMAIL: &str = "From: Alice <alice@example.com>\r\n\
To: shop@relay.test\r\n\
Cc: bob@example.com\r\n\
Subject: Order shipped\r\n\
Message-ID: <order-1@example.com>\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Your order is on its way.\r\n";

pub const HTML_ONLY_EMAIL: &str = "From: promo@example.com\r\n\
To: shop@relay.test\r\n\
Subject: Big sale\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
\r\n\
--sep\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<h1>Everything must go</h1>\r\n\
--sep--\r\n";

/// Mailer that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: AtomicBool,
    fail_io: AtomicBool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer that takes `delay` per message, for concurrency checks.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Fail with a transport I/O error instead of a classified one.
    pub fn set_io_failing(&self, fail: bool) {
        self.fail_io.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::EmailDispatchFailed("transport down".to_string()));
        }
        if self.fail_io.load(Ordering::SeqCst) {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "smtp connection reset",
            )));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        Ok(format!("test-message-{}", sent.len()))
    }
}

/// Object store holding objects in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| RelayError::EmailFetchOrParseFailed(format!("no object {bucket}/{key}")))
    }
}

/// Cache whose every operation fails.
pub struct FailingCache;

fn unavailable<T>() -> Result<T> {
    Err(RelayError::Cache("connection refused".to_string()))
}

#[async_trait]
impl Cache for FailingCache {
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        unavailable()
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        unavailable()
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        unavailable()
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        unavailable()
    }

    async fn increment(&self, _key: &str) -> Result<i64> {
        unavailable()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        unavailable()
    }

    async fn keys(&self, _pattern: &str) -> Result<BTreeSet<String>> {
        unavailable()
    }
}

/// Queue holding messages in memory until deleted or dead-lettered.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<BTreeMap<String, String>>,
    dead: Mutex<BTreeMap<String, String>>,
    next: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, body: impl Into<String>) -> String {
        let receipt = format!("r-{:04}", self.next.fetch_add(1, Ordering::SeqCst));
        self.messages
            .lock()
            .unwrap()
            .insert(receipt.clone(), body.into());
        receipt
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn receipts(&self) -> Vec<String> {
        self.messages.lock().unwrap().keys().cloned().collect()
    }

    /// Dead-lettered receipts with their reasons.
    pub fn dead_letters(&self) -> Vec<(String, String)> {
        self.dead
            .lock()
            .unwrap()
            .iter()
            .map(|(receipt, reason)| (receipt.clone(), reason.clone()))
            .collect()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .take(max)
            .map(|(receipt, body)| QueueMessage {
                receipt: receipt.clone(),
                body: body.clone(),
            })
            .collect())
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        self.messages.lock().unwrap().remove(receipt);
        Ok(())
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<()> {
        self.messages.lock().unwrap().remove(receipt);
        self.dead
            .lock()
            .unwrap()
            .insert(receipt.to_string(), reason.to_string());
        Ok(())
    }
}

/// A fully wired relay over in-memory collaborators.
pub struct TestRelay {
    pub directory: Arc<RelayDirectory>,
    pub objects: Arc<MemoryObjectStore>,
    pub mailer: Arc<RecordingMailer>,
    pub processor: Arc<IngestionProcessor>,
}

impl TestRelay {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryCache::new()), RecordingMailer::new())
    }

    pub fn with_cache(cache: Arc<dyn Cache>) -> Self {
        Self::build(cache, RecordingMailer::new())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::build(Arc::new(MemoryCache::new()), mailer)
    }

    fn build(cache: Arc<dyn Cache>, mailer: RecordingMailer) -> Self {
        let directory = Arc::new(RelayDirectory::new(
            cache,
            Arc::new(MemoryRelayStore::new()),
            DOMAIN,
        ));
        let objects = Arc::new(MemoryObjectStore::new());
        let mailer = Arc::new(mailer);
        let processor = Arc::new(IngestionProcessor::new(
            directory.clone(),
            EmailFetcher::new(objects.clone()),
            ForwardBuilder::new(SERVICE_NAME, FROM),
            Arc::new(PlaceholderSummarizer),
            mailer.clone(),
            BUCKET,
        ));

        Self {
            directory,
            objects,
            mailer,
            processor,
        }
    }
}

/// One notification record.
pub fn record(bucket: &str, key: &str, destination: &[&str]) -> serde_json::Value {
    json!({
        "eventTime": "2024-05-01T10:00:00.000Z",
        "s3": {
            "bucket": { "name": bucket },
            "object": { "key": key, "size": 512 }
        },
        "ses": {
            "mail": {
                "messageId": format!("ses-{key}"),
                "destination": destination,
                "source": "alice@example.com",
                "timestamp": "2024-05-01T10:00:00.000Z"
            }
        }
    })
}

/// A queue message body carrying `records`.
pub fn envelope(records: Vec<serde_json::Value>) -> String {
    json!({ "Records": records }).to_string()
}
