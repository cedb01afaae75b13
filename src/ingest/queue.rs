//! Notification queue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{RelayError, Result};

/// Default time a received message stays hidden from later receives.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of receives before a message is dead-lettered.
pub const DEFAULT_MAX_RECEIVES: u32 = 5;

const DEAD_LETTER_DIR: &str = "dead";

/// A received queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Handle used to acknowledge the message.
    pub receipt: String,
    /// Raw message body.
    pub body: String,
}

/// Source of notification messages.
///
/// A message stays on the queue until it is deleted or dead-lettered, so
/// anything not acknowledged is received again later.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive up to `max` messages.
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a message.
    async fn delete(&self, receipt: &str) -> Result<()>;

    /// Remove a message that can never be processed, keeping it aside
    /// for inspection.
    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    receives: u32,
    visible_at: Instant,
}

/// Queue backed by a directory with one `.json` file per message.
///
/// Messages are received in file-name order, which is enqueue order. A
/// received message is hidden for the visibility timeout; once it has been
/// received `max_receives` times without being deleted it is moved to the
/// `dead/` subdirectory instead of being handed out again.
#[derive(Debug)]
pub struct SpoolQueue {
    dir: PathBuf,
    seq: AtomicU64,
    visibility_timeout: Duration,
    max_receives: u32,
    deliveries: Mutex<HashMap<String, Delivery>>,
}

impl SpoolQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_receives: DEFAULT_MAX_RECEIVES,
            deliveries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_max_receives(mut self, max_receives: u32) -> Self {
        self.max_receives = max_receives.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dead_letter_dir(&self) -> PathBuf {
        self.dir.join(DEAD_LETTER_DIR)
    }

    /// Add a message. Returns its receipt.
    pub async fn enqueue(&self, body: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let receipt = format!(
            "{:020}-{:08}-{}.json",
            Utc::now().timestamp_micros(),
            seq,
            Uuid::new_v4()
        );
        tokio::fs::write(self.dir.join(&receipt), body).await?;
        debug!("Enqueued {}", receipt);
        Ok(receipt)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_spool_file(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Pick up to `max` visible names and mark them received. Names that
    /// used up their receives are returned separately.
    fn claim(&self, names: Vec<String>, max: usize) -> (Vec<String>, Vec<String>) {
        let now = Instant::now();
        let mut deliveries = match self.deliveries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        deliveries.retain(|name, _| names.binary_search(name).is_ok());

        let mut claimed = Vec::new();
        let mut exhausted = Vec::new();
        for name in names {
            if claimed.len() == max {
                break;
            }
            let delivery = deliveries.entry(name.clone()).or_insert(Delivery {
                receives: 0,
                visible_at: now,
            });
            if delivery.visible_at > now {
                continue;
            }
            if delivery.receives >= self.max_receives {
                exhausted.push(name);
                continue;
            }
            delivery.receives += 1;
            delivery.visible_at = now + self.visibility_timeout;
            claimed.push(name);
        }
        (claimed, exhausted)
    }

    fn forget(&self, receipt: &str) {
        let mut deliveries = match self.deliveries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        deliveries.remove(receipt);
    }
}

fn is_spool_file(name: &str) -> bool {
    name.ends_with(".json") && !name.starts_with('.')
}

fn check_receipt(receipt: &str) -> Result<()> {
    if !is_spool_file(receipt) || receipt.contains(['/', '\\']) {
        return Err(RelayError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid receipt: {receipt}"),
        )));
    }
    Ok(())
}

#[async_trait]
impl MessageQueue for SpoolQueue {
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>> {
        let names = self.list().await?;
        let (claimed, exhausted) = self.claim(names, max);

        for receipt in exhausted {
            let reason = format!("received {} times without success", self.max_receives);
            if let Err(e) = self.dead_letter(&receipt, &reason).await {
                warn!("Failed to dead-letter {}: {}", receipt, e);
            }
        }

        let mut messages = Vec::with_capacity(claimed.len());
        for receipt in claimed {
            let bytes = match tokio::fs::read(self.dir.join(&receipt)).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.forget(&receipt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            messages.push(QueueMessage {
                receipt,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(messages)
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        check_receipt(receipt)?;
        tokio::fs::remove_file(self.dir.join(receipt)).await?;
        self.forget(receipt);
        Ok(())
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<()> {
        check_receipt(receipt)?;
        let dead = self.dead_letter_dir();
        tokio::fs::create_dir_all(&dead).await?;
        tokio::fs::rename(self.dir.join(receipt), dead.join(receipt)).await?;
        self.forget(receipt);
        warn!(receipt = %receipt, reason = %reason, "Message dead-lettered");
        Ok(())
    }
}
