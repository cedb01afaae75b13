//! Outbound mail transport.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use super::types::OutboundEmail;
use crate::{RelayError, Result};

/// Outbound mail transport.
///
/// Implementations report every failure as `EmailDispatchFailed`.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message and return the transport's message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String>;
}

/// Mailer that writes each message as JSON into an outbox directory.
///
/// Files are named `{message_id}.json`.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The outbox directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        let json = serde_json::to_vec_pretty(email)
            .map_err(|e| RelayError::EmailDispatchFailed(e.to_string()))?;

        let path = self.dir.join(format!("{message_id}.json"));
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, json).await
        };
        if let Err(e) = write.await {
            error!("Failed to write outbox file {}: {}", path.display(), e);
            return Err(RelayError::EmailDispatchFailed(e.to_string()));
        }

        debug!("Outbox message {} written", message_id);
        Ok(message_id)
    }
}
