//! Retrieval of stored inbound messages.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::parser::parse_email;
use super::types::ParsedEmail;
use crate::{RelayError, Result};

/// Object storage holding raw inbound messages.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the whole object at `bucket`/`key`.
    async fn fetch_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Object store backed by a local directory laid out as `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object to a path under the root.
    ///
    /// Bucket and key must be relative paths without `..` components.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let relative = Path::new(part);
            if part.is_empty()
                || !relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(RelayError::EmailFetchOrParseFailed(format!(
                    "invalid object location: {bucket}/{key}"
                )));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            RelayError::EmailFetchOrParseFailed(format!("{}: {}", path.display(), e))
        })
    }
}

/// Fetches raw messages and decodes them.
#[derive(Clone)]
pub struct EmailFetcher {
    store: Arc<dyn ObjectStore>,
}

impl EmailFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Fetch `bucket`/`key` and parse it.
    ///
    /// Every failure, whether in storage or in decoding, is reported as
    /// `EmailFetchOrParseFailed`.
    pub async fn fetch_and_parse(&self, bucket: &str, key: &str) -> Result<ParsedEmail> {
        let raw = self.store.fetch_bytes(bucket, key).await.map_err(|e| {
            error!("Failed to fetch email {}/{}: {}", bucket, key, e);
            match e {
                RelayError::EmailFetchOrParseFailed(_) => e,
                other => RelayError::EmailFetchOrParseFailed(other.to_string()),
            }
        })?;
        debug!("Fetched {} bytes from {}/{}", raw.len(), bucket, key);

        parse_email(&raw).inspect_err(|e| {
            error!("Failed to parse email {}/{}: {}", bucket, key, e);
        })
    }
}
