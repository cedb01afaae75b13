//! Durable relay mapping store.
//!
//! The store is the source of truth for relay mappings; the cache only
//! holds the live `relay -> primary` projection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{RelayError, Result};

/// A relay address and the primary address it forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMapping {
    /// Unique relay address.
    pub relay_address: String,
    /// Destination address.
    pub primary_email: String,
    /// Whether mail to the relay address is forwarded.
    pub is_active: bool,
    /// Optional user-supplied note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl RelayMapping {
    /// Create an active mapping.
    pub fn new(relay_address: impl Into<String>, primary_email: impl Into<String>) -> Self {
        Self {
            relay_address: relay_address.into(),
            primary_email: primary_email.into(),
            is_active: true,
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Persistence contract for relay mappings.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Look up a mapping by relay address.
    async fn find(&self, relay_address: &str) -> Result<Option<RelayMapping>>;

    /// Check whether a relay address is taken.
    async fn exists(&self, relay_address: &str) -> Result<bool> {
        Ok(self.find(relay_address).await?.is_some())
    }

    /// Insert a mapping unless its relay address is taken.
    ///
    /// Returns false, without writing, when the address already exists.
    async fn insert(&self, mapping: RelayMapping) -> Result<bool>;

    /// Change the active flag. Returns the updated mapping, if any.
    async fn set_active(&self, relay_address: &str, active: bool)
        -> Result<Option<RelayMapping>>;

    /// All active mappings.
    async fn list_active(&self) -> Result<Vec<RelayMapping>>;

    /// All mappings forwarding to `primary_email`.
    async fn list_by_primary(&self, primary_email: &str) -> Result<Vec<RelayMapping>>;
}

/// In-memory relay store.
#[derive(Debug, Default)]
pub struct MemoryRelayStore {
    mappings: RwLock<HashMap<String, RelayMapping>>,
}

fn poisoned<T>(_: T) -> RelayError {
    RelayError::Store("relay store lock poisoned".to_string())
}

impl MemoryRelayStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayStore for MemoryRelayStore {
    async fn find(&self, relay_address: &str) -> Result<Option<RelayMapping>> {
        let mappings = self.mappings.read().map_err(poisoned)?;
        Ok(mappings.get(relay_address).cloned())
    }

    async fn insert(&self, mapping: RelayMapping) -> Result<bool> {
        let mut mappings = self.mappings.write().map_err(poisoned)?;
        if mappings.contains_key(&mapping.relay_address) {
            return Ok(false);
        }
        mappings.insert(mapping.relay_address.clone(), mapping);
        Ok(true)
    }

    async fn set_active(
        &self,
        relay_address: &str,
        active: bool,
    ) -> Result<Option<RelayMapping>> {
        let mut mappings = self.mappings.write().map_err(poisoned)?;
        Ok(mappings.get_mut(relay_address).map(|mapping| {
            mapping.is_active = active;
            mapping.clone()
        }))
    }

    async fn list_active(&self) -> Result<Vec<RelayMapping>> {
        let mappings = self.mappings.read().map_err(poisoned)?;
        Ok(active_of(&mappings))
    }

    async fn list_by_primary(&self, primary_email: &str) -> Result<Vec<RelayMapping>> {
        let mappings = self.mappings.read().map_err(poisoned)?;
        Ok(owned_by(&mappings, primary_email))
    }
}

fn active_of(mappings: &HashMap<String, RelayMapping>) -> Vec<RelayMapping> {
    let mut active: Vec<_> = mappings.values().filter(|m| m.is_active).cloned().collect();
    active.sort_by(|a, b| a.relay_address.cmp(&b.relay_address));
    active
}

fn owned_by(mappings: &HashMap<String, RelayMapping>, primary_email: &str) -> Vec<RelayMapping> {
    let mut owned: Vec<_> = mappings
        .values()
        .filter(|m| m.primary_email == primary_email)
        .cloned()
        .collect();
    owned.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.relay_address.cmp(&b.relay_address))
    });
    owned
}

/// Relay store persisted as a JSON array in a single file.
///
/// The whole file is loaded on open and rewritten after every change.
/// Writes go to a sibling temporary file that is then renamed over the
/// original, so a crash never leaves a half-written store.
#[derive(Debug)]
pub struct FileRelayStore {
    path: PathBuf,
    mappings: Mutex<HashMap<String, RelayMapping>>,
}

impl FileRelayStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mappings = read_store_file(&path).await?;
        info!(
            "Relay store opened: {} ({} mapping(s))",
            path.display(),
            mappings.len()
        );
        Ok(Self {
            path,
            mappings: Mutex::new(mappings),
        })
    }

    /// Re-read the file, picking up changes made by another process.
    ///
    /// Returns the number of mappings loaded.
    pub async fn reload(&self) -> Result<usize> {
        let mut mappings = self.mappings.lock().await;
        *mappings = read_store_file(&self.path).await?;
        debug!("Relay store reloaded: {} mapping(s)", mappings.len());
        Ok(mappings.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, mappings: &HashMap<String, RelayMapping>) -> Result<()> {
        let mut list: Vec<&RelayMapping> = mappings.values().collect();
        list.sort_by(|a, b| a.relay_address.cmp(&b.relay_address));
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| RelayError::Store(format!("failed to encode relay store: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Relay store written: {} mapping(s)", list.len());
        Ok(())
    }
}

async fn read_store_file(path: &Path) -> Result<HashMap<String, RelayMapping>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    let list: Vec<RelayMapping> = serde_json::from_slice(&bytes)
        .map_err(|e| RelayError::Store(format!("invalid relay store {}: {e}", path.display())))?;
    Ok(list
        .into_iter()
        .map(|m| (m.relay_address.clone(), m))
        .collect())
}

#[async_trait]
impl RelayStore for FileRelayStore {
    async fn find(&self, relay_address: &str) -> Result<Option<RelayMapping>> {
        Ok(self.mappings.lock().await.get(relay_address).cloned())
    }

    async fn insert(&self, mapping: RelayMapping) -> Result<bool> {
        let mut mappings = self.mappings.lock().await;
        if mappings.contains_key(&mapping.relay_address) {
            return Ok(false);
        }
        let address = mapping.relay_address.clone();
        mappings.insert(address.clone(), mapping);
        if let Err(e) = self.persist(&mappings).await {
            mappings.remove(&address);
            return Err(e);
        }
        Ok(true)
    }

    async fn set_active(
        &self,
        relay_address: &str,
        active: bool,
    ) -> Result<Option<RelayMapping>> {
        let mut mappings = self.mappings.lock().await;
        let Some(mapping) = mappings.get_mut(relay_address) else {
            return Ok(None);
        };
        let previous = mapping.is_active;
        mapping.is_active = active;
        let updated = mapping.clone();

        if let Err(e) = self.persist(&mappings).await {
            if let Some(mapping) = mappings.get_mut(relay_address) {
                mapping.is_active = previous;
            }
            return Err(e);
        }
        Ok(Some(updated))
    }

    async fn list_active(&self) -> Result<Vec<RelayMapping>> {
        Ok(active_of(&*self.mappings.lock().await))
    }

    async fn list_by_primary(&self, primary_email: &str) -> Result<Vec<RelayMapping>> {
        Ok(owned_by(&*self.mappings.lock().await, primary_email))
    }
}
