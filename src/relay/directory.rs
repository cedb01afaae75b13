//! Relay directory: relay address generation and resolution.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::address::{normalize_relay_address, relay_address, RandomHexGenerator, UsernameGenerator};
use super::store::{RelayMapping, RelayStore};
use super::validation::{validate_primary_email, validate_relay_username};
use crate::cache::{keys, Cache};
use crate::config::RelaySeed;
use crate::{RelayError, Result};

/// Upper bound on candidate addresses tried by one generation.
pub const MAX_GENERATION_ATTEMPTS: usize = 16;

/// Maps relay addresses to primary addresses.
///
/// New mappings are written to the durable store first and then projected
/// into the cache. Resolution reads only the cache.
pub struct RelayDirectory {
    cache: Arc<dyn Cache>,
    store: Arc<dyn RelayStore>,
    generator: Arc<dyn UsernameGenerator>,
    domain: String,
}

impl RelayDirectory {
    /// Create a directory issuing random addresses under `domain`.
    pub fn new(cache: Arc<dyn Cache>, store: Arc<dyn RelayStore>, domain: impl Into<String>) -> Self {
        Self {
            cache,
            store,
            generator: Arc::new(RandomHexGenerator),
            domain: domain.into(),
        }
    }

    /// Replace the username generator.
    pub fn with_generator(mut self, generator: Arc<dyn UsernameGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// The domain relay addresses are issued under.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Generate a unique relay address for `primary_email`.
    ///
    /// Candidates that collide with an existing mapping are discarded and
    /// a new one is drawn, up to [`MAX_GENERATION_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// - `Validation` if the primary address is malformed
    /// - `RelayGeneration` if no unique candidate was produced
    /// - `Store` / `Cache` on backend failure
    pub async fn generate_relay_address(&self, primary_email: &str) -> Result<String> {
        validate_primary_email(primary_email)?;

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let username = self.generator.candidate();
            if username.is_empty() {
                warn!("Empty relay username candidate (attempt {})", attempt);
                continue;
            }

            let candidate = relay_address(&username, &self.domain);
            if self.store.exists(&candidate).await? {
                debug!("Relay address collision on {} (attempt {})", candidate, attempt);
                continue;
            }

            // insert() re-checks, so a concurrent writer cannot take the same address.
            if !self
                .store
                .insert(RelayMapping::new(candidate.clone(), primary_email))
                .await?
            {
                debug!("Relay address {} taken concurrently (attempt {})", candidate, attempt);
                continue;
            }

            self.project(&candidate, primary_email).await?;
            info!("Relay address generated: {}", candidate);
            return Ok(candidate);
        }

        error!(
            "Failed to generate a unique relay address after {} attempts",
            MAX_GENERATION_ATTEMPTS
        );
        Err(RelayError::RelayGeneration)
    }

    /// Claim `username@domain` for `primary_email`.
    ///
    /// # Errors
    ///
    /// - `Validation` if the username or primary address is malformed
    /// - `RelayAddressTaken` if the address already exists
    pub async fn create_custom_relay_address(
        &self,
        primary_email: &str,
        username: &str,
    ) -> Result<String> {
        validate_primary_email(primary_email)?;
        validate_relay_username(username)?;

        let address = relay_address(username, &self.domain);
        if !self
            .store
            .insert(RelayMapping::new(address.clone(), primary_email))
            .await?
        {
            warn!("Custom relay address already in use: {}", address);
            return Err(RelayError::RelayAddressTaken(address));
        }

        self.project(&address, primary_email).await?;
        info!("Custom relay address created: {}", address);
        Ok(address)
    }

    /// Resolve a relay address to its primary address.
    ///
    /// Only the cache is consulted. A miss and a cache failure both
    /// surface as `RelayAddressNotFound`.
    pub async fn resolve_primary_email(&self, relay_address: &str) -> Result<String> {
        let relay_address = normalize_relay_address(relay_address);
        match self.cache.get(&keys::relay_email(&relay_address)).await {
            Ok(Some(primary)) => Ok(primary),
            Ok(None) => {
                warn!("No primary email cached for relay address {}", relay_address);
                Err(RelayError::RelayAddressNotFound(relay_address))
            }
            Err(e) => {
                error!(
                    "Failed to read primary email for relay address {}: {}",
                    relay_address, e
                );
                Err(RelayError::RelayAddressNotFound(relay_address))
            }
        }
    }

    /// Pause or resume forwarding for a relay address.
    ///
    /// A paused address loses its cache projection and therefore resolves
    /// as not found.
    pub async fn set_relay_active(&self, relay_address: &str, active: bool) -> Result<()> {
        let relay_address = normalize_relay_address(relay_address);
        let mapping = self
            .store
            .set_active(&relay_address, active)
            .await?
            .ok_or_else(|| RelayError::RelayAddressNotFound(relay_address.clone()))?;

        if active {
            self.project(&mapping.relay_address, &mapping.primary_email)
                .await?;
        } else {
            self.cache.delete(&keys::relay_email(&relay_address)).await?;
        }

        info!(
            "Relay address {} {}",
            relay_address,
            if active { "resumed" } else { "paused" }
        );
        Ok(())
    }

    /// Rewrite the cache projection of every active mapping and drop
    /// projections whose mapping is gone or paused.
    ///
    /// Returns the number of projections written.
    pub async fn sync_cache(&self) -> Result<usize> {
        let active = self.store.list_active().await?;
        let mut live = HashSet::with_capacity(active.len());
        for mapping in &active {
            self.project(&mapping.relay_address, &mapping.primary_email)
                .await?;
            live.insert(keys::relay_email(&mapping.relay_address));
        }

        let pattern = format!("{}*", keys::RELAY_EMAIL_PREFIX);
        let mut removed = 0;
        for key in self.cache.keys(&pattern).await? {
            if !live.contains(&key) && self.cache.delete(&key).await? {
                removed += 1;
            }
        }

        info!(
            "Relay cache synchronized: {} mapping(s), {} stale projection(s) removed",
            active.len(),
            removed
        );
        Ok(active.len())
    }

    /// Add configured mappings that the store does not hold yet.
    ///
    /// Existing mappings are left untouched, so a pause made at runtime
    /// survives a restart. Projections are not written; follow with
    /// [`RelayDirectory::sync_cache`]. Returns the number of mappings added.
    ///
    /// # Errors
    ///
    /// - `Validation` if a primary address or username is malformed
    /// - `Config` if a relay address is outside the service domain
    pub async fn import(&self, seeds: &[RelaySeed]) -> Result<usize> {
        let domain = relay_address("", &self.domain);
        let mut added = 0;

        for seed in seeds {
            validate_primary_email(&seed.primary_email)?;
            let address = normalize_relay_address(&seed.relay_address);
            let Some(username) = address.strip_suffix(&domain) else {
                return Err(RelayError::Config(format!(
                    "relay address {} is not under {}",
                    address, self.domain
                )));
            };
            validate_relay_username(username)?;

            let mut mapping = RelayMapping::new(address.clone(), seed.primary_email.trim());
            mapping.is_active = seed.active;
            if let Some(description) = &seed.description {
                mapping = mapping.with_description(description.clone());
            }

            if self.store.insert(mapping).await? {
                debug!("Imported relay address {}", address);
                added += 1;
            }
        }

        if added > 0 {
            info!("Imported {} relay mapping(s)", added);
        }
        Ok(added)
    }

    /// Every mapping, active or paused, that forwards to `primary_email`.
    pub async fn list_for_primary(&self, primary_email: &str) -> Result<Vec<RelayMapping>> {
        validate_primary_email(primary_email)?;
        self.store.list_by_primary(primary_email.trim()).await
    }

    async fn project(&self, relay_address: &str, primary_email: &str) -> Result<()> {
        self.cache
            .set(&keys::relay_email(relay_address), primary_email, None)
            .await
    }
}
