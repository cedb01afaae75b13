//! Configuration module for the mail relay.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{RelayError, Result};

/// Largest batch a single queue receive may request.
pub const MAX_BATCH_SIZE: usize = 10;

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Display name, used as subject prefix.
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Domain used to synthesize relay addresses (e.g. "relay.example.com").
    #[serde(default = "default_service_domain")]
    pub domain: String,
}

fn default_service_name() -> String {
    "MailRelay".to_string()
}

fn default_service_domain() -> String {
    "relay.localhost".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            domain: default_service_domain(),
        }
    }
}

/// Verification code configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Lifetime of an issued code in seconds.
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: u64,
    /// Number of wrong codes accepted before the code locks.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_code_ttl() -> u64 {
    300 // 5 minutes
}

fn default_max_attempts() -> u32 {
    5
}

impl VerificationConfig {
    /// Code lifetime as a duration.
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding inbound messages.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory of the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: String,
}

fn default_bucket() -> String {
    "inbound-mail".to_string()
}

fn default_storage_root() -> String {
    "data/objects".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            root: default_storage_root(),
        }
    }
}

/// Queue consumer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Spool directory holding pending queue messages.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
    /// Maximum messages received per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum messages processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Delay between polls in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds a received message stays hidden from later receives.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// Receives allowed before a message is dead-lettered.
    #[serde(default = "default_max_receives")]
    pub max_receives: u32,
}

fn default_spool_dir() -> String {
    "data/queue".to_string()
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    5
}

fn default_visibility_timeout() -> u64 {
    30
}

fn default_max_receives() -> u32 {
    5
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            poll_interval_secs: default_poll_interval(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_receives: default_max_receives(),
        }
    }
}

/// A relay mapping declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelaySeed {
    pub relay_address: String,
    pub primary_email: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Relay directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// JSON file holding the durable relay mappings.
    #[serde(default = "default_store_file")]
    pub store_file: String,
    /// Seconds between cache projection rebuilds.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Mappings imported into the store at startup.
    #[serde(default)]
    pub mappings: Vec<RelaySeed>,
}

fn default_store_file() -> String {
    "data/relays.json".to_string()
}

fn default_sync_interval() -> u64 {
    300
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
            sync_interval_secs: default_sync_interval(),
            mappings: Vec::new(),
        }
    }
}

/// In-process cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds between sweeps of expired entries.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            purge_interval_secs: default_purge_interval(),
        }
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender identity of outbound mail.
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Directory the outbox transport writes dispatched messages to.
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: String,
}

fn default_mail_from() -> String {
    "no-reply@relay.localhost".to_string()
}

fn default_outbox_dir() -> String {
    "data/outbox".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
            outbox_dir: default_outbox_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/mailrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Service identity.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Verification codes.
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Object storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Queue consumer.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Outbound mail.
    #[serde(default)]
    pub mail: MailConfig,
    /// Relay mappings.
    #[serde(default)]
    pub relay: RelayConfig,
    /// In-process cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `MAILRELAY_SERVICE_DOMAIN`: relay address domain
    /// - `MAILRELAY_MAIL_FROM`: outbound sender identity
    /// - `MAILRELAY_STORAGE_BUCKET`: inbound message bucket
    pub fn apply_env_overrides(&mut self) {
        if let Some(domain) = non_empty_env("MAILRELAY_SERVICE_DOMAIN") {
            self.service.domain = domain;
        }
        if let Some(from) = non_empty_env("MAILRELAY_MAIL_FROM") {
            self.mail.from = from;
        }
        if let Some(bucket) = non_empty_env("MAILRELAY_STORAGE_BUCKET") {
            self.storage.bucket = bucket;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.service.domain.trim().is_empty() {
            return Err(RelayError::Config("service.domain must not be empty".into()));
        }
        if self.verification.max_attempts == 0 {
            return Err(RelayError::Config(
                "verification.max_attempts must be at least 1".into(),
            ));
        }
        if self.verification.code_ttl_secs == 0 {
            return Err(RelayError::Config(
                "verification.code_ttl_secs must be at least 1".into(),
            ));
        }
        if self.queue.workers == 0 {
            return Err(RelayError::Config("queue.workers must be at least 1".into()));
        }
        if self.queue.batch_size == 0 || self.queue.batch_size > MAX_BATCH_SIZE {
            return Err(RelayError::Config(format!(
                "queue.batch_size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.queue.max_receives == 0 {
            return Err(RelayError::Config("queue.max_receives must be at least 1".into()));
        }
        if self.cache.purge_interval_secs == 0 || self.relay.sync_interval_secs == 0 {
            return Err(RelayError::Config(
                "cache.purge_interval_secs and relay.sync_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
