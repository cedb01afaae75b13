//! Key/value cache shared by the relay directory and verification codes.
//!
//! Every operation touches a single key and is atomic on its own. There is
//! no multi-key transaction; callers that write related keys must tolerate
//! observing one write without the other.

mod memory;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub use memory::MemoryCache;

/// Cache backend contract.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a live key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Increment an integer value, treating a missing key as 0.
    ///
    /// The key keeps its TTL. Fails if the stored value is not an integer.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Set a TTL on an existing key. Returns false if the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// List live keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<BTreeSet<String>>;
}

/// Cache key namespaces.
pub mod keys {
    /// Prefix of relay projections (`relay address -> primary address`).
    pub const RELAY_EMAIL_PREFIX: &str = "relay-email:";
    /// Prefix of active verification codes.
    pub const VERIFICATION_CODE_PREFIX: &str = "verification:code:";
    /// Prefix of verification attempt counters.
    pub const VERIFICATION_ATTEMPT_PREFIX: &str = "verification:attempt:";

    pub fn relay_email(relay_address: &str) -> String {
        format!("{RELAY_EMAIL_PREFIX}{relay_address}")
    }

    pub fn verification_code(identity: &str) -> String {
        format!("{VERIFICATION_CODE_PREFIX}{identity}")
    }

    pub fn verification_attempt(identity: &str) -> String {
        format!("{VERIFICATION_ATTEMPT_PREFIX}{identity}")
    }
}

/// Match `text` against a glob pattern supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it was tried against.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
