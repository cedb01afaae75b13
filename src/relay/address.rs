//! Relay address synthesis.

use std::fmt::Write;

use rand_core::{OsRng, RngCore};

/// Number of random bytes in a generated relay username.
pub const RANDOM_USERNAME_BYTES: usize = 8;

/// Source of candidate relay usernames (the part before `@`).
pub trait UsernameGenerator: Send + Sync {
    /// Produce the next candidate. Callers retry on collision.
    fn candidate(&self) -> String;
}

/// Random lowercase-hex usernames drawn from the OS random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomHexGenerator;

impl UsernameGenerator for RandomHexGenerator {
    fn candidate(&self) -> String {
        let mut bytes = [0u8; RANDOM_USERNAME_BYTES];
        OsRng.fill_bytes(&mut bytes);
        bytes.iter().fold(
            String::with_capacity(RANDOM_USERNAME_BYTES * 2),
            |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            },
        )
    }
}

/// Normalize an address for use as a directory key.
pub fn normalize_relay_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Join a username and the service domain into a relay address.
pub fn relay_address(username: &str, domain: &str) -> String {
    normalize_relay_address(&format!("{}@{}", username, domain.trim_start_matches('@')))
}
