//! Relay directory module.
//!
//! This module provides:
//! - Random and custom relay address issuance
//! - The durable relay mapping store contract
//! - Cache-backed resolution of relay addresses to primary addresses

mod address;
mod directory;
mod store;
mod validation;

pub use address::{
    normalize_relay_address, relay_address, RandomHexGenerator, UsernameGenerator,
    RANDOM_USERNAME_BYTES,
};
pub use directory::{RelayDirectory, MAX_GENERATION_ATTEMPTS};
pub use store::{FileRelayStore, MemoryRelayStore, RelayMapping, RelayStore};
pub use validation::{
    is_reserved_relay_username, validate_primary_email, validate_relay_username,
    ValidationError, MAX_EMAIL_LENGTH, MAX_RELAY_USERNAME_LENGTH,
};
