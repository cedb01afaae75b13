//! Verification codes for primary-address owners.
//!
//! A code and its attempt counter live under two cache keys with the same
//! TTL. The keys are written one after the other, so a verification racing
//! a re-send may see the new code with the old counter (or no code at all).
//! That window is accepted.

mod code;
mod service;

pub use code::{format_code, CodeGenerator, RandomCodeGenerator, CODE_DIGITS};
pub use service::{verification_email, VerificationService};
