//! Error types for the mail relay.

use thiserror::Error;

use crate::relay::ValidationError;

/// Coarse classification of a failure, used by callers to decide whether
/// a rejected operation is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Client-correctable input problem. Never retried.
    Input,
    /// The requested relay address is unknown.
    NotFound,
    /// Object store, cache or transport failure.
    Transient,
    /// The payload itself cannot be decoded.
    Malformed,
    /// Local misconfiguration or an invariant violation.
    Internal,
}

/// Common error type for the mail relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The notification record names no destination address.
    #[error("no destination address found in mail record")]
    MissingDestinationAddress,

    /// The verification code is wrong, expired, or was never issued.
    #[error("invalid or expired verification code")]
    InvalidCode,

    /// Too many wrong codes were presented for the current code.
    #[error("too many verification attempts, please request a new code")]
    TooManyAttempts,

    /// No live mapping exists for the relay address.
    #[error("failed to find relay address: {0}")]
    RelayAddressNotFound(String),

    /// A custom relay address is already in use.
    #[error("relay address already in use: {0}")]
    RelayAddressTaken(String),

    /// A unique relay address could not be produced.
    #[error("failed to generate relay address")]
    RelayGeneration,

    /// The queue message body is not a valid event envelope.
    #[error("malformed event payload: {0}")]
    MalformedEventPayload(String),

    /// The stored message could not be fetched or decoded.
    #[error("failed to fetch or parse email: {0}")]
    EmailFetchOrParseFailed(String),

    /// The outbound transport rejected the message.
    #[error("failed to send email: {0}")]
    EmailDispatchFailed(String),

    /// Cache backend error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Durable relay store error.
    #[error("relay store error: {0}")]
    Store(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Stable machine-readable identifier for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingDestinationAddress => "missing_destination_address",
            RelayError::InvalidCode => "invalid_code",
            RelayError::TooManyAttempts => "too_many_attempts",
            RelayError::RelayAddressNotFound(_) => "relay_address_not_found",
            RelayError::RelayAddressTaken(_) => "relay_address_taken",
            RelayError::RelayGeneration => "relay_generation_failed",
            RelayError::MalformedEventPayload(_) => "malformed_event_payload",
            RelayError::EmailFetchOrParseFailed(_) => "email_fetch_or_parse_failed",
            RelayError::EmailDispatchFailed(_) => "email_dispatch_failed",
            RelayError::Cache(_) => "cache_error",
            RelayError::Store(_) => "store_error",
            RelayError::Validation(_) => "validation_error",
            RelayError::Io(_) => "io_error",
            RelayError::Config(_) => "config_error",
        }
    }

    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::MissingDestinationAddress
            | RelayError::InvalidCode
            | RelayError::TooManyAttempts
            | RelayError::RelayAddressTaken(_)
            | RelayError::Validation(_) => ErrorCategory::Input,
            RelayError::RelayAddressNotFound(_) => ErrorCategory::NotFound,
            RelayError::EmailFetchOrParseFailed(_)
            | RelayError::EmailDispatchFailed(_)
            | RelayError::Cache(_)
            | RelayError::Store(_)
            | RelayError::Io(_) => ErrorCategory::Transient,
            RelayError::MalformedEventPayload(_) => ErrorCategory::Malformed,
            RelayError::RelayGeneration | RelayError::Config(_) => ErrorCategory::Internal,
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
