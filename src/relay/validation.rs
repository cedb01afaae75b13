//! Input validation for primary addresses and custom relay usernames.

use thiserror::Error;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum relay username (local part) length.
pub const MAX_RELAY_USERNAME_LENGTH: usize = 64;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email is empty.
    #[error("email cannot be empty")]
    EmailEmpty,

    /// Email is too long.
    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    /// Email format is invalid.
    #[error("invalid email format")]
    EmailInvalidFormat,

    /// Relay username is empty.
    #[error("relay username cannot be empty")]
    RelayUsernameEmpty,

    /// Relay username is too long.
    #[error("relay username must be at most {MAX_RELAY_USERNAME_LENGTH} characters")]
    RelayUsernameTooLong,

    /// Relay username contains invalid characters or bad edges.
    #[error(
        "relay username must start and end with alphanumeric characters, \
         and can only contain letters, numbers, dots, and hyphens"
    )]
    RelayUsernameInvalid,

    /// Relay username is reserved.
    #[error("this relay username is reserved")]
    RelayUsernameReserved,
}

/// Local parts the service keeps for itself.
const RESERVED_RELAY_USERNAMES: &[&str] = &[
    "abuse",
    "admin",
    "administrator",
    "hostmaster",
    "mailer-daemon",
    "no-reply",
    "noreply",
    "postmaster",
    "root",
    "security",
    "support",
    "webmaster",
];

/// Check if a relay username is reserved.
pub fn is_reserved_relay_username(username: &str) -> bool {
    let lower = username.to_lowercase();
    RESERVED_RELAY_USERNAMES.iter().any(|&r| r == lower)
}

/// Validate a primary (destination) email address.
///
/// The check is intentionally shallow: one `@`, non-empty local part,
/// dotted domain without empty labels, no whitespace.
pub fn validate_primary_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmailEmpty);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::EmailInvalidFormat);
    };
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::EmailInvalidFormat);
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    Ok(())
}

/// Validate a custom relay username.
///
/// Requirements:
/// - Length: 1-64 characters
/// - Characters: ASCII letters, digits, `.` and `-`
/// - First and last character alphanumeric
/// - Not reserved
///
/// # Examples
///
/// ```
/// use mailrelay::relay::validate_relay_username;
///
/// assert!(validate_relay_username("shop.news-2024").is_ok());
/// assert!(validate_relay_username("a").is_ok());
/// assert!(validate_relay_username("-leading").is_err());
/// assert!(validate_relay_username("postmaster").is_err());
/// ```
pub fn validate_relay_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::RelayUsernameEmpty);
    }
    if username.len() > MAX_RELAY_USERNAME_LENGTH {
        return Err(ValidationError::RelayUsernameTooLong);
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-';
    if !username.chars().all(allowed) {
        return Err(ValidationError::RelayUsernameInvalid);
    }

    let edges_ok = username
        .chars()
        .next()
        .zip(username.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());
    if !edges_ok {
        return Err(ValidationError::RelayUsernameInvalid);
    }

    if is_reserved_relay_username(username) {
        return Err(ValidationError::RelayUsernameReserved);
    }

    Ok(())
}
