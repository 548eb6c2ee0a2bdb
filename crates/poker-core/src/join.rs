//! Username validation and join admission rules.
//!
//! Validation runs in a fixed order and stops at the first failure:
//! - empty after trimming
//! - too short / too long (counted in characters)
//! - characters outside letters, digits, space, hyphen, underscore
//!
//! Name collisions and host claims depend on who is already connected and are
//! checked by [`check_admission`] against the live registry.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::registry::ConnectionRegistry;

/// Minimum username length in characters
pub const MIN_USERNAME_LEN: usize = 2;
/// Maximum username length in characters
pub const MAX_USERNAME_LEN: usize = 20;

static USERNAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9 _-]+$").expect("Invalid username regex"));

/// A username that failed validation. The message is sent verbatim in `joinError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsernameError {
    #[error("username is required")]
    Required,

    #[error("username must be at least {MIN_USERNAME_LEN} characters")]
    TooShort,

    #[error("username must be {MAX_USERNAME_LEN} characters or less")]
    TooLong,

    #[error("username can only contain letters, numbers, spaces, hyphens, and underscores")]
    InvalidCharacters,
}

/// A well-formed join that conflicts with the live session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRejection {
    #[error(transparent)]
    InvalidUsername(#[from] UsernameError),

    #[error("username is already taken, please choose another")]
    NameTaken,

    #[error("a host is already in this session, please join as a player")]
    HostExists,
}

/// Validate and normalize a raw username. Returns the trimmed name.
pub fn validate_username(raw: &str) -> Result<String, UsernameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(UsernameError::Required);
    }

    let len = name.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(UsernameError::TooShort);
    }
    if len > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong);
    }

    if !USERNAME_CHARS.is_match(name) {
        return Err(UsernameError::InvalidCharacters);
    }

    Ok(name.to_string())
}

/// Run every join check against the registry. Returns the normalized name.
pub fn check_admission(
    registry: &ConnectionRegistry,
    raw: &str,
    is_host: bool,
) -> Result<String, JoinRejection> {
    let name = validate_username(raw)?;
    if registry.name_taken(&name) {
        return Err(JoinRejection::NameTaken);
    }
    if is_host && registry.has_host() {
        return Err(JoinRejection::HostExists);
    }
    Ok(name)
}
