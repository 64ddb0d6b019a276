//! Shared primitives for all Rust crates in RoleGate.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;
/// Wall-clock abstraction used by freshness and expiry checks.
pub mod clock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::PrincipalIdentity;
pub use clock::{Clock, ManualClock, SystemClock};

/// Result type used across RoleGate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Retryable failure of an external dependency (timeout, throttling).
    #[error("transient dependency failure: {0}")]
    Transient(String),

    /// External dependency stayed unavailable after bounded retries.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error may succeed when the call is retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(AppError::Transient("throttled".to_owned()).is_transient());
        assert!(!AppError::DependencyUnavailable("iam".to_owned()).is_transient());
        assert!(!AppError::Conflict("duplicate".to_owned()).is_transient());
    }
}
