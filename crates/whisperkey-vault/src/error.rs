//! Error taxonomy for session and vault operations.

use thiserror::Error;
use whisperkey_core::ValidationError;

/// Result type for vault and session operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Every asynchronous operation in this crate resolves to a value or to
/// one of these kinds; nothing escapes as an unobserved failure.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed input, caught before any network call. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No valid session at the time of a protected operation. Raised
    /// after the single implicit refresh attempt has failed; the caller
    /// should send the user back through login.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Login or signup rejected by the boundary (bad credentials,
    /// duplicate identity). Surfaced verbatim, not retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The referenced record does not exist in the local collection.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A CRUD call to the persistence boundary failed, either on the
    /// network or with a non-success status. Local state is untouched;
    /// the caller may retry manually.
    #[error("Sync failed: {message}")]
    Sync {
        /// HTTP status, when the boundary answered at all.
        status: Option<u16>,
        message: String,
    },

    /// Token persistence failed. Session operations log and continue on
    /// this; it never surfaces from a vault operation.
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Client misconfiguration (bad base URL, client build failure).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a not-found error for a record id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a sync error from a boundary status and message.
    pub fn sync(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Sync {
            status,
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether a manual retry of the same call could succeed.
    ///
    /// Only boundary failures are retryable; validation, missing records,
    /// and rejected credentials will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sync { .. })
    }
}

impl From<ValidationError> for VaultError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.0)
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        Self::Sync {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
