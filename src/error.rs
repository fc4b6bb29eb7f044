//! Error types for the user runtime-state core

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the user runtime-state core.
///
/// The taxonomy is deliberate: validation and conflict errors are terminal
/// for a call and never cause store traffic; store errors are degraded or
/// reported per-operation rather than blanket-retried.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors (rejected before any store is touched)
    // =========================================================================
    /// User identifier is empty or malformed
    #[error("Invalid user identifier: {0:?}")]
    InvalidUserId(String),

    /// Batch size exceeds the configured cap
    #[error("Batch of {len} identifiers exceeds maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// Presence mode is not one of real/away/offline
    #[error("Invalid presence mode: {0:?}")]
    InvalidPresenceMode(String),

    /// Username fails the format policy (length 3-30, [A-Za-z0-9._-])
    #[error("Invalid username: {reason}")]
    InvalidUsername { reason: String },

    /// Field name is not in the accessor allow-list
    #[error("Field not allowed: {field}")]
    FieldNotAllowed { field: String },

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    /// Username is already owned by a different identifier
    #[error("Username already taken: {username}")]
    UsernameTaken { username: String },

    // =========================================================================
    // Not Found
    // =========================================================================
    /// No durable row exists for the identifier
    #[error("No {entity} row for user: {user_id}")]
    NotFound {
        entity: &'static str,
        user_id: String,
    },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Cache tier (Redis) error
    #[error("Cache tier error: {0}")]
    CacheTier(#[from] redis::RedisError),

    /// Durable tier (Postgres) error
    #[error("Durable tier error: {0}")]
    DurableTier(#[from] sqlx::Error),

    /// Store failure from an adapter without a client-specific error type
    #[error("Store error: {0}")]
    Store(String),

    /// Cache payload could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Error {
    /// True for errors raised by caller input before any store call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidUserId(_)
                | Error::BatchTooLarge { .. }
                | Error::InvalidPresenceMode(_)
                | Error::InvalidUsername { .. }
                | Error::FieldNotAllowed { .. }
        )
    }

    /// True for transport/timeout/auth failures from either tier.
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            Error::CacheTier(_) | Error::DurableTier(_) | Error::Store(_)
        )
    }
}
