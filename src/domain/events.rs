//! Failure events recorded through the error-capture port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ports::UserId;

/// A failure observed by a state operation.
///
/// Carries enough context for offline reconciliation: which operation, which
/// identifiers, and what the underlying store said. The core records these
/// at every degrade, swallow, and report-without-rollback site; it never
/// reconciles automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Operation name, e.g. `presence.resolve` or `username.claim`.
    pub operation: &'static str,
    /// Identifiers involved in the failing call.
    pub user_ids: Vec<String>,
    /// Stringified underlying error.
    pub detail: String,
    /// When the failure was observed.
    pub at: DateTime<Utc>,
}

impl FailureEvent {
    /// Build an event for a single-identifier operation.
    pub fn new(operation: &'static str, user_id: &UserId, detail: impl ToString) -> Self {
        Self {
            operation,
            user_ids: vec![user_id.as_str().to_string()],
            detail: detail.to_string(),
            at: Utc::now(),
        }
    }

    /// Build an event covering a batch of identifiers.
    pub fn batch(operation: &'static str, user_ids: &[UserId], detail: impl ToString) -> Self {
        Self {
            operation,
            user_ids: user_ids.iter().map(|id| id.as_str().to_string()).collect(),
            detail: detail.to_string(),
            at: Utc::now(),
        }
    }
}
