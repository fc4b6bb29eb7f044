//! Error Capture Adapters
//!
//! Implement the `ErrorCapture` port with tracing and in-memory backends.

use async_trait::async_trait;
use tracing::error;

use crate::domain::events::FailureEvent;
use crate::domain::ports::ErrorCapture;

/// Tracing-based error capture.
///
/// Records failure events as structured error logs. This is the production
/// backend; an external collector picks the events up from the log stream.
#[derive(Debug, Clone, Default)]
pub struct TracingErrorCapture;

impl TracingErrorCapture {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ErrorCapture for TracingErrorCapture {
    async fn record(&self, event: FailureEvent) {
        error!(
            operation = event.operation,
            user_ids = ?event.user_ids,
            detail = %event.detail,
            "State operation failure"
        );
    }
}

/// In-memory failure collector for testing.
///
/// Collects events in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryErrorCapture {
    events: parking_lot::RwLock<Vec<FailureEvent>>,
}

impl InMemoryErrorCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<FailureEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events recorded by a specific operation.
    pub fn events_for(&self, operation: &str) -> Vec<FailureEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.operation == operation)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ErrorCapture for InMemoryErrorCapture {
    async fn record(&self, event: FailureEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::UserId;

    #[tokio::test]
    async fn test_in_memory_collects_by_operation() {
        let capture = InMemoryErrorCapture::new();
        let id = UserId::new("u1").unwrap();

        capture
            .record(FailureEvent::new("presence.resolve", &id, "down"))
            .await;
        capture
            .record(FailureEvent::new("bundle.get", &id, "down"))
            .await;

        assert_eq!(capture.len(), 2);
        assert_eq!(capture.events_for("bundle.get").len(), 1);
        capture.clear();
        assert!(capture.is_empty());
    }
}
