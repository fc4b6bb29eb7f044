//! Presence Resolver
//!
//! Derives online/away/offline state from two cache-tier signals: a sticky
//! override and a short-TTL heartbeat summary. Presence is best-effort by
//! contract: cache-tier read failures degrade to offline instead of
//! propagating, so presence is never a hard dependency for correctness
//! elsewhere.
//!
//! Resolution order:
//!
//! 1. Override `offline` always wins.
//! 2. Override `away` means online with away status.
//! 3. Override `real` or no override falls through to the heartbeat summary:
//!    present means online, absent means offline.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::StateConfig;
use crate::domain::events::FailureEvent;
use crate::domain::ports::{
    CacheTier, DurableTier, ErrorCapture, PresenceMode, PresenceState, UserId,
};
use crate::error::{Error, Result};
use crate::keys;

/// Payload stored under the heartbeat summary key.
///
/// Only the key's presence matters to resolution; the payload exists for
/// external inspection tooling.
#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatMarker<'a> {
    connection_id: &'a str,
    at: chrono::DateTime<Utc>,
}

/// Resolves presence and applies presence mutations.
pub struct PresenceResolver {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    capture: Arc<dyn ErrorCapture>,
    config: StateConfig,
}

impl PresenceResolver {
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        capture: Arc<dyn ErrorCapture>,
        config: StateConfig,
    ) -> Self {
        Self {
            cache,
            durable,
            capture,
            config,
        }
    }

    /// Resolve presence for a single identifier.
    ///
    /// Unknown identifiers and cache failures both resolve to offline.
    pub async fn resolve(&self, id: &UserId) -> PresenceState {
        self.resolve_batch(std::slice::from_ref(id))
            .await
            .map(|mut states| states.remove(0))
            .unwrap_or_else(|_| PresenceState::offline())
    }

    /// Resolve presence for many identifiers.
    ///
    /// Output preserves input order and cardinality: one state per input,
    /// including duplicates and unknown identifiers. Uses a single multi-get
    /// per signal type to bound latency under fan-out.
    pub async fn resolve_batch(&self, ids: &[UserId]) -> Result<Vec<PresenceState>> {
        if ids.len() > self.config.max_batch {
            return Err(Error::BatchTooLarge {
                len: ids.len(),
                max: self.config.max_batch,
            });
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let override_keys: Vec<String> = ids.iter().map(keys::presence_override).collect();
        let summary_keys: Vec<String> = ids.iter().map(keys::presence_summary).collect();

        let overrides = match self.cache.multi_get(&override_keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(error = %err, "Presence override read failed; degrading to offline");
                self.capture
                    .record(FailureEvent::batch("presence.resolve", ids, &err))
                    .await;
                return Ok(vec![PresenceState::offline(); ids.len()]);
            }
        };
        let summaries = match self.cache.multi_get(&summary_keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(error = %err, "Heartbeat summary read failed; degrading to offline");
                self.capture
                    .record(FailureEvent::batch("presence.resolve", ids, &err))
                    .await;
                return Ok(vec![PresenceState::offline(); ids.len()]);
            }
        };

        Ok(overrides
            .iter()
            .zip(summaries.iter())
            .map(|(override_value, summary)| {
                derive(override_value.as_deref(), summary.is_some())
            })
            .collect())
    }

    /// Refresh the heartbeat summary for an identifier.
    ///
    /// The summary write is the correctness-relevant step: if it fails the
    /// user silently appears offline after TTL, so its failure propagates.
    /// The bundle invalidation and the throttled durable last-activity write
    /// are both best-effort.
    pub async fn record_heartbeat(&self, id: &UserId, connection_id: &str) -> Result<()> {
        let marker = serde_json::to_string(&HeartbeatMarker {
            connection_id,
            at: Utc::now(),
        })?;
        self.cache
            .set(
                &keys::presence_summary(id),
                &marker,
                Some(self.config.heartbeat_ttl),
            )
            .await?;

        // Drop the cached bundle so the next read recomposes with the new
        // presence instead of a copy merged moments before the heartbeat.
        if let Err(err) = self.cache.delete(&keys::bundle(id)).await {
            warn!(user_id = %id, error = %err, "Bundle invalidation failed after heartbeat");
            self.capture
                .record(FailureEvent::new("presence.heartbeat", id, &err))
                .await;
        }

        // Throttled durable write keeps last-activity queryable without one
        // UPDATE per heartbeat. Its failure never fails the heartbeat path.
        if let Err(err) = self
            .durable
            .touch_last_activity(id, self.config.activity_throttle)
            .await
        {
            warn!(user_id = %id, error = %err, "Throttled last-activity write failed");
            self.capture
                .record(FailureEvent::new("presence.heartbeat", id, &err))
                .await;
        }

        Ok(())
    }

    /// Set the sticky presence override.
    ///
    /// The override key is written with no expiry and is immediately the
    /// runtime-authoritative value. The same mode is persisted into the
    /// durable settings row for rebuild purposes only; if that write fails
    /// the call reports failure without rolling the cache write back, so the
    /// visible runtime behavior has already changed. The divergence is
    /// captured for offline reconciliation.
    pub async fn set_override(&self, id: &UserId, mode: PresenceMode) -> Result<()> {
        self.cache
            .set(&keys::presence_override(id), mode.as_str(), None)
            .await?;

        if let Err(err) = self.cache.delete(&keys::bundle(id)).await {
            warn!(user_id = %id, error = %err, "Bundle invalidation failed after override");
            self.capture
                .record(FailureEvent::new("presence.set_override", id, &err))
                .await;
        }

        match self.durable.write_presence_preference(id, mode).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(
                    user_id = %id,
                    mode = %mode,
                    error = %err,
                    "Durable presence preference write failed; cache override remains authoritative"
                );
                self.capture
                    .record(FailureEvent::new("presence.set_override", id, &err))
                    .await;
                Err(err)
            }
        }
    }
}

/// Apply the resolution order to the two raw signals.
fn derive(override_value: Option<&str>, heartbeat_present: bool) -> PresenceState {
    match override_value {
        Some("offline") => PresenceState::offline(),
        Some("away") => PresenceState::away(),
        // "real", absent, or an unrecognized stored value all fall through
        // to the heartbeat signal.
        _ => {
            if heartbeat_present {
                PresenceState::online()
            } else {
                PresenceState::offline()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::capture::InMemoryErrorCapture;
    use crate::adapters::memory::{MemoryCacheTier, MemoryDurableTier};
    use crate::domain::ports::PresenceStatus;

    fn resolver() -> (
        PresenceResolver,
        Arc<MemoryCacheTier>,
        Arc<MemoryDurableTier>,
        Arc<InMemoryErrorCapture>,
    ) {
        let cache = Arc::new(MemoryCacheTier::new());
        let durable = Arc::new(MemoryDurableTier::new());
        let capture = Arc::new(InMemoryErrorCapture::new());
        let resolver = PresenceResolver::new(
            cache.clone(),
            durable.clone(),
            capture.clone(),
            StateConfig::default(),
        );
        (resolver, cache, durable, capture)
    }

    fn identity_row(id: &str) -> crate::domain::ports::IdentityRow {
        crate::domain::ports::IdentityRow {
            user_id: id.to_string(),
            username_lower: "alice".to_string(),
            display_name: "Alice Doe".to_string(),
            avatar_url: "/a.png".to_string(),
            role: "member".to_string(),
            is_new_user: false,
            last_activity_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_derive_precedence() {
        // Override offline wins regardless of heartbeat.
        assert_eq!(derive(Some("offline"), true), PresenceState::offline());
        assert_eq!(derive(Some("offline"), false), PresenceState::offline());
        // Override away wins regardless of heartbeat.
        assert_eq!(derive(Some("away"), true), PresenceState::away());
        assert_eq!(derive(Some("away"), false), PresenceState::away());
        // Real / absent fall through to the heartbeat.
        assert_eq!(derive(Some("real"), true), PresenceState::online());
        assert_eq!(derive(Some("real"), false), PresenceState::offline());
        assert_eq!(derive(None, true), PresenceState::online());
        assert_eq!(derive(None, false), PresenceState::offline());
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_offline() {
        let (resolver, _, _, _) = resolver();
        let state = resolver.resolve(&UserId::new("ghost").unwrap()).await;
        assert_eq!(state, PresenceState::offline());
    }

    #[tokio::test]
    async fn test_heartbeat_then_resolve_online() {
        let (resolver, _, _, _) = resolver();
        let id = UserId::new("u1").unwrap();
        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        assert_eq!(resolver.resolve(&id).await, PresenceState::online());
    }

    #[tokio::test]
    async fn test_override_away_without_heartbeat() {
        let (resolver, _, _, _) = resolver();
        let id = UserId::new("u1").unwrap();
        resolver.set_override(&id, PresenceMode::Away).await.ok();

        let state = resolver.resolve(&id).await;
        assert!(state.online);
        assert_eq!(state.status, PresenceStatus::Away);
    }

    #[tokio::test]
    async fn test_override_offline_beats_heartbeat() {
        let (resolver, _, _, _) = resolver();
        let id = UserId::new("u1").unwrap();
        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        resolver.set_override(&id, PresenceMode::Offline).await.ok();

        assert_eq!(resolver.resolve(&id).await, PresenceState::offline());
    }

    #[tokio::test]
    async fn test_override_real_restores_heartbeat_derivation() {
        let (resolver, _, _, _) = resolver();
        let id = UserId::new("u1").unwrap();
        resolver.set_override(&id, PresenceMode::Offline).await.ok();
        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        resolver.set_override(&id, PresenceMode::Real).await.ok();

        assert_eq!(resolver.resolve(&id).await, PresenceState::online());
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_cardinality() {
        let (resolver, _, _, _) = resolver();
        let u1 = UserId::new("u1").unwrap();
        let u2 = UserId::new("u2").unwrap();
        resolver.record_heartbeat(&u1, "conn-1").await.unwrap();

        let states = resolver
            .resolve_batch(&[u1.clone(), u2.clone(), u1.clone()])
            .await
            .unwrap();
        assert_eq!(states.len(), 3);
        assert_eq!(states[0], PresenceState::online());
        assert_eq!(states[1], PresenceState::offline());
        assert_eq!(states[2], PresenceState::online());
    }

    #[tokio::test]
    async fn test_batch_too_large_rejected() {
        let (resolver, _, _, _) = resolver();
        let ids: Vec<UserId> = (0..501)
            .map(|i| UserId::new(format!("u{i}")).unwrap())
            .collect();
        assert!(matches!(
            resolver.resolve_batch(&ids).await,
            Err(Error::BatchTooLarge { len: 501, max: 500 })
        ));
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_offline_and_captures() {
        let (resolver, cache, _, capture) = resolver();
        let id = UserId::new("u1").unwrap();
        resolver.record_heartbeat(&id, "conn-1").await.unwrap();

        cache.set_failing(true);
        let states = resolver.resolve_batch(&[id.clone()]).await.unwrap();
        assert_eq!(states, vec![PresenceState::offline()]);
        assert_eq!(capture.events_for("presence.resolve").len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_fails_when_summary_write_fails() {
        let (resolver, cache, _, _) = resolver();
        let id = UserId::new("u1").unwrap();
        cache.set_failing(true);
        assert!(resolver.record_heartbeat(&id, "conn-1").await.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_swallows_durable_failure() {
        let (resolver, _, durable, capture) = resolver();
        let id = UserId::new("u1").unwrap();
        durable.set_failing(true);

        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        assert_eq!(capture.events_for("presence.heartbeat").len(), 1);
        // The user still resolves online: the cache write went through.
        assert_eq!(resolver.resolve(&id).await, PresenceState::online());
    }

    #[tokio::test]
    async fn test_heartbeat_touches_last_activity_with_throttle() {
        let (resolver, _, durable, _) = resolver();
        let id = UserId::new("u1").unwrap();
        durable.insert_identity(identity_row("u1"));

        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        let first = durable.identity(&id).unwrap().last_activity_at;
        assert!(first.is_some());

        // Second heartbeat inside the throttle window leaves it unchanged.
        resolver.record_heartbeat(&id, "conn-1").await.unwrap();
        assert_eq!(durable.identity(&id).unwrap().last_activity_at, first);
    }

    #[tokio::test]
    async fn test_override_reports_durable_failure_but_cache_wins() {
        let (resolver, _, durable, capture) = resolver();
        let id = UserId::new("u1").unwrap();
        durable.set_failing(true);

        let result = resolver.set_override(&id, PresenceMode::Away).await;
        assert!(result.is_err());
        assert_eq!(capture.events_for("presence.set_override").len(), 1);
        // Runtime behavior already changed: the override is live.
        assert_eq!(resolver.resolve(&id).await, PresenceState::away());
    }

    #[tokio::test]
    async fn test_override_persists_preference() {
        let (resolver, _, durable, _) = resolver();
        let id = UserId::new("u1").unwrap();
        durable.insert_settings(crate::domain::ports::SettingsRow {
            user_id: "u1".to_string(),
            presence_preference: "real".to_string(),
            locale: "en".to_string(),
            notifications: serde_json::json!({}),
            call_prefs: serde_json::json!({}),
            updated_at: Utc::now(),
        });

        resolver.set_override(&id, PresenceMode::Away).await.unwrap();
        assert_eq!(durable.settings_row(&id).unwrap().presence_preference, "away");
    }
}
