//! End-to-end consistency tests for the user runtime-state core, run over
//! the in-memory tier adapters.

use std::sync::Arc;

use chrono::Utc;

use vitals::adapters::{InMemoryErrorCapture, MemoryCacheTier, MemoryDurableTier};
use vitals::{
    Bundle, CacheTier, Error, IdentityRow, PresenceMode, PresenceState, PresenceStatus,
    SettingsRow, StateConfig, UserId, UserState,
};

struct Harness {
    state: UserState,
    cache: Arc<MemoryCacheTier>,
    durable: Arc<MemoryDurableTier>,
    capture: Arc<InMemoryErrorCapture>,
}

fn harness() -> Harness {
    let cache = Arc::new(MemoryCacheTier::new());
    let durable = Arc::new(MemoryDurableTier::new());
    let capture = Arc::new(InMemoryErrorCapture::new());
    let state = UserState::new(
        cache.clone(),
        durable.clone(),
        capture.clone(),
        StateConfig::default(),
    );
    Harness {
        state,
        cache,
        durable,
        capture,
    }
}

fn identity(id: &str, username: &str, display_name: &str, avatar: &str) -> IdentityRow {
    IdentityRow {
        user_id: id.to_string(),
        username_lower: username.to_string(),
        display_name: display_name.to_string(),
        avatar_url: avatar.to_string(),
        role: "member".to_string(),
        is_new_user: false,
        last_activity_at: None,
        updated_at: Utc::now(),
    }
}

fn settings(id: &str) -> SettingsRow {
    SettingsRow {
        user_id: id.to_string(),
        presence_preference: "real".to_string(),
        locale: "en".to_string(),
        notifications: serde_json::json!({}),
        call_prefs: serde_json::json!({}),
        updated_at: Utc::now(),
    }
}

fn uid(raw: &str) -> UserId {
    UserId::new(raw).unwrap()
}

// =============================================================================
// Bundle read-through
// =============================================================================

mod bundle_tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_everywhere_is_absent_and_offline() {
        let h = harness();
        let ghost = uid("ghost");

        assert!(h.state.get_bundle(&ghost).await.unwrap().is_none());
        assert_eq!(h.state.get_presence(&ghost).await, PresenceState::offline());
    }

    #[tokio::test]
    async fn test_cold_read_hydrates_exactly_once() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));

        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(bundle.username, "alice");
        assert_eq!(bundle.display_name, "Alice Doe");
        assert_eq!(bundle.avatar, "/a.png");
        assert!(!bundle.online);
        assert_eq!(bundle.status, PresenceStatus::Offline);

        // The cache entry is live, so the second read needs no durable tier
        // at all.
        assert!(h.cache.get("cud:u1").await.unwrap().is_some());
        h.durable.set_failing(true);
        let again = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(again.username, "alice");
    }

    #[tokio::test]
    async fn test_batch_output_matches_input_order_and_length() {
        let h = harness();
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));
        h.durable
            .insert_identity(identity("u2", "bob", "Bob Roe", "/b.png"));

        let ids = vec![uid("u2"), uid("ghost"), uid("u1"), uid("u2")];
        let bundles = h.state.get_bundles(&ids).await.unwrap();
        assert_eq!(bundles.len(), 4);
        assert_eq!(bundles[0].username, "bob");
        assert_eq!(bundles[1], Bundle::placeholder(uid("ghost")));
        assert_eq!(bundles[2].username, "alice");
        assert_eq!(bundles[3].username, "bob");
    }

    #[tokio::test]
    async fn test_bundle_merges_live_presence_from_warm_cache() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));

        // Warm the cache while offline, then come online.
        h.state.get_bundle(&u1).await.unwrap();
        h.state.record_heartbeat(&u1, "conn-1").await.unwrap();

        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert!(bundle.online);
        assert_eq!(bundle.status, PresenceStatus::Online);
    }
}

// =============================================================================
// Presence
// =============================================================================

mod presence_tests {
    use super::*;

    #[tokio::test]
    async fn test_override_precedence() {
        let h = harness();
        let u1 = uid("u1");
        h.state.record_heartbeat(&u1, "conn-1").await.unwrap();

        h.state
            .set_presence_override(&u1, PresenceMode::Offline)
            .await
            .ok();
        assert_eq!(h.state.get_presence(&u1).await, PresenceState::offline());

        h.state
            .set_presence_override(&u1, PresenceMode::Away)
            .await
            .ok();
        assert_eq!(h.state.get_presence(&u1).await, PresenceState::away());

        h.state
            .set_presence_override(&u1, PresenceMode::Real)
            .await
            .ok();
        assert_eq!(h.state.get_presence(&u1).await, PresenceState::online());
    }

    #[tokio::test]
    async fn test_override_away_without_any_heartbeat() {
        let h = harness();
        let u1 = uid("u1");
        h.durable.insert_settings(settings("u1"));

        h.state
            .set_presence_override(&u1, PresenceMode::Away)
            .await
            .unwrap();
        let state = h.state.get_presence(&u1).await;
        assert!(state.online);
        assert_eq!(state.status, PresenceStatus::Away);
    }

    #[tokio::test]
    async fn test_batch_presence_alignment() {
        let h = harness();
        h.state
            .record_heartbeat(&uid("u1"), "conn-1")
            .await
            .unwrap();

        let states = h
            .state
            .get_presence_batch(&[uid("ghost"), uid("u1"), uid("ghost")])
            .await
            .unwrap();
        assert_eq!(
            states,
            vec![
                PresenceState::offline(),
                PresenceState::online(),
                PresenceState::offline()
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_mode_is_rejected_at_parse() {
        assert!(matches!(
            "busy".parse::<PresenceMode>(),
            Err(Error::InvalidPresenceMode(_))
        ));
    }
}

// =============================================================================
// Username registry
// =============================================================================

mod username_tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_then_taken() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "", "Alice Doe", "/a.png"));

        assert!(!h.state.is_username_taken("alice").await);
        h.state.claim_username(&u1, "alice").await.unwrap();
        assert!(h.state.is_username_taken("alice").await);
        assert!(!h.state.is_username_taken("never-claimed").await);
    }

    #[tokio::test]
    async fn test_claim_idempotent_and_converged() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "", "Alice Doe", "/a.png"));

        h.state.claim_username(&u1, "alice").await.unwrap();
        h.state.claim_username(&u1, "alice").await.unwrap();

        assert_eq!(
            h.cache.get("username:to:uid:alice").await.unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(
            h.cache.get("uid:to:username:u1").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(h.durable.identity(&u1).unwrap().username_lower, "alice");
    }

    #[tokio::test]
    async fn test_conflict_leaves_both_mappings_untouched() {
        let h = harness();
        let u1 = uid("u1");
        let u2 = uid("u2");
        h.durable
            .insert_identity(identity("u1", "", "Alice Doe", "/a.png"));
        h.durable
            .insert_identity(identity("u2", "", "Bob Roe", "/b.png"));

        h.state.claim_username(&u1, "alice").await.unwrap();
        let err = h.state.claim_username(&u2, "alice").await.unwrap_err();
        assert!(matches!(err, Error::UsernameTaken { .. }));

        assert_eq!(
            h.cache.get("username:to:uid:alice").await.unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(h.cache.get("uid:to:username:u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_two_char_claim_fails_format_and_changes_nothing() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "", "Alice Doe", "/a.png"));

        let err = h.state.claim_username(&u1, "ab").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsername { .. }));
        assert_eq!(h.cache.get("username:to:uid:ab").await.unwrap(), None);
        assert_eq!(h.durable.identity(&u1).unwrap().username_lower, "");
    }

    #[tokio::test]
    async fn test_rename_patches_cached_bundle_in_place() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));

        h.state.get_bundle(&u1).await.unwrap();
        h.state.claim_username(&u1, "alyce").await.unwrap();

        let raw = h.cache.get("cud:u1").await.unwrap().unwrap();
        let cached: Bundle = serde_json::from_str(&raw).unwrap();
        assert_eq!(cached.username, "alyce");
        assert_eq!(cached.display_name, "Alice Doe");

        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(bundle.username, "alyce");
    }
}

// =============================================================================
// Cold-read scenario
// =============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_cold_bundle_scenario() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));

        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(bundle.username, "alice");
        assert_eq!(bundle.display_name, "Alice Doe");
        assert_eq!(bundle.avatar, "/a.png");
        assert!(!bundle.online);
        assert_eq!(bundle.status, PresenceStatus::Offline);

        let raw = h.cache.get("cud:u1").await.unwrap();
        assert!(raw.is_some_and(|r| !r.is_empty()));
    }
}

// =============================================================================
// Degrade-and-capture contract
// =============================================================================

mod degrade_tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_outage_degrades_reads_not_errors() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));
        h.cache.set_failing(true);

        // Presence degrades to offline, bundle still hydrates from the
        // durable tier, availability degrades to taken.
        assert_eq!(h.state.get_presence(&u1).await, PresenceState::offline());
        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(bundle.username, "alice");
        assert!(h.state.is_username_taken("free-name").await);
        assert!(!h.capture.is_empty());
    }

    #[tokio::test]
    async fn test_override_durable_failure_reported_but_committed() {
        let h = harness();
        let u1 = uid("u1");
        h.durable.set_failing(true);

        let result = h
            .state
            .set_presence_override(&u1, PresenceMode::Away)
            .await;
        assert!(result.is_err());
        // The cache-tier override already took effect.
        assert_eq!(h.state.get_presence(&u1).await, PresenceState::away());
        assert!(!h.capture.events_for("presence.set_override").is_empty());
    }

    #[tokio::test]
    async fn test_field_write_invalidates_bundle_synchronously() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "alice", "Alice Doe", "/a.png"));
        h.state.get_bundle(&u1).await.unwrap();

        h.state
            .set_field(&u1, "display_name", &serde_json::json!("New Name"))
            .await
            .unwrap();
        assert!(h.cache.get("cud:u1").await.unwrap().is_none());

        let bundle = h.state.get_bundle(&u1).await.unwrap().unwrap();
        assert_eq!(bundle.display_name, "New Name");
    }

    #[tokio::test]
    async fn test_views_compose_after_mutations() {
        let h = harness();
        let u1 = uid("u1");
        h.durable
            .insert_identity(identity("u1", "", "Alice Doe", "/a.png"));
        h.durable.insert_settings(settings("u1"));

        h.state.claim_username(&u1, "alice").await.unwrap();
        h.state.record_heartbeat(&u1, "conn-1").await.unwrap();

        let summary = h.state.ui_summary(&u1).await;
        assert_eq!(summary.username, "alice");
        assert_eq!(summary.initials, "AD");

        let profile = h.state.profile_view(&u1).await.unwrap().unwrap();
        assert_eq!(profile.username, "alice");
        assert!(profile.online);

        let settings_view = h.state.settings_view(&u1).await;
        assert_eq!(settings_view.locale, "en");
    }
}
