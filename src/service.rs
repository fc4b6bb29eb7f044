//! UserState facade
//!
//! Wires the five components over shared tier handles and exposes the
//! operation set consumed by transport collaborators. Each component is
//! also reachable directly for callers that want a narrower dependency.

use std::sync::Arc;

use crate::bundle::BundleCache;
use crate::config::StateConfig;
use crate::domain::ports::{
    Bundle, CacheTier, DurableTier, ErrorCapture, PresenceMode, PresenceState, UserId,
};
use crate::error::Result;
use crate::fields::FieldAccessor;
use crate::presence::PresenceResolver;
use crate::username::{ClaimOutcome, UsernameRegistry};
use crate::views::{ProfileView, SettingsView, UiSummary, Views};

/// Entry point for the user runtime-state layer.
pub struct UserState {
    presence: Arc<PresenceResolver>,
    bundles: Arc<BundleCache>,
    usernames: UsernameRegistry,
    fields: FieldAccessor,
    views: Views,
}

impl UserState {
    /// Build the state layer over concrete tier adapters.
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        capture: Arc<dyn ErrorCapture>,
        config: StateConfig,
    ) -> Self {
        let presence = Arc::new(PresenceResolver::new(
            cache.clone(),
            durable.clone(),
            capture.clone(),
            config.clone(),
        ));
        let bundles = Arc::new(BundleCache::new(
            cache.clone(),
            durable.clone(),
            presence.clone(),
            capture.clone(),
            config.clone(),
        ));
        let usernames = UsernameRegistry::new(
            cache.clone(),
            durable.clone(),
            bundles.clone(),
            capture.clone(),
            config.clone(),
        );
        let fields = FieldAccessor::new(cache, durable.clone(), capture.clone());
        let views = Views::new(bundles.clone(), durable, capture);
        Self {
            presence,
            bundles,
            usernames,
            fields,
            views,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the bundle for one identifier.
    pub async fn get_bundle(&self, id: &UserId) -> Result<Option<Bundle>> {
        self.bundles.get(id).await
    }

    /// Fetch bundles for many identifiers, output aligned with input.
    pub async fn get_bundles(&self, ids: &[UserId]) -> Result<Vec<Bundle>> {
        self.bundles.get_batch(ids).await
    }

    /// Resolve presence for one identifier.
    pub async fn get_presence(&self, id: &UserId) -> PresenceState {
        self.presence.resolve(id).await
    }

    /// Resolve presence for many identifiers, output aligned with input.
    pub async fn get_presence_batch(&self, ids: &[UserId]) -> Result<Vec<PresenceState>> {
        self.presence.resolve_batch(ids).await
    }

    /// Check username availability.
    pub async fn is_username_taken(&self, username: &str) -> bool {
        self.usernames.is_taken(username).await
    }

    /// Read one allow-listed durable field.
    pub async fn get_field(&self, id: &UserId, name: &str) -> Result<Option<serde_json::Value>> {
        self.fields.get_field(id, name).await
    }

    /// Minimal UI summary document.
    pub async fn ui_summary(&self, id: &UserId) -> UiSummary {
        self.views.ui_summary(id).await
    }

    /// Settings document.
    pub async fn settings_view(&self, id: &UserId) -> SettingsView {
        self.views.settings_view(id).await
    }

    /// Public profile document.
    pub async fn profile_view(&self, id: &UserId) -> Result<Option<ProfileView>> {
        self.views.profile_view(id).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Claim a username for an identifier.
    pub async fn claim_username(&self, id: &UserId, username: &str) -> Result<ClaimOutcome> {
        self.usernames.claim(id, username).await
    }

    /// Set the sticky presence override.
    pub async fn set_presence_override(&self, id: &UserId, mode: PresenceMode) -> Result<()> {
        self.presence.set_override(id, mode).await
    }

    /// Record a liveness heartbeat.
    pub async fn record_heartbeat(&self, id: &UserId, connection_id: &str) -> Result<()> {
        self.presence.record_heartbeat(id, connection_id).await
    }

    /// Write one allow-listed durable field.
    pub async fn set_field(
        &self,
        id: &UserId,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        self.fields.set_field(id, name, value).await
    }

    // =========================================================================
    // Component access
    // =========================================================================

    pub fn presence(&self) -> &PresenceResolver {
        &self.presence
    }

    pub fn bundles(&self) -> &BundleCache {
        &self.bundles
    }

    pub fn usernames(&self) -> &UsernameRegistry {
        &self.usernames
    }

    pub fn fields(&self) -> &FieldAccessor {
        &self.fields
    }

    pub fn views(&self) -> &Views {
        &self.views
    }
}
