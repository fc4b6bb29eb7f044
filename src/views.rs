//! View Composers
//!
//! Read-only aggregations assembling UI-facing documents from the bundle
//! cache, the presence resolver (via the bundle merge), and durable columns.
//! All three are tolerant of partial data: a missing durable row yields
//! empty fields, never an error surfacing to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bundle::BundleCache;
use crate::domain::events::FailureEvent;
use crate::domain::ports::{DurableTier, ErrorCapture, PresenceStatus, UserId};
use crate::error::Result;

/// Minimal UI summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSummary {
    pub user_id: String,
    pub display_name: String,
    pub username: String,
    pub avatar: String,
    pub initials: String,
    pub role: String,
    pub is_new_user: bool,
}

/// Settings document, sourced purely from the durable settings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsView {
    pub user_id: String,
    pub locale: String,
    pub notifications: serde_json::Value,
    pub call_prefs: serde_json::Value,
}

/// Public profile document: bundle identity fields plus the extended
/// profile attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileView {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
    pub online: bool,
    pub status: PresenceStatus,
    pub bio: String,
    pub location: String,
    pub website: String,
    pub links: serde_json::Value,
    pub media: serde_json::Value,
}

/// Composes the three UI-facing documents.
pub struct Views {
    bundles: Arc<BundleCache>,
    durable: Arc<dyn DurableTier>,
    capture: Arc<dyn ErrorCapture>,
}

impl Views {
    pub fn new(
        bundles: Arc<BundleCache>,
        durable: Arc<dyn DurableTier>,
        capture: Arc<dyn ErrorCapture>,
    ) -> Self {
        Self {
            bundles,
            durable,
            capture,
        }
    }

    /// Minimal UI summary from the identity row.
    ///
    /// A missing row or a durable failure yields the empty-shaped document.
    pub async fn ui_summary(&self, id: &UserId) -> UiSummary {
        let identity = match self.durable.fetch_identity(id).await {
            Ok(row) => row,
            Err(err) => {
                warn!(user_id = %id, error = %err, "Identity read failed; returning empty summary");
                self.capture
                    .record(FailureEvent::new("views.ui_summary", id, &err))
                    .await;
                None
            }
        };

        match identity {
            Some(row) => UiSummary {
                user_id: row.user_id,
                initials: initials(&row.display_name),
                display_name: row.display_name,
                username: row.username_lower,
                avatar: row.avatar_url,
                role: row.role,
                is_new_user: row.is_new_user,
            },
            None => UiSummary {
                user_id: id.as_str().to_string(),
                display_name: String::new(),
                username: String::new(),
                avatar: String::new(),
                initials: String::new(),
                role: String::new(),
                is_new_user: false,
            },
        }
    }

    /// Settings view from the durable settings row.
    pub async fn settings_view(&self, id: &UserId) -> SettingsView {
        let settings = match self.durable.fetch_settings(id).await {
            Ok(row) => row,
            Err(err) => {
                warn!(user_id = %id, error = %err, "Settings read failed; returning empty view");
                self.capture
                    .record(FailureEvent::new("views.settings", id, &err))
                    .await;
                None
            }
        };

        match settings {
            Some(row) => SettingsView {
                user_id: row.user_id,
                locale: row.locale,
                notifications: row.notifications,
                call_prefs: row.call_prefs,
            },
            None => SettingsView {
                user_id: id.as_str().to_string(),
                locale: String::new(),
                notifications: serde_json::Value::Null,
                call_prefs: serde_json::Value::Null,
            },
        }
    }

    /// Public profile view.
    ///
    /// Identity is the gating entity: if the bundle lookup is absent the
    /// view is absent, even when a durable profile row exists. A missing
    /// profile row only blanks the extended attributes.
    pub async fn profile_view(&self, id: &UserId) -> Result<Option<ProfileView>> {
        let Some(bundle) = self.bundles.get(id).await? else {
            return Ok(None);
        };

        let profile = match self.durable.fetch_profile(id).await {
            Ok(row) => row,
            Err(err) => {
                warn!(user_id = %id, error = %err, "Profile read failed; blanking extended fields");
                self.capture
                    .record(FailureEvent::new("views.profile", id, &err))
                    .await;
                None
            }
        };

        let mut view = ProfileView {
            user_id: bundle.user_id.as_str().to_string(),
            username: bundle.username,
            display_name: bundle.display_name,
            avatar: bundle.avatar,
            online: bundle.online,
            status: bundle.status,
            bio: String::new(),
            location: String::new(),
            website: String::new(),
            links: serde_json::Value::Null,
            media: serde_json::Value::Null,
        };
        if let Some(row) = profile {
            view.bio = row.bio;
            view.location = row.location;
            view.website = row.website;
            view.links = row.links;
            view.media = row.media;
        }
        Ok(Some(view))
    }
}

/// First letter of up to the first two whitespace-delimited tokens,
/// uppercased.
pub fn initials(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .take(2)
        .filter_map(|token| token.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect()
}
