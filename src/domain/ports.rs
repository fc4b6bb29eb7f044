//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the core abstractions (ports) that the state layer
//! depends on. Infrastructure adapters implement these traits to provide
//! concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      State Layer                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │   CacheTier  │  DurableTier  │  ErrorCapture         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  RedisCacheTier │ PostgresDurableTier │ Tracing…     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::events::FailureEvent;
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Stable user identifier (value object).
///
/// Opaque string, primary key across both tiers. Validated once at the
/// public boundary so inner layers can trust it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Maximum accepted identifier length.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty()
            || raw.len() > Self::MAX_LEN
            || raw.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidUserId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Explicit presence override mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceMode {
    /// Derive presence from heartbeats.
    Real,
    /// Appear online but away, regardless of heartbeats.
    Away,
    /// Appear offline, regardless of heartbeats.
    Offline,
}

impl PresenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceMode::Real => "real",
            PresenceMode::Away => "away",
            PresenceMode::Offline => "offline",
        }
    }
}

impl FromStr for PresenceMode {
    type Err = Error;

    /// Strict parse; anything outside the three modes is rejected, never
    /// coerced.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "real" => Ok(PresenceMode::Real),
            "away" => Ok(PresenceMode::Away),
            "offline" => Ok(PresenceMode::Offline),
            other => Err(Error::InvalidPresenceMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for PresenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Away => "away",
        };
        write!(f, "{s}")
    }
}

/// Derived presence state; computed at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub online: bool,
    pub status: PresenceStatus,
}

impl PresenceState {
    pub fn online() -> Self {
        Self {
            online: true,
            status: PresenceStatus::Online,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            status: PresenceStatus::Offline,
        }
    }

    /// Away counts as online with an away status.
    pub fn away() -> Self {
        Self {
            online: true,
            status: PresenceStatus::Away,
        }
    }
}

/// Critical user data bundle: the denormalized per-user record served to UI
/// surfaces.
///
/// `username`/`display_name`/`avatar` are durable-sourced; `online`/`status`
/// are recomputed from the presence resolver on every read and must never be
/// trusted from a cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
    pub online: bool,
    pub status: PresenceStatus,
}

impl Bundle {
    /// Compose a bundle from its durable projection and fresh presence.
    pub fn compose(user_id: UserId, source: BundleSource, presence: PresenceState) -> Self {
        Self {
            user_id,
            username: source.username_lower,
            display_name: source.display_name,
            avatar: source.avatar_url,
            online: presence.online,
            status: presence.status,
        }
    }

    /// Empty-shaped placeholder used so batch output stays aligned with
    /// batch input for unknown identifiers.
    pub fn placeholder(user_id: UserId) -> Self {
        Self {
            user_id,
            username: String::new(),
            display_name: String::new(),
            avatar: String::new(),
            online: false,
            status: PresenceStatus::Offline,
        }
    }

    /// Overwrite the presence-derived fields with a freshly resolved state.
    pub fn merge_presence(&mut self, presence: PresenceState) {
        self.online = presence.online;
        self.status = presence.status;
    }
}

/// Minimal identity projection used on bundle hydrate.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BundleSource {
    pub username_lower: String,
    pub display_name: String,
    pub avatar_url: String,
}

// =============================================================================
// Durable Rows
// =============================================================================

/// Identity row: system of record for who a user is.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityRow {
    pub user_id: String,
    pub username_lower: String,
    pub display_name: String,
    pub avatar_url: String,
    pub role: String,
    pub is_new_user: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Settings row, 1:1 with identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingsRow {
    pub user_id: String,
    pub presence_preference: String,
    pub locale: String,
    pub notifications: serde_json::Value,
    pub call_prefs: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Profile row: public profile attributes, 1:1 with identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileRow {
    pub user_id: String,
    pub bio: String,
    pub location: String,
    pub website: String,
    pub links: serde_json::Value,
    pub media: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Allow-listed durable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Identity,
    Settings,
    Profile,
}

impl Table {
    /// SQL relation name. These are compile-time constants, never caller
    /// input.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Identity => "user_identity",
            Table::Settings => "user_settings",
            Table::Profile => "user_profile",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Cache Tier Port
// =============================================================================

/// Port for the fast, TTL-capable key-value store.
///
/// Carries no business meaning; keys and values are opaque strings. The
/// cache tier is runtime-authoritative for presence and username uniqueness
/// and a read-through cache for bundles.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Read a single key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a key, optionally with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically write a key only if it does not exist.
    ///
    /// Returns true if the write happened. This is the uniqueness gate for
    /// username claims.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Read many keys in one round trip; output aligned with input.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

// =============================================================================
// Durable Tier Port
// =============================================================================

/// Port for the relational store of record.
///
/// Parameterized row operations against the identity, settings, and profile
/// tables, keyed by user identifier.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Fetch the full identity row.
    async fn fetch_identity(&self, id: &UserId) -> Result<Option<IdentityRow>>;

    /// Fetch the settings row.
    async fn fetch_settings(&self, id: &UserId) -> Result<Option<SettingsRow>>;

    /// Fetch the profile row.
    async fn fetch_profile(&self, id: &UserId) -> Result<Option<ProfileRow>>;

    /// Fetch the minimal three-column projection used on bundle hydrate.
    async fn fetch_bundle_source(&self, id: &UserId) -> Result<Option<BundleSource>>;

    /// Read one allow-listed column as JSON. `None` means no row.
    async fn read_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
    ) -> Result<Option<serde_json::Value>>;

    /// Write one allow-listed column and refresh the row's update timestamp.
    ///
    /// Returns the affected-row count.
    async fn write_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
        value: &serde_json::Value,
    ) -> Result<u64>;

    /// Persist the normalized username into the identity row.
    async fn write_username(&self, id: &UserId, normalized: &str) -> Result<u64>;

    /// Persist the presence preference into the settings row.
    ///
    /// Stored for rebuild purposes only; never read back at resolution time.
    async fn write_presence_preference(&self, id: &UserId, mode: PresenceMode) -> Result<u64>;

    /// Refresh the last-activity timestamp if it is null or older than the
    /// throttle window. Returns true if a write happened.
    async fn touch_last_activity(&self, id: &UserId, throttle: Duration) -> Result<bool>;
}

// =============================================================================
// Error Capture Port
// =============================================================================

/// Port for the error-capture collaborator.
///
/// Every degraded read, swallowed write failure, and reported-but-committed
/// divergence is recorded here with the operation name and the identifiers
/// involved, for offline reconciliation. Recording is infallible by
/// contract: a capture backend must never fail the operation it is
/// observing.
#[async_trait]
pub trait ErrorCapture: Send + Sync {
    /// Record a failure event.
    async fn record(&self, event: FailureEvent);
}

// =============================================================================
// Tests
// =============================================================================
