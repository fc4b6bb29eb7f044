//! Vitals - User Runtime-State Core
//!
//! Keeps a fast, ephemeral cache tier (Redis) synchronized with a durable
//! relational tier (Postgres) for three kinds of per-user state: a
//! denormalized summary bundle served to UI surfaces, live presence, and
//! globally unique usernames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   View Composers                │   Field Accessor              │
//! ├─────────────────────────────────┴───────────────────────────────┤
//! │  Presence Resolver  │  Bundle Cache  │  Username Registry       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │       Cache Tier Adapter        │     Durable Tier Adapter      │
//! │           (Redis)               │         (Postgres)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads flow top-down; mutations flow top-down and fan invalidations back
//! to the cache tier. The cache tier is runtime-authoritative for presence
//! and username uniqueness; the durable tier is the record of truth the
//! cache can always be rebuilt from.
//!
//! # Consistency contract
//!
//! - Bundle reads always recompute presence; only the three durable-sourced
//!   fields can go stale, bounded by explicit invalidation or TTL.
//! - Username uniqueness is gated by an atomic set-if-absent on the forward
//!   key, so concurrent claimants cannot both win.
//! - Store failures on read paths degrade to a safe absent/offline result;
//!   failures on write paths are reported without rolling back committed
//!   cache effects. Every such site records a failure event for offline
//!   reconciliation.
//!
//! # Modules
//!
//! - [`adapters`] - infrastructure adapters implementing the domain ports
//! - [`bundle`] - read-through bundle cache
//! - [`config`] - frozen runtime configuration
//! - [`domain`] - ports and failure events
//! - [`error`] - error types
//! - [`fields`] - allow-listed durable field access
//! - [`keys`] - cache-tier key naming scheme
//! - [`presence`] - presence resolution and mutations
//! - [`service`] - the [`UserState`] facade
//! - [`username`] - username registry
//! - [`views`] - UI-facing view composers

pub mod adapters;
pub mod bundle;
pub mod config;
pub mod domain;
pub mod error;
pub mod fields;
pub mod keys;
pub mod presence;
pub mod service;
pub mod username;
pub mod views;

// Re-export commonly used types
pub use bundle::BundleCache;
pub use config::StateConfig;
pub use domain::events::FailureEvent;
pub use domain::ports::{
    Bundle, CacheTier, DurableTier, ErrorCapture, IdentityRow, PresenceMode, PresenceState,
    PresenceStatus, ProfileRow, SettingsRow, Table, UserId,
};
pub use error::{Error, Result};
pub use fields::FieldAccessor;
pub use presence::PresenceResolver;
pub use service::UserState;
pub use username::{ClaimOutcome, UsernameRegistry};
pub use views::{ProfileView, SettingsView, UiSummary, Views};
