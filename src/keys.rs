//! Cache-tier key naming scheme.
//!
//! The formats here are part of the external contract: operational tooling
//! inspects the cache tier by these exact patterns, so they must not drift.

use crate::domain::ports::UserId;

/// Key for the cached critical user data bundle.
pub fn bundle(id: &UserId) -> String {
    format!("cud:{}", id.as_str())
}

/// Key for the short-TTL heartbeat summary marker.
pub fn presence_summary(id: &UserId) -> String {
    format!("presence:summary:user:{}", id.as_str())
}

/// Key for the sticky presence override.
pub fn presence_override(id: &UserId) -> String {
    format!("presence:override:user:{}", id.as_str())
}

/// Forward username map: normalized username to owning identifier.
pub fn username_to_uid(normalized: &str) -> String {
    format!("username:to:uid:{normalized}")
}

/// Reverse username mirror: identifier to its normalized username.
pub fn uid_to_username(id: &UserId) -> String {
    format!("uid:to:username:{}", id.as_str())
}
