//! In-Memory Adapters
//!
//! Implement the `CacheTier` and `DurableTier` ports over process-local
//! maps. Used by the test suite and by embedders that want the state layer
//! without external stores. Both adapters carry a failure switch so tests
//! can exercise the degrade paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;

use crate::domain::ports::{
    BundleSource, CacheTier, DurableTier, IdentityRow, PresenceMode, ProfileRow, SettingsRow,
    Table, UserId,
};
use crate::error::{Error, Result};

// =============================================================================
// Cache Tier
// =============================================================================

/// In-memory cache tier with TTL expiry.
#[derive(Default)]
pub struct MemoryCacheTier {
    entries: RwLock<HashMap<String, (String, Option<Instant>)>>,
    failing: AtomicBool,
}

impl MemoryCacheTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|(_, exp)| exp.map_or(true, |e| e > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Store("memory cache tier failing".into()))
        } else {
            Ok(())
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.read();
        match entries.get(key) {
            Some((value, exp)) if exp.map_or(true, |e| e > now) => Some(value.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl CacheTier for MemoryCacheTier {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        let expires = ttl.map(|t| Instant::now() + t);
        self.entries
            .write()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        self.check()?;
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        self.entries
            .write()
            .insert(key.to_string(), (value.to_string(), None));
        Ok(true)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        Ok(keys.iter().map(|k| self.live_value(k)).collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.write().remove(key);
        Ok(())
    }
}

// =============================================================================
// Durable Tier
// =============================================================================

/// In-memory durable tier over the three user tables.
#[derive(Default)]
pub struct MemoryDurableTier {
    identities: RwLock<HashMap<String, IdentityRow>>,
    settings: RwLock<HashMap<String, SettingsRow>>,
    profiles: RwLock<HashMap<String, ProfileRow>>,
    failing: AtomicBool,
}

impl MemoryDurableTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed an identity row.
    pub fn insert_identity(&self, row: IdentityRow) {
        self.identities.write().insert(row.user_id.clone(), row);
    }

    /// Seed a settings row.
    pub fn insert_settings(&self, row: SettingsRow) {
        self.settings.write().insert(row.user_id.clone(), row);
    }

    /// Seed a profile row.
    pub fn insert_profile(&self, row: ProfileRow) {
        self.profiles.write().insert(row.user_id.clone(), row);
    }

    /// Snapshot an identity row for assertions.
    pub fn identity(&self, id: &UserId) -> Option<IdentityRow> {
        self.identities.read().get(id.as_str()).cloned()
    }

    /// Snapshot a settings row for assertions.
    pub fn settings_row(&self, id: &UserId) -> Option<SettingsRow> {
        self.settings.read().get(id.as_str()).cloned()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Store("memory durable tier failing".into()))
        } else {
            Ok(())
        }
    }

    /// Row as a JSON object, for generic column access.
    fn row_value(&self, id: &UserId, table: Table) -> Result<Option<serde_json::Value>> {
        let value = match table {
            Table::Identity => self
                .identities
                .read()
                .get(id.as_str())
                .map(serde_json::to_value),
            Table::Settings => self
                .settings
                .read()
                .get(id.as_str())
                .map(serde_json::to_value),
            Table::Profile => self
                .profiles
                .read()
                .get(id.as_str())
                .map(serde_json::to_value),
        };
        value.transpose().map_err(Error::from)
    }
}

#[async_trait]
impl DurableTier for MemoryDurableTier {
    async fn fetch_identity(&self, id: &UserId) -> Result<Option<IdentityRow>> {
        self.check()?;
        Ok(self.identities.read().get(id.as_str()).cloned())
    }

    async fn fetch_settings(&self, id: &UserId) -> Result<Option<SettingsRow>> {
        self.check()?;
        Ok(self.settings.read().get(id.as_str()).cloned())
    }

    async fn fetch_profile(&self, id: &UserId) -> Result<Option<ProfileRow>> {
        self.check()?;
        Ok(self.profiles.read().get(id.as_str()).cloned())
    }

    async fn fetch_bundle_source(&self, id: &UserId) -> Result<Option<BundleSource>> {
        self.check()?;
        Ok(self
            .identities
            .read()
            .get(id.as_str())
            .map(|row| BundleSource {
                username_lower: row.username_lower.clone(),
                display_name: row.display_name.clone(),
                avatar_url: row.avatar_url.clone(),
            }))
    }

    async fn read_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
    ) -> Result<Option<serde_json::Value>> {
        self.check()?;
        match self.row_value(id, table)? {
            Some(row) => Ok(Some(row.get(column).cloned().unwrap_or(
                serde_json::Value::Null,
            ))),
            None => Ok(None),
        }
    }

    async fn write_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
        value: &serde_json::Value,
    ) -> Result<u64> {
        self.check()?;
        let Some(mut row) = self.row_value(id, table)? else {
            return Ok(0);
        };
        row[column] = value.clone();
        row["updated_at"] = serde_json::to_value(Utc::now())?;
        match table {
            Table::Identity => {
                let row: IdentityRow = serde_json::from_value(row)?;
                self.identities.write().insert(row.user_id.clone(), row);
            }
            Table::Settings => {
                let row: SettingsRow = serde_json::from_value(row)?;
                self.settings.write().insert(row.user_id.clone(), row);
            }
            Table::Profile => {
                let row: ProfileRow = serde_json::from_value(row)?;
                self.profiles.write().insert(row.user_id.clone(), row);
            }
        }
        Ok(1)
    }

    async fn write_username(&self, id: &UserId, normalized: &str) -> Result<u64> {
        self.check()?;
        let mut identities = self.identities.write();
        match identities.get_mut(id.as_str()) {
            Some(row) => {
                row.username_lower = normalized.to_string();
                row.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn write_presence_preference(&self, id: &UserId, mode: PresenceMode) -> Result<u64> {
        self.check()?;
        let mut settings = self.settings.write();
        match settings.get_mut(id.as_str()) {
            Some(row) => {
                row.presence_preference = mode.as_str().to_string();
                row.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn touch_last_activity(&self, id: &UserId, throttle: Duration) -> Result<bool> {
        self.check()?;
        let mut identities = self.identities.write();
        let Some(row) = identities.get_mut(id.as_str()) else {
            return Ok(false);
        };
        let cutoff = Utc::now()
            - ChronoDuration::from_std(throttle).unwrap_or_else(|_| ChronoDuration::zero());
        let stale = row.last_activity_at.map_or(true, |at| at < cutoff);
        if stale {
            row.last_activity_at = Some(Utc::now());
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_row(id: &str, username: &str) -> IdentityRow {
        IdentityRow {
            user_id: id.to_string(),
            username_lower: username.to_string(),
            display_name: "Test User".to_string(),
            avatar_url: "/t.png".to_string(),
            role: "member".to_string(),
            is_new_user: false,
            last_activity_at: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let cache = MemoryCacheTier::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_set_if_absent() {
        let cache = MemoryCacheTier::new();
        assert!(cache.set_if_absent("k", "first").await.unwrap());
        assert!(!cache.set_if_absent("k", "second").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_cache_multi_get_alignment() {
        let cache = MemoryCacheTier::new();
        cache.set("a", "1", None).await.unwrap();
        cache.set("c", "3", None).await.unwrap();

        let got = cache
            .multi_get(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some("1".into()), None, Some("3".into())]);
    }

    #[tokio::test]
    async fn test_cache_failure_switch() {
        let cache = MemoryCacheTier::new();
        cache.set_failing(true);
        assert!(cache.get("k").await.is_err());
        cache.set_failing(false);
        assert!(cache.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_generic_column_roundtrip() {
        let durable = MemoryDurableTier::new();
        let id = UserId::new("u1").unwrap();
        durable.insert_identity(identity_row("u1", "alice"));

        let affected = durable
            .write_column(
                &id,
                Table::Identity,
                "display_name",
                &serde_json::json!("New Name"),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let value = durable
            .read_column(&id, Table::Identity, "display_name")
            .await
            .unwrap();
        assert_eq!(value, Some(serde_json::json!("New Name")));
    }

    #[tokio::test]
    async fn test_write_column_missing_row() {
        let durable = MemoryDurableTier::new();
        let id = UserId::new("ghost").unwrap();
        let affected = durable
            .write_column(&id, Table::Identity, "display_name", &serde_json::json!("x"))
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_touch_last_activity_throttles() {
        let durable = MemoryDurableTier::new();
        let id = UserId::new("u1").unwrap();
        durable.insert_identity(identity_row("u1", "alice"));

        // Null timestamp: first touch writes.
        assert!(durable
            .touch_last_activity(&id, Duration::from_secs(60))
            .await
            .unwrap());
        // Fresh timestamp: second touch is throttled.
        assert!(!durable
            .touch_last_activity(&id, Duration::from_secs(60))
            .await
            .unwrap());
        // Zero window: always stale.
        assert!(durable
            .touch_last_activity(&id, Duration::ZERO)
            .await
            .unwrap());
    }
}
