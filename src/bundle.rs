//! Bundle Cache (Critical User Data)
//!
//! Cache-aside read-through for the denormalized per-user bundle. The three
//! durable-sourced fields (username, display name, avatar) are cached with a
//! TTL; the presence fields are recomputed from the resolver on every read
//! and are never served from a cached copy.

use std::sync::Arc;

use tracing::warn;

use crate::config::StateConfig;
use crate::domain::events::FailureEvent;
use crate::domain::ports::{Bundle, CacheTier, DurableTier, ErrorCapture, UserId};
use crate::error::{Error, Result};
use crate::keys;
use crate::presence::PresenceResolver;

/// Read-through cache for user bundles.
pub struct BundleCache {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    presence: Arc<PresenceResolver>,
    capture: Arc<dyn ErrorCapture>,
    config: StateConfig,
}

impl BundleCache {
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        presence: Arc<PresenceResolver>,
        capture: Arc<dyn ErrorCapture>,
        config: StateConfig,
    ) -> Self {
        Self {
            cache,
            durable,
            presence,
            capture,
            config,
        }
    }

    /// Get the bundle for one identifier.
    ///
    /// Cache hit: decode the cached copy and overwrite its presence fields
    /// with a fresh resolve. Cache miss: hydrate from the minimal durable
    /// projection, compose with fresh presence, write back with the bundle
    /// TTL. No durable row means absent. Store failures on this read path
    /// degrade to absent rather than surfacing.
    pub async fn get(&self, id: &UserId) -> Result<Option<Bundle>> {
        let key = keys::bundle(id);

        let cached = match self.cache.get(&key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(user_id = %id, error = %err, "Bundle cache read failed; hydrating from durable");
                self.capture
                    .record(FailureEvent::new("bundle.get", id, &err))
                    .await;
                None
            }
        };

        if let Some(raw) = cached {
            match serde_json::from_str::<Bundle>(&raw) {
                Ok(mut bundle) => {
                    bundle.merge_presence(self.presence.resolve(id).await);
                    return Ok(Some(bundle));
                }
                Err(err) => {
                    // Corrupt payload: treat as a miss and re-hydrate over it.
                    warn!(user_id = %id, error = %err, "Cached bundle undecodable; rehydrating");
                    self.capture
                        .record(FailureEvent::new("bundle.decode", id, &err))
                        .await;
                }
            }
        }

        self.hydrate(id, &key).await
    }

    /// Get bundles for many identifiers.
    ///
    /// One multi-get across all bundle keys; hits are presence-merged via a
    /// single batch resolve, misses are hydrated through the single-item
    /// path. Output length and order always match the input, duplicates
    /// included; unknown identifiers yield an empty-shaped placeholder.
    pub async fn get_batch(&self, ids: &[UserId]) -> Result<Vec<Bundle>> {
        if ids.len() > self.config.max_batch {
            return Err(Error::BatchTooLarge {
                len: ids.len(),
                max: self.config.max_batch,
            });
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let cache_keys: Vec<String> = ids.iter().map(keys::bundle).collect();
        let cached = match self.cache.multi_get(&cache_keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(error = %err, "Bundle batch read failed; hydrating all from durable");
                self.capture
                    .record(FailureEvent::batch("bundle.get_batch", ids, &err))
                    .await;
                vec![None; ids.len()]
            }
        };

        // Decode hits; anything undecodable joins the miss set.
        let mut slots: Vec<Option<Bundle>> = cached
            .into_iter()
            .map(|raw| raw.and_then(|r| serde_json::from_str::<Bundle>(&r).ok()))
            .collect();

        // One presence resolve covering the hits, merged in place.
        let hit_ids: Vec<UserId> = ids
            .iter()
            .zip(slots.iter())
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        if !hit_ids.is_empty() {
            let states = self.presence.resolve_batch(&hit_ids).await?;
            let mut states = states.into_iter();
            for slot in slots.iter_mut().flatten() {
                if let Some(state) = states.next() {
                    slot.merge_presence(state);
                }
            }
        }

        let mut out = Vec::with_capacity(ids.len());
        for (id, slot) in ids.iter().zip(slots.into_iter()) {
            match slot {
                Some(bundle) => out.push(bundle),
                None => match self.get(id).await? {
                    Some(bundle) => out.push(bundle),
                    None => out.push(Bundle::placeholder(id.clone())),
                },
            }
        }
        Ok(out)
    }

    /// Drop the cached bundle for an identifier.
    ///
    /// Called by every mutation that changes a bundle-visible durable column
    /// or a presence signal.
    pub async fn invalidate(&self, id: &UserId) -> Result<()> {
        self.cache.delete(&keys::bundle(id)).await
    }

    /// Patch the username field of a cached bundle in place, rewriting it
    /// with a fresh TTL.
    ///
    /// This is the one mutation that patches rather than invalidates: after
    /// a rename the other durable-sourced fields are still valid. A missing
    /// or undecodable entry is simply dropped so the next read re-hydrates.
    pub async fn patch_username(&self, id: &UserId, username: &str) -> Result<()> {
        let key = keys::bundle(id);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(());
        };
        match serde_json::from_str::<Bundle>(&raw) {
            Ok(mut bundle) => {
                bundle.username = username.to_string();
                let encoded = serde_json::to_string(&bundle)?;
                self.cache
                    .set(&key, &encoded, Some(self.config.bundle_ttl))
                    .await
            }
            Err(_) => self.cache.delete(&key).await,
        }
    }

    /// Miss path: minimal durable projection, fresh presence, write back.
    async fn hydrate(&self, id: &UserId, key: &str) -> Result<Option<Bundle>> {
        let source = match self.durable.fetch_bundle_source(id).await {
            Ok(source) => source,
            Err(err) => {
                warn!(user_id = %id, error = %err, "Bundle hydrate failed; degrading to absent");
                self.capture
                    .record(FailureEvent::new("bundle.hydrate", id, &err))
                    .await;
                return Ok(None);
            }
        };
        let Some(source) = source else {
            return Ok(None);
        };

        let presence = self.presence.resolve(id).await;
        let bundle = Bundle::compose(id.clone(), source, presence);

        match serde_json::to_string(&bundle) {
            Ok(encoded) => {
                if let Err(err) = self
                    .cache
                    .set(key, &encoded, Some(self.config.bundle_ttl))
                    .await
                {
                    warn!(user_id = %id, error = %err, "Bundle write-back failed");
                    self.capture
                        .record(FailureEvent::new("bundle.hydrate", id, &err))
                        .await;
                }
            }
            Err(err) => {
                self.capture
                    .record(FailureEvent::new("bundle.hydrate", id, &err))
                    .await;
            }
        }

        Ok(Some(bundle))
    }
}
