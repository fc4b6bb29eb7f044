//! Username Registry
//!
//! Enforces global uniqueness of normalized usernames through a forward map
//! (username to identifier) and a reverse mirror (identifier to username) in
//! the cache tier, with a durable mirror column. The cache tier is the
//! runtime authority; the atomic set-if-absent on the forward key is the
//! uniqueness gate, which closes the check-then-act race between concurrent
//! claimants.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bundle::BundleCache;
use crate::config::StateConfig;
use crate::domain::events::FailureEvent;
use crate::domain::ports::{CacheTier, DurableTier, ErrorCapture, UserId};
use crate::error::{Error, Result};
use crate::keys;

/// Username format policy bounds.
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

/// Outcome of a successful claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    /// The normalized username now owned by the claimant.
    pub username: String,
    /// The claimant's previous normalized username, if any.
    pub previous_username: Option<String>,
}

/// Registry of globally unique usernames.
pub struct UsernameRegistry {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    bundles: Arc<BundleCache>,
    capture: Arc<dyn ErrorCapture>,
    #[allow(dead_code)]
    config: StateConfig,
}

impl UsernameRegistry {
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        bundles: Arc<BundleCache>,
        capture: Arc<dyn ErrorCapture>,
        config: StateConfig,
    ) -> Self {
        Self {
            cache,
            durable,
            bundles,
            capture,
            config,
        }
    }

    /// Check whether a username is unavailable.
    ///
    /// Pure cache-tier read. A username failing the format policy is
    /// reported as taken, since it can never be claimed; for the same
    /// reason a cache-tier read failure also degrades to taken.
    pub async fn is_taken(&self, username: &str) -> bool {
        let normalized = normalize(username);
        if validate_format(&normalized).is_err() {
            return true;
        }
        match self.cache.get(&keys::username_to_uid(&normalized)).await {
            Ok(owner) => owner.is_some(),
            Err(err) => {
                warn!(username = %normalized, error = %err, "Availability check failed; reporting taken");
                self.capture
                    .record(FailureEvent {
                        operation: "username.is_taken",
                        user_ids: Vec::new(),
                        detail: err.to_string(),
                        at: chrono::Utc::now(),
                    })
                    .await;
                true
            }
        }
    }

    /// Claim a username for an identifier.
    ///
    /// The forward-key set-if-absent is the uniqueness gate: losing it to a
    /// different owner is the conflict signal. From the durable write
    /// onward, a failure leaves the cache tier authoritative and the durable
    /// tier stale; the divergence is captured and the call reports failure,
    /// but nothing is rolled back.
    ///
    /// Idempotent for the same `(id, username)` pair.
    pub async fn claim(&self, id: &UserId, username: &str) -> Result<ClaimOutcome> {
        let normalized = normalize(username);
        validate_format(&normalized)?;

        let forward_key = keys::username_to_uid(&normalized);
        let won = self.cache.set_if_absent(&forward_key, id.as_str()).await?;
        if !won {
            match self.cache.get(&forward_key).await? {
                Some(owner) if owner != id.as_str() => {
                    return Err(Error::UsernameTaken {
                        username: normalized,
                    });
                }
                // Already ours (re-claim) or deleted in the meantime;
                // either way the writes below converge the registry.
                _ => {}
            }
        }

        match self.finish_claim(id, &normalized, &forward_key).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(
                    user_id = %id,
                    username = %normalized,
                    error = %err,
                    "Claim failed after the forward entry was gated; cache remains authoritative"
                );
                self.capture
                    .record(FailureEvent::new("username.claim", id, &err))
                    .await;
                Err(err)
            }
        }
    }

    /// Steps after the uniqueness gate has admitted the claimant.
    async fn finish_claim(
        &self,
        id: &UserId,
        normalized: &str,
        forward_key: &str,
    ) -> Result<ClaimOutcome> {
        let reverse_key = keys::uid_to_username(id);
        let previous = self.cache.get(&reverse_key).await?;

        self.cache.set(forward_key, id.as_str(), None).await?;
        self.cache.set(&reverse_key, normalized, None).await?;

        let affected = self.durable.write_username(id, normalized).await?;
        if affected == 0 {
            return Err(Error::NotFound {
                entity: "identity",
                user_id: id.as_str().to_string(),
            });
        }

        // The other bundle fields are still valid after a rename, so the
        // cached entry is patched in place instead of invalidated.
        if let Err(err) = self.bundles.patch_username(id, normalized).await {
            warn!(user_id = %id, error = %err, "Bundle patch failed after claim");
            self.capture
                .record(FailureEvent::new("username.claim", id, &err))
                .await;
        }

        // Free the old forward entry, but only if it still points at the
        // claimant; another process may have reassigned it since.
        if let Some(prev) = previous.as_deref() {
            if prev != normalized {
                let old_forward = keys::username_to_uid(prev);
                match self.cache.get(&old_forward).await {
                    Ok(Some(owner)) if owner == id.as_str() => {
                        if let Err(err) = self.cache.delete(&old_forward).await {
                            self.capture
                                .record(FailureEvent::new("username.claim", id, &err))
                                .await;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        self.capture
                            .record(FailureEvent::new("username.claim", id, &err))
                            .await;
                    }
                }
            }
        }

        Ok(ClaimOutcome {
            username: normalized.to_string(),
            previous_username: previous,
        })
    }
}

/// Normalize a requested username: trim and lowercase.
pub fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Apply the format policy: length 3-30, characters `[A-Za-z0-9._-]`.
pub fn validate_format(normalized: &str) -> Result<()> {
    if normalized.len() < USERNAME_MIN_LEN || normalized.len() > USERNAME_MAX_LEN {
        return Err(Error::InvalidUsername {
            reason: format!(
                "length must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN}, got {}",
                normalized.len()
            ),
        });
    }
    if let Some(bad) = normalized
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::InvalidUsername {
            reason: format!("character {bad:?} is not allowed"),
        });
    }
    Ok(())
}
