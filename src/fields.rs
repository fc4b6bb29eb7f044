//! Field Accessor
//!
//! Generic single-column read/write against the durable tier, constrained to
//! a fixed allow-list built at first use. Logical field names map to a
//! concrete (table, column) pair; nothing caller-supplied is ever spliced
//! into SQL. Writes to bundle-visible columns invalidate the cached bundle
//! synchronously before the call reports success.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::domain::events::FailureEvent;
use crate::domain::ports::{CacheTier, DurableTier, ErrorCapture, Table, UserId};
use crate::error::{Error, Result};
use crate::keys;

/// Resolved target of a logical field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub table: Table,
    pub column: &'static str,
    /// Whether a write to this column must invalidate the cached bundle.
    pub invalidates_bundle: bool,
}

/// The allow-list. `username` is deliberately absent: renames must go
/// through the registry so the forward/reverse mapping stays consistent.
static ALLOWED_FIELDS: Lazy<HashMap<&'static str, FieldSpec>> = Lazy::new(|| {
    let mut map = HashMap::new();
    let mut field = |name, table, column, invalidates_bundle| {
        map.insert(
            name,
            FieldSpec {
                table,
                column,
                invalidates_bundle,
            },
        );
    };

    field("display_name", Table::Identity, "display_name", true);
    field("avatar", Table::Identity, "avatar_url", true);
    field("role", Table::Identity, "role", false);
    field("is_new_user", Table::Identity, "is_new_user", false);

    field("locale", Table::Settings, "locale", false);
    field("notifications", Table::Settings, "notifications", false);
    field("call_prefs", Table::Settings, "call_prefs", false);
    field(
        "presence_preference",
        Table::Settings,
        "presence_preference",
        false,
    );

    field("bio", Table::Profile, "bio", false);
    field("location", Table::Profile, "location", false);
    field("website", Table::Profile, "website", false);
    field("links", Table::Profile, "links", false);
    field("media", Table::Profile, "media", false);

    map
});

/// Look up a logical field name in the allow-list.
pub fn field_spec(name: &str) -> Result<FieldSpec> {
    ALLOWED_FIELDS
        .get(name)
        .copied()
        .ok_or_else(|| Error::FieldNotAllowed {
            field: name.to_string(),
        })
}

/// Allow-listed single-column access to the durable tier.
pub struct FieldAccessor {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    capture: Arc<dyn ErrorCapture>,
}

impl FieldAccessor {
    pub fn new(
        cache: Arc<dyn CacheTier>,
        durable: Arc<dyn DurableTier>,
        capture: Arc<dyn ErrorCapture>,
    ) -> Self {
        Self {
            cache,
            durable,
            capture,
        }
    }

    /// Read one field as JSON.
    ///
    /// `Ok(None)` covers both a missing row and a durable-tier failure: this
    /// is a read path, and store errors degrade to absent.
    pub async fn get_field(&self, id: &UserId, name: &str) -> Result<Option<serde_json::Value>> {
        let spec = field_spec(name)?;
        match self.durable.read_column(id, spec.table, spec.column).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(user_id = %id, field = name, error = %err, "Field read failed; degrading to absent");
                self.capture
                    .record(FailureEvent::new("fields.get", id, &err))
                    .await;
                Ok(None)
            }
        }
    }

    /// Write one field, refreshing the row's update timestamp.
    ///
    /// For bundle-visible columns the cached bundle is deleted before the
    /// call returns success; if that invalidation fails, the call fails even
    /// though the durable write committed, and the divergence is captured.
    pub async fn set_field(
        &self,
        id: &UserId,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        let spec = field_spec(name)?;
        let affected = self
            .durable
            .write_column(id, spec.table, spec.column, value)
            .await?;
        if affected == 0 {
            return Err(Error::NotFound {
                entity: spec.table.name(),
                user_id: id.as_str().to_string(),
            });
        }

        if spec.invalidates_bundle {
            if let Err(err) = self.cache.delete(&keys::bundle(id)).await {
                warn!(user_id = %id, field = name, error = %err, "Bundle invalidation failed after field write");
                self.capture
                    .record(FailureEvent::new("fields.set", id, &err))
                    .await;
                return Err(err);
            }
        }
        Ok(())
    }
}
