//! Postgres Durable Tier Adapter
//!
//! Implements the `DurableTier` port over a sqlx connection pool. Table and
//! column names interpolated into SQL here come exclusively from the
//! allow-listed `Table` enum and `&'static str` columns owned by the field
//! accessor; caller-supplied data only ever travels through bind parameters.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::ports::{
    BundleSource, DurableTier, IdentityRow, PresenceMode, ProfileRow, SettingsRow, Table, UserId,
};
use crate::error::Result;

/// Postgres-backed durable tier.
///
/// Pool construction and schema migration belong to the embedding process;
/// this adapter only issues parameterized row operations.
#[derive(Clone)]
pub struct PostgresDurableTier {
    pool: PgPool,
}

impl PostgresDurableTier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PostgresDurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDurableTier").finish_non_exhaustive()
    }
}

#[async_trait]
impl DurableTier for PostgresDurableTier {
    async fn fetch_identity(&self, id: &UserId) -> Result<Option<IdentityRow>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT user_id, username_lower, display_name, avatar_url, role, is_new_user, \
             last_activity_at, updated_at \
             FROM user_identity WHERE user_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_settings(&self, id: &UserId) -> Result<Option<SettingsRow>> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT user_id, presence_preference, locale, notifications, call_prefs, updated_at \
             FROM user_settings WHERE user_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_profile(&self, id: &UserId) -> Result<Option<ProfileRow>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, bio, location, website, links, media, updated_at \
             FROM user_profile WHERE user_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_bundle_source(&self, id: &UserId) -> Result<Option<BundleSource>> {
        let row = sqlx::query_as::<_, BundleSource>(
            "SELECT username_lower, display_name, avatar_url \
             FROM user_identity WHERE user_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn read_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
    ) -> Result<Option<serde_json::Value>> {
        // to_jsonb gives a uniform JSON view regardless of the column type.
        let sql = format!(
            "SELECT to_jsonb({column}) FROM {table} WHERE user_id = $1",
            column = column,
            table = table.name()
        );
        let value = sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write_column(
        &self,
        id: &UserId,
        table: Table,
        column: &'static str,
        value: &serde_json::Value,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {table} SET {column} = $1, updated_at = NOW() WHERE user_id = $2",
            table = table.name(),
            column = column
        );
        // Bind with the native type so text/bool/numeric columns accept the
        // value; objects and arrays go in as jsonb.
        let query = sqlx::query(&sql);
        let query = match value {
            serde_json::Value::Null => {
                let sql = format!(
                    "UPDATE {table} SET {column} = NULL, updated_at = NOW() WHERE user_id = $1",
                    table = table.name(),
                    column = column
                );
                return Ok(sqlx::query(&sql)
                    .bind(id.as_str())
                    .execute(&self.pool)
                    .await?
                    .rows_affected());
            }
            serde_json::Value::String(s) => query.bind(s.clone()),
            serde_json::Value::Bool(b) => query.bind(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else {
                    query.bind(n.as_f64().unwrap_or(0.0))
                }
            }
            other => query.bind(other.clone()),
        };
        let result = query.bind(id.as_str()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn write_username(&self, id: &UserId, normalized: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE user_identity SET username_lower = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(normalized)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn write_presence_preference(&self, id: &UserId, mode: PresenceMode) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE user_settings SET presence_preference = $1, updated_at = NOW() \
             WHERE user_id = $2",
        )
        .bind(mode.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn touch_last_activity(&self, id: &UserId, throttle: Duration) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_identity SET last_activity_at = NOW() \
             WHERE user_id = $1 \
             AND (last_activity_at IS NULL \
                  OR last_activity_at < NOW() - make_interval(secs => $2))",
        )
        .bind(id.as_str())
        .bind(throttle.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
