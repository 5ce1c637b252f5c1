//! Persistent store client (spec §6) and Config Loader (spec §4.9).
//!
//! The core only ever reads `guild_onboarding_config`; writes happen in the
//! admin wizard, out of core scope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use sqlx::Row;
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, RoleMarker},
    Id,
};

use crate::cache::{keys, Cache};
use crate::error::{Error, Result};

/// Guild Onboarding Config (spec §3), cached per-guild with no expiry,
/// invalidated explicitly on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildOnboardingConfig {
    pub guild_id: Id<GuildMarker>,
    pub entry_channel_id: Id<ChannelMarker>,
    pub voice_category_id: Id<ChannelMarker>,
    pub entrance_role: Option<Id<RoleMarker>>,
    pub in_progress_role: Option<Id<RoleMarker>>,
    pub completed_role: Option<Id<RoleMarker>>,
    pub milestone_roles: HashMap<String, Id<RoleMarker>>,
    pub attribute_roles: HashMap<String, Id<RoleMarker>>,
}

/// Thin client over the persistent store.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Store> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Store { pool })
    }

    async fn query_row(&self, guild_id: Id<GuildMarker>) -> Result<Option<GuildOnboardingConfig>> {
        let row = sqlx::query(
            "SELECT entry_channel_id, voice_category_id, entrance_role, in_progress_role, \
             completed_role, milestone_roles, attribute_roles \
             FROM guild_onboarding_config WHERE guild_id = $1",
        )
        .bind(guild_id.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let milestone_roles: serde_json::Value = row.try_get("milestone_roles")?;
        let attribute_roles: serde_json::Value = row.try_get("attribute_roles")?;

        Ok(Some(GuildOnboardingConfig {
            guild_id,
            entry_channel_id: Id::new(row.try_get::<i64, _>("entry_channel_id")? as u64),
            voice_category_id: Id::new(row.try_get::<i64, _>("voice_category_id")? as u64),
            entrance_role: optional_role(row.try_get("entrance_role")?),
            in_progress_role: optional_role(row.try_get("in_progress_role")?),
            completed_role: optional_role(row.try_get("completed_role")?),
            milestone_roles: serde_json::from_value(milestone_roles).unwrap_or_default(),
            attribute_roles: serde_json::from_value(attribute_roles).unwrap_or_default(),
        }))
    }
}

fn optional_role(raw: Option<i64>) -> Option<Id<RoleMarker>> {
    raw.map(|v| Id::new(v as u64))
}

/// Config Loader (spec §4.9). Read path: cache (no expiry) -> DB on miss ->
/// populate cache.
#[derive(Clone)]
pub struct ConfigLoader {
    cache: Cache,
    store: Store,
}

impl ConfigLoader {
    pub fn new(cache: Cache, store: Store) -> ConfigLoader {
        ConfigLoader { cache, store }
    }

    /// Loads the onboarding config for a guild, or
    /// [`Error::ConfigMissing`] if no row exists.
    pub async fn load(&self, guild_id: Id<GuildMarker>) -> Result<GuildOnboardingConfig> {
        let key = keys::onboarding_config(guild_id);

        if let Some(config) = self.cache.get_json::<GuildOnboardingConfig>(&key).await.ok().flatten() {
            return Ok(config);
        }

        let config = self
            .store
            .query_row(guild_id)
            .await?
            .ok_or(Error::ConfigMissing)?;

        let _ = self.cache.set_json(&key, &config, None).await;

        Ok(config)
    }

    /// Explicitly invalidates the cached config for a guild (called by the
    /// admin wizard on change; out of core scope to trigger it, but the
    /// core must expose the operation).
    pub async fn invalidate(&self, guild_id: Id<GuildMarker>) -> Result<()> {
        self.cache.delete(&keys::onboarding_config(guild_id)).await?;
        Ok(())
    }
}
