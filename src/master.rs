//! Master Dispatcher (spec §4.8): runs in the gateway-facing process that
//! owns the entrance channel. On an entrance interaction it picks a worker,
//! marks it busy, and enqueues an `onboarding_start` task — it never touches
//! a session directly.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use twilight_model::id::{
    marker::{GuildMarker, UserMarker},
    Id,
};

use crate::constants::MASTER_BUSY_TTL;
use crate::db::GuildOnboardingConfig;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::queue::{Queue, StartPayload, Task};
use crate::registry::Registry;
use crate::session::SessionStore;

/// The entrance button's fixed custom id, posted into the configured entry
/// channel by the admin wizard (out of core scope). Distinct from the
/// colon-delimited per-session action-token grammar (spec §4.7), since it
/// fires before any session — and therefore any per-user token — exists.
pub const ENTRANCE_CUSTOM_ID: &str = "onboarding_entrance:start";

/// The known, statically-configured pool of worker ids this deployment can
/// dispatch to (spec §4.2: the registry holds no durable membership, so the
/// master supplies the candidate set).
#[derive(Clone)]
pub struct WorkerPool {
    pub worker_ids: Vec<String>,
}

#[derive(Clone)]
pub struct MasterDispatcher<P: Platform> {
    platform: Arc<P>,
    sessions: SessionStore,
    registry: Registry,
    queue: Queue,
    pool: WorkerPool,
}

impl<P: Platform> MasterDispatcher<P> {
    pub fn new(
        platform: Arc<P>,
        sessions: SessionStore,
        registry: Registry,
        queue: Queue,
        pool: WorkerPool,
    ) -> MasterDispatcher<P> {
        MasterDispatcher {
            platform,
            sessions,
            registry,
            queue,
            pool,
        }
    }

    /// Handles a user's entrance interaction for `guild_id`/`user_id`,
    /// starting onboarding if one isn't already running for them.
    pub async fn start_onboarding(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        config: &GuildOnboardingConfig,
    ) -> Result<()> {
        if self.sessions.contains((guild_id, user_id)).await {
            return Err(Error::AlreadyInProgress);
        }

        let worker_id = self
            .registry
            .pick(&self.pool.worker_ids)
            .await?
            .ok_or(Error::NoWorkerAvailable)?;

        // Optimistic busy mark between Pick and Enqueue, so a second
        // dispatch racing the same poll doesn't also pick this worker; the
        // worker's own heartbeat supersedes this short-lived mark once it
        // picks the task up (spec §4.8).
        self.registry.mark_busy(&worker_id, MASTER_BUSY_TTL).await?;

        let mut roles: HashMap<String, Id<twilight_model::id::marker::RoleMarker>> = HashMap::new();
        roles.extend(config.milestone_roles.clone());
        roles.extend(config.attribute_roles.clone());

        let payload = StartPayload {
            user_id,
            category_id: config.voice_category_id,
            worker_id: worker_id.clone(),
            in_progress_role: config.in_progress_role,
            completed_role: config.completed_role,
            entrance_role: config.entrance_role,
            roles,
        };

        let task = Task::start(guild_id, payload, chrono::Utc::now().timestamp());
        if let Err(err) = self.queue.enqueue(&task).await {
            warn!(%err, worker_id, "failed to enqueue onboarding_start; releasing worker");
            let _ = self.registry.mark_available(&worker_id).await;
            return Err(Error::Fatal(err.to_string()));
        }

        // Apply the entry role immediately (spec §2 table: Master "applies
        // entry role" as part of dispatch, not gated on the worker picking
        // the task up).
        if let Some(role_id) = config.entrance_role {
            if let Err(err) = self.platform.add_role(guild_id, user_id, role_id).await {
                warn!(%err, "failed to grant entrance role");
            }
        }

        Ok(())
    }
}
