//! Session State (spec §4.4) and the per-session owning task (spec §4.5),
//! modeled on the teacher's `music::QueueServer`/`Queue`: a `RwLock`-guarded
//! map of guild+user to a running task, each task owning its own mutable
//! state so interaction handlers never hold a lock across platform I/O.

pub mod lifecycle;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, UserMarker},
    Id,
};

use std::path::PathBuf;

use crate::cache::{keys, Cache};
use crate::platform::Platform;
use crate::queue::{Queue, StartPayload};
use crate::registry::Registry;
use crate::step::Phase;

/// Process-wide dependencies every session needs, bundled so
/// [`SessionStore::spawn`] doesn't grow an ever-longer argument list.
#[derive(Clone)]
pub struct SessionDeps {
    pub registry: Registry,
    pub queue: Queue,
    pub audio_root: PathBuf,
    pub assets_root: PathBuf,
    pub worker_id: String,
}

/// `(guild_id, user_id)`, the session key used everywhere (spec §4.4).
pub type SessionKey = (Id<GuildMarker>, Id<UserMarker>);

/// The compact, cache-mirrored projection of a session's state that the
/// interaction-handling task (which may not be the session's own task) can
/// read to decide routing without touching the in-memory map (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProjection {
    pub guild_id: Id<GuildMarker>,
    pub user_id: Id<UserMarker>,
    pub voice_channel_id: Id<ChannelMarker>,
    pub guide: Option<String>,
    pub phase: Phase,
    pub started_at: i64,
}

/// A handle to a running session task: the command sender plus lock-free
/// snapshot fields the router reads without waking the task.
pub struct SessionHandle {
    command_tx: UnboundedSender<RouterCommand>,

    /// Seconds since epoch of the last interaction; updated by the router
    /// directly (spec §4.4: "per-session field mutation... only mutated by
    /// that session's owning goroutine" — `last_activity` is the one
    /// exception, refreshed by whichever task handles the interaction,
    /// hence the atomic rather than a session-task-only field).
    last_activity: AtomicI64,
    /// The step the engine most recently entered, `255` for "not yet on a
    /// numbered step" (guide menu, etc). Read-only snapshot for router
    /// idempotency checks (spec §4.6 "stale step button").
    current_step: AtomicU8,
}

impl SessionHandle {
    pub fn send(&self, command: RouterCommand) -> Result<(), crate::error::Error> {
        self.command_tx
            .send(command)
            .map_err(|_| crate::error::Error::SessionNotFound)
    }

    pub fn touch(&self, now: i64) {
        self.last_activity.store(now, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn current_step(&self) -> u8 {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn set_current_step(&self, step: u8) {
        self.current_step.store(step, Ordering::Relaxed);
    }
}

/// A command sent from an interaction-handling task into a session's
/// owning task. The session task is the only writer of its own phase, roles
/// granted, and voice/audio state; this channel is how the rest of the
/// process asks it to act.
#[derive(Debug)]
pub enum RouterCommand {
    /// An action button press, carrying the token's params since most
    /// answer actions (Step 3's sub-steps) need them to know which role to
    /// grant (spec §4.7: the param segment is the answer's identity).
    Action {
        action: crate::token::Action,
        params: Vec<String>,
    },
    Cancel,
}

/// An entry in the session map: the task's join handle (used only to check
/// liveness) alongside the shared handle interaction routing reads from.
struct SessionEntry {
    task: JoinHandle<()>,
    handle: Arc<SessionHandle>,
}

/// The in-memory session map (spec §4.4: "thread-safe store keyed by
/// `(guild_id, user_id)`... a read-write lock for the map").
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionEntry>>>,
    cache: Cache,
}

impl SessionStore {
    pub fn new(cache: Cache) -> SessionStore {
        SessionStore {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cache,
        }
    }

    pub async fn contains(&self, key: SessionKey) -> bool {
        self.sessions
            .read()
            .await
            .get(&key)
            .map(|entry| !entry.task.is_finished())
            .unwrap_or(false)
    }

    pub async fn get(&self, key: SessionKey) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&key).map(|entry| entry.handle.clone())
    }

    /// Whether this store holds any live session (spec §5: "at most one
    /// active session per worker process"). A worker's own [`SessionStore`]
    /// should never hold more than one entry at a time.
    pub async fn any_active(&self) -> bool {
        self.sessions.read().await.values().any(|entry| !entry.task.is_finished())
    }

    /// Spawns a new session task for `payload` and registers it in the map.
    /// Mutation of the map only happens on create/destroy (spec §5).
    pub async fn spawn<P: Platform + 'static>(
        &self,
        platform: Arc<P>,
        deps: SessionDeps,
        key: SessionKey,
        category_id: Id<ChannelMarker>,
        payload: StartPayload,
        now: i64,
    ) -> Arc<SessionHandle> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = Arc::new(SessionHandle {
            command_tx,
            last_activity: AtomicI64::new(now),
            current_step: AtomicU8::new(0),
        });

        let ctx = lifecycle::SessionContext {
            store: self.clone(),
            platform,
            deps,
            key,
            category_id,
            payload,
            command_rx,
            handle: handle.clone(),
        };

        let task = tokio::spawn(lifecycle::run(ctx));

        self.sessions.write().await.insert(
            key,
            SessionEntry {
                task,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Removes a session from the map (termination step (d), spec §4.5).
    pub async fn remove(&self, key: SessionKey) {
        self.sessions.write().await.remove(&key);
    }

    pub async fn mirror(&self, projection: &SessionProjection) {
        let key = keys::session(projection.guild_id, projection.user_id);
        let _ = self.cache.set_json(&key, projection, None).await;
    }

    pub async fn unmirror(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) {
        let _ = self.cache.delete(&keys::session(guild_id, user_id)).await;
    }
}
