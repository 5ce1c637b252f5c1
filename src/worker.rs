//! Worker-process glue (spec §4.8 worker half, §4.2 heartbeat): blocking
//! dequeue loop that spawns session tasks, plus the periodic availability
//! heartbeat.

use std::sync::Arc;
use std::time::Instant as StdInstant;

use tokio::time::sleep;
use tracing::{error, info, warn};
use twilight_model::id::marker::{GuildMarker, UserMarker};
use twilight_model::id::Id;

use crate::constants::{DUPLICATE_TASK_RETRY_DELAY, DUPLICATE_TASK_RETRY_LIMIT, HEARTBEAT_INTERVAL, QUEUE_DEQUEUE_TIMEOUT};
use crate::platform::Platform;
use crate::queue::{Queue, Task, TaskKind};
use crate::registry::{Registry, Status};
use crate::session::{SessionDeps, SessionStore};

/// Runs the worker's heartbeat loop forever, reporting the worker's actual
/// status (busy while it holds a session, available otherwise) every
/// [`HEARTBEAT_INTERVAL`] (spec §9: "the worker writes its actual status").
pub async fn heartbeat_loop(registry: Registry, worker_id: String, sessions: SessionStore) {
    loop {
        let status = if sessions.any_active().await {
            Status::Busy
        } else {
            Status::Available
        };

        if let Err(err) = registry.heartbeat(&worker_id, status).await {
            warn!(%err, "heartbeat failed");
        }

        sleep(HEARTBEAT_INTERVAL).await;
    }
}

/// Runs the worker's dequeue loop forever: blocks on the task queue, and for
/// each `onboarding_start` task either spawns a session or, if this worker
/// is already busy, re-enqueues it up to [`DUPLICATE_TASK_RETRY_LIMIT`]
/// times before giving up (spec §4.8).
pub async fn dequeue_loop<P: Platform + 'static>(platform: Arc<P>, queue: Queue, deps: SessionDeps, sessions: SessionStore) {
    loop {
        let task = match queue.dequeue(QUEUE_DEQUEUE_TIMEOUT).await {
            Ok(Some(task)) => task,
            Ok(None) => continue,
            Err(err) => {
                error!(%err, "dequeue failed; backing off");
                sleep(QUEUE_DEQUEUE_TIMEOUT).await;
                continue;
            }
        };

        match task.kind {
            TaskKind::OnboardingStart => {
                handle_start(&platform, &queue, &deps, &sessions, task).await;
            }
            TaskKind::OnboardingComplete => {
                // Acknowledgement-only task; the master's own process reads
                // these for its own bookkeeping. A worker should never see
                // one of its own peers' completions on this queue in
                // practice, but ignore it rather than crash if it does.
                info!("ignoring onboarding_complete task seen by a worker");
            }
        }
    }
}

async fn handle_start<P: Platform + 'static>(
    platform: &Arc<P>,
    queue: &Queue,
    deps: &SessionDeps,
    sessions: &SessionStore,
    task: Task,
) {
    let payload = match task.start_payload() {
        Ok(payload) => payload,
        Err(err) => {
            error!(%err, task_id = %task.task_id, "malformed onboarding_start payload; dropping");
            return;
        }
    };

    if payload.worker_id != deps.worker_id {
        // Not ours; a duplicate delivery or a misrouted task from a shared
        // queue topology. Don't touch it.
        return;
    }

    if sessions.any_active().await {
        requeue_with_backoff(queue, task).await;
        return;
    }

    let key: (Id<GuildMarker>, Id<UserMarker>) = (task.guild_id, payload.user_id);
    if sessions.contains(key).await {
        warn!(guild_id = %task.guild_id, user_id = %payload.user_id, "duplicate onboarding_start for an active session; dropping");
        return;
    }

    let category_id = payload.category_id;
    sessions
        .spawn(
            platform.clone(),
            deps.clone(),
            key,
            category_id,
            payload,
            chrono::Utc::now().timestamp(),
        )
        .await;
}

/// Re-enqueues a task this worker can't take right now, waiting
/// [`DUPLICATE_TASK_RETRY_DELAY`] first so it doesn't spin the queue, and
/// gives up after [`DUPLICATE_TASK_RETRY_LIMIT`] attempts (tracked via the
/// task's own retry counter embedded in its payload would require a wire
/// change, so this process-local attempt count is an approximation: it
/// bounds this worker's own re-delivery loop, not the task's lifetime
/// across every worker that might see it).
async fn requeue_with_backoff(queue: &Queue, task: Task) {
    let started = StdInstant::now();
    for attempt in 1..=DUPLICATE_TASK_RETRY_LIMIT {
        sleep(DUPLICATE_TASK_RETRY_DELAY).await;
        if let Err(err) = queue.enqueue(&task).await {
            error!(%err, attempt, "failed to re-enqueue busy-worker task");
            continue;
        }
        return;
    }
    warn!(
        task_id = %task.task_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "gave up re-enqueuing onboarding_start after exhausting retries"
    );
}
