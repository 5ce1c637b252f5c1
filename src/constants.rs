//! Crate-wide constants.

use tokio::time::Duration;

/// Worker availability TTL (§3 Worker Availability Record).
pub const WORKER_STATUS_TTL: Duration = Duration::from_secs(120);

/// Interval between worker heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// TTL applied to a `busy` mark made optimistically by the master between
/// `Pick` and `Enqueue` (§4.8); the worker's own heartbeat supersedes it.
pub const MASTER_BUSY_TTL: Duration = Duration::from_secs(15);

/// Total session wall-clock budget (§4.5).
pub const SESSION_TOTAL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Inactivity budget, reset on every user interaction (§4.5).
pub const SESSION_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Granularity of the inactivity timer tick.
pub const INACTIVITY_TICK: Duration = Duration::from_secs(30);

/// Cap on waiting for the voice connection to become ready after join.
pub const VOICE_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for voice readiness.
pub const VOICE_JOIN_POLL: Duration = Duration::from_millis(100);

/// Cap on waiting for a graceful voice disconnect during cleanup.
pub const VOICE_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiescence delay before auto-advancing S3.EVENT to S3.DONE (§9 open
/// question; 2s chosen, within the specified [1s, 5s] range).
pub const EVENT_QUIESCENCE_DELAY: Duration = Duration::from_secs(2);

/// Retry cap for a worker re-enqueuing a task it received while busy (§4.8).
pub const DUPLICATE_TASK_RETRY_LIMIT: u32 = 3;

/// Delay before a re-enqueued duplicate task is retried.
pub const DUPLICATE_TASK_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Voice channel bitrate for onboarding channels, in bits per second.
pub const ONBOARDING_CHANNEL_BITRATE: u32 = 96_000;

/// Voice channel user limit for onboarding channels.
pub const ONBOARDING_CHANNEL_USER_LIMIT: u32 = 2;

/// Blocking timeout passed to the task queue's `BRPOP`.
pub const QUEUE_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of scripted top-level steps (Step 1 through Step 7).
pub const STEP_COUNT: u8 = 7;
