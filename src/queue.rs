//! Task Queue (spec §4.3): a FIFO list in the cache with blocking pop and
//! at-most-once delivery. Tasks are JSON-encoded; `Dequeue` owns the task
//! once it returns — there is no acknowledgment protocol.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, RoleMarker, UserMarker},
    Id,
};
use uuid::Uuid;

use crate::cache::{keys, Cache};

/// `Task` (spec §6 wire schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub guild_id: Id<GuildMarker>,
    pub created_at: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    OnboardingStart,
    OnboardingComplete,
}

/// The payload of an `onboarding_start` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPayload {
    pub user_id: Id<UserMarker>,
    pub category_id: Id<ChannelMarker>,
    pub worker_id: String,
    pub in_progress_role: Option<Id<RoleMarker>>,
    pub completed_role: Option<Id<RoleMarker>>,
    pub entrance_role: Option<Id<RoleMarker>>,
    /// Every other configured role id (milestone + attribute roles), keyed
    /// by the name used in the guild's onboarding config.
    #[serde(flatten)]
    pub roles: HashMap<String, Id<RoleMarker>>,
}

/// The payload of an `onboarding_complete` task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompletePayload {
    pub user_id: Id<UserMarker>,
    pub outcome: CompleteOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompleteOutcome {
    Finished,
    Timeout,
    UserLeftVoice,
    Cancelled,
}

impl Task {
    pub fn start(guild_id: Id<GuildMarker>, payload: StartPayload, now: i64) -> Task {
        Task {
            task_id: Uuid::new_v4().to_string(),
            kind: TaskKind::OnboardingStart,
            guild_id,
            created_at: now,
            payload: serde_json::to_value(payload).expect("StartPayload always serializes"),
        }
    }

    pub fn complete(guild_id: Id<GuildMarker>, payload: CompletePayload, now: i64) -> Task {
        Task {
            task_id: Uuid::new_v4().to_string(),
            kind: TaskKind::OnboardingComplete,
            guild_id,
            created_at: now,
            payload: serde_json::to_value(payload).expect("CompletePayload always serializes"),
        }
    }

    pub fn start_payload(&self) -> Result<StartPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// A handle to the task queue.
#[derive(Clone)]
pub struct Queue {
    cache: Cache,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed task JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Queue {
    pub fn new(cache: Cache) -> Queue {
        Queue { cache }
    }

    /// `Enqueue(task)`.
    pub async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(task)?;
        self.cache.lpush(keys::task_queue(), &encoded).await?;
        Ok(())
    }

    /// `Dequeue(timeout): task | nil`. Blocks up to `timeout`.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Task>, QueueError> {
        match self.cache.brpop(keys::task_queue(), timeout).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_payload_round_trips_through_task() {
        let mut roles = HashMap::new();
        roles.insert("milestone_2".to_string(), Id::new(42));

        let payload = StartPayload {
            user_id: Id::new(1),
            category_id: Id::new(2),
            worker_id: "worker-a".to_string(),
            in_progress_role: Some(Id::new(3)),
            completed_role: None,
            entrance_role: None,
            roles,
        };

        let task = Task::start(Id::new(99), payload.clone(), 1_700_000_000);
        assert_eq!(task.kind, TaskKind::OnboardingStart);

        let decoded = task.start_payload().unwrap();
        assert_eq!(decoded.user_id, payload.user_id);
        assert_eq!(decoded.worker_id, payload.worker_id);
        assert_eq!(decoded.roles.get("milestone_2"), Some(&Id::new(42)));
    }

    #[test]
    fn task_json_round_trips() {
        let payload = CompletePayload {
            user_id: Id::new(5),
            outcome: CompleteOutcome::Timeout,
        };
        let task = Task::complete(Id::new(7), payload, 1_700_000_001);
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.task_id, task.task_id);
        assert_eq!(decoded.kind, TaskKind::OnboardingComplete);
    }
}
