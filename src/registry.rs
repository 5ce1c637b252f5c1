//! Worker Registry (spec §4.2).
//!
//! State lives in the cache under `worker.status.{worker_id}`. Selection
//! policy is any-available: any record whose value is `available` is
//! eligible, picked with a random jitter so that many masters racing the
//! same poll don't pile onto the same worker every time (the spec allows
//! round-robin or hashing here; this crate uses `rand`, already a teacher
//! dependency via `voice::rtp::crypto`).

use rand::seq::SliceRandom;

use crate::cache::{keys, Cache};
use crate::constants::WORKER_STATUS_TTL;

/// A worker's liveness/availability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Available,
    Busy,
    Offline,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Available => "available",
            Status::Busy => "busy",
            Status::Offline => "offline",
        }
    }

    fn parse(s: &str) -> Option<Status> {
        match s {
            "available" => Some(Status::Available),
            "busy" => Some(Status::Busy),
            "offline" => Some(Status::Offline),
            _ => None,
        }
    }
}

/// A handle to the worker registry.
#[derive(Clone)]
pub struct Registry {
    cache: Cache,
}

impl Registry {
    pub fn new(cache: Cache) -> Registry {
        Registry { cache }
    }

    /// `Heartbeat(worker_id, status, ttl=2m)`. Per the resolved open
    /// question in spec §9, the worker writes its *actual* status: `busy`
    /// while a session is running, `available` otherwise.
    pub async fn heartbeat(&self, worker_id: &str, status: Status) -> Result<(), redis::RedisError> {
        self.cache
            .set(&keys::worker_status(worker_id), status.as_str(), Some(WORKER_STATUS_TTL))
            .await
    }

    /// `MarkBusy(worker_id)`, with a short TTL (finalized by the worker's own
    /// heartbeat on accept).
    pub async fn mark_busy(&self, worker_id: &str, ttl: std::time::Duration) -> Result<(), redis::RedisError> {
        self.cache
            .set(&keys::worker_status(worker_id), Status::Busy.as_str(), Some(ttl))
            .await
    }

    /// `MarkAvailable(worker_id)`.
    pub async fn mark_available(&self, worker_id: &str) -> Result<(), redis::RedisError> {
        self.heartbeat(worker_id, Status::Available).await
    }

    /// Reads a single worker's status. Absence means offline.
    pub async fn status(&self, worker_id: &str) -> Result<Status, redis::RedisError> {
        match self.cache.get(&keys::worker_status(worker_id)).await? {
            Some(raw) => Ok(Status::parse(&raw).unwrap_or(Status::Offline)),
            None => Ok(Status::Offline),
        }
    }

    /// `Pick(): worker_id | none`. Scans the known worker id set and returns
    /// any one currently `available`, picked uniformly at random among the
    /// eligible set. `known_worker_ids` is the static pool configured for
    /// this deployment (the registry itself holds no durable membership).
    pub async fn pick(&self, known_worker_ids: &[String]) -> Result<Option<String>, redis::RedisError> {
        let mut available = Vec::new();
        for worker_id in known_worker_ids {
            if self.status(worker_id).await? == Status::Available {
                available.push(worker_id.clone());
            }
        }

        Ok(available.choose(&mut rand::thread_rng()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [Status::Available, Status::Busy, Status::Offline] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_string_is_none() {
        assert_eq!(Status::parse("zzz"), None);
    }
}
