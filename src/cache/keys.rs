//! Bit-stable cache key layout (spec §6).

use twilight_model::id::{
    marker::{GuildMarker, UserMarker},
    Id,
};

/// `worker.status.{worker_id}`
pub fn worker_status(worker_id: &str) -> String {
    format!("worker.status.{worker_id}")
}

/// `queue.tasks`
pub fn task_queue() -> &'static str {
    "queue.tasks"
}

/// `session.{guild_id}.{user_id}`
pub fn session(guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> String {
    format!("session.{guild_id}.{user_id}")
}

/// `config.onboarding.{guild_id}`
pub fn onboarding_config(guild_id: Id<GuildMarker>) -> String {
    format!("config.onboarding.{guild_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_spec() {
        assert_eq!(worker_status("w1"), "worker.status.w1");
        assert_eq!(task_queue(), "queue.tasks");
        assert_eq!(session(Id::new(1), Id::new(2)), "session.1.2");
        assert_eq!(onboarding_config(Id::new(7)), "config.onboarding.7");
    }
}
