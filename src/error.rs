//! The error taxonomy described in spec §7.
//!
//! Interaction handlers never bubble these up to the gateway dispatch loop:
//! they either answer ephemerally, log and continue, or (for the setup-time
//! variants) tear the session down. See each call site for which policy
//! applies.

use twilight_model::id::{marker::UserMarker, Id};

/// Any error produced by the onboarding core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The interaction wasn't addressed to this feature; the router should
    /// return control to whatever else might handle it.
    #[error("interaction not handled by onboarding")]
    NotHandled,

    /// The pressing user didn't match the action token's trailing user id.
    #[error("button does not belong to user {0}")]
    NotYourButton(Id<UserMarker>),

    /// No active session exists for `(guild_id, user_id)`.
    #[error("no active onboarding session")]
    SessionNotFound,

    /// The guild has no onboarding configuration on record.
    #[error("guild is not configured for onboarding")]
    ConfigMissing,

    /// The worker registry has no `available` record.
    #[error("no onboarding worker is available")]
    NoWorkerAvailable,

    /// A session already exists for `(guild_id, user_id)`.
    #[error("onboarding already in progress for this user")]
    AlreadyInProgress,

    /// The requested audio file does not exist on disk.
    #[error("audio file not found: {0}")]
    AudioNotFound(String),

    /// The voice connection isn't ready to accept frames yet.
    #[error("voice connection not ready")]
    VoiceNotReady,

    /// A write to the voice connection failed.
    #[error("audio io error: {0}")]
    AudioIo(#[source] std::io::Error),

    /// A one-shot platform HTTP/WS call failed; not retried for UI writes.
    #[error("platform request failed: {0}")]
    PlatformTransient(#[source] twilight_http::Error),

    /// Unrecoverable error; the session context is cancelled and the
    /// session is cleaned up.
    #[error("fatal session error: {0}")]
    Fatal(String),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("voice error: {0}")]
    Voice(#[from] crate::voice::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<twilight_http::Error> for Error {
    fn from(err: twilight_http::Error) -> Error {
        Error::PlatformTransient(err)
    }
}

impl Error {
    /// Whether this error should be surfaced to the user via an ephemeral
    /// I18N-backed message (§7, "every user-visible error message flows
    /// through the I18N facade").
    pub fn user_facing_key(&self) -> Option<&'static str> {
        match self {
            Error::NotYourButton(_) => Some("onboarding.error.not_your_button"),
            Error::SessionNotFound => Some("onboarding.error.session_not_found"),
            Error::ConfigMissing => Some("onboarding.error.not_configured"),
            Error::NoWorkerAvailable => Some("onboarding.error.all_busy"),
            Error::AlreadyInProgress => Some("onboarding.error.already_in_progress"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
