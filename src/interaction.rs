//! Interaction Router (spec §4.7): parses a component interaction's custom
//! id into an [`ActionToken`], resolves it to a running session, and
//! forwards the action onto that session's owning task.
//!
//! Dispatch, in order:
//! 1. Parse the custom id; a non-onboarding token falls through untouched.
//! 2. Reject a token whose trailing user id doesn't match the presser.
//! 3. Look up the `(guild_id, user_id)` session; missing is an ephemeral
//!    error, not a crash.
//! 4. Refresh `last_activity` (this task, not the session's own, does the
//!    touch — see [`crate::session::SessionHandle::touch`]).
//! 5. Forward the action to the session's command channel.
//! 6. Acknowledge the interaction with a deferred update; the session task
//!    posts the actual next message itself.

use tracing::warn;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::id::{marker::UserMarker, Id};

use crate::i18n::I18n;
use crate::platform::response::InteractionReply;
use crate::platform::Platform;
use crate::session::{RouterCommand, SessionStore};
use crate::token::{ActionToken, ParseError};

/// Everything the router needs, bundled so the process's event loop doesn't
/// have to thread each dependency through by hand.
#[derive(Clone)]
pub struct InteractionRouter {
    sessions: SessionStore,
    i18n: std::sync::Arc<I18n>,
}

impl InteractionRouter {
    pub fn new(sessions: SessionStore, i18n: std::sync::Arc<I18n>) -> InteractionRouter {
        InteractionRouter { sessions, i18n }
    }

    /// Handles one `INTERACTION_CREATE` event. Returns without acting if the
    /// interaction isn't a message-component press, or its custom id isn't
    /// one of ours (so the caller can fall through to other handlers).
    pub async fn handle<P: Platform>(&self, platform: &P, mut interaction: Interaction, lang: &str) {
        let Some(InteractionData::MessageComponent(data)) = interaction.data.take() else {
            return;
        };

        let Some(guild_id) = interaction.guild_id else {
            return;
        };

        let presser_id = match interaction
            .member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(interaction.user.as_ref())
        {
            Some(user) => user.id,
            None => return,
        };

        let token = match ActionToken::parse(&data.custom_id) {
            Ok(token) => token,
            Err(ParseError::WrongPrefix) => return,
            Err(err) => {
                warn!(%err, custom_id = %data.custom_id, "malformed onboarding token");
                return;
            }
        };

        let reply = self.dispatch(guild_id, presser_id, token, lang).await;

        if let Err(err) = platform
            .respond_interaction(interaction.id, &interaction.token, reply)
            .await
        {
            warn!(%err, "failed to respond to interaction");
        }
    }

    async fn dispatch(
        &self,
        guild_id: Id<twilight_model::id::marker::GuildMarker>,
        presser_id: Id<UserMarker>,
        token: ActionToken,
        lang: &str,
    ) -> InteractionReply {
        if token.user_id != presser_id {
            return InteractionReply::Ephemeral(self.i18n.t(lang, "onboarding.error.not_your_button"));
        }

        let Some(handle) = self.sessions.get((guild_id, presser_id)).await else {
            return InteractionReply::Ephemeral(self.i18n.t(lang, "onboarding.error.session_not_found"));
        };

        handle.touch(chrono::Utc::now().timestamp());

        if let Err(err) = handle.send(RouterCommand::Action {
            action: token.action,
            params: token.params,
        }) {
            warn!(%err, "session task gone; could not dispatch action");
            return InteractionReply::Ephemeral(self.i18n.t(lang, "onboarding.error.session_not_found"));
        }

        InteractionReply::DeferredUpdate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_prefix_is_not_an_error() {
        assert!(matches!(
            ActionToken::parse("other:thing:1"),
            Err(ParseError::WrongPrefix)
        ));
    }
}
