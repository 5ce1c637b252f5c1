//! The Step Engine (spec §4.6): a static, linear seven-step sequence, each
//! step a function that renders platform UI, sets `current_step`, and kicks
//! off the step's audio clip. Step 3 is a nested sub-step machine, handled
//! by [`step3`].

pub mod step3;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};
use twilight_model::id::{marker::ChannelMarker, Id};

pub use step3::Step3Phase;

use crate::audio;
use crate::error::Result;
use crate::platform::{OutgoingMessage, Platform};
use crate::queue::StartPayload;
use crate::token::{Action, ActionToken};
use crate::voice::VoiceConnection;

/// Where in the onboarding flow a session currently is (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Created,
    VcOpen,
    VoiceJoined,
    GuideMenu,
    GuideConfirm,
    Step(u8),
    Step3(Step3Phase),
    Completing,
    Terminated,
}

/// Role keys looked up in [`StartPayload::roles`]. Unlisted here because
/// they're strongly-typed fields on `StartPayload` itself: `in_progress`,
/// `completed`, `entrance`. These are the flexible, config-driven ones.
pub mod role_keys {
    pub const NYUKAI: &str = "nyukai";
    pub const MILESTONE_1: &str = "milestone_1";
    pub const MILESTONE_2: &str = "milestone_2";
    pub const MILESTONE_3: &str = "milestone_3";
    pub const VISITOR: &str = "visitor";
    pub const MEMBER: &str = "member";
}

/// Everything a step's render/advance logic needs, borrowed for the call.
pub struct StepContext<'a, P: Platform> {
    pub platform: &'a P,
    pub channel_id: Id<ChannelMarker>,
    pub user_id: twilight_model::id::Id<twilight_model::id::marker::UserMarker>,
    pub guild_id: twilight_model::id::Id<twilight_model::id::marker::GuildMarker>,
    pub roles: &'a StartPayload,
    pub guide: &'a str,
    pub audio_root: &'a Path,
}

impl<'a, P: Platform> StepContext<'a, P> {
    /// Grants a role looked up by key in `roles.roles`, warning and no-op'ing
    /// if absent (spec §4.6: "missing role ID silently skips... logs a
    /// warning").
    pub async fn grant(&self, key: &str) {
        match self.roles.roles.get(key) {
            Some(role_id) => {
                if let Err(err) = self.platform.add_role(self.guild_id, self.user_id, *role_id).await {
                    warn!(%err, role = key, "failed to grant role");
                }
            }
            None => warn!(role = key, "role not configured; skipping grant"),
        }
    }

    pub async fn revoke(&self, key: &str) {
        match self.roles.roles.get(key) {
            Some(role_id) => {
                if let Err(err) = self.platform.remove_role(self.guild_id, self.user_id, *role_id).await {
                    warn!(%err, role = key, "failed to revoke role");
                }
            }
            None => warn!(role = key, "role not configured; skipping revoke"),
        }
    }

    fn token(&self, action: Action, params: Vec<String>) -> String {
        ActionToken {
            action,
            params,
            user_id: self.user_id,
        }
        .format()
    }

    fn button(&self, label: &str, action: Action, style: ButtonStyle) -> Component {
        Component::Button(Button {
            custom_id: Some(self.token(action, Vec::new())),
            disabled: false,
            emoji: None,
            label: Some(label.to_string()),
            style,
            url: None,
        })
    }

    fn row(&self, components: Vec<Component>) -> Component {
        Component::ActionRow(ActionRow { components })
    }
}

/// Enters step `n` (1-7): stops whatever was playing, sends the step's
/// message with Next/Replay buttons (Complete instead of Next on step 7),
/// and starts its audio clip.
pub async fn enter_step<P: Platform>(ctx: &StepContext<'_, P>, conn: &VoiceConnection, n: u8) -> Result<()> {
    audio::stop(conn);

    if n == 1 {
        ctx.grant(role_keys::MILESTONE_1).await;
    }

    if n == 2 {
        ctx.revoke(role_keys::NYUKAI).await;
        ctx.grant(role_keys::MILESTONE_2).await;
    }

    let advance_button = if n == 7 {
        ctx.button("Complete", Action::Step7Complete, ButtonStyle::Success)
    } else {
        ctx.button("Next", Action::StepNext(n), ButtonStyle::Primary)
    };

    let mut row = vec![advance_button];
    if n != 7 {
        row.push(ctx.button("Replay", Action::StepReplay(n), ButtonStyle::Secondary));
    }

    let message = OutgoingMessage {
        content: Some(format!("onboarding.step.{n}.text")),
        components: vec![ctx.row(row)],
        ..Default::default()
    };
    ctx.platform.send_message(ctx.channel_id, message).await?;

    let clip = audio::clip_path(ctx.audio_root, ctx.guide, audio::step_clip_name(n));
    if let Err(err) = audio::start(conn, &clip).await {
        warn!(%err, step = n, "step audio failed to start; continuing without it");
    }

    Ok(())
}

/// Replays the current step's audio clip (spec §4.6: a no-op for sub-steps
/// that have no clip, handled by the caller passing `None`).
pub async fn replay_step<P: Platform>(ctx: &StepContext<'_, P>, conn: &VoiceConnection, n: u8) -> Result<()> {
    let clip = audio::clip_path(ctx.audio_root, ctx.guide, audio::step_clip_name(n));
    if let Err(err) = audio::start(conn, &clip).await {
        warn!(%err, step = n, "step replay failed to start audio");
    }
    Ok(())
}

/// Finishes onboarding (Step 7's `Complete` action): grants `visitor`/
/// `member`, revokes the three milestone roles.
pub async fn complete<P: Platform>(ctx: &StepContext<'_, P>, conn: &VoiceConnection) -> Result<()> {
    audio::stop(conn);

    ctx.grant(role_keys::VISITOR).await;
    ctx.grant(role_keys::MEMBER).await;
    ctx.revoke(role_keys::MILESTONE_1).await;
    ctx.revoke(role_keys::MILESTONE_2).await;
    ctx.revoke(role_keys::MILESTONE_3).await;

    if let Some(role_id) = ctx.roles.completed_role {
        if let Err(err) = ctx.platform.add_role(ctx.guild_id, ctx.user_id, role_id).await {
            warn!(%err, "failed to grant completed role");
        }
    }

    Ok(())
}

/// Whether the user already holds "milestone-3" and Step 3 should be
/// skipped entirely (spec §4.6).
pub async fn should_skip_step3<P: Platform>(ctx: &StepContext<'_, P>) -> bool {
    let Some(milestone_3) = ctx.roles.roles.get(role_keys::MILESTONE_3) else {
        return false;
    };

    match ctx.platform.member_roles(ctx.guild_id, ctx.user_id).await {
        Ok(roles) => roles.contains(milestone_3),
        Err(err) => {
            warn!(%err, "could not fetch member roles; not skipping step 3");
            false
        }
    }
}
