//! The Platform API boundary (spec §6): channel/role/message/voice
//! connection primitives, treated as an external collaborator. The core
//! only ever talks to the small [`Platform`] trait below; [`discord`] is the
//! one production implementation, wrapping `twilight_http` the way the
//! teacher's `interaction::ResponseExt` wraps `twilight_http::client::
//! InteractionClient`.

pub mod discord;
pub mod response;

use async_trait::async_trait;
use twilight_model::channel::message::component::Component;
use twilight_model::channel::message::Embed;
use twilight_model::http::attachment::Attachment;
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, InteractionMarker, RoleMarker, UserMarker},
    Id,
};

use crate::error::Result;
use crate::voice::VoiceConnection;
use response::InteractionReply;

/// A message to post into a text channel, with the subset of fields the
/// step engine needs (spec §4.6: "text, images, buttons").
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub components: Vec<Component>,
    pub attachments: Vec<Attachment>,
}

/// Permission overwrite shape needed to create a private onboarding channel
/// (spec §4.5: target user + bot allow view/connect/speak, `everyone` deny
/// view). The bot's own overwrite is added by the implementation itself,
/// since only it knows its own user id.
#[derive(Debug, Clone)]
pub struct ChannelGrant {
    pub user_id: Id<UserMarker>,
}

/// The platform collaborator boundary.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Creates a private voice channel under `category_id`, named
    /// `onboarding-{username}`, with the permission overwrites in
    /// [`ChannelGrant`] and the fixed bitrate/user-limit from spec §4.5.
    async fn create_onboarding_channel(
        &self,
        guild_id: Id<GuildMarker>,
        category_id: Id<ChannelMarker>,
        username: &str,
        grant: ChannelGrant,
    ) -> Result<Id<ChannelMarker>>;

    /// Deletes a channel. Best-effort at the call site (spec §4.5 cleanup).
    async fn delete_channel(&self, channel_id: Id<ChannelMarker>) -> Result<()>;

    /// Sends a new message into a channel.
    async fn send_message(&self, channel_id: Id<ChannelMarker>, message: OutgoingMessage) -> Result<()>;

    /// Responds to an interaction with one of the three non-modal response
    /// kinds the core uses (deferred update, update message, new message),
    /// or an ephemeral message.
    async fn respond_interaction(
        &self,
        interaction_id: Id<InteractionMarker>,
        token: &str,
        reply: InteractionReply,
    ) -> Result<()>;

    /// Joins voice in `guild_id`/`channel_id` (`mute=false, deaf=true` per
    /// spec §6), waiting up to the caller-supplied deadline for readiness.
    async fn join_voice(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<VoiceConnection>;

    async fn add_role(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>, role_id: Id<RoleMarker>) -> Result<()>;

    async fn remove_role(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>, role_id: Id<RoleMarker>) -> Result<()>;

    /// Fetches a guild member's current roles, used by the Step Engine to
    /// check for the "milestone-3" role before deciding to skip Step 3.
    async fn member_roles(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Result<Vec<Id<RoleMarker>>>;
}
