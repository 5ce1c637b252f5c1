//! The production [`Platform`] implementation, wrapping
//! `twilight_http::Client` and the kept `voice` transport, in the same
//! "thin wrapper around the twilight client" shape as the teacher's
//! `interaction::ResponseExt`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use twilight_http::Client;
use twilight_model::channel::permission_overwrite::{PermissionOverwrite, PermissionOverwriteType};
use twilight_model::channel::ChannelType;
use twilight_model::gateway::payload::{
    incoming::{VoiceServerUpdate, VoiceStateUpdate},
    outgoing::UpdateVoiceState,
};
use twilight_model::guild::Permissions;
use twilight_model::id::{
    marker::{ApplicationMarker, ChannelMarker, GuildMarker, InteractionMarker, RoleMarker, UserMarker},
    Id,
};

use crate::constants::{ONBOARDING_CHANNEL_BITRATE, ONBOARDING_CHANNEL_USER_LIMIT, VOICE_JOIN_TIMEOUT};
use crate::error::{Error, Result};
use crate::voice::{GatewayEvent, VoiceConnection};

use super::{ChannelGrant, InteractionReply, OutgoingMessage, Platform};

/// Map from guild to the gateway-event sender of its in-flight (or active)
/// voice connection, populated by [`DiscordPlatform::join_voice`] and
/// drained by [`DiscordPlatform::route_voice_state_update`]/
/// [`DiscordPlatform::route_voice_server_update`], which the process's main
/// gateway shard loop calls for every incoming voice event.
type VoiceRegistry = RwLock<HashMap<Id<GuildMarker>, UnboundedSender<GatewayEvent>>>;

pub struct DiscordPlatform {
    http: Arc<Client>,
    application_id: Id<ApplicationMarker>,
    bot_user_id: Id<UserMarker>,
    gateway_commands: UnboundedSender<UpdateVoiceState>,
    voice_registry: VoiceRegistry,
}

impl DiscordPlatform {
    pub fn new(
        http: Arc<Client>,
        application_id: Id<ApplicationMarker>,
        bot_user_id: Id<UserMarker>,
        gateway_commands: UnboundedSender<UpdateVoiceState>,
    ) -> DiscordPlatform {
        DiscordPlatform {
            http,
            application_id,
            bot_user_id,
            gateway_commands,
            voice_registry: RwLock::new(HashMap::new()),
        }
    }

    /// Forwards a `VOICE_STATE_UPDATE` shard event to the guild's in-flight
    /// voice connection, if any.
    pub async fn route_voice_state_update(&self, ev: Box<VoiceStateUpdate>) {
        let Some(guild_id) = ev.0.guild_id else { return };
        if let Some(sender) = self.voice_registry.read().await.get(&guild_id) {
            let _ = sender.send(GatewayEvent::VoiceStateUpdate(ev));
        }
    }

    /// Forwards a `VOICE_SERVER_UPDATE` shard event to the guild's in-flight
    /// voice connection, if any.
    pub async fn route_voice_server_update(&self, ev: VoiceServerUpdate) {
        let guild_id = ev.guild_id;
        if let Some(sender) = self.voice_registry.read().await.get(&guild_id) {
            let _ = sender.send(GatewayEvent::VoiceServerUpdate(ev));
        }
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn create_onboarding_channel(
        &self,
        guild_id: Id<GuildMarker>,
        category_id: Id<ChannelMarker>,
        username: &str,
        grant: ChannelGrant,
    ) -> Result<Id<ChannelMarker>> {
        let name = format!("onboarding-{username}");

        let overwrites = vec![
            PermissionOverwrite {
                id: grant.user_id.cast(),
                kind: PermissionOverwriteType::Member,
                allow: Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK,
                deny: Permissions::empty(),
            },
            PermissionOverwrite {
                id: self.bot_user_id.cast(),
                kind: PermissionOverwriteType::Member,
                allow: Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK,
                deny: Permissions::empty(),
            },
            PermissionOverwrite {
                id: guild_id.cast(),
                kind: PermissionOverwriteType::Role,
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
            },
        ];

        let channel = self
            .http
            .create_guild_channel(guild_id, &name)
            .map_err(|err| Error::Fatal(err.to_string()))?
            .kind(ChannelType::GuildVoice)
            .parent_id(category_id)
            .bitrate(ONBOARDING_CHANNEL_BITRATE)
            .user_limit(ONBOARDING_CHANNEL_USER_LIMIT)
            .permission_overwrites(&overwrites)
            .await?
            .model()
            .await
            .map_err(|err| Error::Fatal(err.to_string()))?;

        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_id: Id<ChannelMarker>) -> Result<()> {
        self.http.delete_channel(channel_id).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: Id<ChannelMarker>, message: OutgoingMessage) -> Result<()> {
        let mut req = self.http.create_message(channel_id);
        if let Some(content) = message.content.as_deref() {
            req = req.content(content).map_err(|err| Error::Fatal(err.to_string()))?;
        }
        if !message.embeds.is_empty() {
            req = req.embeds(&message.embeds).map_err(|err| Error::Fatal(err.to_string()))?;
        }
        if !message.components.is_empty() {
            req = req.components(&message.components).map_err(|err| Error::Fatal(err.to_string()))?;
        }
        if !message.attachments.is_empty() {
            req = req.attachments(&message.attachments).map_err(|err| Error::Fatal(err.to_string()))?;
        }
        req.await?;
        Ok(())
    }

    async fn respond_interaction(
        &self,
        interaction_id: Id<InteractionMarker>,
        token: &str,
        reply: InteractionReply,
    ) -> Result<()> {
        let response = reply.into_response();
        self.http
            .interaction(self.application_id)
            .create_response(interaction_id, token, &response)
            .await?;
        Ok(())
    }

    async fn join_voice(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<VoiceConnection> {
        let (conn, mut event_rx) = VoiceConnection::start(self.bot_user_id, guild_id);

        // Register before requesting the gateway update, so the shard loop
        // has somewhere to forward VOICE_STATE_UPDATE/VOICE_SERVER_UPDATE
        // the moment they arrive.
        self.voice_registry.write().await.insert(guild_id, conn.gateway_sender());

        // mute=false, deaf=true per spec §6.
        self.gateway_commands
            .send(UpdateVoiceState::new(guild_id, Some(channel_id), false, true))
            .map_err(|_| Error::Fatal("gateway command channel closed".into()))?;

        VoiceConnection::wait_ready(&mut event_rx, VOICE_JOIN_TIMEOUT).await?;
        Ok(conn)
    }

    async fn add_role(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>, role_id: Id<RoleMarker>) -> Result<()> {
        self.http.add_guild_member_role(guild_id, user_id, role_id).await?;
        Ok(())
    }

    async fn remove_role(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>, role_id: Id<RoleMarker>) -> Result<()> {
        self.http.remove_guild_member_role(guild_id, user_id, role_id).await?;
        Ok(())
    }

    async fn member_roles(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Result<Vec<Id<RoleMarker>>> {
        let member = self.http.guild_member(guild_id, user_id).await?.model().await.map_err(|err| Error::Fatal(err.to_string()))?;
        Ok(member.roles)
    }
}
