//! Worker process entry point (spec §4.8 worker half): owns a single bot
//! token, dequeues `onboarding_start` tasks addressed to it, and runs the
//! sessions it's assigned.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use twilight_gateway::{Event, EventTypeFlags, Shard, ShardId, StreamExt as _};
use twilight_http::Client;
use twilight_model::gateway::Intents;

use onboardbot::cache::Cache;
use onboardbot::config::Settings;
use onboardbot::i18n::{I18n, StaticCatalog};
use onboardbot::interaction::InteractionRouter;
use onboardbot::platform::discord::DiscordPlatform;
use onboardbot::queue::Queue;
use onboardbot::registry::Registry;
use onboardbot::session::{SessionDeps, SessionStore};
use onboardbot::worker::{dequeue_loop, heartbeat_loop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load_worker()?;
    onboardbot::config::init_tracing(settings.log_format);

    let worker_id = settings.worker_id.clone().expect("WORKER_ID required for worker process");

    let http = Arc::new(Client::new(settings.bot_token.clone()));
    let bot_user = http.current_user().await?.model().await?;
    let application = http.current_user_application().await?.model().await?;

    let cache = Cache::connect(&settings.redis_url).await?;
    let registry = Registry::new(cache.clone());
    let queue = Queue::new(cache.clone());
    let sessions = SessionStore::new(cache.clone());

    let (gateway_tx, mut gateway_rx) = mpsc::unbounded_channel();
    let platform = Arc::new(DiscordPlatform::new(http.clone(), application.id, bot_user.id, gateway_tx));

    let deps = SessionDeps {
        registry: registry.clone(),
        queue: queue.clone(),
        audio_root: audio_root(),
        assets_root: assets_root(),
        worker_id: worker_id.clone(),
    };

    let i18n = Arc::new(I18n::new(Arc::new(StaticCatalog::new())));
    let router = InteractionRouter::new(sessions.clone(), i18n);

    let intents = Intents::GUILDS | Intents::GUILD_VOICE_STATES | Intents::GUILD_MEMBERS;
    let mut shard = Shard::new(ShardId::ONE, settings.bot_token.clone(), intents);

    // Forwards voice gateway commands (join/leave requests from
    // `DiscordPlatform::join_voice`) out onto the shard's own sender, since
    // only the shard owning this guild's connection can send them.
    let command_sender = shard.sender();
    tokio::spawn(async move {
        while let Some(command) = gateway_rx.recv().await {
            if command_sender.command(&command).is_err() {
                warn!("shard command sender closed; dropping voice state update");
                break;
            }
        }
    });

    tokio::spawn(heartbeat_loop(registry.clone(), worker_id.clone(), sessions.clone()));
    tokio::spawn(dequeue_loop(platform.clone(), queue.clone(), deps, sessions.clone()));

    info!(worker_id, "worker started");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(source) => {
                warn!(?source, "error receiving gateway event");
                continue;
            }
        };

        match event {
            Event::InteractionCreate(interaction) => {
                let platform = platform.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    router.handle(platform.as_ref(), interaction.0, "en").await;
                });
            }
            Event::VoiceStateUpdate(ev) => {
                platform.route_voice_state_update(ev).await;
            }
            Event::VoiceServerUpdate(ev) => {
                platform.route_voice_server_update(ev).await;
            }
            Event::GatewayClose(_) => {
                error!("gateway connection closed");
            }
            _ => {}
        }
    }

    Ok(())
}

fn audio_root() -> PathBuf {
    env::var("ONBOARDING_AUDIO_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("guides"))
}

fn assets_root() -> PathBuf {
    env::var("ONBOARDING_ASSETS_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("assets"))
}
