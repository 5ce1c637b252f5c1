//! Master Dispatcher process entry point (spec §4.8): owns the entrance
//! channel's bot connection, picks a worker for each entrance press, and
//! enqueues the `onboarding_start` task. Holds no sessions itself.

use std::env;
use std::sync::Arc;

use tracing::{info, warn};
use twilight_gateway::{Event, EventTypeFlags, Shard, ShardId, StreamExt as _};
use twilight_http::Client;
use twilight_model::application::interaction::InteractionData;
use twilight_model::gateway::Intents;

use onboardbot::cache::Cache;
use onboardbot::config::Settings;
use onboardbot::db::{ConfigLoader, Store};
use onboardbot::master::{MasterDispatcher, WorkerPool, ENTRANCE_CUSTOM_ID};
use onboardbot::platform::discord::DiscordPlatform;
use onboardbot::platform::response::InteractionReply;
use onboardbot::platform::Platform;
use onboardbot::queue::Queue;
use onboardbot::registry::Registry;
use onboardbot::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load_master()?;
    onboardbot::config::init_tracing(settings.log_format);

    let http = Arc::new(Client::new(settings.bot_token.clone()));
    let bot_user = http.current_user().await?.model().await?;
    let application = http.current_user_application().await?.model().await?;

    let cache = Cache::connect(&settings.redis_url).await?;
    let store = Store::connect(&settings.database_url).await?;
    let config_loader = ConfigLoader::new(cache.clone(), store);

    let registry = Registry::new(cache.clone());
    let queue = Queue::new(cache.clone());
    let sessions = SessionStore::new(cache.clone());

    let (gateway_tx, _gateway_rx) = tokio::sync::mpsc::unbounded_channel();
    let platform = Arc::new(DiscordPlatform::new(http.clone(), application.id, bot_user.id, gateway_tx));

    let pool = WorkerPool { worker_ids: worker_ids() };
    let dispatcher = MasterDispatcher::new(platform.clone(), sessions, registry, queue, pool);

    let intents = Intents::GUILDS | Intents::GUILD_MEMBERS;
    let mut shard = Shard::new(ShardId::ONE, settings.bot_token.clone(), intents);

    info!("master started");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(source) => {
                warn!(?source, "error receiving gateway event");
                continue;
            }
        };

        let Event::InteractionCreate(interaction) = event else {
            continue;
        };
        let interaction = interaction.0;

        let Some(InteractionData::MessageComponent(data)) = &interaction.data else {
            continue;
        };
        if data.custom_id != ENTRANCE_CUSTOM_ID {
            continue;
        }

        let Some(guild_id) = interaction.guild_id else { continue };
        let Some(user_id) = interaction
            .member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(interaction.user.as_ref())
            .map(|user| user.id)
        else {
            continue;
        };

        let dispatcher = dispatcher.clone();
        let platform = platform.clone();
        let config_loader = config_loader.clone();
        tokio::spawn(async move {
            let reply = match config_loader.load(guild_id).await {
                Ok(config) => match dispatcher.start_onboarding(guild_id, user_id, &config).await {
                    Ok(()) => InteractionReply::Ephemeral("onboarding.entrance.started".to_string()),
                    Err(err) => {
                        warn!(%err, "failed to start onboarding");
                        InteractionReply::Ephemeral(
                            err.user_facing_key().unwrap_or("onboarding.error.fatal").to_string(),
                        )
                    }
                },
                Err(err) => {
                    warn!(%err, "failed to load onboarding config");
                    InteractionReply::Ephemeral("onboarding.error.not_configured".to_string())
                }
            };

            if let Err(err) = platform.respond_interaction(interaction.id, &interaction.token, reply).await {
                warn!(%err, "failed to respond to entrance interaction");
            }
        });
    }

    Ok(())
}

fn worker_ids() -> Vec<String> {
    env::var("ONBOARDING_WORKER_IDS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
