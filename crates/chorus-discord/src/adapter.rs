//! Top-level chat-platform adapter (§6): owns the `serenity` `Client`,
//! wires the gateway event handler to the context/dispatch engine, and runs
//! the background maintenance tasks (§5) that belong to no single message —
//! conversation pruning, stale-user cleanup, and the media-cache flush.
//!
//! Everything upstream of this module only ever sees `RawMessage` /
//! `UserFacts` / `ChannelFacts`; this is the one place that owns a live
//! `serenity::Client` and decides how its background tasks are scheduled.

use std::sync::Arc;
use std::time::Duration;

use chorus_core::{ChorusError, Result};
use serenity::prelude::GatewayIntents;
use serenity::Client;
use tracing::{info, warn};

use crate::context::DiscordAppContext;
use crate::handler::Handler;

pub struct DiscordAdapter {
    token: String,
    ctx: Arc<DiscordAppContext>,
}

impl DiscordAdapter {
    pub fn new(token: String, ctx: Arc<DiscordAppContext>) -> Self {
        Self { token, ctx }
    }

    /// Connect to the gateway and run until the shard manager gives up.
    /// Spawns the §5 background maintenance tasks alongside the connection
    /// so they run for the lifetime of the process, not just one guild.
    pub async fn run(self) -> Result<()> {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler::new(Arc::clone(&self.ctx));
        let client = Client::builder(&self.token, intents)
            .event_handler(handler)
            .await
            .map_err(|e| ChorusError::Discord(format!("building gateway client: {e}")))?;

        spawn_maintenance(Arc::clone(&self.ctx));

        let mut client = client;
        client
            .start()
            .await
            .map_err(|e| ChorusError::Discord(format!("gateway connection ended: {e}")))
    }
}

/// §5 background maintenance: the media-cache dirty-flag flush (§4.4 step
/// 8), and a combined prune/cleanup timer keyed to the shortest configured
/// interval so no channel or guild goes longer than its own policy allows
/// between passes.
fn spawn_maintenance(ctx: Arc<DiscordAppContext>) {
    ctx.media_cache.clone().spawn_background_flush();

    let prune_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let interval = Duration::from_secs(prune_ctx.config.chatbot.prune_interval_hours.max(1) as u64 * 3600);
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it so we don't prune on startup
        loop {
            ticker.tick().await;
            match prune_ctx.conversation.prune_all(&prune_ctx.chatbot_config).await {
                Ok(pruned) if pruned > 0 => info!(pruned, "conversation prune pass removed messages"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "conversation prune pass failed"),
            }
        }
    });

    let cleanup_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let horizon = cleanup_ctx.config.chatbot.cleanup_horizon_hours;
        let interval = Duration::from_secs(horizon.max(1) * 3600 / 4);
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for guild_id in cleanup_ctx.known_guilds() {
                match cleanup_ctx.index.cleanup_stale_users(guild_id, horizon).await {
                    Ok(removed) if removed > 0 => info!(guild_id, removed, "removed stale users from index"),
                    Ok(_) => {}
                    Err(e) => warn!(guild_id, error = %e, "stale-user cleanup failed"),
                }
            }
        }
    });
}
