use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client as SerenityClient, Context as SerenityContext,
    EventHandler as SerenityEventHandler, GatewayIntents, Http, Interaction, Member, Ready,
    VoiceState,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{NameResolver, NotificationSender, NotifyEngine, PresenceEvent};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT_SECONDS: u64 = 30;

pub mod embed;
pub mod interactions;

/// Parses a Discord snowflake. Zero is rejected since serenity ids cannot
/// hold it.
pub fn parse_snowflake(id: &str) -> Result<u64> {
    let raw: u64 = id
        .trim()
        .parse()
        .map_err(|err| anyhow!("invalid discord id {id:?}: {err}"))?;
    if raw == 0 {
        return Err(anyhow!("invalid discord id {id:?}: zero"));
    }
    Ok(raw)
}

/// Channel names through the gateway context, cache first.
pub struct ContextResolver<'a> {
    ctx: &'a SerenityContext,
}

impl<'a> ContextResolver<'a> {
    pub fn new(ctx: &'a SerenityContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<'a> NameResolver for ContextResolver<'a> {
    async fn channel_name(&self, channel_id: &str) -> Result<String> {
        let channel = ChannelId::new(parse_snowflake(channel_id)?)
            .to_channel(self.ctx)
            .await?;
        channel
            .guild()
            .map(|channel| channel.name)
            .ok_or_else(|| anyhow!("channel {channel_id} is not a guild channel"))
    }
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

struct GatewayHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    http_sender: Arc<AsyncMutex<Option<oneshot::Sender<Arc<Http>>>>>,
    engine: Arc<RwLock<Option<Arc<NotifyEngine>>>>,
}

impl GatewayHandler {
    async fn engine(&self) -> Option<Arc<NotifyEngine>> {
        self.engine.read().await.clone()
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({}) in {} guilds",
            ready.user.name,
            ready.user.id,
            ready.guilds.len()
        );
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
        if let Some(sender) = self.http_sender.lock().await.take() {
            let _ = sender.send(ctx.http);
        }
    }

    async fn voice_state_update(
        &self,
        ctx: SerenityContext,
        old: Option<VoiceState>,
        new: VoiceState,
    ) {
        let Some(engine) = self.engine().await else {
            debug!("ignoring voice state update before engine binding");
            return;
        };

        let member = match new.member.clone() {
            Some(member) => member,
            None => {
                let Some(guild_id) = new.guild_id else {
                    debug!("ignoring voice state update outside a guild");
                    return;
                };
                match guild_id.member(&ctx, new.user_id).await {
                    Ok(member) => member,
                    Err(err) => {
                        warn!(
                            "failed to fetch member {} in guild {}: {err}",
                            new.user_id, guild_id
                        );
                        return;
                    }
                }
            }
        };

        let event = presence_event(
            &member,
            old.and_then(|state| state.channel_id),
            new.channel_id,
        );

        let resolver = ContextResolver::new(&ctx);
        engine.handle_presence(&event, &resolver).await;
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        let Some(engine) = self.engine().await else {
            debug!("ignoring interaction before engine binding");
            return;
        };
        interactions::handle_interaction(&ctx, &engine, interaction).await;
    }
}

/// Flattens a voice state change into the engine's event. The account
/// username is used, not the global display name.
fn presence_event(
    member: &Member,
    previous: Option<ChannelId>,
    current: Option<ChannelId>,
) -> PresenceEvent {
    PresenceEvent {
        actor_id: member.user.id.to_string(),
        is_bot: member.user.bot,
        username: member.user.name.clone(),
        nickname: member.nick.clone(),
        previous_source_id: previous.map(|id| id.to_string()),
        current_source_id: current.map(|id| id.to_string()),
    }
}

#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    engine: Arc<RwLock<Option<Arc<NotifyEngine>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
}

impl DiscordClient {
    pub fn new(config: Arc<Config>) -> Self {
        info!("initializing discord client");
        Self {
            config,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            engine: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_engine(&self, engine: Arc<NotifyEngine>) {
        *self.engine.write().await = Some(engine);
    }

    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (http_tx, http_rx) = oneshot::channel();
        let event_handler = GatewayHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            http_sender: Arc::new(AsyncMutex::new(Some(http_tx))),
            engine: self.engine.clone(),
        };

        let mut gateway_client =
            SerenityClient::builder(&self.config.auth.bot_token, Self::intents())
                .event_handler(event_handler)
                .await
                .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        let ready_timeout = std::time::Duration::from_secs(READY_TIMEOUT_SECONDS);
        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");

                match tokio::time::timeout(std::time::Duration::from_secs(5), http_rx).await {
                    Ok(Ok(http)) => *self.http.write().await = Some(http),
                    _ => warn!("discord http client was not handed over, sends will fail"),
                }
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    /// Logs in, retrying with exponential backoff until it succeeds.
    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(retry_seconds)).await;
                    retry_seconds = next_retry_seconds(retry_seconds);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        *self.http.write().await = None;
        info!("discord client stopped");
        Ok(())
    }
}

fn next_retry_seconds(current: u64) -> u64 {
    (current * 2).min(MAX_LOGIN_RETRY_SECONDS)
}

#[async_trait]
impl NotificationSender for DiscordClient {
    async fn emit(&self, target_id: &str, message: &str) -> Result<()> {
        let http = self
            .http
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("discord http client is not ready"))?;
        let channel_id = ChannelId::new(parse_snowflake(target_id)?);
        channel_id.say(&*http, message).await?;
        debug!("sent notification to discord channel {}", target_id);
        Ok(())
    }
}
