use serenity::all::{
    ChannelId, ChannelType, CommandDataOptionValue, ComponentInteractionDataKind,
    Context as SerenityContext, CreateInteractionResponse, CreateInteractionResponseMessage,
    GuildId, Interaction, Member, Permissions,
};
use tracing::{debug, error, warn};

use super::embed::{
    self, CHANNEL_FETCH_FAILED, GUILD_ONLY, INVALID_BUTTON, NO_CHANNEL_SELECTED,
    NO_VOICE_CHANNELS, NOTHING_TO_UNSUBSCRIBE, NOT_ADMINISTRATOR, NamedSource,
};
use super::{ContextResolver, parse_snowflake};
use crate::engine::router::NameResolver;
use crate::engine::{Command, CommandOutcome, NotifyEngine};

pub const SUBSCRIBE_COMMAND: &str = "subscribe";
pub const UNSUBSCRIBE_COMMAND: &str = "unsubscribe";
pub const LIST_COMMAND: &str = "list-subscriptions";
pub const SET_ADMIN_COMMAND: &str = "set-admin-channel";

pub const SUBSCRIBE_SELECT_ID: &str = "subscribe_channel_select";
pub const UNSUBSCRIBE_SELECT_ID: &str = "unsubscribe_channel_select";
pub const MANAGE_SELECT_ID: &str = "manage_subscription_select";
pub const BACK_TO_LIST_ID: &str = "back_to_subscription_list";
pub const REMOVE_SUBSCRIPTION_PREFIX: &str = "remove_sub:";

/// Where an interaction came from and who issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionOrigin {
    pub group_id: String,
    pub target_id: String,
    pub is_administrator: bool,
}

impl InteractionOrigin {
    /// `None` outside a guild.
    pub fn new(guild_id: Option<GuildId>, channel_id: ChannelId, member: Option<&Member>) -> Option<Self> {
        let guild_id = guild_id?;
        let is_administrator = member
            .and_then(|member| member.permissions)
            .is_some_and(|permissions| permissions.contains(Permissions::ADMINISTRATOR));
        Some(Self {
            group_id: guild_id.to_string(),
            target_id: channel_id.to_string(),
            is_administrator,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInteraction {
    Run(Command),
    Reject(&'static str),
    Ignore,
}

pub fn parse_slash_command(
    name: &str,
    channel_option: Option<String>,
    origin: &InteractionOrigin,
) -> ParsedInteraction {
    let group_id = origin.group_id.clone();
    let target_id = origin.target_id.clone();
    let command = match name {
        SUBSCRIBE_COMMAND => Command::Subscribe {
            source_id: channel_option,
            target_id,
            group_id,
        },
        UNSUBSCRIBE_COMMAND => Command::Unsubscribe {
            source_id: channel_option,
            target_id,
            group_id,
        },
        LIST_COMMAND => Command::ListSubscriptions {
            group_id,
            target_id,
        },
        SET_ADMIN_COMMAND => Command::SetAdminChannel {
            group_id,
            target_id: channel_option.unwrap_or(target_id),
            is_administrator: origin.is_administrator,
        },
        other => {
            debug!("ignoring unknown slash command {}", other);
            return ParsedInteraction::Ignore;
        }
    };
    ParsedInteraction::Run(command)
}

/// Splits `remove_sub:<voice>:<text>`.
pub fn parse_remove_button(custom_id: &str) -> Option<(String, String)> {
    let rest = custom_id.strip_prefix(REMOVE_SUBSCRIPTION_PREFIX)?;
    let (source_id, target_id) = rest.split_once(':')?;
    if source_id.is_empty() || target_id.is_empty() || target_id.contains(':') {
        return None;
    }
    Some((source_id.to_string(), target_id.to_string()))
}

pub fn parse_component(
    custom_id: &str,
    values: &[String],
    origin: &InteractionOrigin,
) -> ParsedInteraction {
    let group_id = origin.group_id.clone();
    let target_id = origin.target_id.clone();

    if custom_id.starts_with(REMOVE_SUBSCRIPTION_PREFIX) {
        return match parse_remove_button(custom_id) {
            Some((source_id, subscribed_target_id)) => {
                ParsedInteraction::Run(Command::RemoveSubscription {
                    group_id,
                    target_id,
                    source_id,
                    subscribed_target_id,
                })
            }
            None => ParsedInteraction::Reject(INVALID_BUTTON),
        };
    }

    let selected = values.first().cloned();
    let command = match (custom_id, selected) {
        (BACK_TO_LIST_ID, _) => Command::ListSubscriptions {
            group_id,
            target_id,
        },
        (SUBSCRIBE_SELECT_ID | UNSUBSCRIBE_SELECT_ID | MANAGE_SELECT_ID, None) => {
            return ParsedInteraction::Reject(NO_CHANNEL_SELECTED);
        }
        (SUBSCRIBE_SELECT_ID, Some(source_id)) => Command::Subscribe {
            source_id: Some(source_id),
            target_id,
            group_id,
        },
        (UNSUBSCRIBE_SELECT_ID, Some(source_id)) => Command::Unsubscribe {
            source_id: Some(source_id),
            target_id,
            group_id,
        },
        (MANAGE_SELECT_ID, Some(source_id)) => Command::ManageSource {
            group_id,
            target_id,
            source_id,
        },
        (other, _) => {
            debug!("ignoring unknown component {}", other);
            return ParsedInteraction::Ignore;
        }
    };
    ParsedInteraction::Run(command)
}

async fn name_or_id(resolver: &dyn NameResolver, channel_id: &str) -> String {
    match resolver.channel_name(channel_id).await {
        Ok(name) => name,
        Err(err) => {
            debug!("channel name lookup failed for {}: {err}", channel_id);
            channel_id.to_string()
        }
    }
}

async fn named(resolver: &dyn NameResolver, channel_id: &str) -> NamedSource {
    NamedSource::new(channel_id, name_or_id(resolver, channel_id).await)
}

async fn guild_voice_channels(ctx: &SerenityContext, group_id: &str) -> anyhow::Result<Vec<NamedSource>> {
    let guild_id = GuildId::new(parse_snowflake(group_id)?);
    let mut channels: Vec<_> = guild_id
        .channels(&ctx.http)
        .await?
        .into_values()
        .filter(|channel| channel.kind == ChannelType::Voice)
        .collect();
    channels.sort_by_key(|channel| (channel.position, channel.id));
    Ok(channels
        .into_iter()
        .map(|channel| NamedSource::new(channel.id.to_string(), channel.name))
        .collect())
}

/// Renders an outcome. `in_place` replaces the component message the
/// interaction came from instead of posting a new ephemeral reply.
async fn present(
    ctx: &SerenityContext,
    origin: &InteractionOrigin,
    outcome: CommandOutcome,
    in_place: bool,
) -> CreateInteractionResponseMessage {
    let resolver = ContextResolver::new(ctx);
    let text = |content: String| {
        if in_place {
            embed::text_update(content)
        } else {
            embed::text_reply(content)
        }
    };

    match outcome {
        CommandOutcome::Subscribed {
            source_id,
            already_subscribed,
        } => text(embed::subscribed_text(
            &name_or_id(&resolver, &source_id).await,
            already_subscribed,
        )),
        CommandOutcome::PickSourceToSubscribe => {
            match guild_voice_channels(ctx, &origin.group_id).await {
                Ok(channels) if channels.is_empty() => text(NO_VOICE_CHANNELS.to_string()),
                Ok(channels) => embed::channel_picker(
                    SUBSCRIBE_SELECT_ID,
                    "Select a voice channel to monitor:",
                    &channels,
                ),
                Err(err) => {
                    warn!(
                        "failed to fetch voice channels for guild {}: {err}",
                        origin.group_id
                    );
                    text(CHANNEL_FETCH_FAILED.to_string())
                }
            }
        }
        CommandOutcome::Unsubscribed {
            source_id,
            was_subscribed,
        } => text(embed::unsubscribed_text(
            &name_or_id(&resolver, &source_id).await,
            was_subscribed,
        )),
        CommandOutcome::NothingToUnsubscribe => text(NOTHING_TO_UNSUBSCRIBE.to_string()),
        CommandOutcome::PickSourceToUnsubscribe { candidates } => {
            let mut channels = Vec::with_capacity(candidates.len());
            for source_id in &candidates {
                channels.push(named(&resolver, source_id).await);
            }
            embed::channel_picker(
                UNSUBSCRIBE_SELECT_ID,
                "Select a voice channel to unsubscribe from:",
                &channels,
            )
        }
        CommandOutcome::AdminChannelSet { target_id } => {
            text(embed::admin_channel_set_text(&target_id))
        }
        CommandOutcome::NotAdministrator => embed::text_reply(NOT_ADMINISTRATOR),
        CommandOutcome::AdminDenied(denial) => embed::text_reply(embed::denial_text(&denial)),
        CommandOutcome::SubscriptionList(listing) => {
            let mut sources = Vec::with_capacity(listing.sources.len());
            for (source_id, subscriptions) in listing.sources {
                sources.push((named(&resolver, &source_id).await, subscriptions));
            }
            embed::subscription_list(&sources)
        }
        CommandOutcome::SourceSubscriptions {
            source_id,
            subscriptions,
        } => embed::manage_view(&named(&resolver, &source_id).await, &subscriptions),
        CommandOutcome::SubscriptionRemoved {
            source_id,
            target_id,
            removed,
        } => embed::removal_result(&named(&resolver, &source_id).await, &target_id, removed),
    }
}

/// Denials never overwrite the message the user clicked on.
fn replaces_component_message(outcome: &CommandOutcome) -> bool {
    !matches!(
        outcome,
        CommandOutcome::AdminDenied(_) | CommandOutcome::NotAdministrator
    )
}

pub(super) async fn handle_interaction(
    ctx: &SerenityContext,
    engine: &NotifyEngine,
    interaction: Interaction,
) {
    match interaction {
        Interaction::Command(command) => {
            let origin = InteractionOrigin::new(
                command.guild_id,
                command.channel_id,
                command.member.as_deref(),
            );
            let message = match origin {
                None => embed::text_reply(GUILD_ONLY),
                Some(origin) => {
                    let channel_option = command.data.options.iter().find_map(|option| {
                        match option.value {
                            CommandDataOptionValue::Channel(channel_id) => {
                                Some(channel_id.to_string())
                            }
                            _ => None,
                        }
                    });
                    match parse_slash_command(&command.data.name, channel_option, &origin) {
                        ParsedInteraction::Run(parsed) => {
                            let outcome = engine.handle_command(parsed);
                            present(ctx, &origin, outcome, false).await
                        }
                        ParsedInteraction::Reject(content) => embed::text_reply(content),
                        ParsedInteraction::Ignore => return,
                    }
                }
            };
            if let Err(err) = command
                .create_response(&ctx.http, CreateInteractionResponse::Message(message))
                .await
            {
                error!(
                    "failed to respond to command {}: {err}",
                    command.data.name
                );
            }
        }
        Interaction::Component(component) => {
            let origin = InteractionOrigin::new(
                component.guild_id,
                component.channel_id,
                component.member.as_ref(),
            );
            let response = match origin {
                None => CreateInteractionResponse::Message(embed::text_reply(GUILD_ONLY)),
                Some(origin) => {
                    let values = match &component.data.kind {
                        ComponentInteractionDataKind::StringSelect { values } => values.clone(),
                        _ => Vec::new(),
                    };
                    match parse_component(&component.data.custom_id, &values, &origin) {
                        ParsedInteraction::Run(parsed) => {
                            let outcome = engine.handle_command(parsed);
                            if replaces_component_message(&outcome) {
                                CreateInteractionResponse::UpdateMessage(
                                    present(ctx, &origin, outcome, true).await,
                                )
                            } else {
                                CreateInteractionResponse::Message(
                                    present(ctx, &origin, outcome, false).await,
                                )
                            }
                        }
                        ParsedInteraction::Reject(content) => {
                            CreateInteractionResponse::Message(embed::text_reply(content))
                        }
                        ParsedInteraction::Ignore => return,
                    }
                }
            };
            if let Err(err) = component.create_response(&ctx.http, response).await {
                error!(
                    "failed to respond to component {}: {err}",
                    component.data.custom_id
                );
            }
        }
        other => debug!("ignoring interaction of kind {:?}", other.kind()),
    }
}
