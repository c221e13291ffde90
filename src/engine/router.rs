use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::debounce::{DebounceKey, DebounceRegistry};

pub const JOINED_GLYPH: &str = "🔊";
pub const LEFT_GLYPH: &str = "🔇";

/// Looks up human-readable channel names for rendering.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn channel_name(&self, channel_id: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChangeKind {
    Joined,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub kind: PresenceChangeKind,
    pub source_id: String,
}

/// A decoded voice-state update.
#[derive(Debug, Clone, Default)]
pub struct PresenceEvent {
    pub actor_id: String,
    pub is_bot: bool,
    pub username: String,
    pub nickname: Option<String>,
    pub previous_source_id: Option<String>,
    pub current_source_id: Option<String>,
}

impl PresenceEvent {
    /// Guild nickname when set, account username otherwise.
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|nick| !nick.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Derives the notifications implied by moving from `previous` to `current`.
/// Empty ids count as "no channel". A move yields the leave before the join.
pub fn classify(previous: Option<&str>, current: Option<&str>) -> Vec<PresenceChange> {
    let previous = previous.filter(|id| !id.is_empty());
    let current = current.filter(|id| !id.is_empty());

    let left = |source_id: &str| PresenceChange {
        kind: PresenceChangeKind::Left,
        source_id: source_id.to_string(),
    };
    let joined = |source_id: &str| PresenceChange {
        kind: PresenceChangeKind::Joined,
        source_id: source_id.to_string(),
    };

    match (previous, current) {
        (None, Some(current)) => vec![joined(current)],
        (Some(previous), None) => vec![left(previous)],
        (Some(previous), Some(current)) if previous != current => {
            vec![left(previous), joined(current)]
        }
        _ => Vec::new(),
    }
}

pub fn render_message(kind: PresenceChangeKind, display_name: &str, source_name: &str) -> String {
    match kind {
        PresenceChangeKind::Joined => {
            format!("{JOINED_GLYPH} **{display_name}** joined **{source_name}**")
        }
        PresenceChangeKind::Left => {
            format!("{LEFT_GLYPH} **{display_name}** left **{source_name}**")
        }
    }
}

/// Turns presence events into debounced notifications.
pub struct EventRouter {
    debouncer: DebounceRegistry,
}

impl EventRouter {
    pub fn new(debouncer: DebounceRegistry) -> Self {
        Self { debouncer }
    }

    /// Returns the number of debounce entries armed by the event.
    pub async fn route(&self, event: &PresenceEvent, resolver: &dyn NameResolver) -> usize {
        if event.is_bot {
            debug!("ignoring voice state update from bot {}", event.actor_id);
            return 0;
        }

        let changes = classify(
            event.previous_source_id.as_deref(),
            event.current_source_id.as_deref(),
        );
        if changes.is_empty() {
            debug!(
                "voice state update without channel change actor={}",
                event.actor_id
            );
            return 0;
        }

        let display_name = event.display_name();
        for change in &changes {
            let source_name = match resolver.channel_name(&change.source_id).await {
                Ok(name) => name,
                Err(err) => {
                    debug!(
                        "channel name lookup failed for {}: {err}, using id",
                        change.source_id
                    );
                    change.source_id.clone()
                }
            };
            let message = render_message(change.kind, display_name, &source_name);
            self.debouncer.submit(
                DebounceKey::new(event.actor_id.clone(), change.source_id.clone()),
                message,
            );
        }
        changes.len()
    }
}
