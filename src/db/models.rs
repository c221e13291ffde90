use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A voice channel watched on behalf of a text channel, both in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "voice_channel_id")]
    pub source_id: String,
    #[serde(rename = "text_channel_id")]
    pub target_id: String,
    #[serde(rename = "guild_id")]
    pub group_id: String,
}

impl Subscription {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            group_id: group_id.into(),
        }
    }
}

/// Durable form of the subscription index and the admin channel registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSnapshot {
    #[serde(default)]
    pub subscriptions: IndexMap<String, Vec<Subscription>>,
    #[serde(default)]
    pub admin_channels: IndexMap<String, String>,
}

impl PersistentSnapshot {
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}
