use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use super::admin::{AdminChannelRegistry, AdminDenial};
use super::subscriptions::SubscriptionIndex;
use crate::db::Subscription;

/// A user request, already stripped of platform details. `target_id` is
/// always the text channel the request was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe {
        source_id: Option<String>,
        target_id: String,
        group_id: String,
    },
    Unsubscribe {
        source_id: Option<String>,
        target_id: String,
        group_id: String,
    },
    SetAdminChannel {
        group_id: String,
        target_id: String,
        is_administrator: bool,
    },
    ListSubscriptions {
        group_id: String,
        target_id: String,
    },
    ManageSource {
        group_id: String,
        target_id: String,
        source_id: String,
    },
    RemoveSubscription {
        group_id: String,
        target_id: String,
        source_id: String,
        subscribed_target_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Subscribed {
        source_id: String,
        already_subscribed: bool,
    },
    /// No source given; the presentation layer should offer a picker.
    PickSourceToSubscribe,
    Unsubscribed {
        source_id: String,
        was_subscribed: bool,
    },
    NothingToUnsubscribe,
    /// More than one candidate; nothing was removed.
    PickSourceToUnsubscribe {
        candidates: Vec<String>,
    },
    AdminChannelSet {
        target_id: String,
    },
    NotAdministrator,
    AdminDenied(AdminDenial),
    SubscriptionList(SubscriptionListing),
    SourceSubscriptions {
        source_id: String,
        subscriptions: Vec<Subscription>,
    },
    SubscriptionRemoved {
        source_id: String,
        target_id: String,
        removed: bool,
    },
}

/// Subscriptions of one guild grouped by voice channel, in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionListing {
    pub sources: IndexMap<String, Vec<Subscription>>,
}

impl SubscriptionListing {
    pub fn total(&self) -> usize {
        self.sources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub struct CommandHandler {
    subscriptions: Arc<SubscriptionIndex>,
    admin_channels: Arc<AdminChannelRegistry>,
}

impl CommandHandler {
    pub fn new(
        subscriptions: Arc<SubscriptionIndex>,
        admin_channels: Arc<AdminChannelRegistry>,
    ) -> Self {
        Self {
            subscriptions,
            admin_channels,
        }
    }

    pub fn handle(&self, command: Command) -> CommandOutcome {
        debug!("handling command {:?}", command);
        match command {
            Command::Subscribe {
                source_id,
                target_id,
                group_id,
            } => match source_id {
                Some(source_id) => self.subscribe(source_id, &target_id, &group_id),
                None => CommandOutcome::PickSourceToSubscribe,
            },
            Command::Unsubscribe {
                source_id,
                target_id,
                group_id,
            } => match source_id {
                Some(source_id) => self.unsubscribe(source_id, &target_id),
                None => self.unsubscribe_from_target(&target_id, &group_id),
            },
            Command::SetAdminChannel {
                group_id,
                target_id,
                is_administrator,
            } => {
                if !is_administrator {
                    info!(
                        "rejected admin channel change for group {} from non-administrator",
                        group_id
                    );
                    return CommandOutcome::NotAdministrator;
                }
                self.admin_channels.set(&group_id, &target_id);
                CommandOutcome::AdminChannelSet { target_id }
            }
            Command::ListSubscriptions {
                group_id,
                target_id,
            } => {
                if let Err(denial) = self.admin_channels.authorize(&group_id, &target_id) {
                    return CommandOutcome::AdminDenied(denial);
                }
                CommandOutcome::SubscriptionList(SubscriptionListing {
                    sources: self.subscriptions.list_all(&group_id),
                })
            }
            Command::ManageSource {
                group_id,
                target_id,
                source_id,
            } => {
                if let Err(denial) = self.admin_channels.authorize(&group_id, &target_id) {
                    return CommandOutcome::AdminDenied(denial);
                }
                let subscriptions = self
                    .subscriptions
                    .list_by_source(&source_id)
                    .into_iter()
                    .filter(|subscription| subscription.group_id == group_id)
                    .collect();
                CommandOutcome::SourceSubscriptions {
                    source_id,
                    subscriptions,
                }
            }
            Command::RemoveSubscription {
                group_id,
                target_id,
                source_id,
                subscribed_target_id,
            } => {
                if let Err(denial) = self.admin_channels.authorize(&group_id, &target_id) {
                    return CommandOutcome::AdminDenied(denial);
                }
                let removed = self.subscriptions.remove_in_group(
                    &source_id,
                    &subscribed_target_id,
                    &group_id,
                );
                CommandOutcome::SubscriptionRemoved {
                    source_id,
                    target_id: subscribed_target_id,
                    removed,
                }
            }
        }
    }

    fn subscribe(&self, source_id: String, target_id: &str, group_id: &str) -> CommandOutcome {
        let already_subscribed = self.subscriptions.add(&source_id, target_id, group_id);
        CommandOutcome::Subscribed {
            source_id,
            already_subscribed,
        }
    }

    fn unsubscribe(&self, source_id: String, target_id: &str) -> CommandOutcome {
        let was_subscribed = self.subscriptions.remove(&source_id, target_id);
        CommandOutcome::Unsubscribed {
            source_id,
            was_subscribed,
        }
    }

    fn unsubscribe_from_target(&self, target_id: &str, group_id: &str) -> CommandOutcome {
        let mut candidates = self.subscriptions.list_by_target(target_id, group_id);
        match candidates.len() {
            0 => CommandOutcome::NothingToUnsubscribe,
            1 => {
                let source_id = candidates.remove(0);
                self.unsubscribe(source_id, target_id)
            }
            _ => CommandOutcome::PickSourceToUnsubscribe { candidates },
        }
    }
}
