use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::db::{PersistenceHandle, Subscription};

/// Targets of one source, keyed by target id in insertion order.
type TargetSet = IndexMap<String, Subscription>;

/// Source id to the text channels notified about it.
///
/// Invariants: a `(source, target)` pair appears at most once and no source
/// key is ever left with an empty target set. The lock is held only for the
/// in-memory mutation; persistence is scheduled after it is released.
pub struct SubscriptionIndex {
    entries: RwLock<IndexMap<String, TargetSet>>,
    persistence: PersistenceHandle,
}

impl SubscriptionIndex {
    pub fn new(persistence: PersistenceHandle) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            persistence,
        }
    }

    /// Returns `true` when the pair was already present, in which case
    /// nothing changes.
    pub fn add(&self, source_id: &str, target_id: &str, group_id: &str) -> bool {
        let already_existed = {
            let mut entries = self.entries.write();
            let targets = entries.entry(source_id.to_string()).or_default();
            if targets.contains_key(target_id) {
                true
            } else {
                targets.insert(
                    target_id.to_string(),
                    Subscription::new(source_id, target_id, group_id),
                );
                false
            }
        };

        if already_existed {
            debug!(
                "subscription already present source={} target={}",
                source_id, target_id
            );
        } else {
            info!(
                "subscription added source={} target={} group={}",
                source_id, target_id, group_id
            );
            self.persistence.schedule();
        }
        already_existed
    }

    /// Returns `true` when a subscription was deleted. The source key is
    /// dropped together with its last subscription.
    pub fn remove(&self, source_id: &str, target_id: &str) -> bool {
        self.remove_if(source_id, target_id, |_| true)
    }

    /// Like [`remove`](Self::remove), but only deletes a subscription that
    /// belongs to `group_id`. Checked and deleted under one write lock.
    pub fn remove_in_group(&self, source_id: &str, target_id: &str, group_id: &str) -> bool {
        self.remove_if(source_id, target_id, |subscription| {
            subscription.group_id == group_id
        })
    }

    fn remove_if(
        &self,
        source_id: &str,
        target_id: &str,
        matches: impl FnOnce(&Subscription) -> bool,
    ) -> bool {
        let existed = {
            let mut entries = self.entries.write();
            let Some(targets) = entries.get_mut(source_id) else {
                return false;
            };
            if !targets.get(target_id).is_some_and(matches) {
                return false;
            }
            targets.shift_remove(target_id);
            if targets.is_empty() {
                entries.shift_remove(source_id);
            }
            true
        };

        if existed {
            info!(
                "subscription removed source={} target={}",
                source_id, target_id
            );
            self.persistence.schedule();
        }
        existed
    }

    pub fn list_by_source(&self, source_id: &str) -> Vec<Subscription> {
        self.entries
            .read()
            .get(source_id)
            .map(|targets| targets.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sources the target is subscribed to within the group.
    pub fn list_by_target(&self, target_id: &str, group_id: &str) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, targets)| {
                targets
                    .get(target_id)
                    .is_some_and(|subscription| subscription.group_id == group_id)
            })
            .map(|(source_id, _)| source_id.clone())
            .collect()
    }

    /// Every subscription of the group, grouped by source.
    pub fn list_all(&self, group_id: &str) -> IndexMap<String, Vec<Subscription>> {
        self.entries
            .read()
            .iter()
            .filter_map(|(source_id, targets)| {
                let in_group: Vec<Subscription> = targets
                    .values()
                    .filter(|subscription| subscription.group_id == group_id)
                    .cloned()
                    .collect();
                (!in_group.is_empty()).then(|| (source_id.clone(), in_group))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.entries.read().contains_key(source_id)
    }

    pub fn snapshot(&self) -> IndexMap<String, Vec<Subscription>> {
        self.entries
            .read()
            .iter()
            .map(|(source_id, targets)| (source_id.clone(), targets.values().cloned().collect()))
            .collect()
    }

    /// Replaces the contents with persisted state without scheduling a write.
    /// Entries are re-keyed under their map key, duplicates are dropped and
    /// empty lists skipped, so a hand-edited file cannot break the invariants.
    pub fn restore(&self, persisted: IndexMap<String, Vec<Subscription>>) {
        let mut restored: IndexMap<String, TargetSet> = IndexMap::new();
        for (source_id, subscriptions) in persisted {
            for mut subscription in subscriptions {
                if subscription.source_id != source_id {
                    debug!(
                        "re-keying persisted subscription {} under {}",
                        subscription.source_id, source_id
                    );
                    subscription.source_id = source_id.clone();
                }
                restored
                    .entry(source_id.clone())
                    .or_default()
                    .entry(subscription.target_id.clone())
                    .or_insert(subscription);
            }
        }
        *self.entries.write() = restored;
    }
}
