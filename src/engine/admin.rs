use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::db::PersistenceHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminDenial {
    /// The guild has no admin channel.
    NoAdminChannel,
    /// Issued from a channel other than the guild's admin channel.
    WrongChannel { admin_channel_id: String },
}

/// Guild id to the one text channel allowed to run admin operations.
pub struct AdminChannelRegistry {
    channels: RwLock<IndexMap<String, String>>,
    persistence: PersistenceHandle,
}

impl AdminChannelRegistry {
    /// `preloaded` comes from configuration and is never replaced by
    /// [`restore`](Self::restore).
    pub fn new(preloaded: IndexMap<String, String>, persistence: PersistenceHandle) -> Self {
        Self {
            channels: RwLock::new(preloaded),
            persistence,
        }
    }

    /// Unconditional overwrite. Privilege checks belong to the caller.
    pub fn set(&self, group_id: &str, target_id: &str) -> Option<String> {
        let previous = self
            .channels
            .write()
            .insert(group_id.to_string(), target_id.to_string());
        info!(
            "admin channel for group {} set to {} (previous={:?})",
            group_id, target_id, previous
        );
        self.persistence.schedule();
        previous
    }

    pub fn get(&self, group_id: &str) -> Option<String> {
        self.channels.read().get(group_id).cloned()
    }

    pub fn authorize(&self, group_id: &str, target_id: &str) -> Result<(), AdminDenial> {
        match self.get(group_id) {
            None => Err(AdminDenial::NoAdminChannel),
            Some(admin_channel_id) if admin_channel_id != target_id => {
                debug!(
                    "admin action denied group={} target={} admin_channel={}",
                    group_id, target_id, admin_channel_id
                );
                Err(AdminDenial::WrongChannel { admin_channel_id })
            }
            Some(_) => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.channels.read().clone()
    }

    /// Merges persisted entries for groups that are not already configured.
    /// Returns how many were taken from the snapshot.
    pub fn restore(&self, persisted: IndexMap<String, String>) -> usize {
        let mut channels = self.channels.write();
        let mut restored = 0;
        for (group_id, target_id) in persisted {
            if channels.contains_key(&group_id) {
                debug!(
                    "keeping configured admin channel for group {}, ignoring persisted {}",
                    group_id, target_id
                );
                continue;
            }
            channels.insert(group_id, target_id);
            restored += 1;
        }
        restored
    }
}
