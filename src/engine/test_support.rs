use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::debounce::DebounceSink;
use super::dispatch::NotificationSender;
use super::router::NameResolver;
use crate::db::{PersistentSnapshot, SnapshotStore, StoreError};

#[derive(Debug, Clone)]
pub struct Fired {
    pub source_id: String,
    pub message: String,
    pub at: Instant,
}

#[derive(Default)]
pub struct RecordingSink {
    fired: Mutex<Vec<Fired>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            fired: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn fired(&self) -> Vec<Fired> {
        self.fired.lock().clone()
    }
}

#[async_trait]
impl DebounceSink for RecordingSink {
    async fn fire(&self, source_id: &str, message: String) {
        self.fired.lock().push(Fired {
            source_id: source_id.to_string(),
            message,
            at: Instant::now(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Records sends; targets listed in `failing` return an error.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: Vec<String>,
}

impl RecordingSender {
    pub fn failing_for(targets: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn emit(&self, target_id: &str, message: &str) -> Result<()> {
        if self.failing.iter().any(|t| t == target_id) {
            return Err(anyhow!("channel {target_id} unavailable"));
        }
        self.sent
            .lock()
            .push((target_id.to_string(), message.to_string()));
        Ok(())
    }
}

/// Resolves from a fixed table; unknown ids are lookup failures.
#[derive(Default)]
pub struct StaticResolver {
    names: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(names: &[(&str, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn channel_name(&self, channel_id: &str) -> Result<String> {
        self.names
            .get(channel_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown channel {channel_id}"))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<PersistentSnapshot>>,
    saves: Mutex<usize>,
    fail_load: bool,
    save_delay: Option<Duration>,
    in_flight: Mutex<(usize, usize)>,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: PersistentSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    /// Every save sleeps for `delay` before it lands.
    pub fn with_save_delay(delay: Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Option<PersistentSnapshot> {
        self.saved.lock().clone()
    }

    pub fn saves_in_flight(&self) -> usize {
        self.in_flight.lock().0
    }

    /// Highest number of saves that ever overlapped.
    pub fn max_saves_in_flight(&self) -> usize {
        self.in_flight.lock().1
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistentSnapshot>, StoreError> {
        if self.fail_load {
            return Err(StoreError::Io(std::io::Error::other("disk on fire")));
        }
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, snapshot: &PersistentSnapshot) -> Result<(), StoreError> {
        {
            let mut in_flight = self.in_flight.lock();
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        *self.saved.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        self.in_flight.lock().0 -= 1;
        Ok(())
    }
}
