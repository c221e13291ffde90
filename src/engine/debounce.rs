//! Per-(actor, source) debouncing of presence notifications.
//!
//! Each key owns at most one pending timer. Every new event for the key
//! replaces the stored message and restarts the full quiet interval; when the
//! interval elapses without another event the latest message is handed to the
//! [`DebounceSink`] and the key is forgotten.
//!
//! Two lock levels are used. The registry map lock guards inserting, arming
//! and removing keys; each entry has its own lock around the message and timer.
//! Neither is held while the sink runs, so a slow delivery never blocks a new
//! event on the same key from re-arming it.
//!
//! A timer that has already woken up when a new event lands is not cancelled.
//! In that window one extra notification with the older message can go out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub actor_id: String,
    pub source_id: String,
}

impl DebounceKey {
    pub fn new(actor_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            source_id: source_id.into(),
        }
    }
}

/// Receives the settled message once a key has been quiet long enough.
#[async_trait]
pub trait DebounceSink: Send + Sync {
    async fn fire(&self, source_id: &str, message: String);
}

#[derive(Default)]
struct PendingState {
    message: String,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Debouncer {
    state: Mutex<PendingState>,
}

struct RegistryInner {
    interval: Duration,
    sink: Arc<dyn DebounceSink>,
    pending: Mutex<HashMap<DebounceKey, Arc<Debouncer>>>,
}

#[derive(Clone)]
pub struct DebounceRegistry {
    inner: Arc<RegistryInner>,
}

impl DebounceRegistry {
    /// A zero interval is replaced by [`DEFAULT_QUIET_INTERVAL`].
    pub fn new(interval: Duration, sink: Arc<dyn DebounceSink>) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                "debounce interval must be positive, using default {:?}",
                DEFAULT_QUIET_INTERVAL
            );
            DEFAULT_QUIET_INTERVAL
        } else {
            interval
        };

        Self {
            inner: Arc::new(RegistryInner {
                interval,
                sink,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Records `message` as the latest state for `key` and (re)starts its
    /// timer. Must be called from within a tokio runtime.
    pub fn submit(&self, key: DebounceKey, message: String) {
        // Map lock before entry lock, same order as `fire`, so a firing timer
        // cannot drop the entry between lookup and re-arm.
        let mut pending = self.inner.pending.lock();
        let debouncer = pending.entry(key.clone()).or_default().clone();

        let mut state = debouncer.state.lock();
        state.message = message;
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let generation = state.generation;
        let inner = self.inner.clone();
        let fired = debouncer.clone();
        debug!(
            "debounce armed actor={} source={} generation={}",
            key.actor_id, key.source_id, generation
        );
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.interval).await;
            inner.fire(key, fired, generation).await;
        }));
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, key: &DebounceKey) -> bool {
        self.inner.pending.lock().contains_key(key)
    }
}

impl RegistryInner {
    async fn fire(&self, key: DebounceKey, debouncer: Arc<Debouncer>, generation: u64) {
        let message = {
            let mut state = debouncer.state.lock();
            if state.generation != generation {
                return;
            }
            // Detach our own handle so a reset during delivery cannot abort it.
            state.timer = None;
            state.message.clone()
        };

        debug!(
            "debounce fired actor={} source={} generation={}",
            key.actor_id, key.source_id, generation
        );
        self.sink.fire(&key.source_id, message).await;

        let mut pending = self.pending.lock();
        let superseded = debouncer.state.lock().generation != generation;
        let still_registered = pending
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &debouncer));
        if still_registered && !superseded {
            pending.remove(&key);
        }
    }
}
