use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{PersistentSnapshot, SnapshotStore, StoreError};
use crate::engine::admin::AdminChannelRegistry;
use crate::engine::subscriptions::SubscriptionIndex;

/// Requests a background snapshot write. Cheap to clone and never blocks.
#[derive(Clone, Debug, Default)]
pub struct PersistenceHandle {
    tx: Option<UnboundedSender<()>>,
}

impl PersistenceHandle {
    /// A handle that drops every request, for state that is never saved.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn schedule(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(()).is_err() {
            debug!("persistence writer is gone, dropping save request");
        }
    }
}

/// Moves state between the in-memory registries and a [`SnapshotStore`].
pub struct PersistenceBridge {
    store: Arc<dyn SnapshotStore>,
    subscriptions: Arc<SubscriptionIndex>,
    admin_channels: Arc<AdminChannelRegistry>,
}

impl PersistenceBridge {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        subscriptions: Arc<SubscriptionIndex>,
        admin_channels: Arc<AdminChannelRegistry>,
    ) -> Self {
        Self {
            store,
            subscriptions,
            admin_channels,
        }
    }

    pub fn snapshot(&self) -> PersistentSnapshot {
        PersistentSnapshot {
            subscriptions: self.subscriptions.snapshot(),
            admin_channels: self.admin_channels.snapshot(),
        }
    }

    /// Loads the stored snapshot into the registries. A missing or unreadable
    /// snapshot leaves them empty; startup never fails on it.
    pub async fn restore(&self) {
        match self.store.load().await {
            Ok(Some(snapshot)) => {
                let subscription_count = snapshot.subscription_count();
                self.subscriptions.restore(snapshot.subscriptions);
                let admin_count = self.admin_channels.restore(snapshot.admin_channels);
                info!(
                    "restored {} subscriptions and {} admin channels",
                    subscription_count, admin_count
                );
            }
            Ok(None) => info!("no persisted state found, starting empty"),
            Err(err) => warn!("failed to load persisted state, starting empty: {err}"),
        }
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await
    }

    /// Single writer for all save requests. Requests that queue up while a
    /// write is running are folded into the next one.
    pub fn spawn_writer(self: Arc<Self>, mut rx: UnboundedReceiver<()>) -> PersistenceWriter {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    request = rx.recv() => {
                        if request.is_none() {
                            break;
                        }
                        let mut coalesced = 0usize;
                        while rx.try_recv().is_ok() {
                            coalesced += 1;
                        }
                        if coalesced > 0 {
                            debug!("coalesced {} save requests", coalesced);
                        }
                        // A save in progress always runs to completion; stop
                        // is only observed between saves.
                        if let Err(err) = self.flush().await {
                            warn!("failed to persist state: {err}");
                        }
                    }
                }
            }
            debug!("persistence writer stopped");
        });
        PersistenceWriter {
            stop: stop_tx,
            task,
        }
    }
}

/// The running background writer.
pub struct PersistenceWriter {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PersistenceWriter {
    /// Waits for an in-flight save to finish, then ends the task. Requests
    /// still queued are left to the caller's final flush.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!("persistence writer task failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use indexmap::IndexMap;

    use super::{PersistenceBridge, PersistenceHandle};
    use crate::db::{PersistentSnapshot, Subscription};
    use crate::engine::admin::AdminChannelRegistry;
    use crate::engine::subscriptions::SubscriptionIndex;
    use crate::engine::test_support::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        subscriptions: Arc<SubscriptionIndex>,
        admin_channels: Arc<AdminChannelRegistry>,
        bridge: Arc<PersistenceBridge>,
    }

    fn fixture(store: MemoryStore, handle: PersistenceHandle, preloaded: &[(&str, &str)]) -> Fixture {
        let store = Arc::new(store);
        let subscriptions = Arc::new(SubscriptionIndex::new(handle.clone()));
        let admin_channels = Arc::new(AdminChannelRegistry::new(
            preloaded
                .iter()
                .map(|(g, c)| (g.to_string(), c.to_string()))
                .collect(),
            handle,
        ));
        let bridge = Arc::new(PersistenceBridge::new(
            store.clone(),
            subscriptions.clone(),
            admin_channels.clone(),
        ));
        Fixture {
            store,
            subscriptions,
            admin_channels,
            bridge,
        }
    }

    fn persisted() -> PersistentSnapshot {
        let mut subscriptions = IndexMap::new();
        subscriptions.insert(
            "v1".to_string(),
            vec![
                Subscription::new("v1", "t1", "g1"),
                Subscription::new("v1", "t2", "g1"),
            ],
        );
        let mut admin_channels = IndexMap::new();
        admin_channels.insert("g1".to_string(), "persisted".to_string());
        admin_channels.insert("g2".to_string(), "a2".to_string());
        PersistentSnapshot {
            subscriptions,
            admin_channels,
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn detached_handle_ignores_requests() {
        PersistenceHandle::detached().schedule();
        PersistenceHandle::default().schedule();
    }

    #[test]
    fn schedule_after_receiver_dropped_is_harmless() {
        let (handle, rx) = PersistenceHandle::channel();
        drop(rx);
        handle.schedule();
    }

    #[tokio::test]
    async fn restore_loads_snapshot_and_keeps_configured_admin_channels() {
        let f = fixture(
            MemoryStore::with_snapshot(persisted()),
            PersistenceHandle::detached(),
            &[("g1", "configured")],
        );

        f.bridge.restore().await;

        assert_eq!(f.subscriptions.len(), 2);
        assert_eq!(f.admin_channels.get("g1"), Some("configured".to_string()));
        assert_eq!(f.admin_channels.get("g2"), Some("a2".to_string()));
        assert_eq!(f.store.save_count(), 0);
    }

    #[tokio::test]
    async fn restore_with_failing_store_starts_empty() {
        let f = fixture(
            MemoryStore::failing_load(),
            PersistenceHandle::detached(),
            &[("g1", "configured")],
        );

        f.bridge.restore().await;

        assert!(f.subscriptions.is_empty());
        assert_eq!(f.admin_channels.len(), 1);
    }

    #[tokio::test]
    async fn flush_writes_current_state() {
        let f = fixture(MemoryStore::default(), PersistenceHandle::detached(), &[]);
        f.subscriptions.add("v1", "t1", "g1");
        f.admin_channels.set("g1", "a1");

        f.bridge.flush().await.expect("flush");

        let saved = f.store.saved().expect("snapshot saved");
        assert_eq!(saved.subscription_count(), 1);
        assert_eq!(saved.admin_channels["g1"], "a1");
    }

    #[tokio::test]
    async fn writer_coalesces_queued_requests() {
        let (handle, rx) = PersistenceHandle::channel();
        let f = fixture(MemoryStore::default(), handle, &[]);
        let writer = f.bridge.clone().spawn_writer(rx);

        f.subscriptions.add("v1", "t1", "g1");
        f.subscriptions.add("v1", "t2", "g1");
        f.admin_channels.set("g1", "a1");
        settle().await;

        assert_eq!(f.store.save_count(), 1);
        let saved = f.store.saved().expect("snapshot saved");
        assert_eq!(saved.subscription_count(), 2);
        assert_eq!(saved.admin_channels.len(), 1);

        f.subscriptions.remove("v1", "t1");
        settle().await;

        assert_eq!(f.store.save_count(), 2);
        assert_eq!(f.store.saved().expect("snapshot saved").subscription_count(), 1);
        writer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_save() {
        let (handle, rx) = PersistenceHandle::channel();
        let f = fixture(MemoryStore::with_save_delay(Duration::from_secs(5)), handle, &[]);
        let writer = f.bridge.clone().spawn_writer(rx);

        f.subscriptions.add("v1", "t1", "g1");
        settle().await;
        assert_eq!(f.store.saves_in_flight(), 1);

        writer.stop().await;

        assert_eq!(f.store.saves_in_flight(), 0);
        assert_eq!(f.store.save_count(), 1);

        f.subscriptions.add("v1", "t2", "g1");
        f.bridge.flush().await.expect("final flush");

        assert_eq!(f.store.max_saves_in_flight(), 1);
        assert_eq!(f.store.save_count(), 2);
        assert_eq!(f.store.saved().expect("snapshot saved").subscription_count(), 2);
    }

    #[tokio::test]
    async fn stop_ends_idle_writer() {
        let (handle, rx) = PersistenceHandle::channel();
        let f = fixture(MemoryStore::default(), handle, &[]);
        let writer = f.bridge.clone().spawn_writer(rx);

        writer.stop().await;
        f.subscriptions.add("v1", "t1", "g1");
        settle().await;

        assert_eq!(f.store.save_count(), 0);
    }
}
