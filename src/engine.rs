use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::info;

use crate::config::Config;
use crate::db::{PersistenceBridge, PersistenceHandle, PersistenceWriter, SnapshotStore, StoreError};

pub mod admin;
pub mod commands;
pub mod debounce;
pub mod dispatch;
pub mod router;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::admin::{AdminChannelRegistry, AdminDenial};
pub use self::commands::{Command, CommandHandler, CommandOutcome, SubscriptionListing};
pub use self::debounce::{DebounceKey, DebounceRegistry, DebounceSink};
pub use self::dispatch::{DeliveryReport, NotificationDispatcher, NotificationSender};
pub use self::router::{EventRouter, NameResolver, PresenceChangeKind, PresenceEvent};
pub use self::subscriptions::SubscriptionIndex;

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub quiet_interval: Duration,
    /// Admin channels from configuration. These take precedence over
    /// persisted ones.
    pub preloaded_admin_channels: IndexMap<String, String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quiet_interval: config.notifications.debounce_interval(),
            preloaded_admin_channels: config.admin_channels.clone(),
        }
    }
}

/// Owns the registries and wires presence events and commands through them.
pub struct NotifyEngine {
    subscriptions: Arc<SubscriptionIndex>,
    admin_channels: Arc<AdminChannelRegistry>,
    persistence: Arc<PersistenceBridge>,
    debouncer: DebounceRegistry,
    router: EventRouter,
    commands: CommandHandler,
    writer: Mutex<Option<PersistenceWriter>>,
}

impl NotifyEngine {
    /// Restores persisted state and starts the background writer. Must be
    /// called from within a tokio runtime.
    pub async fn start(
        settings: EngineSettings,
        store: Arc<dyn SnapshotStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Arc<Self> {
        let (handle, rx) = PersistenceHandle::channel();
        let subscriptions = Arc::new(SubscriptionIndex::new(handle.clone()));
        let admin_channels = Arc::new(AdminChannelRegistry::new(
            settings.preloaded_admin_channels,
            handle,
        ));
        let persistence = Arc::new(PersistenceBridge::new(
            store,
            subscriptions.clone(),
            admin_channels.clone(),
        ));
        persistence.restore().await;
        let writer = persistence.clone().spawn_writer(rx);

        let dispatcher = Arc::new(NotificationDispatcher::new(subscriptions.clone(), sender));
        let debouncer = DebounceRegistry::new(settings.quiet_interval, dispatcher);

        info!(
            "notification engine started sources={} admin_channels={} quiet_interval={:?}",
            subscriptions.source_count(),
            admin_channels.len(),
            debouncer.interval()
        );

        Arc::new(Self {
            router: EventRouter::new(debouncer.clone()),
            commands: CommandHandler::new(subscriptions.clone(), admin_channels.clone()),
            subscriptions,
            admin_channels,
            persistence,
            debouncer,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub async fn handle_presence(&self, event: &PresenceEvent, resolver: &dyn NameResolver) -> usize {
        self.router.route(event, resolver).await
    }

    pub fn handle_command(&self, command: Command) -> CommandOutcome {
        self.commands.handle(command)
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionIndex> {
        &self.subscriptions
    }

    pub fn admin_channels(&self) -> &Arc<AdminChannelRegistry> {
        &self.admin_channels
    }

    pub fn quiet_interval(&self) -> Duration {
        self.debouncer.interval()
    }

    pub fn pending_notifications(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Stops the background writer and saves the final state. Pending
    /// notifications are dropped.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            writer.stop().await;
        }
        self.persistence.flush().await?;
        info!(
            "notification engine stopped, dropped {} pending notifications",
            self.debouncer.pending_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use indexmap::IndexMap;

    use super::{Command, CommandOutcome, EngineSettings, NotifyEngine, PresenceEvent};
    use crate::db::{PersistentSnapshot, Subscription};
    use crate::engine::test_support::{MemoryStore, RecordingSender, StaticResolver};

    const INTERVAL: Duration = Duration::from_secs(3);

    fn settings() -> EngineSettings {
        EngineSettings {
            quiet_interval: INTERVAL,
            preloaded_admin_channels: IndexMap::new(),
        }
    }

    fn presence(actor_id: &str, previous: Option<&str>, current: Option<&str>) -> PresenceEvent {
        PresenceEvent {
            actor_id: actor_id.to_string(),
            username: format!("user-{actor_id}"),
            previous_source_id: previous.map(str::to_string),
            current_source_id: current.map(str::to_string),
            ..PresenceEvent::default()
        }
    }

    fn subscribe(source_id: &str, target_id: &str) -> Command {
        Command::Subscribe {
            source_id: Some(source_id.to_string()),
            target_id: target_id.to_string(),
            group_id: "g1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn join_is_delivered_to_subscribers_after_quiet_interval() {
        let store = Arc::new(MemoryStore::default());
        let sender = Arc::new(RecordingSender::default());
        let engine = NotifyEngine::start(settings(), store, sender.clone()).await;
        let resolver = StaticResolver::new(&[("v1", "Lounge")]);

        engine.handle_command(subscribe("v1", "t1"));
        engine.handle_command(subscribe("v1", "t2"));
        engine
            .handle_presence(&presence("u1", None, Some("v1")), &resolver)
            .await;

        tokio::time::sleep(INTERVAL / 2).await;
        assert!(sender.sent().is_empty());
        assert_eq!(engine.pending_notifications(), 1);

        tokio::time::sleep(INTERVAL).await;
        let message = "🔊 **user-u1** joined **Lounge**".to_string();
        assert_eq!(
            sender.sent(),
            vec![("t1".to_string(), message.clone()), ("t2".to_string(), message)]
        );
        assert_eq!(engine.pending_notifications(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_rejoin_reports_only_final_state() {
        let sender = Arc::new(RecordingSender::default());
        let engine =
            NotifyEngine::start(settings(), Arc::new(MemoryStore::default()), sender.clone()).await;
        let resolver = StaticResolver::new(&[("v1", "Lounge")]);
        engine.handle_command(subscribe("v1", "t1"));

        engine
            .handle_presence(&presence("u1", None, Some("v1")), &resolver)
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine
            .handle_presence(&presence("u1", Some("v1"), None), &resolver)
            .await;
        tokio::time::sleep(INTERVAL * 2).await;

        assert_eq!(
            sender.sent(),
            vec![("t1".to_string(), "🔇 **user-u1** left **Lounge**".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_sources_produce_no_messages() {
        let sender = Arc::new(RecordingSender::default());
        let engine =
            NotifyEngine::start(settings(), Arc::new(MemoryStore::default()), sender.clone()).await;

        engine
            .handle_presence(&presence("u1", None, Some("v9")), &StaticResolver::default())
            .await;
        tokio::time::sleep(INTERVAL * 2).await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn start_restores_state_and_shutdown_flushes_it() {
        let mut subscriptions = IndexMap::new();
        subscriptions.insert("v1".to_string(), vec![Subscription::new("v1", "t1", "g1")]);
        let mut admin_channels = IndexMap::new();
        admin_channels.insert("g1".to_string(), "persisted".to_string());
        let store = Arc::new(MemoryStore::with_snapshot(PersistentSnapshot {
            subscriptions,
            admin_channels,
        }));
        let mut settings = settings();
        settings
            .preloaded_admin_channels
            .insert("g1".to_string(), "configured".to_string());

        let engine = NotifyEngine::start(
            settings,
            store.clone(),
            Arc::new(RecordingSender::default()),
        )
        .await;

        assert_eq!(engine.subscriptions().len(), 1);
        assert_eq!(
            engine.admin_channels().get("g1"),
            Some("configured".to_string())
        );

        let outcome = engine.handle_command(Command::ListSubscriptions {
            group_id: "g1".to_string(),
            target_id: "configured".to_string(),
        });
        assert!(matches!(outcome, CommandOutcome::SubscriptionList(ref l) if l.total() == 1));

        engine.shutdown().await.expect("shutdown flush");
        let saved = store.saved().expect("snapshot saved");
        assert_eq!(saved.subscription_count(), 1);
        assert_eq!(saved.admin_channels["g1"], "configured");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_save_before_final_flush() {
        let store = Arc::new(MemoryStore::with_save_delay(Duration::from_secs(5)));
        let engine = NotifyEngine::start(
            settings(),
            store.clone(),
            Arc::new(RecordingSender::default()),
        )
        .await;

        engine.handle_command(subscribe("v1", "t1"));
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.saves_in_flight(), 1);

        engine.shutdown().await.expect("shutdown flush");

        assert_eq!(store.max_saves_in_flight(), 1);
        assert_eq!(store.saves_in_flight(), 0);
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.saved().expect("snapshot saved").subscription_count(), 1);
    }

    #[tokio::test]
    async fn zero_quiet_interval_uses_default() {
        let engine = NotifyEngine::start(
            EngineSettings::default(),
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingSender::default()),
        )
        .await;

        assert_eq!(engine.quiet_interval(), super::debounce::DEFAULT_QUIET_INTERVAL);
    }
}
