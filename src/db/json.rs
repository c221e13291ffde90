use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::StoreError;
use super::models::PersistentSnapshot;
use super::stores::SnapshotStore;

/// Snapshot store backed by a single pretty-printed JSON file.
pub struct JsonSnapshotStore {
    path: PathBuf,
    io_lock: AsyncMutex<()>,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: AsyncMutex::new(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Option<PersistentSnapshot>, StoreError> {
        let _guard = self.io_lock.lock().await;

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no snapshot at {}", self.path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot: PersistentSnapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PersistentSnapshot) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock().await;

        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        info!(
            "saved {} subscriptions across {} voice channels to {}",
            snapshot.subscription_count(),
            snapshot.subscriptions.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::JsonSnapshotStore;
    use crate::db::{PersistentSnapshot, SnapshotStore, Subscription};

    fn sample_snapshot() -> PersistentSnapshot {
        let mut snapshot = PersistentSnapshot::default();
        snapshot.subscriptions.insert(
            "v1".to_string(),
            vec![
                Subscription::new("v1", "t1", "g1"),
                Subscription::new("v1", "t2", "g1"),
            ],
        );
        snapshot
            .subscriptions
            .insert("v2".to_string(), vec![Subscription::new("v2", "t9", "g2")]);
        snapshot
            .admin_channels
            .insert("g1".to_string(), "admin1".to_string());
        snapshot
    }

    #[tokio::test]
    async fn save_then_load_returns_equal_snapshot() {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonSnapshotStore::new(dir.path().join("subscriptions.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).await.expect("save");
        let loaded = store.load().await.expect("load").expect("snapshot present");

        assert_eq!(loaded, snapshot);
        assert_eq!(
            loaded.subscriptions.keys().collect::<Vec<_>>(),
            vec!["v1", "v2"]
        );
        assert!(!dir.path().join("subscriptions.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonSnapshotStore::new(dir.path().join("absent.json"));

        assert!(store.load().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("subscriptions.json");
        std::fs::write(&path, b"{not json").expect("write corrupt file");
        let store = JsonSnapshotStore::new(&path);

        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn reads_files_written_by_older_deployments() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("subscriptions.json");
        std::fs::write(
            &path,
            r#"{
  "subscriptions": {
    "111": [{"voice_channel_id": "111", "text_channel_id": "222", "guild_id": "333"}]
  },
  "admin_channels": {"333": "444"}
}"#,
        )
        .expect("write legacy file");
        let store = JsonSnapshotStore::new(&path);

        let loaded = store.load().await.expect("load").expect("snapshot present");

        assert_eq!(loaded.subscriptions["111"], vec![Subscription::new("111", "222", "333")]);
        assert_eq!(loaded.admin_channels["333"], "444");
    }
}
