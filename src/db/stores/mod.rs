use async_trait::async_trait;

use super::StoreError;
use super::models::PersistentSnapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistentSnapshot>, StoreError>;
    async fn save(&self, snapshot: &PersistentSnapshot) -> Result<(), StoreError>;
}
