pub use self::error::StoreError;
pub use self::json::JsonSnapshotStore;
pub use self::manager::{PersistenceBridge, PersistenceHandle, PersistenceWriter};
pub use self::models::{PersistentSnapshot, Subscription};
pub use self::stores::SnapshotStore;

pub mod error;
pub mod json;
pub mod manager;
pub mod models;
pub mod stores;
