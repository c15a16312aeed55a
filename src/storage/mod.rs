mod in_memory;
mod on_disk;

pub use in_memory::InMemoryStorage;
pub use on_disk::OnDiskStorage;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),
}

/// Durable key-value storage, namespaced by a prefix. Backs queue-state
/// persistence and the settings registry.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, StorageError>;
    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), StorageError>;
    /// Deleting a key that was never saved is not an error.
    async fn delete(&self, prefix: &str, key: &str) -> Result<(), StorageError>;
}
