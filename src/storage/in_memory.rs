use crate::storage::{KeyValueStorage, StorageError};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

/// Non-durable backend used by tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryStorage {
    storage: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            storage: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.storage.lock().unwrap();

        Ok(guard.get(prefix).and_then(|m| m.get(key)).cloned())
    }

    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.storage.lock().unwrap();

        guard
            .entry(prefix.into())
            .or_default()
            .insert(key.into(), value.into());

        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<(), StorageError> {
        let mut guard = self.storage.lock().unwrap();

        if let Entry::Occupied(mut entry) = guard.entry(prefix.into()) {
            let map = entry.get_mut();
            map.remove(key);

            if map.is_empty() {
                entry.remove();
            }
        }

        Ok(())
    }
}
