use crate::storage::{KeyValueStorage, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::create_dir_all;
use tokio::io::AsyncWriteExt;

/// One file per prefix/key pair under a root directory. Values are written
/// whole; a missing file reads back as `None`.
pub struct OnDiskStorage {
    path: PathBuf,
}

impl OnDiskStorage {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn entry_path(&self, prefix: &str, key: &str) -> PathBuf {
        self.path.join(prefix).join(key)
    }
}

#[async_trait]
impl KeyValueStorage for OnDiskStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(prefix, key);

        match tokio::fs::read_to_string(path).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if matches!(error.kind(), std::io::ErrorKind::NotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, prefix: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(prefix, key);
        let parent = path.parent().unwrap_or_else(|| Path::new("."));

        create_dir_all(parent).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;

        file.write_all(value.as_bytes()).await?;

        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(prefix, key);

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if matches!(error.kind(), std::io::ErrorKind::NotFound) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
