//! Directory-backed bucket.

use super::{validate_key, ObjectReader, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Bucket whose objects are the files below `root`, keyed by relative path.
#[derive(Debug)]
pub struct FilesystemBucket {
    root: PathBuf,
}

impl FilesystemBucket {
    /// Open the bucket. Fails if `root` is not an existing directory.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", root.display())))?;

        if !metadata.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemBucket {
    async fn open_reader(&self, key: &str) -> StorageResult<ObjectReader> {
        let path = self.key_path(key)?;
        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                key: key.to_string(),
            },
            _ => StorageError::Inaccessible {
                key: key.to_string(),
                reason: e.to_string(),
            },
        })?;

        // Directories open fine on unix but are not objects.
        let metadata = file.metadata().await.map_err(|e| StorageError::Inaccessible {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }

        Ok(Box::new(file))
    }

    async fn health_check(&self) -> StorageResult<()> {
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(StorageError::Unavailable(format!(
                "{}: {e}",
                self.root.display()
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
