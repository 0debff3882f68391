use crate::error::StorageError;
use crate::storage::types::KeyValueStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Keeps each key in its own `<key>.json` file under a data directory.
///
/// Writes land in a hidden temp file next to the target, are synced, and
/// then renamed over it, so a crash mid-write leaves the previous value intact.
/// The directory is canonicalized so every spelling of it names one location.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).await?;
        let dir = fs::canonicalize(dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn location(&self) -> String {
        format!("file:{}", self.dir.display())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp_path = self.dir.join(format!(".{}.json.tmp", key));

        let result = async {
            let mut tmp_file = fs::File::create(&tmp_path).await?;
            tmp_file.write_all(value.as_bytes()).await?;
            tmp_file.sync_all().await?;
            drop(tmp_file);

            fs::rename(&tmp_path, &path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(
                    "Failed to remove temp file {}: {}",
                    tmp_path.display(),
                    cleanup
                );
            }
            return Err(e.into());
        }

        Ok(())
    }
}
