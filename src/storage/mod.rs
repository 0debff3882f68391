mod file;
mod memory;
mod sqlite;
mod types;

use crate::config::{Config, StorageBackend};
use crate::error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
use std::sync::Arc;
use tracing::info;
pub use types::KeyValueStore;

pub async fn open(config: &Config) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::File => Arc::new(FileStore::new(&config.data_dir).await?),
        StorageBackend::Sqlite => Arc::new(SqliteStore::new(&config.data_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    info!("Conversation storage: {}", store.location());
    Ok(store)
}
