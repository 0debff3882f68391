use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("Stored conversation under '{key}' is malformed: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode conversation: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to write '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("Conversation '{0}' is already loaded")]
    AlreadyLoaded(String),
    #[error("Conversation key '{0}' is already owned by another store")]
    KeyInUse(String),
}
