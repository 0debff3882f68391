use crate::entity::kv_entries;
use crate::error::StorageError;
use crate::storage::types::KeyValueStore;
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::path::{Path, PathBuf};
use tracing::info;

const DB_FILE: &str = "conversation.db";

fn db_err(e: DbErr) -> StorageError {
    StorageError::Database(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> StorageError {
    StorageError::Task(e.to_string())
}

pub struct SqliteStore {
    db_url: String,
    db_path: PathBuf,
}

impl SqliteStore {
    pub async fn new(data_dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = tokio::fs::canonicalize(data_dir).await?.join(DB_FILE);
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        tokio::task::spawn_blocking({
            let db_url = db_url.clone();
            move || -> Result<(), StorageError> {
                let db = Database::connect(&db_url).map_err(db_err)?;

                db.get_schema_builder()
                    .register(kv_entries::Entity)
                    .apply(&db)
                    .map_err(db_err)?;

                Ok(())
            }
        })
        .await
        .map_err(join_err)??;

        info!("SQLite key-value store ready at {}", db_path.display());
        Ok(Self { db_url, db_path })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    fn location(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db_url = self.db_url.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            let db = Database::connect(&db_url).map_err(db_err)?;
            let row = kv_entries::Entity::find_by_id(key)
                .one(&db)
                .map_err(db_err)?;
            Ok(row.map(|r| r.payload))
        })
        .await
        .map_err(join_err)?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let db_url = self.db_url.clone();
        let record = kv_entries::ActiveModel {
            storage_key: Set(key.to_string()),
            payload: Set(value.to_string()),
        };

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let db = Database::connect(&db_url).map_err(db_err)?;
            kv_entries::Entity::insert(record)
                .on_conflict(
                    OnConflict::column(kv_entries::Column::StorageKey)
                        .update_column(kv_entries::Column::Payload)
                        .to_owned(),
                )
                .exec_without_returning(&db)
                .map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }
}
