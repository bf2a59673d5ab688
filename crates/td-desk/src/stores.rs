// stores.rs — Build the durable stores a StorageConfig describes.
//
// Shared by TicketDesk::open and the `td` CLI so both read the same
// counters and archive.

use std::sync::Arc;

use td_store::{
    ArchiveStore, DegradedSequence, FileArchive, FileSequence, SequenceAllocator, SqliteArchive,
    SqliteDb, SqliteSequence, StoreError, UnavailableArchive,
};

use crate::config::{ArchiveBackend, StorageConfig};
use crate::error::DeskError;

/// The sequence allocator and archive for one deployment.
pub struct Stores {
    pub sequence: Arc<dyn SequenceAllocator>,
    pub archive: Arc<dyn ArchiveStore>,
}

fn storage_error(e: StoreError) -> DeskError {
    DeskError::Configuration(format!("storage: {}", e))
}

impl Stores {
    pub fn open(storage: &StorageConfig) -> Result<Self, DeskError> {
        let db = storage
            .database
            .as_ref()
            .map(SqliteDb::open)
            .transpose()
            .map_err(storage_error)?;

        let sequence: Arc<dyn SequenceAllocator> = match &db {
            Some(db) => {
                let primary = Arc::new(SqliteSequence::new(db.clone()));
                if storage.unsafe_local_fallback {
                    tracing::warn!(
                        "unsafe_local_fallback enabled: ticket numbers may collide if the database fails"
                    );
                    let fallback = FileSequence::new(&storage.counter_dir).map_err(storage_error)?;
                    Arc::new(DegradedSequence::new(primary, fallback))
                } else {
                    primary
                }
            }
            None => Arc::new(FileSequence::new(&storage.counter_dir).map_err(storage_error)?),
        };

        let archive: Arc<dyn ArchiveStore> = match (storage.archive, &db) {
            (ArchiveBackend::Sqlite, Some(db)) => Arc::new(SqliteArchive::new(db.clone())),
            (ArchiveBackend::Sqlite, None) => {
                tracing::warn!(
                    "sqlite archive selected but no database configured; transcripts will not be saved"
                );
                Arc::new(UnavailableArchive::new("no database configured"))
            }
            (ArchiveBackend::File, _) => {
                Arc::new(FileArchive::new(&storage.archive_dir).map_err(storage_error)?)
            }
            (ArchiveBackend::Disabled, _) => {
                Arc::new(UnavailableArchive::new("archive disabled in configuration"))
            }
        };

        Ok(Self { sequence, archive })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::config::DeskConfig;

    #[tokio::test]
    async fn default_layout_uses_sqlite_for_both() {
        let dir = tempdir().unwrap();
        let stores = Stores::open(&DeskConfig::for_data_dir(dir.path()).storage).unwrap();
        assert_eq!(stores.sequence.name(), "sqlite");
        assert_eq!(stores.archive.name(), "sqlite");
        assert_eq!(stores.sequence.next("normal").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn no_database_falls_back_to_files() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig {
            database: None,
            counter_dir: dir.path().join("counters"),
            archive: ArchiveBackend::File,
            archive_dir: dir.path().join("archive"),
            ..StorageConfig::default()
        };
        let stores = Stores::open(&storage).unwrap();
        assert_eq!(stores.sequence.next("gang").await.unwrap(), 1);
        assert!(dir.path().join("counters/gang_counter.txt").exists());
        assert!(stores.archive.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_archive_without_database_is_unavailable() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig {
            database: None,
            counter_dir: dir.path().join("counters"),
            ..StorageConfig::default()
        };
        let stores = Stores::open(&storage).unwrap();
        assert!(stores.archive.list(None).await.is_err());
    }
}
