// sequence.rs — SequenceAllocator: the next ticket number for a scope.
//
// The contract: `next(scope)` never returns the same value twice for the same
// scope, even under concurrent callers, and never goes backwards across
// restarts. Numbers consumed by failed ticket creations stay consumed.
//
// Implementations:
//   SqliteSequence   — one atomic upsert-and-return statement
//   FileSequence     — counter file per scope, read/increment/write under a
//                      process-local lock on the blocking pool (no
//                      cross-process coordination)
//   DegradedSequence — opt-in: primary first, FileSequence when it fails

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::error::{check_scope, AllocationError, StoreError};
use crate::sqlite::SqliteDb;

/// Issues strictly increasing numbers per scope.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Issue the next number for `scope` (the first number is 1).
    async fn next(&self, scope: &str) -> Result<u64, AllocationError>;

    /// The last number issued for `scope` (0 if none yet). Read-only.
    async fn current(&self, scope: &str) -> Result<u64, AllocationError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Durable counters in the `sequence_counters` table.
pub struct SqliteSequence {
    db: SqliteDb,
}

impl SqliteSequence {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }
}

fn to_u64(scope: &str, value: i64) -> Result<u64, AllocationError> {
    u64::try_from(value).map_err(|_| AllocationError::Unavailable {
        scope: scope.to_string(),
        source: StoreError::InvalidValue(format!("negative counter value {}", value)),
    })
}

#[async_trait]
impl SequenceAllocator for SqliteSequence {
    async fn next(&self, scope: &str) -> Result<u64, AllocationError> {
        check_scope(scope)?;
        let key = scope.to_string();
        // Insert-or-increment and read back in a single statement: there is
        // no window between reading the old value and writing the new one.
        let value = self
            .db
            .call(move |conn| {
                Ok(conn.query_row(
                    "INSERT INTO sequence_counters (scope, value) VALUES (?1, 1)
                     ON CONFLICT(scope) DO UPDATE SET value = value + 1
                     RETURNING value",
                    params![key],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await
            .map_err(|source| AllocationError::Unavailable {
                scope: scope.to_string(),
                source,
            })?;
        to_u64(scope, value)
    }

    async fn current(&self, scope: &str) -> Result<u64, AllocationError> {
        check_scope(scope)?;
        let key = scope.to_string();
        let value = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM sequence_counters WHERE scope = ?1",
                        params![key],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?)
            })
            .await
            .map_err(|source| AllocationError::Unavailable {
                scope: scope.to_string(),
                source,
            })?;
        value.map_or(Ok(0), |v| to_u64(scope, v))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Counter files: `<dir>/<scope>_counter.txt`, each holding the last number
/// issued as plain text. File I/O runs on the blocking pool.
pub struct FileSequence {
    files: Arc<CounterFiles>,
}

struct CounterFiles {
    dir: PathBuf,
    // Serializes read/increment/write for every scope in this process.
    lock: Mutex<()>,
}

impl CounterFiles {
    fn counter_file(&self, scope: &str) -> PathBuf {
        self.dir.join(format!("{}_counter.txt", scope))
    }

    fn read(&self, scope: &str) -> Result<u64, AllocationError> {
        let path = self.counter_file(scope);
        if !path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&path).map_err(|source| AllocationError::Unavailable {
            scope: scope.to_string(),
            source: StoreError::Io {
                path: path.clone(),
                source,
            },
        })?;
        content
            .trim()
            .parse()
            .map_err(|_| AllocationError::Corrupt { path, content })
    }

    fn write(&self, scope: &str, value: u64) -> Result<(), AllocationError> {
        let path = self.counter_file(scope);
        let tmp = path.with_extension("txt.tmp");
        let io_err = |path: &Path, source| AllocationError::Unavailable {
            scope: scope.to_string(),
            source: StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        };
        // Write-then-rename so a crash mid-write never leaves a truncated
        // counter behind.
        fs::write(&tmp, value.to_string()).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))
    }
}

impl FileSequence {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            files: Arc::new(CounterFiles {
                dir,
                lock: Mutex::new(()),
            }),
        })
    }

    /// Run `f` on the blocking pool with the counter lock held.
    async fn locked<T, F>(&self, scope: &str, f: F) -> Result<T, AllocationError>
    where
        T: Send + 'static,
        F: FnOnce(&CounterFiles, &str) -> Result<T, AllocationError> + Send + 'static,
    {
        check_scope(scope)?;
        let files = Arc::clone(&self.files);
        let key = scope.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = files.lock.lock().unwrap_or_else(|e| e.into_inner());
            f(&*files, key.as_str())
        })
        .await
        .map_err(|e| AllocationError::Unavailable {
            scope: scope.to_string(),
            source: StoreError::Task(e.to_string()),
        })?
    }
}

#[async_trait]
impl SequenceAllocator for FileSequence {
    async fn next(&self, scope: &str) -> Result<u64, AllocationError> {
        self.locked(scope, |files, scope| {
            let value = files.read(scope)? + 1;
            files.write(scope, value)?;
            Ok(value)
        })
        .await
    }

    async fn current(&self, scope: &str) -> Result<u64, AllocationError> {
        self.locked(scope, |files, scope| files.read(scope)).await
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Explicit unsafe fallback: when the primary allocator fails, allocate from
/// local counter files instead of aborting.
///
/// Numbers issued this way are unique only within this process's counter
/// files; once the primary comes back the two ranges can overlap. Only
/// construct this when that trade-off has been chosen in configuration.
pub struct DegradedSequence {
    primary: Arc<dyn SequenceAllocator>,
    fallback: FileSequence,
}

impl DegradedSequence {
    pub fn new(primary: Arc<dyn SequenceAllocator>, fallback: FileSequence) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SequenceAllocator for DegradedSequence {
    async fn next(&self, scope: &str) -> Result<u64, AllocationError> {
        match self.primary.next(scope).await {
            Ok(value) => Ok(value),
            Err(AllocationError::InvalidScope(s)) => Err(AllocationError::InvalidScope(s)),
            Err(e) => {
                tracing::warn!(
                    scope,
                    primary = self.primary.name(),
                    "degraded allocation, number may collide once the primary recovers: {}",
                    e
                );
                self.fallback.next(scope).await
            }
        }
    }

    async fn current(&self, scope: &str) -> Result<u64, AllocationError> {
        self.primary.current(scope).await
    }

    fn name(&self) -> &str {
        "degraded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn allocate_concurrently(alloc: Arc<dyn SequenceAllocator>, n: usize) -> Vec<u64> {
        let mut handles = Vec::new();
        for _ in 0..n {
            let alloc = Arc::clone(&alloc);
            handles.push(tokio::spawn(async move { alloc.next("normal").await }));
        }
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }
        values.sort_unstable();
        values
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sqlite_concurrent_callers_get_distinct_gapless_numbers() {
        let dir = tempdir().unwrap();
        let db = SqliteDb::open(dir.path().join("tickets.db")).unwrap();
        let values = allocate_concurrently(Arc::new(SqliteSequence::new(db)), 40).await;
        assert_eq!(values, (1..=40).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn file_concurrent_callers_get_distinct_gapless_numbers() {
        let dir = tempdir().unwrap();
        let seq = FileSequence::new(dir.path()).unwrap();
        let values = allocate_concurrently(Arc::new(seq), 40).await;
        assert_eq!(values, (1..=40).collect::<Vec<u64>>());
        let on_disk = fs::read_to_string(dir.path().join("normal_counter.txt")).unwrap();
        assert_eq!(on_disk, "40");
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let seq = SqliteSequence::new(SqliteDb::in_memory().unwrap());
        assert_eq!(seq.next("normal").await.unwrap(), 1);
        assert_eq!(seq.next("normal").await.unwrap(), 2);
        assert_eq!(seq.next("support").await.unwrap(), 1);
        assert_eq!(seq.current("normal").await.unwrap(), 2);
        assert_eq!(seq.current("gang").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.db");
        {
            let seq = SqliteSequence::new(SqliteDb::open(&path).unwrap());
            seq.next("gang").await.unwrap();
            seq.next("gang").await.unwrap();
        }
        let seq = SqliteSequence::new(SqliteDb::open(&path).unwrap());
        assert_eq!(seq.next("gang").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn file_counter_continues_from_existing_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("support_counter.txt"), "17\n").unwrap();
        let seq = FileSequence::new(dir.path()).unwrap();
        assert_eq!(seq.current("support").await.unwrap(), 17);
        assert_eq!(seq.next("support").await.unwrap(), 18);
    }

    #[tokio::test]
    async fn corrupt_counter_file_is_an_error_not_a_reset() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("normal_counter.txt"), "twelve").unwrap();
        let seq = FileSequence::new(dir.path()).unwrap();
        let result = seq.next("normal").await;
        assert!(matches!(result, Err(AllocationError::Corrupt { .. })));
        // Nothing was overwritten.
        let content = fs::read_to_string(dir.path().join("normal_counter.txt")).unwrap();
        assert_eq!(content, "twelve");
    }

    #[tokio::test]
    async fn scope_with_path_separator_is_rejected() {
        let dir = tempdir().unwrap();
        let seq = FileSequence::new(dir.path()).unwrap();
        assert!(matches!(
            seq.next("../etc").await,
            Err(AllocationError::InvalidScope(_))
        ));
    }

    struct BrokenStore;

    #[async_trait]
    impl SequenceAllocator for BrokenStore {
        async fn next(&self, scope: &str) -> Result<u64, AllocationError> {
            Err(AllocationError::Unavailable {
                scope: scope.to_string(),
                source: StoreError::Task("connection refused".into()),
            })
        }

        async fn current(&self, scope: &str) -> Result<u64, AllocationError> {
            self.next(scope).await
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn degraded_sequence_falls_back_when_primary_fails() {
        let dir = tempdir().unwrap();
        let seq = DegradedSequence::new(
            Arc::new(BrokenStore),
            FileSequence::new(dir.path()).unwrap(),
        );
        assert_eq!(seq.next("normal").await.unwrap(), 1);
        assert_eq!(seq.next("normal").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn degraded_sequence_prefers_primary() {
        let dir = tempdir().unwrap();
        let primary = Arc::new(SqliteSequence::new(SqliteDb::in_memory().unwrap()));
        primary.next("normal").await.unwrap();
        let seq = DegradedSequence::new(primary, FileSequence::new(dir.path()).unwrap());
        assert_eq!(seq.next("normal").await.unwrap(), 2);
        assert!(!dir.path().join("normal_counter.txt").exists());
    }
}
