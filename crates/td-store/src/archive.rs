// archive.rs — ArchiveStore: durable, immutable transcript storage.
//
// A transcript is saved exactly once per ticket, keyed by (scope, number).
// A second save for the same key is refused rather than overwriting: the
// first archived copy is the record. A save that fails part way leaves
// nothing under the final key.
//
// Implementations:
//   SqliteArchive      — rows in the `transcripts` table
//   FileArchive        — one JSON document per ticket under <dir>/<scope>/
//   UnavailableArchive — no store configured; every save fails loudly

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{ArchivalError, StoreError};
use crate::sqlite::SqliteDb;

/// Identifies one archived transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveKey {
    pub scope: String,
    pub number: u64,
}

impl ArchiveKey {
    pub fn new(scope: impl Into<String>, number: u64) -> Self {
        Self {
            scope: scope.into(),
            number,
        }
    }
}

impl std::fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.number)
    }
}

/// A rendered transcript plus the metadata stored alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    pub key: ArchiveKey,
    pub channel_name: String,
    /// Display name of whoever confirmed the close, if known.
    pub closed_by_name: Option<String>,
    pub rendered_at: DateTime<Utc>,
    pub content: String,
    /// SHA-256 of `content`, lowercase hex.
    pub content_sha256: String,
}

impl TranscriptArtifact {
    pub fn new(
        key: ArchiveKey,
        channel_name: impl Into<String>,
        closed_by_name: Option<String>,
        rendered_at: DateTime<Utc>,
        content: String,
    ) -> Self {
        let content_sha256 = td_audit::hasher::hash_str(&content);
        Self {
            key,
            channel_name: channel_name.into(),
            closed_by_name,
            rendered_at,
            content,
            content_sha256,
        }
    }

    pub fn summary(&self) -> ArchiveSummary {
        ArchiveSummary {
            key: self.key.clone(),
            channel_name: self.channel_name.clone(),
            closed_by_name: self.closed_by_name.clone(),
            rendered_at: self.rendered_at,
            size: self.content.len(),
        }
    }
}

/// What a successful save hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub key: ArchiveKey,
    pub content_sha256: String,
    /// Backend that stored it.
    pub store: String,
}

/// One line of an archive listing (content omitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub key: ArchiveKey,
    pub channel_name: String,
    pub closed_by_name: Option<String>,
    pub rendered_at: DateTime<Utc>,
    pub size: usize,
}

/// Insert-only transcript storage.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store a transcript. Fails with `AlreadyArchived` if the key exists.
    async fn save(&self, artifact: &TranscriptArtifact) -> Result<ArchiveReceipt, ArchivalError>;

    async fn get(&self, key: &ArchiveKey) -> Result<TranscriptArtifact, ArchivalError>;

    /// Summaries for a scope (or every scope), ordered by scope then number.
    async fn list(&self, scope: Option<&str>) -> Result<Vec<ArchiveSummary>, ArchivalError>;

    fn name(&self) -> &str;
}

/// Transcripts stored in the shared SQLite database.
pub struct SqliteArchive {
    db: SqliteDb,
}

impl SqliteArchive {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }
}

fn number_to_sql(number: u64) -> Result<i64, ArchivalError> {
    i64::try_from(number)
        .map_err(|_| StoreError::InvalidValue(format!("ticket number {} out of range", number)).into())
}

fn parse_rendered_at(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidValue(format!("rendered_at '{}': {}", raw, e)))
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    async fn save(&self, artifact: &TranscriptArtifact) -> Result<ArchiveReceipt, ArchivalError> {
        let number = number_to_sql(artifact.key.number)?;
        let row = artifact.clone();
        let inserted = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO transcripts
                     (scope, number, channel_name, closed_by_name, rendered_at, content, content_sha256)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.key.scope,
                        number,
                        row.channel_name,
                        row.closed_by_name,
                        row.rendered_at.to_rfc3339(),
                        row.content,
                        row.content_sha256,
                    ],
                )?)
            })
            .await?;

        if inserted == 0 {
            return Err(ArchivalError::AlreadyArchived {
                scope: artifact.key.scope.clone(),
                number: artifact.key.number,
            });
        }
        tracing::debug!(key = %artifact.key, "transcript stored in sqlite");
        Ok(ArchiveReceipt {
            key: artifact.key.clone(),
            content_sha256: artifact.content_sha256.clone(),
            store: self.name().to_string(),
        })
    }

    async fn get(&self, key: &ArchiveKey) -> Result<TranscriptArtifact, ArchivalError> {
        let number = number_to_sql(key.number)?;
        let lookup = key.clone();
        let row = self
            .db
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT channel_name, closed_by_name, rendered_at, content, content_sha256
                         FROM transcripts WHERE scope = ?1 AND number = ?2",
                        params![lookup.scope, number],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, Option<String>>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )
                    .optional()?;
                row.map(|(channel_name, closed_by_name, rendered_at, content, content_sha256)| {
                    Ok::<_, StoreError>(TranscriptArtifact {
                        key: lookup.clone(),
                        channel_name,
                        closed_by_name,
                        rendered_at: parse_rendered_at(&rendered_at)?,
                        content,
                        content_sha256,
                    })
                })
                .transpose()
            })
            .await?;

        row.ok_or_else(|| ArchivalError::NotFound {
            scope: key.scope.clone(),
            number: key.number,
        })
    }

    async fn list(&self, scope: Option<&str>) -> Result<Vec<ArchiveSummary>, ArchivalError> {
        let scope = scope.map(str::to_string);
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT scope, number, channel_name, closed_by_name, rendered_at, LENGTH(CAST(content AS BLOB))
                     FROM transcripts
                     WHERE ?1 IS NULL OR scope = ?1
                     ORDER BY scope, number",
                )?;
                let rows = stmt
                    .query_map(params![scope], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, i64>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(scope, number, channel_name, closed_by_name, rendered_at, size)| {
                        Ok::<_, StoreError>(ArchiveSummary {
                            key: ArchiveKey::new(
                                scope,
                                u64::try_from(number).map_err(|_| {
                                    StoreError::InvalidValue(format!("ticket number {}", number))
                                })?,
                            ),
                            channel_name,
                            closed_by_name,
                            rendered_at: parse_rendered_at(&rendered_at)?,
                            size: usize::try_from(size).unwrap_or_default(),
                        })
                    })
                    .collect::<Result<Vec<_>, StoreError>>()
            })
            .await?;
        Ok(rows)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Transcripts as JSON files: `<dir>/<scope>/<number>.json`. File I/O runs
/// on the blocking pool.
pub struct FileArchive {
    dir: PathBuf,
}

fn io_err(path: &Path, source: std::io::Error) -> ArchivalError {
    ArchivalError::Store(StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn scope_err(scope: &str) -> Result<(), ArchivalError> {
    crate::error::check_scope(scope)
        .map_err(|e| ArchivalError::Store(StoreError::InvalidValue(e.to_string())))
}

/// Run blocking file work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ArchivalError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ArchivalError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArchivalError::Store(StoreError::Task(e.to_string())))?
}

impl FileArchive {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &ArchiveKey) -> Result<PathBuf, ArchivalError> {
        scope_err(&key.scope)?;
        Ok(self
            .dir
            .join(&key.scope)
            .join(format!("{}.json", key.number)))
    }

    fn read_artifact(path: &Path) -> Result<TranscriptArtifact, ArchivalError> {
        let content = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `json` to a temp file beside `path`, then link it into place.
    /// The final name only ever appears fully written, and never replaces
    /// an existing transcript.
    fn write_new(path: &Path, json: &str, key: &ArchiveKey) -> Result<(), ArchivalError> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".incoming-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| io_err(parent, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| io_err(tmp.path(), e))?;

        // A failed persist drops the temp file with the error.
        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(ArchivalError::AlreadyArchived {
                scope: key.scope.clone(),
                number: key.number,
            }),
            Err(e) => Err(io_err(path, e.error)),
        }
    }

    fn scan(dirs: Vec<PathBuf>) -> Result<Vec<ArchiveSummary>, ArchivalError> {
        let mut summaries = Vec::new();
        for scope_dir in dirs {
            if !scope_dir.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&scope_dir).map_err(|e| io_err(&scope_dir, e))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_artifact(&path) {
                    Ok(artifact) => summaries.push(artifact.summary()),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "skipping unreadable transcript: {}", e)
                    }
                }
            }
        }

        summaries.sort_by(|a, b| {
            (a.key.scope.as_str(), a.key.number).cmp(&(b.key.scope.as_str(), b.key.number))
        });
        Ok(summaries)
    }
}

#[async_trait]
impl ArchiveStore for FileArchive {
    async fn save(&self, artifact: &TranscriptArtifact) -> Result<ArchiveReceipt, ArchivalError> {
        let path = self.path_for(&artifact.key)?;
        let json = serde_json::to_string_pretty(artifact)?;
        let key = artifact.key.clone();
        let target = path.clone();
        blocking(move || Self::write_new(&target, &json, &key)).await?;

        tracing::debug!(key = %artifact.key, path = %path.display(), "transcript stored on disk");
        Ok(ArchiveReceipt {
            key: artifact.key.clone(),
            content_sha256: artifact.content_sha256.clone(),
            store: self.name().to_string(),
        })
    }

    async fn get(&self, key: &ArchiveKey) -> Result<TranscriptArtifact, ArchivalError> {
        let path = self.path_for(key)?;
        let key = key.clone();
        blocking(move || {
            if !path.exists() {
                return Err(ArchivalError::NotFound {
                    scope: key.scope,
                    number: key.number,
                });
            }
            Self::read_artifact(&path)
        })
        .await
    }

    async fn list(&self, scope: Option<&str>) -> Result<Vec<ArchiveSummary>, ArchivalError> {
        let dir = self.dir.clone();
        let scope = match scope {
            Some(s) => {
                scope_err(s)?;
                Some(s.to_string())
            }
            None => None,
        };
        blocking(move || {
            let dirs = match scope {
                Some(s) => vec![dir.join(s)],
                None => fs::read_dir(&dir)
                    .map_err(|e| io_err(&dir, e))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .collect(),
            };
            Self::scan(dirs)
        })
        .await
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Stands in when no archive is configured. Saving always fails, so a close
/// never silently proceeds as if the transcript had been kept.
pub struct UnavailableArchive {
    reason: String,
}

impl UnavailableArchive {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ArchiveStore for UnavailableArchive {
    async fn save(&self, _artifact: &TranscriptArtifact) -> Result<ArchiveReceipt, ArchivalError> {
        Err(ArchivalError::Unavailable(self.reason.clone()))
    }

    async fn get(&self, _key: &ArchiveKey) -> Result<TranscriptArtifact, ArchivalError> {
        Err(ArchivalError::Unavailable(self.reason.clone()))
    }

    async fn list(&self, _scope: Option<&str>) -> Result<Vec<ArchiveSummary>, ArchivalError> {
        Err(ArchivalError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(scope: &str, number: u64, content: &str) -> TranscriptArtifact {
        TranscriptArtifact::new(
            ArchiveKey::new(scope, number),
            format!("ticket-{}", number),
            Some("Mod Alice".into()),
            Utc::now(),
            content.to_string(),
        )
    }

    async fn exercise_store(store: &dyn ArchiveStore) {
        let first = artifact("normal", 2, "<html>two</html>");
        let receipt = store.save(&first).await.unwrap();
        assert_eq!(receipt.key, ArchiveKey::new("normal", 2));
        assert_eq!(receipt.content_sha256, td_audit::hasher::hash_str("<html>two</html>"));

        store.save(&artifact("normal", 1, "<html>one</html>")).await.unwrap();
        store.save(&artifact("gang", 1, "<html>g</html>")).await.unwrap();

        let loaded = store.get(&ArchiveKey::new("normal", 2)).await.unwrap();
        assert_eq!(loaded.content, "<html>two</html>");
        assert_eq!(loaded.closed_by_name.as_deref(), Some("Mod Alice"));
        assert_eq!(loaded.rendered_at, first.rendered_at);

        let normal: Vec<u64> = store
            .list(Some("normal"))
            .await
            .unwrap()
            .iter()
            .map(|s| s.key.number)
            .collect();
        assert_eq!(normal, [1, 2]);
        assert_eq!(store.list(None).await.unwrap().len(), 3);

        // Immutable: a second save for the same ticket is refused and the
        // first copy survives.
        let dup = store.save(&artifact("normal", 2, "<html>forged</html>")).await;
        assert!(matches!(dup, Err(ArchivalError::AlreadyArchived { number: 2, .. })));
        let still = store.get(&ArchiveKey::new("normal", 2)).await.unwrap();
        assert_eq!(still.content, "<html>two</html>");

        let missing = store.get(&ArchiveKey::new("support", 9)).await;
        assert!(matches!(missing, Err(ArchivalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn sqlite_archive_contract() {
        let store = SqliteArchive::new(SqliteDb::in_memory().unwrap());
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn file_archive_contract() {
        let dir = tempdir().unwrap();
        let store = FileArchive::new(dir.path().join("archive")).unwrap();
        exercise_store(&store).await;
        assert!(dir.path().join("archive/normal/2.json").exists());
    }

    #[tokio::test]
    async fn file_archive_leaves_only_complete_transcripts() {
        let dir = tempdir().unwrap();
        let store = FileArchive::new(dir.path()).unwrap();
        // Debris from an interrupted save does not block or shadow the key.
        fs::create_dir_all(dir.path().join("normal")).unwrap();
        fs::write(dir.path().join("normal/.incoming-x1.tmp"), "{\"key\":").unwrap();

        store.save(&artifact("normal", 3, "<html>three</html>")).await.unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("normal"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with(".incoming-"))
            .collect();
        assert_eq!(names, ["3.json"]);
        let listed = store.list(Some("normal")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            store.get(&ArchiveKey::new("normal", 3)).await.unwrap().content,
            "<html>three</html>"
        );
    }

    #[tokio::test]
    async fn file_archive_rejects_scopes_outside_its_directory() {
        let dir = tempdir().unwrap();
        let store = FileArchive::new(dir.path().join("archive")).unwrap();
        fs::create_dir_all(dir.path().join("elsewhere")).unwrap();

        let listed = store.list(Some("../elsewhere")).await;
        assert!(matches!(listed, Err(ArchivalError::Store(StoreError::InvalidValue(_)))));
        let fetched = store.get(&ArchiveKey::new("..", 1)).await;
        assert!(matches!(fetched, Err(ArchivalError::Store(StoreError::InvalidValue(_)))));
    }

    #[tokio::test]
    async fn unavailable_archive_refuses_to_save() {
        let store = UnavailableArchive::new("no archive configured");
        let result = store.save(&artifact("normal", 1, "x")).await;
        assert!(matches!(result, Err(ArchivalError::Unavailable(_))));
    }

    #[test]
    fn archive_key_display() {
        assert_eq!(ArchiveKey::new("gang", 12).to_string(), "gang/12");
    }
}
