// log.rs — Append-only JSONL audit log.
//
// One JSON object per line. Each event's `previous_hash` is the SHA-256 of
// the raw previous line, so inserting, deleting or editing a line breaks the
// chain at that point.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::hasher;

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Hash of the last line written; becomes the next event's `previous_hash`.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// Creates missing parent directories. An existing log is scanned for
    /// its last line so new events continue the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source| AuditError::OpenFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_failed)?;
        }

        let last_hash = if path.exists() {
            raw_lines(&path)?.last().map(|line| hasher::hash_str(line))
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_failed)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append an event, chaining it to the previous one. Flushes to disk.
    pub fn append(&mut self, event: &mut AuditEvent) -> Result<(), AuditError> {
        event.previous_hash = self.last_hash.clone();
        let json = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.last_hash = Some(hasher::hash_str(&json));
        Ok(())
    }

    /// Read all events from a log file, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>, AuditError> {
        raw_lines(path.as_ref())?
            .iter()
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }

    /// The last `n` events, oldest first.
    pub fn recent(path: impl AsRef<Path>, n: usize) -> Result<Vec<AuditEvent>, AuditError> {
        let mut events = Self::read_all(path)?;
        let start = events.len().saturating_sub(n);
        Ok(events.split_off(start))
    }

    /// Verify the integrity of a log file's hash chain.
    ///
    /// Returns the number of events checked, or `IntegrityViolation` at the
    /// first broken link.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let lines = raw_lines(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (index, line) in lines.iter().enumerate() {
            let event: AuditEvent = serde_json::from_str(line)?;
            if event.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: index + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: event.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            // Hash the raw line, not a re-serialization (field order may differ).
            previous_hash = Some(hasher::hash_str(line));
        }

        Ok(lines.len())
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Non-blank lines of the log, in file order.
fn raw_lines(path: &Path) -> Result<Vec<String>, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditAction;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut e1 = AuditEvent::new("7", AuditAction::TicketCreated).with_target("normal/1");
            let mut e2 = AuditEvent::new("7", AuditAction::CloseRequested).with_target("normal/1");
            log.append(&mut e1).unwrap();
            log.append(&mut e2).unwrap();
        }

        let events = AuditLog::read_all(&log_path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::TicketCreated);
        assert!(events[0].previous_hash.is_none());
        assert!(events[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_log_continues_chain() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("nested").join("audit.jsonl");

        for action in [AuditAction::TicketCreated, AuditAction::SpaceDeleted] {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut AuditEvent::new("system", action)).unwrap();
        }

        assert_eq!(AuditLog::verify_chain(&log_path).unwrap(), 2);
    }

    #[test]
    fn edited_line_breaks_chain() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for n in 1..=3 {
                let mut event =
                    AuditEvent::new("7", AuditAction::TicketCreated).with_target(format!("normal/{}", n));
                log.append(&mut event).unwrap();
            }
        }

        let content = fs::read_to_string(&log_path).unwrap();
        fs::write(&log_path, content.replacen("normal/2", "normal/9", 1)).unwrap();

        match AuditLog::verify_chain(&log_path) {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected integrity violation, got {:?}", other),
        }
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::open(&log_path).unwrap();
        for n in 1..=5 {
            let mut event =
                AuditEvent::new("7", AuditAction::TicketCreated).with_target(format!("support/{}", n));
            log.append(&mut event).unwrap();
        }

        let tail = AuditLog::recent(&log_path, 2).unwrap();
        let targets: Vec<_> = tail.iter().map(|e| e.target.clone().unwrap()).collect();
        assert_eq!(targets, ["support/4", "support/5"]);
    }
}
