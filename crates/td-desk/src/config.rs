// config.rs — Desk configuration (desk.toml).
//
// Every field has a serde default, so a desk.toml only needs the ids that
// differ per server (containers, log channels, staff role). The
// `for_data_dir()` constructor lays out all local state under
// `<dir>/.ticketdesk/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use td_ticket::{RoleId, SpaceId, TicketKind};

use crate::error::DeskError;

/// Top-level desk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Channel the "create ticket" panel is posted to.
    #[serde(default)]
    pub panel_channel: Option<SpaceId>,

    /// Role admitted to every ticket and allowed to close any of them.
    #[serde(default)]
    pub staff_role: Option<RoleId>,

    /// Role-name prefix that marks gang roles.
    #[serde(default = "default_gang_role_prefix")]
    pub gang_role_prefix: String,

    #[serde(default)]
    pub normal: KindConfig,

    #[serde(default)]
    pub gang: KindConfig,

    #[serde(default)]
    pub support: KindConfig,

    /// How long a close confirmation stays open.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,

    /// Pause between the closing notice and deleting the space.
    #[serde(default = "default_teardown_grace_ms")]
    pub teardown_grace_ms: u64,

    /// Only the member who requested a close may confirm it.
    #[serde(default)]
    pub require_same_actor: bool,

    #[serde(default)]
    pub strict_archival: StrictArchivalConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where one kind of ticket lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindConfig {
    /// Category new ticket spaces are created under.
    #[serde(default)]
    pub container: Option<SpaceId>,

    /// Channel that receives creation and closure entries.
    #[serde(default)]
    pub log_channel: Option<SpaceId>,
}

/// Block teardown until the transcript is archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictArchivalConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Total save attempts before the close is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for StrictArchivalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Which store keeps transcripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveBackend {
    /// The `transcripts` table of `storage.database`.
    #[default]
    Sqlite,
    /// JSON files under `storage.archive_dir`.
    File,
    /// No archive. Every save fails and is reported.
    Disabled,
}

/// Local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database for counters (and transcripts with the sqlite
    /// backend). Without one, counters fall back to `counter_dir`.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Directory of `{scope}_counter.txt` files.
    #[serde(default = "default_counter_dir")]
    pub counter_dir: PathBuf,

    #[serde(default)]
    pub archive: ArchiveBackend,

    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Snapshot directory for live tickets; unset keeps them in memory only.
    #[serde(default)]
    pub tickets_dir: Option<PathBuf>,

    /// Append-only audit log; unset disables auditing.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// Allocate from `counter_dir` when the database fails. Numbers issued
    /// this way may collide with the database's once it recovers.
    #[serde(default)]
    pub unsafe_local_fallback: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: None,
            counter_dir: default_counter_dir(),
            archive: ArchiveBackend::default(),
            archive_dir: default_archive_dir(),
            tickets_dir: None,
            audit_log: None,
            unsafe_local_fallback: false,
        }
    }
}

// Serde default functions
fn default_gang_role_prefix() -> String {
    "Gang-".to_string()
}

fn default_confirm_timeout_ms() -> u64 {
    30_000
}

fn default_teardown_grace_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_counter_dir() -> PathBuf {
    PathBuf::from(".ticketdesk/counters")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".ticketdesk/archive")
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            panel_channel: None,
            staff_role: None,
            gang_role_prefix: default_gang_role_prefix(),
            normal: KindConfig::default(),
            gang: KindConfig::default(),
            support: KindConfig::default(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            teardown_grace_ms: default_teardown_grace_ms(),
            require_same_actor: false,
            strict_archival: StrictArchivalConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl DeskConfig {
    /// Standard `.ticketdesk/` layout under `dir`, with a SQLite database,
    /// ticket snapshots and an audit log.
    pub fn for_data_dir(dir: impl AsRef<Path>) -> Self {
        let root = dir.as_ref().join(".ticketdesk");
        Self {
            storage: StorageConfig {
                database: Some(root.join("tickets.db")),
                counter_dir: root.join("counters"),
                archive: ArchiveBackend::Sqlite,
                archive_dir: root.join("archive"),
                tickets_dir: Some(root.join("tickets")),
                audit_log: Some(root.join("audit.jsonl")),
                unsafe_local_fallback: false,
            },
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, DeskError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeskError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DeskError::Configuration(format!("invalid {}: {}", path.display(), e)))
    }

    /// Load `path` if it exists, otherwise the `for_data_dir` layout next to it.
    pub fn load_or_default(path: &Path) -> Result<Self, DeskError> {
        if path.exists() {
            Self::load(path)
        } else {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            Ok(Self::for_data_dir(dir))
        }
    }

    pub fn kind(&self, kind: TicketKind) -> &KindConfig {
        match kind {
            TicketKind::Normal => &self.normal,
            TicketKind::Gang => &self.gang,
            TicketKind::Support => &self.support,
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    /// Reject values that would make the close flow misbehave.
    pub fn validate(&self) -> Result<(), DeskError> {
        if self.confirm_timeout_ms == 0 {
            return Err(DeskError::Configuration(
                "confirm_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.strict_archival.enabled && self.strict_archival.max_attempts == 0 {
            return Err(DeskError::Configuration(
                "strict_archival.max_attempts must be at least 1".into(),
            ));
        }
        if self.gang_role_prefix.is_empty() {
            return Err(DeskError::Configuration(
                "gang_role_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let config: DeskConfig = toml::from_str(
            r#"
            staff_role = 1101039305390043187

            [normal]
            container = 1435565165025427516
            log_channel = 1286008582151602218
            "#,
        )
        .unwrap();

        assert_eq!(config.staff_role, Some(RoleId(1101039305390043187)));
        assert_eq!(config.normal.container, Some(SpaceId(1435565165025427516)));
        assert_eq!(config.gang.container, None);
        assert_eq!(config.gang_role_prefix, "Gang-");
        assert_eq!(config.confirm_timeout(), Duration::from_secs(30));
        assert_eq!(config.teardown_grace(), Duration::from_secs(3));
        assert!(!config.require_same_actor);
        assert!(!config.strict_archival.enabled);
        assert_eq!(config.storage.archive, ArchiveBackend::Sqlite);
        assert!(!config.storage.unsafe_local_fallback);
    }

    #[test]
    fn strict_archival_and_storage_sections_parse() {
        let config: DeskConfig = toml::from_str(
            r#"
            require_same_actor = true

            [strict_archival]
            enabled = true
            max_attempts = 5

            [storage]
            database = "/var/lib/ticketdesk/tickets.db"
            archive = "file"
            archive_dir = "/var/lib/ticketdesk/archive"
            unsafe_local_fallback = true
            "#,
        )
        .unwrap();

        assert!(config.require_same_actor);
        assert!(config.strict_archival.enabled);
        assert_eq!(config.strict_archival.max_attempts, 5);
        assert_eq!(config.strict_archival.retry_delay_ms, 1_000);
        assert_eq!(config.storage.archive, ArchiveBackend::File);
        assert!(config.storage.unsafe_local_fallback);
    }

    #[test]
    fn for_data_dir_uses_ticketdesk_layout() {
        let config = DeskConfig::for_data_dir("/srv/bot");
        let root = PathBuf::from("/srv/bot/.ticketdesk");
        assert_eq!(config.storage.database, Some(root.join("tickets.db")));
        assert_eq!(config.storage.counter_dir, root.join("counters"));
        assert_eq!(config.storage.archive_dir, root.join("archive"));
        assert_eq!(config.storage.tickets_dir, Some(root.join("tickets")));
        assert_eq!(config.storage.audit_log, Some(root.join("audit.jsonl")));
    }

    #[test]
    fn load_or_default_without_file_uses_layout_next_to_it() {
        let dir = tempdir().unwrap();
        let config = DeskConfig::load_or_default(&dir.path().join("desk.toml")).unwrap();
        assert_eq!(
            config.storage.database,
            Some(dir.path().join(".ticketdesk").join("tickets.db"))
        );
    }

    #[test]
    fn load_reports_bad_toml_as_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("desk.toml");
        std::fs::write(&path, "confirm_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(
            DeskConfig::load(&path),
            Err(DeskError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = DeskConfig {
            confirm_timeout_ms: 0,
            ..DeskConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(DeskConfig::default().validate().is_ok());
    }
}
