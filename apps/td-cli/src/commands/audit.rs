// audit.rs — Audit subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;
use td_audit::AuditLog;
use td_desk::DeskConfig;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to storage.audit_log).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit events.
    Tail {
        /// Path to audit log (defaults to storage.audit_log).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

fn log_path(log: &Option<PathBuf>, config: &DeskConfig) -> anyhow::Result<PathBuf> {
    log.clone()
        .or_else(|| config.storage.audit_log.clone())
        .ok_or_else(|| anyhow::anyhow!("No audit log configured; pass --log"))
}

pub fn execute(cmd: &AuditCommands, config: &DeskConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log_path(log, config)?;
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(&path) {
                Ok(count) => {
                    println!("Audit log verified: {} event(s), hash chain intact.", count);
                }
                Err(td_audit::AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = log_path(log, config)?;
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let recent = AuditLog::recent(&path, *n)?;
            if recent.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!(
                "{:<20} {:<20} {:<20} TARGET",
                "TIMESTAMP", "ACTOR", "ACTION"
            );
            println!("{}", "-".repeat(80));

            for event in &recent {
                println!(
                    "{:<20} {:<20} {:<20} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.actor_id,
                    format!("{:?}", event.action),
                    event.target.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}
