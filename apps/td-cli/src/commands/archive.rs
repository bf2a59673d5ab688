// archive.rs — Archive subcommands: list, get, export.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use td_desk::{DeskConfig, Stores};
use td_store::{ArchivalError, ArchiveKey, ArchiveStore};
use td_ticket::TicketKind;

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// List archived transcripts.
    List {
        /// Only this kind (normal, gang, support).
        #[arg(long)]
        kind: Option<TicketKind>,
    },
    /// Show the metadata of one transcript.
    Get {
        /// Ticket kind.
        kind: TicketKind,
        /// Ticket number.
        number: u64,
    },
    /// Write one transcript to an HTML file.
    Export {
        /// Ticket kind.
        kind: TicketKind,
        /// Ticket number.
        number: u64,
        /// Output path (defaults to `<channel>_backup.html`).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub async fn execute(cmd: &ArchiveCommands, config: &DeskConfig) -> anyhow::Result<()> {
    let stores = Stores::open(&config.storage)?;
    let archive = stores.archive.as_ref();

    match cmd {
        ArchiveCommands::List { kind } => list(archive, *kind).await,
        ArchiveCommands::Get { kind, number } => get(archive, *kind, *number).await,
        ArchiveCommands::Export { kind, number, out } => {
            let path = export(archive, *kind, *number, out.as_deref()).await?;
            println!("Transcript written to {}", path.display());
            Ok(())
        }
    }
}

async fn list(archive: &dyn ArchiveStore, kind: Option<TicketKind>) -> anyhow::Result<()> {
    let summaries = archive.list(kind.map(|k| k.scope())).await?;
    if summaries.is_empty() {
        println!("No archived transcripts.");
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:<20} {:<20} SIZE",
        "KEY", "CHANNEL", "CLOSED BY", "RENDERED"
    );
    println!("{}", "-".repeat(90));
    for summary in &summaries {
        println!(
            "{:<20} {:<20} {:<20} {:<20} {}",
            summary.key.to_string(),
            summary.channel_name,
            summary.closed_by_name.as_deref().unwrap_or("-"),
            summary.rendered_at.format("%Y-%m-%d %H:%M:%S"),
            summary.size,
        );
    }
    println!();
    println!("{} transcript(s).", summaries.len());
    Ok(())
}

async fn get(archive: &dyn ArchiveStore, kind: TicketKind, number: u64) -> anyhow::Result<()> {
    let artifact = archive.get(&ArchiveKey::new(kind.scope(), number)).await?;
    println!("Key:        {}", artifact.key);
    println!("Channel:    {}", artifact.channel_name);
    println!(
        "Closed by:  {}",
        artifact.closed_by_name.as_deref().unwrap_or("-")
    );
    println!(
        "Rendered:   {}",
        artifact.rendered_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Size:       {} bytes", artifact.content.len());
    println!("SHA-256:    {}", artifact.content_sha256);
    Ok(())
}

/// Write the transcript for `kind`/`number` and return where it went.
async fn export(
    archive: &dyn ArchiveStore,
    kind: TicketKind,
    number: u64,
    out: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let artifact = match archive.get(&ArchiveKey::new(kind.scope(), number)).await {
        Ok(artifact) => artifact,
        Err(ArchivalError::NotFound { .. }) => {
            anyhow::bail!("No transcript found for {}", kind.channel_name(number))
        }
        Err(e) => return Err(e.into()),
    };

    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}_backup.html", artifact.channel_name)));
    std::fs::write(&path, &artifact.content)?;
    Ok(path)
}
