//! # td-cli
//!
//! Operator command-line interface for TicketDesk.
//!
//! Works directly on the desk's local state, without a platform connection:
//! - `td archive list/get/export` — browse and export archived transcripts
//! - `td sequence current/next` — inspect or advance ticket counters
//! - `td audit verify/tail` — inspect the tamper-evident audit trail
//! - `td transcript render` — render an exported history to HTML
//! - `td config check/show` — validate and print the resolved desk.toml

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use td_desk::DeskConfig;
use tracing_subscriber::EnvFilter;

/// TicketDesk CLI — archived transcripts, counters and the audit trail.
#[derive(Parser)]
#[command(name = "td", version, about)]
struct Cli {
    /// Desk configuration file. Without one, the `.ticketdesk/` layout next
    /// to it is used.
    #[arg(long, default_value = "desk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse and export archived transcripts.
    Archive {
        #[command(subcommand)]
        command: commands::archive::ArchiveCommands,
    },
    /// Inspect or advance ticket counters.
    Sequence {
        #[command(subcommand)]
        command: commands::sequence::SequenceCommands,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Render transcripts offline.
    Transcript {
        #[command(subcommand)]
        command: commands::transcript::TranscriptCommands,
    },
    /// Validate or print the configuration.
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't mix with command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("td_desk=warn".parse()?)
                .add_directive("td_store=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = DeskConfig::load_or_default(&cli.config)?;

    match &cli.command {
        Commands::Archive { command } => commands::archive::execute(command, &config).await,
        Commands::Sequence { command } => commands::sequence::execute(command, &config).await,
        Commands::Audit { command } => commands::audit::execute(command, &config),
        Commands::Transcript { command } => commands::transcript::execute(command),
        Commands::Config { command } => commands::config::execute(command, &config, &cli.config),
    }
}
