// sequence.rs — Sequence subcommands: current, next.

use clap::Subcommand;
use td_desk::{DeskConfig, Stores};
use td_ticket::TicketKind;

#[derive(Subcommand)]
pub enum SequenceCommands {
    /// Show the last number issued, per kind.
    Current {
        /// Only this kind (normal, gang, support).
        kind: Option<TicketKind>,
    },
    /// Consume the next number of a kind without creating a ticket.
    ///
    /// Useful to skip past numbers already used by a previous deployment.
    Next {
        kind: TicketKind,
    },
}

pub async fn execute(cmd: &SequenceCommands, config: &DeskConfig) -> anyhow::Result<()> {
    let stores = Stores::open(&config.storage)?;
    let sequence = stores.sequence.as_ref();

    match cmd {
        SequenceCommands::Current { kind } => {
            let kinds = match kind {
                Some(kind) => vec![*kind],
                None => TicketKind::ALL.to_vec(),
            };
            println!("{:<10} {:<8} NEXT CHANNEL", "KIND", "CURRENT");
            for kind in kinds {
                let current = sequence.current(kind.scope()).await?;
                println!(
                    "{:<10} {:<8} {}",
                    kind.scope(),
                    current,
                    kind.channel_name(current + 1)
                );
            }
            println!();
            println!("Counter backend: {}", sequence.name());
        }
        SequenceCommands::Next { kind } => {
            let number = sequence.next(kind.scope()).await?;
            println!(
                "Consumed {} number {} ({}).",
                kind.scope(),
                number,
                kind.channel_name(number)
            );
        }
    }

    Ok(())
}
