// config.rs — Config subcommands: check, show.

use std::path::Path;

use clap::Subcommand;
use td_desk::DeskConfig;
use td_ticket::TicketKind;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration and report unset ids.
    Check,
    /// Print the resolved configuration as TOML.
    Show,
}

pub fn execute(cmd: &ConfigCommands, config: &DeskConfig, path: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Check => {
            config.validate()?;
            let warnings = warnings(config);
            if path.exists() {
                println!("{} is valid.", path.display());
            } else {
                println!("{} not found; defaults are valid.", path.display());
            }
            for warning in &warnings {
                println!("  warning: {}", warning);
            }
        }
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
    }
    Ok(())
}

/// Settings that are legal but leave part of the desk unusable.
fn warnings(config: &DeskConfig) -> Vec<String> {
    let mut out = Vec::new();
    if config.staff_role.is_none() {
        out.push("staff_role is not set; only creators can close tickets".to_string());
    }
    if config.panel_channel.is_none() {
        out.push("panel_channel is not set".to_string());
    }
    for kind in TicketKind::ALL {
        if config.kind(kind).container.is_none() {
            out.push(format!(
                "{0}.container is not set; {0} tickets cannot be created",
                kind.scope()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_about_every_missing_id() {
        let warnings = warnings(&DeskConfig::default());
        assert_eq!(warnings.len(), 5);
        assert!(warnings[2].starts_with("normal.container"));
    }

    #[test]
    fn shown_config_parses_back() {
        let shown = toml::to_string_pretty(&DeskConfig::default()).unwrap();
        let parsed: DeskConfig = toml::from_str(&shown).unwrap();
        assert_eq!(parsed.confirm_timeout_ms, 30_000);
    }
}
