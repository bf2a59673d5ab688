// transcript.rs — Transcript subcommands: render.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Subcommand;
use td_transcript::{HtmlTranscript, RenderContext, TranscriptMessage};

#[derive(Subcommand)]
pub enum TranscriptCommands {
    /// Render a JSON message export to a standalone HTML page.
    Render {
        /// JSON array of messages (id, author, created_at, content, embeds, attachments).
        input: PathBuf,
        /// Conversation name shown in the header (defaults to the file stem).
        #[arg(long)]
        name: Option<String>,
        /// Server name shown in the header.
        #[arg(long, default_value = "Unknown server")]
        server: String,
        /// Output path (defaults to `<name>.html`).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn execute(cmd: &TranscriptCommands) -> anyhow::Result<()> {
    match cmd {
        TranscriptCommands::Render {
            input,
            name,
            server,
            out,
        } => {
            let path = render_file(input, name.as_deref(), server, out.as_deref())?;
            println!("Transcript written to {}", path.display());
            Ok(())
        }
    }
}

fn render_file(
    input: &Path,
    name: Option<&str>,
    server: &str,
    out: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let raw = std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", input.display(), e))?;
    let messages: Vec<TranscriptMessage> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid message export {}: {}", input.display(), e))?;

    let name = name
        .map(str::to_string)
        .or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "transcript".to_string());
    let heading = format!("Transcript for #{}", name);
    let html = HtmlTranscript::new().render(&RenderContext {
        conversation_name: &name,
        server_name: server,
        heading: &heading,
        generated_at: Utc::now(),
        messages: &messages,
    });

    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.html", name)));
    std::fs::write(&path, html)?;
    Ok(path)
}
