//! html.rs — Self-contained HTML transcript of a ticket conversation.

use chrono::{DateTime, Utc};

use crate::message::{Attachment, Embed, TranscriptMessage};

/// Everything a render needs. Nothing else is consulted.
pub struct RenderContext<'a> {
    /// Channel name of the ticket, e.g. `ticket-12`.
    pub conversation_name: &'a str,
    pub server_name: &'a str,
    /// Page heading, e.g. "Transcript for #ticket-12".
    pub heading: &'a str,
    /// Stamped into the header; supplied by the caller so output is reproducible.
    pub generated_at: DateTime<Utc>,
    /// Full history, any order.
    pub messages: &'a [TranscriptMessage],
}

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Default)]
pub struct HtmlTranscript {}

impl HtmlTranscript {
    pub fn new() -> Self {
        Self {}
    }

    fn css(&self) -> &str {
        r#"
        <style>
            body { background: #2f3136; color: #dcddde; font-family: Arial, sans-serif; }
            .header { padding: 8px; }
            .msg { margin: 8px; padding: 8px; border-bottom: 1px solid #444; }
            .author { color: #7289da; font-weight: bold; }
            .time { color: #999; font-size: 0.85em; margin-left: 6px; }
            .content { margin-top: 4px; white-space: pre-wrap; }
            .embed { margin: 8px 0; padding: 8px; border-left: 4px solid #5865f2; background: #2c2f33; }
            .embed-title { color: #00b0f4; font-weight: bold; }
            .attachment { margin-top: 4px; }
            img { max-width: 400px; border-radius: 4px; margin-top: 4px; }
        </style>
        "#
    }

    fn render_embed(&self, embed: &Embed, html: &mut String) {
        html.push_str("<div class=\"embed\">");
        if let Some(title) = &embed.title {
            html.push_str(&format!(
                "<div class=\"embed-title\">{}</div>",
                escape_html(title)
            ));
        }
        if let Some(description) = &embed.description {
            html.push_str(&format!(
                "<div class=\"content\">{}</div>",
                escape_html(description)
            ));
        }
        for field in &embed.fields {
            html.push_str(&format!(
                "<div><b>{}:</b> {}</div>",
                escape_html(&field.name),
                escape_html(&field.value)
            ));
        }
        html.push_str("</div>");
    }

    fn render_attachment(&self, attachment: &Attachment, html: &mut String) {
        let name = escape_html(&attachment.filename);
        let url = escape_html(&attachment.url);
        if !attachment.has_web_url() {
            // Anything but http(s) could execute or embed local data.
            html.push_str(&format!(
                "<div class=\"attachment\">{} ({})</div>",
                name, url
            ));
        } else if attachment.is_image() {
            html.push_str(&format!("<img src=\"{}\" alt=\"{}\">", url, name));
        } else {
            html.push_str(&format!(
                "<div class=\"attachment\"><a href=\"{}\">{}</a></div>",
                url, name
            ));
        }
    }

    /// Render the conversation. Messages are ordered by timestamp, then id.
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut messages: Vec<&TranscriptMessage> = ctx.messages.iter().collect();
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
        html.push_str(&format!(
            "<title>Transcript - {}</title>\n",
            escape_html(ctx.conversation_name)
        ));
        html.push_str(self.css());
        html.push_str("</head>\n<body>\n");

        // Header
        html.push_str("<div class=\"header\">\n");
        html.push_str(&format!("<h2>{}</h2>\n", escape_html(ctx.heading)));
        html.push_str(&format!(
            "<p>Server: {}<br>\nGenerated: {}<br>\nMessages: {}</p>\n",
            escape_html(ctx.server_name),
            ctx.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            messages.len()
        ));
        html.push_str("</div>\n<hr>\n");

        for msg in messages {
            html.push_str(&format!(
                "<div class=\"msg\"><span class=\"author\">{}</span><span class=\"time\">[{}]</span>",
                escape_html(&msg.author),
                msg.created_at.format("%Y-%m-%d %H:%M:%S")
            ));
            if !msg.content.is_empty() {
                html.push_str(&format!(
                    "<div class=\"content\">{}</div>",
                    escape_html(&msg.content)
                ));
            }
            for embed in &msg.embeds {
                self.render_embed(embed, &mut html);
            }
            for attachment in &msg.attachments {
                self.render_attachment(attachment, &mut html);
            }
            html.push_str("</div>\n");
        }

        html.push_str("</body>\n</html>");
        html
    }

    pub fn name(&self) -> &str {
        "html"
    }
}
