// message.rs — The conversation history as the renderer sees it.
//
// Platform adapters convert their native message objects into these plain
// values, so rendering never touches the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message in a ticket conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Platform message id; breaks ties between equal timestamps.
    pub id: u64,
    /// Display name of the author.
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TranscriptMessage {
    pub fn new(
        id: u64,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            created_at,
            content: content.into(),
            embeds: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A titled block of structured content attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// A file uploaded with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }

    /// Whether the file should be shown inline as an image.
    pub fn is_image(&self) -> bool {
        const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Only http(s) links are emitted as live `src`/`href` attributes.
    pub fn has_web_url(&self) -> bool {
        let lower = self.url.to_ascii_lowercase();
        lower.starts_with("https://") || lower.starts_with("http://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_detection_is_case_insensitive() {
        assert!(Attachment::new("photo.PNG", "https://cdn/x").is_image());
        assert!(Attachment::new("clip.webp", "https://cdn/x").is_image());
        assert!(!Attachment::new("notes.txt", "https://cdn/x").is_image());
        assert!(!Attachment::new("png", "https://cdn/x").is_image());
    }

    #[test]
    fn only_http_urls_count_as_web_urls() {
        assert!(Attachment::new("a.png", "HTTPS://cdn/a.png").has_web_url());
        assert!(!Attachment::new("a.png", "javascript:alert(1)").has_web_url());
        assert!(!Attachment::new("a.png", "data:image/png;base64,AAAA").has_web_url());
    }

    #[test]
    fn missing_collections_deserialize_as_empty() {
        let msg: TranscriptMessage = serde_json::from_str(
            r#"{"id": 5, "author": "alice", "created_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(msg.content.is_empty());
        assert!(msg.embeds.is_empty());
        assert!(msg.attachments.is_empty());
    }
}
