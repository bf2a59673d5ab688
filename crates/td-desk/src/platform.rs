// platform.rs — The chat platform, as the desk sees it.
//
// Gateway connection, event dispatch and command registration live outside
// this crate. A Platform implementation only has to create and delete
// spaces, post and edit messages, and answer a few lookups. Every call is a
// single request; nothing here is retried.

use async_trait::async_trait;
use thiserror::Error;

use td_policy::GrantSet;
use td_ticket::{MessageId, Role, RoleId, SpaceId, UserId};
use td_transcript::{Embed, TranscriptMessage};

/// Failures reported by the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The space, message or container does not exist (any more).
    #[error("not found: {0}")]
    NotFound(String),

    /// The bot lacks the platform permission for this request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("platform request failed: {0}")]
    Request(String),
}

/// Whoever triggered an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    /// Roles in platform order.
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A grouping that new spaces can be created under.
    Category,
    Text,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: SpaceId,
    pub name: String,
    pub kind: ContainerKind,
}

/// Everything needed to create a ticket space.
#[derive(Debug, Clone)]
pub struct SpaceRequest {
    pub name: String,
    pub container: SpaceId,
    /// Free-text topic; carries the creator id for operators.
    pub topic: String,
    pub grants: GrantSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Danger,
}

/// A clickable control. Clicking it delivers `token` back to the desk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub token: String,
    pub label: String,
    pub style: ControlStyle,
}

impl Control {
    pub fn button(token: impl ToString, label: impl Into<String>, style: ControlStyle) -> Self {
        Self {
            token: token.to_string(),
            label: label.into(),
            style,
        }
    }
}

/// A file sent along with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub controls: Vec<Control>,
    pub file: Option<FileUpload>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn with_file(mut self, filename: impl Into<String>, body: impl Into<String>) -> Self {
        self.file = Some(FileUpload {
            filename: filename.into(),
            body: body.into(),
        });
        self
    }
}

pub fn mention_user(user: UserId) -> String {
    format!("<@{}>", user)
}

pub fn mention_role(role: RoleId) -> String {
    format!("<@&{}>", role)
}

pub fn mention_space(space: SpaceId) -> String {
    format!("<#{}>", space)
}

/// The chat platform boundary.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user id.
    fn service_identity(&self) -> UserId;

    /// Name of the server the desk runs in (transcript headers).
    fn server_name(&self) -> String;

    /// Look up a container by id. `Ok(None)` if it does not exist.
    async fn container(&self, id: SpaceId) -> Result<Option<Container>, PlatformError>;

    /// Current holders of `role`.
    async fn role_members(&self, role: RoleId) -> Result<Vec<UserId>, PlatformError>;

    /// Create a private space under `request.container` with exactly the
    /// given grants.
    async fn create_space(&self, request: SpaceRequest) -> Result<SpaceId, PlatformError>;

    async fn post(&self, space: SpaceId, message: OutboundMessage) -> Result<MessageId, PlatformError>;

    /// Grey out every control on a message.
    async fn disable_controls(&self, space: SpaceId, message: MessageId) -> Result<(), PlatformError>;

    /// Full message history of a space, in any order.
    async fn history(&self, space: SpaceId) -> Result<Vec<TranscriptMessage>, PlatformError>;

    /// Give one more member read + write on a space.
    async fn grant_access(&self, space: SpaceId, user: UserId) -> Result<(), PlatformError>;

    /// Delete a space. A space that is already gone is `NotFound`.
    async fn delete_space(&self, space: SpaceId) -> Result<(), PlatformError>;
}
