// testing.rs — MemoryPlatform: an in-memory Platform for tests and dry runs.
//
// Spaces, containers and role memberships live in a map behind one mutex.
// Every post is kept twice: as the OutboundMessage the desk sent (for
// assertions) and as a TranscriptMessage (what `history` returns). Failures
// can be switched on per operation to drive the error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use td_policy::{GrantSet, Principal};
use td_ticket::{MessageId, RoleId, SpaceId, UserId};
use td_transcript::{Attachment, TranscriptMessage};

use crate::platform::{
    Container, ContainerKind, OutboundMessage, Platform, PlatformError, SpaceRequest,
};

/// Author name on messages the desk posts.
pub const SERVICE_NAME: &str = "TicketDesk";

/// A space as the memory platform stores it.
#[derive(Debug, Clone)]
pub struct MemorySpace {
    pub id: SpaceId,
    pub name: String,
    /// `None` for channels registered with `with_channel`.
    pub container: Option<SpaceId>,
    pub topic: String,
    pub grants: GrantSet,
    pub posts: Vec<MemoryPost>,
    pub history: Vec<TranscriptMessage>,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryPost {
    pub id: MessageId,
    pub message: OutboundMessage,
    pub controls_disabled: bool,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    CreateSpace,
    Post,
    History,
    DeleteSpace,
}

#[derive(Default)]
struct State {
    next_id: u64,
    containers: HashMap<SpaceId, Container>,
    role_members: HashMap<RoleId, Vec<UserId>>,
    spaces: BTreeMap<SpaceId, MemorySpace>,
    failing: HashMap<Failure, u32>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Consume one scheduled failure of `op`, if any.
    fn take_failure(&mut self, op: Failure) -> bool {
        match self.failing.get_mut(&op) {
            Some(0) | None => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }

    fn live_space(&mut self, id: SpaceId) -> Result<&mut MemorySpace, PlatformError> {
        self.spaces
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| PlatformError::NotFound(format!("space {}", id)))
    }
}

pub struct MemoryPlatform {
    service: UserId,
    server_name: String,
    latency: Duration,
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new(service: impl Into<UserId>) -> Self {
        Self {
            service: service.into(),
            server_name: "Memory Server".to_string(),
            latency: Duration::ZERO,
            state: Mutex::new(State {
                next_id: 10_000,
                ..State::default()
            }),
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Delay every async call, so concurrent operations interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_category(self, id: impl Into<SpaceId>, name: impl Into<String>) -> Self {
        self.with_container(id, name, ContainerKind::Category)
    }

    pub fn with_container(self, id: impl Into<SpaceId>, name: impl Into<String>, kind: ContainerKind) -> Self {
        let id = id.into();
        self.lock().containers.insert(
            id,
            Container {
                id,
                name: name.into(),
                kind,
            },
        );
        self
    }

    /// A plain channel the desk can post to (panels, log channels).
    pub fn with_channel(self, id: impl Into<SpaceId>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        {
            let mut state = self.lock();
            state.containers.insert(
                id,
                Container {
                    id,
                    name: name.clone(),
                    kind: ContainerKind::Text,
                },
            );
            state.spaces.insert(
                id,
                MemorySpace {
                    id,
                    name,
                    container: None,
                    topic: String::new(),
                    grants: GrantSet::default_deny(),
                    posts: Vec::new(),
                    history: Vec::new(),
                    deleted: false,
                },
            );
        }
        self
    }

    pub fn with_role_members(self, role: impl Into<RoleId>, members: &[u64]) -> Self {
        self.lock()
            .role_members
            .insert(role.into(), members.iter().copied().map(UserId).collect());
        self
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail(&self, op: Failure, times: u32) {
        self.lock().failing.insert(op, times);
    }

    /// A member writes in a space.
    pub fn say(&self, space: SpaceId, author: &str, content: &str) -> Result<MessageId, PlatformError> {
        let mut state = self.lock();
        let id = state.next_id();
        let target = state.live_space(space)?;
        target
            .history
            .push(TranscriptMessage::new(id, author, Utc::now(), content));
        Ok(MessageId(id))
    }

    pub fn space(&self, id: SpaceId) -> Option<MemorySpace> {
        self.lock().spaces.get(&id).cloned()
    }

    /// The most recent space with `name`, deleted or not.
    pub fn space_named(&self, name: &str) -> Option<MemorySpace> {
        self.lock()
            .spaces
            .values()
            .filter(|s| s.name == name)
            .last()
            .cloned()
    }

    /// Ticket spaces that have not been deleted, in creation order.
    pub fn live_spaces(&self) -> Vec<MemorySpace> {
        self.lock()
            .spaces
            .values()
            .filter(|s| s.container.is_some() && !s.deleted)
            .cloned()
            .collect()
    }

    pub fn messages(&self, space: SpaceId) -> Vec<OutboundMessage> {
        self.lock()
            .spaces
            .get(&space)
            .map(|s| s.posts.iter().map(|p| p.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn was_deleted(&self, space: SpaceId) -> bool {
        self.lock().spaces.get(&space).is_some_and(|s| s.deleted)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn injected(op: Failure) -> PlatformError {
    PlatformError::Request(format!("injected {:?} failure", op))
}

#[async_trait]
impl Platform for MemoryPlatform {
    fn service_identity(&self) -> UserId {
        self.service
    }

    fn server_name(&self) -> String {
        self.server_name.clone()
    }

    async fn container(&self, id: SpaceId) -> Result<Option<Container>, PlatformError> {
        self.pause().await;
        Ok(self.lock().containers.get(&id).cloned())
    }

    async fn role_members(&self, role: RoleId) -> Result<Vec<UserId>, PlatformError> {
        self.pause().await;
        Ok(self.lock().role_members.get(&role).cloned().unwrap_or_default())
    }

    async fn create_space(&self, request: SpaceRequest) -> Result<SpaceId, PlatformError> {
        self.pause().await;
        let mut state = self.lock();
        if state.take_failure(Failure::CreateSpace) {
            return Err(injected(Failure::CreateSpace));
        }
        match state.containers.get(&request.container) {
            Some(c) if c.kind == ContainerKind::Category => {}
            _ => {
                return Err(PlatformError::NotFound(format!(
                    "category {}",
                    request.container
                )))
            }
        }
        let id = SpaceId(state.next_id());
        state.spaces.insert(
            id,
            MemorySpace {
                id,
                name: request.name,
                container: Some(request.container),
                topic: request.topic,
                grants: request.grants,
                posts: Vec::new(),
                history: Vec::new(),
                deleted: false,
            },
        );
        Ok(id)
    }

    async fn post(&self, space: SpaceId, message: OutboundMessage) -> Result<MessageId, PlatformError> {
        self.pause().await;
        let mut state = self.lock();
        if state.take_failure(Failure::Post) {
            return Err(injected(Failure::Post));
        }
        let id = state.next_id();
        let target = state.live_space(space)?;

        let mut entry = TranscriptMessage::new(
            id,
            SERVICE_NAME,
            Utc::now(),
            message.content.clone().unwrap_or_default(),
        );
        for embed in &message.embeds {
            entry = entry.with_embed(embed.clone());
        }
        if let Some(file) = &message.file {
            entry = entry.with_attachment(Attachment::new(
                file.filename.clone(),
                format!("attachment://{}", file.filename),
            ));
        }
        target.history.push(entry);
        target.posts.push(MemoryPost {
            id: MessageId(id),
            message,
            controls_disabled: false,
        });
        Ok(MessageId(id))
    }

    async fn disable_controls(&self, space: SpaceId, message: MessageId) -> Result<(), PlatformError> {
        self.pause().await;
        let mut state = self.lock();
        let post = state
            .live_space(space)?
            .posts
            .iter_mut()
            .find(|p| p.id == message)
            .ok_or_else(|| PlatformError::NotFound(format!("message {}", message)))?;
        post.controls_disabled = true;
        Ok(())
    }

    async fn history(&self, space: SpaceId) -> Result<Vec<TranscriptMessage>, PlatformError> {
        self.pause().await;
        let mut state = self.lock();
        if state.take_failure(Failure::History) {
            return Err(injected(Failure::History));
        }
        // Newest first, like most platform APIs.
        let mut history = state.live_space(space)?.history.clone();
        history.reverse();
        Ok(history)
    }

    async fn grant_access(&self, space: SpaceId, user: UserId) -> Result<(), PlatformError> {
        self.pause().await;
        self.lock()
            .live_space(space)?
            .grants
            .allow_read_write(Principal::User(user));
        Ok(())
    }

    async fn delete_space(&self, space: SpaceId) -> Result<(), PlatformError> {
        self.pause().await;
        let mut state = self.lock();
        if state.take_failure(Failure::DeleteSpace) {
            return Err(injected(Failure::DeleteSpace));
        }
        state.live_space(space)?.deleted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_are_created_only_under_categories() {
        let platform = MemoryPlatform::new(1u64)
            .with_category(100u64, "Tickets")
            .with_channel(200u64, "logs");

        let request = |container: u64| SpaceRequest {
            name: "ticket-1".into(),
            container: SpaceId(container),
            topic: "7".into(),
            grants: GrantSet::default_deny(),
        };
        let id = platform.create_space(request(100)).await.unwrap();
        assert_eq!(platform.space(id).unwrap().name, "ticket-1");
        assert!(matches!(
            platform.create_space(request(200)).await,
            Err(PlatformError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn history_includes_member_and_desk_messages() {
        let platform = MemoryPlatform::new(1u64).with_channel(200u64, "general");
        let space = SpaceId(200);
        platform.say(space, "alice", "hi").unwrap();
        platform.post(space, OutboundMessage::text("hello")).await.unwrap();

        let history = platform.history(space).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|m| m.author == SERVICE_NAME));
    }

    #[tokio::test]
    async fn deleted_spaces_are_gone() {
        let platform = MemoryPlatform::new(1u64).with_category(100u64, "Tickets");
        let id = platform
            .create_space(SpaceRequest {
                name: "gang-ticket-1".into(),
                container: SpaceId(100),
                topic: String::new(),
                grants: GrantSet::default_deny(),
            })
            .await
            .unwrap();
        platform.delete_space(id).await.unwrap();
        assert!(platform.was_deleted(id));
        assert!(platform.live_spaces().is_empty());
        assert!(matches!(platform.delete_space(id).await, Err(PlatformError::NotFound(_))));
        assert!(matches!(
            platform.post(id, OutboundMessage::text("late")).await,
            Err(PlatformError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let platform = MemoryPlatform::new(1u64).with_channel(200u64, "general");
        platform.fail(Failure::Post, 1);
        assert!(platform.post(SpaceId(200), OutboundMessage::text("a")).await.is_err());
        assert!(platform.post(SpaceId(200), OutboundMessage::text("b")).await.is_ok());
    }
}
