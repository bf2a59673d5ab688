// provisioner.rs — TicketProvisioner: from a create request to a live space.
//
// Order matters:
//   1. validate the form, resolve the container, check the gang role
//      (all before a number is allocated, so a refused request consumes
//      nothing)
//   2. allocate the number; from here on it stays consumed whatever happens
//   3. compute grants and create the space
//   4. track the ticket, seed the space; if seeding fails the ticket is
//      abandoned and the space deleted
//
// Numbers are never rolled back: monotonicity matters more than density.

use std::sync::Arc;

use serde_json::json;

use td_audit::{AuditAction, AuditEvent};
use td_policy::AccessPolicy;
use td_store::SequenceAllocator;
use td_ticket::{FormFields, MessageId, SpaceId, Ticket, TicketKind, TicketRegistry};
use td_transcript::Embed;

use crate::config::DeskConfig;
use crate::error::DeskError;
use crate::lifecycle::LifecycleController;
use crate::platform::{
    mention_role, mention_user, Actor, ContainerKind, Control, ControlStyle, OutboundMessage,
    Platform, SpaceRequest,
};
use crate::trail::AuditTrail;
use crate::ActionToken;

pub struct TicketProvisioner {
    platform: Arc<dyn Platform>,
    policy: Arc<AccessPolicy>,
    sequence: Arc<dyn SequenceAllocator>,
    registry: Arc<TicketRegistry>,
    lifecycle: Arc<LifecycleController>,
    audit: Arc<AuditTrail>,
    config: Arc<DeskConfig>,
}

impl TicketProvisioner {
    pub fn new(
        platform: Arc<dyn Platform>,
        policy: Arc<AccessPolicy>,
        sequence: Arc<dyn SequenceAllocator>,
        registry: Arc<TicketRegistry>,
        lifecycle: Arc<LifecycleController>,
        audit: Arc<AuditTrail>,
        config: Arc<DeskConfig>,
    ) -> Self {
        Self {
            platform,
            policy,
            sequence,
            registry,
            lifecycle,
            audit,
            config,
        }
    }

    /// Open a ticket of `kind` for `actor`.
    pub async fn create(&self, kind: TicketKind, actor: &Actor, form: FormFields) -> Result<Ticket, DeskError> {
        match kind.form_spec() {
            Some(spec) => spec.validate(&form)?,
            None if !form.is_empty() => {
                return Err(DeskError::InvalidForm(format!(
                    "{} tickets take no form",
                    kind.label()
                )))
            }
            None => {}
        }

        let container = self.resolve_container(kind).await?;

        let gang_role = self.policy.gang_role(kind, &actor.roles).map_err(|e| {
            self.audit.record(
                AuditEvent::new(actor.id.to_string(), AuditAction::PermissionDenied)
                    .with_metadata(json!({ "operation": "create", "kind": kind.scope() })),
            );
            DeskError::from(e)
        })?;
        let co_members = match gang_role {
            Some(role) => self.platform.role_members(role.id).await?,
            None => Vec::new(),
        };

        let number = self.sequence.next(kind.scope()).await?;
        let name = kind.channel_name(number);
        let grants = self
            .policy
            .grants_for(kind, actor.id, &actor.roles, &co_members)?;

        let space = self
            .platform
            .create_space(SpaceRequest {
                name: name.clone(),
                container,
                topic: actor.id.to_string(),
                grants,
            })
            .await?;
        tracing::info!(ticket = %name, %space, "space created for {}", actor.display_name);

        let mut ticket = Ticket::new(kind, number, space, actor.id, actor.display_name.clone(), form);
        if let Err(e) = self.registry.insert(ticket.clone()) {
            tracing::error!(ticket = %name, "could not track new ticket: {}", e);
            if let Err(cleanup) = self.platform.delete_space(space).await {
                tracing::error!(ticket = %name, "could not delete untracked space: {}", cleanup);
            }
            return Err(e.into());
        }

        match self.seed(&ticket, actor).await {
            Ok(control) => {
                self.registry
                    .update(space, |t| {
                        t.control_message = Some(control);
                        Ok(())
                    })?;
                ticket.control_message = Some(control);
            }
            Err(e) => {
                tracing::error!(ticket = %name, "seeding the ticket space failed: {}", e);
                if let Err(cleanup) = self.lifecycle.abandon(space, "seeding the space failed").await {
                    tracing::error!(ticket = %name, "cleanup after failed seeding failed: {}", cleanup);
                }
                return Err(e);
            }
        }

        self.audit.record(
            AuditEvent::new(actor.id.to_string(), AuditAction::TicketCreated)
                .with_target(format!("{}/{}", kind.scope(), number))
                .with_metadata(json!({ "channel": name, "space": space.0 })),
        );
        self.post_creation_log(&ticket, actor).await;
        Ok(ticket)
    }

    async fn resolve_container(&self, kind: TicketKind) -> Result<SpaceId, DeskError> {
        let id = self.config.kind(kind).container.ok_or_else(|| {
            DeskError::Configuration(format!("no container configured for {} tickets", kind))
        })?;
        match self.platform.container(id).await? {
            Some(c) if c.kind == ContainerKind::Category => Ok(c.id),
            Some(c) => Err(DeskError::Configuration(format!(
                "container {} ({}) for {} tickets is not a category",
                c.id, c.name, kind
            ))),
            None => Err(DeskError::Configuration(format!(
                "container {} for {} tickets not found",
                id, kind
            ))),
        }
    }

    /// Post the opening messages. Returns the message carrying the close
    /// control.
    async fn seed(&self, ticket: &Ticket, actor: &Actor) -> Result<MessageId, DeskError> {
        let close = Control::button(
            ActionToken::CloseRequest {
                creator: ticket.creator,
            },
            "Close Ticket",
            ControlStyle::Danger,
        );

        let control = match ticket.kind {
            TicketKind::Support => {
                let header = Embed::titled(format!("{} #{}", ticket.kind.label(), ticket.number))
                    .with_description(format!("Ticket opened by **{}**.", actor.display_name));
                self.platform
                    .post(ticket.space, OutboundMessage::embed(header))
                    .await?;

                let instructions = Embed::titled("Please Explain Your Issue").with_description(
                    "Our support team will attend to you shortly.\n\
                     While you wait, please describe your problem in detail below. \
                     Include any relevant screenshots, the time it happened, or other info.",
                );
                self.platform
                    .post(
                        ticket.space,
                        OutboundMessage::embed(instructions).with_control(close),
                    )
                    .await?
            }
            TicketKind::Normal | TicketKind::Gang => {
                let mut embed = Embed::titled(format!("{} #{}", ticket.kind.label(), ticket.number))
                    .with_description("A staff member will assist you soon.");
                for field in ticket.form.iter() {
                    embed = embed.with_field(field.name.clone(), field.value.clone());
                }
                self.platform
                    .post(ticket.space, OutboundMessage::embed(embed).with_control(close))
                    .await?
            }
        };

        if let Some(staff) = self.policy.staff_role() {
            let ping = format!(
                "{} new {} created by {}",
                mention_role(staff),
                ticket.kind.label().to_lowercase(),
                mention_user(actor.id)
            );
            self.platform.post(ticket.space, OutboundMessage::text(ping)).await?;
        }

        Ok(control)
    }

    /// Creation entry in the kind's log channel. Best effort.
    async fn post_creation_log(&self, ticket: &Ticket, actor: &Actor) {
        let Some(channel) = self.config.kind(ticket.kind).log_channel else {
            return;
        };
        let mut embed = Embed::titled(format!("{} Created", ticket.kind.label()))
            .with_description(format!(
                "{} **#{}** created by **{}**",
                ticket.kind.label(),
                ticket.number,
                actor.display_name
            ))
            .with_field("Channel", ticket.name.clone());
        if let Some(title) = ticket.form.get("Title") {
            embed = embed.with_field("Title", title);
        }
        if let Err(e) = self.platform.post(channel, OutboundMessage::embed(embed)).await {
            tracing::warn!(ticket = %ticket.name, "could not post creation log entry: {}", e);
        }
    }
}
