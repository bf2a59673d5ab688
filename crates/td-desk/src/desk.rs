// desk.rs — TicketDesk: interaction routing.
//
// The platform collaborator turns every button click, form submission and
// staff command into an Interaction and hands it to `TicketDesk::handle`.
// The desk routes it by action token, runs it, and answers with a Reply.
// Errors never escape `handle`: they are logged in full and answered with
// the actor-facing text from DeskError::user_message.

use std::sync::Arc;

use serde_json::json;

use td_audit::{AuditAction, AuditEvent};
use td_policy::AccessPolicy;
use td_store::{ArchivalError, ArchiveKey, ArchiveStore, SequenceAllocator};
use td_ticket::{FormFields, FormSpec, MessageId, SpaceId, TicketKind, TicketRegistry, UserId};
use td_transcript::Embed;

use crate::action::ActionToken;
use crate::config::DeskConfig;
use crate::error::DeskError;
use crate::lifecycle::LifecycleController;
use crate::platform::{mention_space, Actor, Control, ControlStyle, FileUpload, OutboundMessage, Platform};
use crate::provisioner::TicketProvisioner;
use crate::stores::Stores;
use crate::trail::AuditTrail;

/// One inbound event from the platform.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub actor: Actor,
    /// Where it happened (the ticket space for close controls and commands).
    pub space: SpaceId,
    pub kind: InteractionKind,
}

#[derive(Debug, Clone)]
pub enum InteractionKind {
    /// A control was clicked.
    Control { token: String },
    /// A form shown by a `Reply::Form` was submitted.
    FormSubmit { token: String, fields: FormFields },
    /// Staff command: give `member` access to the ticket in this space.
    AddMember { member: UserId, member_name: String },
    /// Staff command: fetch an archived transcript. Without a kind, every
    /// kind is tried in order.
    Backup { number: u64, kind: Option<TicketKind> },
}

/// What the actor sees. Everything but `Form` is visible to them only.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ephemeral(String),
    /// A message with follow-up controls (the close confirmation).
    Prompt { content: String, controls: Vec<Control> },
    /// Show a form; its submission comes back with `token`.
    Form { token: String, spec: FormSpec },
    File { content: String, file: FileUpload },
}

impl Reply {
    /// The reply's text, whatever its shape.
    pub fn text(&self) -> &str {
        match self {
            Reply::Ephemeral(text) => text,
            Reply::Prompt { content, .. } | Reply::File { content, .. } => content,
            Reply::Form { spec, .. } => &spec.title,
        }
    }
}

pub struct TicketDesk {
    config: Arc<DeskConfig>,
    platform: Arc<dyn Platform>,
    policy: Arc<AccessPolicy>,
    registry: Arc<TicketRegistry>,
    archive: Arc<dyn ArchiveStore>,
    audit: Arc<AuditTrail>,
    provisioner: TicketProvisioner,
    lifecycle: Arc<LifecycleController>,
}

impl TicketDesk {
    /// Build a desk with the stores `config.storage` describes.
    pub fn open(config: DeskConfig, platform: Arc<dyn Platform>) -> Result<Self, DeskError> {
        config.validate()?;
        let storage = &config.storage;
        let Stores { sequence, archive } = Stores::open(storage)?;

        let registry = match &storage.tickets_dir {
            Some(dir) => TicketRegistry::with_snapshots(dir)?,
            None => TicketRegistry::new(),
        };
        let audit = match &storage.audit_log {
            Some(path) => AuditTrail::open(path)?,
            None => AuditTrail::disabled(),
        };

        tracing::info!(
            sequence = sequence.name(),
            archive = archive.name(),
            tracked = registry.len(),
            "ticket desk ready"
        );
        let desk = Self::new(config, platform, sequence, archive, registry, audit);
        desk.lifecycle.reopen_stale();
        Ok(desk)
    }

    /// Build a desk from explicit parts.
    pub fn new(
        config: DeskConfig,
        platform: Arc<dyn Platform>,
        sequence: Arc<dyn SequenceAllocator>,
        archive: Arc<dyn ArchiveStore>,
        registry: TicketRegistry,
        audit: AuditTrail,
    ) -> Self {
        let config = Arc::new(config);
        let policy = Arc::new(AccessPolicy::new(
            platform.service_identity(),
            config.staff_role,
            config.gang_role_prefix.clone(),
        ));
        let registry = Arc::new(registry);
        let audit = Arc::new(audit);

        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&platform),
            Arc::clone(&policy),
            Arc::clone(&registry),
            Arc::clone(&archive),
            Arc::clone(&audit),
            Arc::clone(&config),
        ));
        let provisioner = TicketProvisioner::new(
            Arc::clone(&platform),
            Arc::clone(&policy),
            sequence,
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            Arc::clone(&audit),
            Arc::clone(&config),
        );

        Self {
            config,
            platform,
            policy,
            registry,
            archive,
            audit,
            provisioner,
            lifecycle,
        }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn provisioner(&self) -> &TicketProvisioner {
        &self.provisioner
    }

    /// Handle one interaction. Never fails: errors become replies.
    pub async fn handle(&self, interaction: Interaction) -> Reply {
        match self.dispatch(&interaction).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(
                        actor = %interaction.actor.id,
                        space = %interaction.space,
                        "interaction failed: {}",
                        e
                    );
                } else {
                    tracing::info!(
                        actor = %interaction.actor.id,
                        space = %interaction.space,
                        "interaction refused: {}",
                        e
                    );
                }
                Reply::Ephemeral(e.user_message())
            }
        }
    }

    async fn dispatch(&self, interaction: &Interaction) -> Result<Reply, DeskError> {
        let actor = &interaction.actor;
        let space = interaction.space;
        match &interaction.kind {
            InteractionKind::Control { token } => match token.parse::<ActionToken>()? {
                ActionToken::Create(kind) => self.begin_create(kind, actor).await,
                ActionToken::CloseRequest { creator } => {
                    if let Some(ticket) = self.registry.get(space) {
                        if ticket.creator != creator {
                            tracing::debug!(
                                ticket = %ticket.name,
                                "close control carries creator {} but ticket records {}",
                                creator,
                                ticket.creator
                            );
                        }
                        // Closed earlier, but the space survived teardown.
                        if ticket.state.is_terminal() {
                            let ticket = self.lifecycle.retry_teardown(space, actor).await?;
                            return Ok(Reply::Ephemeral(format!("{} deleted.", ticket.name)));
                        }
                    }
                    let opened = self.lifecycle.request_close(space, actor)?;
                    Ok(Reply::Prompt {
                        content: "Confirm closing this ticket?".to_string(),
                        controls: vec![
                            Control::button(
                                ActionToken::CloseConfirm {
                                    window: Some(opened.window),
                                },
                                "Confirm",
                                ControlStyle::Danger,
                            ),
                            Control::button(
                                ActionToken::CloseCancel {
                                    window: Some(opened.window),
                                },
                                "Cancel",
                                ControlStyle::Secondary,
                            ),
                        ],
                    })
                }
                ActionToken::CloseConfirm { window } => {
                    let outcome = self.lifecycle.confirm(space, actor, window).await?;
                    Ok(Reply::Ephemeral(match outcome.receipt {
                        Some(_) => format!("{} closed and archived.", outcome.ticket.name),
                        None => format!(
                            "{} closed. The transcript could not be archived.",
                            outcome.ticket.name
                        ),
                    }))
                }
                ActionToken::CloseCancel { window } => {
                    if self.lifecycle.cancel(space, actor, window)? {
                        Ok(Reply::Ephemeral("Close cancelled.".to_string()))
                    } else {
                        Ok(Reply::Ephemeral(
                            "This confirmation is no longer active.".to_string(),
                        ))
                    }
                }
            },
            InteractionKind::FormSubmit { token, fields } => match token.parse::<ActionToken>()? {
                ActionToken::Create(kind) => self.create(kind, actor, fields.clone()).await,
                _ => Err(DeskError::UnknownAction(token.clone())),
            },
            InteractionKind::AddMember {
                member,
                member_name,
            } => self.add_member(space, actor, *member, member_name).await,
            InteractionKind::Backup { number, kind } => self.backup(actor, *number, *kind).await,
        }
    }

    /// A create control was clicked: show the form, or create right away
    /// for kinds without one.
    async fn begin_create(&self, kind: TicketKind, actor: &Actor) -> Result<Reply, DeskError> {
        match kind.form_spec() {
            Some(spec) => {
                // Gang membership is checked before the form is shown.
                self.policy.gang_role(kind, &actor.roles)?;
                Ok(Reply::Form {
                    token: ActionToken::Create(kind).to_string(),
                    spec,
                })
            }
            None => self.create(kind, actor, FormFields::new()).await,
        }
    }

    async fn create(&self, kind: TicketKind, actor: &Actor, fields: FormFields) -> Result<Reply, DeskError> {
        match self.provisioner.create(kind, actor, fields).await {
            Ok(ticket) => Ok(Reply::Ephemeral(format!(
                "Your {} has been created: {}",
                kind.label().to_lowercase(),
                mention_space(ticket.space)
            ))),
            Err(e) if e.is_internal() => {
                tracing::error!(actor = %actor.id, %kind, "ticket creation failed: {}", e);
                Ok(Reply::Ephemeral(
                    "Something went wrong while creating your ticket.".to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    fn authorize_staff(&self, actor: &Actor, what: &str) -> Result<(), DeskError> {
        self.policy.authorize_staff(&actor.roles, what).map_err(|e| {
            self.audit.record(
                AuditEvent::new(actor.id.to_string(), AuditAction::PermissionDenied)
                    .with_metadata(json!({ "operation": what })),
            );
            e.into()
        })
    }

    /// Staff only: give `member` read + write on the ticket in `space`.
    pub async fn add_member(
        &self,
        space: SpaceId,
        actor: &Actor,
        member: UserId,
        member_name: &str,
    ) -> Result<Reply, DeskError> {
        let ticket = self
            .registry
            .get(space)
            .ok_or(DeskError::UnknownTicket(space))?;
        self.authorize_staff(actor, "add members to tickets")?;

        self.platform.grant_access(space, member).await?;
        let notice = format!(
            "{} has been granted access by {}.",
            member_name, actor.display_name
        );
        if let Err(e) = self.platform.post(space, OutboundMessage::text(notice)).await {
            tracing::warn!(ticket = %ticket.name, "could not post access notice: {}", e);
        }

        tracing::info!(ticket = %ticket.name, %member, "member added by {}", actor.display_name);
        self.audit.record(
            AuditEvent::new(actor.id.to_string(), AuditAction::MemberAdded)
                .with_target(format!("{}/{}", ticket.kind.scope(), ticket.number))
                .with_metadata(json!({ "member": member.0 })),
        );
        Ok(Reply::Ephemeral(format!("{} added to this ticket.", member_name)))
    }

    /// Staff only: fetch an archived transcript by number.
    pub async fn backup(
        &self,
        actor: &Actor,
        number: u64,
        kind: Option<TicketKind>,
    ) -> Result<Reply, DeskError> {
        self.authorize_staff(actor, "retrieve transcripts")?;

        let kinds: Vec<TicketKind> = match kind {
            Some(kind) => vec![kind],
            None => TicketKind::ALL.to_vec(),
        };
        for kind in &kinds {
            match self.archive.get(&ArchiveKey::new(kind.scope(), number)).await {
                Ok(artifact) => {
                    let name = kind.channel_name(number);
                    return Ok(Reply::File {
                        content: format!("Transcript for `{}` retrieved from the archive.", name),
                        file: FileUpload {
                            filename: format!("{}_backup.html", name),
                            body: artifact.content,
                        },
                    });
                }
                Err(ArchivalError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let names: Vec<String> = kinds.iter().map(|k| k.channel_name(number)).collect();
        Ok(Reply::Ephemeral(format!(
            "No transcript found for `{}`.",
            names.join("`, `")
        )))
    }

    /// Post the "create ticket" panel with one control per kind.
    pub async fn publish_panel(&self, channel: SpaceId, kinds: &[TicketKind]) -> Result<MessageId, DeskError> {
        let description = match kinds {
            [TicketKind::Support] => {
                "Click below to create a support ticket. A private channel will be made for you."
            }
            _ => "Choose an option below to create a ticket.",
        };
        let mut message = OutboundMessage::embed(
            Embed::titled("Support Ticket System").with_description(description),
        );
        for kind in kinds {
            let (label, style) = match kind {
                TicketKind::Normal => ("Create Normal Ticket", ControlStyle::Primary),
                TicketKind::Gang => ("Create Gang Ticket", ControlStyle::Danger),
                TicketKind::Support => ("Create Support Ticket", ControlStyle::Primary),
            };
            message = message.with_control(Control::button(ActionToken::Create(*kind), label, style));
        }

        let id = self.platform.post(channel, message).await?;
        tracing::info!(%channel, kinds = kinds.len(), "ticket panel published");
        Ok(id)
    }

    /// Publish the panel to `panel_channel` from the configuration.
    pub async fn publish_configured_panel(&self, kinds: &[TicketKind]) -> Result<MessageId, DeskError> {
        let channel = self.config.panel_channel.ok_or_else(|| {
            DeskError::Configuration("no panel_channel configured".to_string())
        })?;
        self.publish_panel(channel, kinds).await
    }
}
