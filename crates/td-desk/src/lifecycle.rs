// lifecycle.rs — LifecycleController: the close flow of a ticket.
//
//   Open ──request_close──▶ PendingClose ──confirm──▶ Closed ──▶ space deleted
//                              │    ▲
//                    cancel /  │    │ strict archival
//                    expiry    ▼    │ exhausted
//                             Open ─┘
//
// Each close request opens a confirmation window with its own number. The
// confirm, cancel and expiry paths all go through TicketRegistry::update, so
// whichever reaches the ticket first decides the window; the others find it
// claimed or gone and do nothing. Nothing holds the registry lock across an
// `.await`.
//
// The space is torn down only after the archival attempt has finished, and
// after the teardown grace period, which runs in its own task so the
// confirming actor is answered right away. A ticket whose space could not
// be deleted stays tracked in its terminal state until a retry succeeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use td_audit::{AuditAction, AuditEvent};
use td_policy::AccessPolicy;
use td_store::{ArchivalError, ArchiveKey, ArchiveReceipt, ArchiveStore, TranscriptArtifact};
use td_ticket::{SpaceId, Ticket, TicketError, TicketKind, TicketRegistry, TicketState};
use td_transcript::{Embed, HtmlTranscript, RenderContext};

use crate::action::ActionToken;
use crate::config::DeskConfig;
use crate::error::DeskError;
use crate::platform::{mention_role, Actor, Control, ControlStyle, OutboundMessage, Platform, PlatformError};
use crate::trail::AuditTrail;

/// Actor id recorded for timer-driven transitions.
const SYSTEM_ACTOR: &str = "system";

/// An open confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseWindow {
    pub window: u64,
    pub expires_at: DateTime<Utc>,
}

/// What a successful confirmation did.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// The ticket in its final (Closed) state.
    pub ticket: Ticket,
    /// `None` when archival failed and teardown went ahead anyway.
    pub receipt: Option<ArchiveReceipt>,
}

pub struct LifecycleController {
    platform: Arc<dyn Platform>,
    policy: Arc<AccessPolicy>,
    registry: Arc<TicketRegistry>,
    archive: Arc<dyn ArchiveStore>,
    audit: Arc<AuditTrail>,
    config: Arc<DeskConfig>,
    renderer: HtmlTranscript,
    /// Source of confirmation window numbers. Seeded from the clock so
    /// controls posted before a restart never match a new window.
    windows: AtomicU64,
}

impl LifecycleController {
    pub fn new(
        platform: Arc<dyn Platform>,
        policy: Arc<AccessPolicy>,
        registry: Arc<TicketRegistry>,
        archive: Arc<dyn ArchiveStore>,
        audit: Arc<AuditTrail>,
        config: Arc<DeskConfig>,
    ) -> Self {
        Self {
            platform,
            policy,
            registry,
            archive,
            audit,
            config,
            renderer: HtmlTranscript::new(),
            windows: AtomicU64::new(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)),
        }
    }

    fn tracked(&self, space: SpaceId) -> Result<Ticket, DeskError> {
        self.registry.get(space).ok_or(DeskError::UnknownTicket(space))
    }

    fn authorize(&self, ticket: &Ticket, actor: &Actor) -> Result<(), DeskError> {
        self.policy
            .authorize_manage(ticket.creator, actor.id, &actor.roles, "close this ticket")
            .map_err(|e| {
                self.audit.record(
                    AuditEvent::new(actor.id.to_string(), AuditAction::PermissionDenied)
                        .with_target(target(ticket))
                        .with_metadata(json!({ "operation": "close" })),
                );
                e.into()
            })
    }

    /// Open → PendingClose. Opens a confirmation window and schedules its
    /// expiry.
    pub fn request_close(self: &Arc<Self>, space: SpaceId, actor: &Actor) -> Result<CloseWindow, DeskError> {
        let ticket = self.tracked(space)?;
        self.authorize(&ticket, actor)?;

        let window = self.windows.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = self.config.confirm_timeout();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(30));

        self.registry.update(space, |t| {
            t.transition(TicketState::PendingClose {
                requested_by: actor.id,
                window,
                expires_at,
                confirmed_by: None,
            })
        })?;

        tracing::info!(ticket = %ticket.name, window, "close requested by {}", actor.display_name);
        self.audit.note(actor.id, AuditAction::CloseRequested, target(&ticket));

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            this.expire(space, window);
        });

        Ok(CloseWindow { window, expires_at })
    }

    /// Reopen tickets left pending by a previous run; their expiry timers
    /// died with it. Returns how many were reopened.
    pub fn reopen_stale(&self) -> usize {
        let mut reopened = 0;
        for ticket in self.registry.list() {
            if !matches!(ticket.state, TicketState::PendingClose { .. }) {
                continue;
            }
            match self.registry.update(ticket.space, |t| t.transition(TicketState::Open)) {
                Ok(()) => {
                    tracing::info!(ticket = %ticket.name, "pending close from a previous run reopened");
                    self.audit.note(SYSTEM_ACTOR, AuditAction::CloseExpired, target(&ticket));
                    reopened += 1;
                }
                Err(e) => tracing::warn!(ticket = %ticket.name, "could not reopen: {}", e),
            }
        }
        reopened
    }

    /// PendingClose → Open when `window` runs out unanswered.
    ///
    /// Returns whether this call reverted the ticket. A window that was
    /// already confirmed, cancelled or superseded is left alone.
    pub fn expire(&self, space: SpaceId, window: u64) -> bool {
        match self.revert_window(space, Some(window)) {
            Ok(Some(ticket)) => {
                tracing::info!(ticket = %ticket.name, window, "close confirmation timed out");
                self.audit.note(SYSTEM_ACTOR, AuditAction::CloseExpired, target(&ticket));
                true
            }
            Ok(None) => {
                tracing::debug!(%space, window, "expiry for a resolved window ignored");
                false
            }
            Err(e) => {
                tracing::debug!(%space, window, "expiry skipped: {}", e);
                false
            }
        }
    }

    /// PendingClose → Open on request. `Ok(false)` if the window was already
    /// resolved.
    pub fn cancel(&self, space: SpaceId, actor: &Actor, window: Option<u64>) -> Result<bool, DeskError> {
        let ticket = self.tracked(space)?;
        self.authorize(&ticket, actor)?;

        match self.revert_window(space, window)? {
            Some(ticket) => {
                tracing::info!(ticket = %ticket.name, "close cancelled by {}", actor.display_name);
                self.audit.note(actor.id, AuditAction::CloseCancelled, target(&ticket));
                Ok(true)
            }
            None => {
                tracing::debug!(ticket = %ticket.name, "cancel for a resolved window ignored");
                Ok(false)
            }
        }
    }

    /// Atomically move an open, unclaimed window back to Open.
    fn revert_window(&self, space: SpaceId, window: Option<u64>) -> Result<Option<Ticket>, TicketError> {
        self.registry.update(space, |t| {
            if !t.window_is_open(window) {
                return Ok(None);
            }
            t.transition(TicketState::Open)?;
            Ok(Some(t.clone()))
        })
    }

    /// PendingClose → Closed: archive the transcript, then tear down.
    pub async fn confirm(
        self: &Arc<Self>,
        space: SpaceId,
        actor: &Actor,
        window: Option<u64>,
    ) -> Result<CloseOutcome, DeskError> {
        let ticket = self.tracked(space)?;
        self.authorize(&ticket, actor)?;

        if self.config.require_same_actor {
            if let TicketState::PendingClose { requested_by, .. } = ticket.state {
                if requested_by != actor.id {
                    return Err(DeskError::PermissionDenied {
                        reason: "only the member who requested the close can confirm it".into(),
                    });
                }
            }
        }

        // From here on the window is ours: expiry and cancel are no-ops.
        self.registry.update(space, |t| t.claim_window(window, actor.id))?;
        tracing::info!(ticket = %ticket.name, "close confirmed by {}", actor.display_name);
        self.audit.note(actor.id, AuditAction::CloseConfirmed, target(&ticket));

        let receipt = match self.archive_with_policy(&ticket, actor).await {
            Ok(receipt) => Some(receipt),
            Err(e) if self.config.strict_archival.enabled => {
                self.keep_open_after_failed_archive(&ticket, &e).await?;
                return Err(DeskError::KeptOpen {
                    ticket: ticket.name.clone(),
                    source: e,
                });
            }
            Err(e) => {
                tracing::error!(
                    ticket = %ticket.name,
                    "transcript not archived, closing anyway: {}",
                    e
                );
                None
            }
        };

        let closed = self.registry.update(space, |t| {
            t.transition(TicketState::Closed { closed_by: actor.id })?;
            Ok(t.clone())
        })?;

        if let Some(message) = ticket.control_message {
            if let Err(e) = self.platform.disable_controls(space, message).await {
                tracing::warn!(ticket = %ticket.name, "could not disable close control: {}", e);
            }
        }

        let grace = self.config.teardown_grace();
        let notice = format!(
            "Ticket closed. This channel will be deleted in {} seconds.",
            grace.as_secs()
        );
        if let Err(e) = self.platform.post(space, OutboundMessage::text(notice)).await {
            tracing::warn!(ticket = %ticket.name, "could not post closing notice: {}", e);
        }

        let closer = actor.id.to_string();
        if grace.is_zero() {
            // Nothing to wait for: a failed delete reaches the actor directly.
            self.teardown(&closed, &closer).await?;
        } else {
            let this = Arc::clone(self);
            let pending = closed.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                // Failures are logged and alerted inside teardown.
                let _ = this.teardown(&pending, &closer).await;
            });
        }

        Ok(CloseOutcome {
            ticket: closed,
            receipt,
        })
    }

    /// Any live state → Cancelled, then tear the space down without an
    /// archive. Used when seeding a new space fails or the space vanished.
    pub async fn abandon(&self, space: SpaceId, reason: &str) -> Result<(), DeskError> {
        let ticket = match self.registry.update(space, |t| {
            t.transition(TicketState::Cancelled {
                reason: reason.to_string(),
            })?;
            Ok(t.clone())
        }) {
            Ok(ticket) => ticket,
            Err(TicketError::NotFound(_)) => {
                tracing::debug!(%space, "abandon for an untracked space ignored");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::warn!(ticket = %ticket.name, "ticket abandoned: {}", reason);
        self.audit.record(
            AuditEvent::new(SYSTEM_ACTOR, AuditAction::TicketAbandoned)
                .with_target(target(&ticket))
                .with_metadata(json!({ "reason": reason })),
        );
        self.teardown(&ticket, SYSTEM_ACTOR).await
    }

    /// Delete the space of a closed or abandoned ticket whose earlier
    /// teardown failed.
    pub async fn retry_teardown(&self, space: SpaceId, actor: &Actor) -> Result<Ticket, DeskError> {
        let ticket = self.tracked(space)?;
        if !ticket.state.is_terminal() {
            return Err(DeskError::Ticket(TicketError::InvalidTransition {
                ticket: ticket.name.clone(),
                from: ticket.state.to_string(),
                to: "deleted".to_string(),
            }));
        }
        self.authorize(&ticket, actor)?;

        tracing::info!(ticket = %ticket.name, "teardown retried by {}", actor.display_name);
        self.teardown(&ticket, &actor.id.to_string()).await?;
        Ok(ticket)
    }

    /// Delete the space and stop tracking the ticket. Deleting a space that
    /// is already gone is a no-op. If the delete fails the ticket stays
    /// tracked and the space gets a control to retry.
    async fn teardown(&self, ticket: &Ticket, actor: &str) -> Result<(), DeskError> {
        match self.platform.delete_space(ticket.space).await {
            Ok(()) => {
                tracing::info!(ticket = %ticket.name, "space deleted");
                self.audit.note(actor, AuditAction::SpaceDeleted, target(ticket));
            }
            Err(PlatformError::NotFound(_)) => {
                tracing::debug!(ticket = %ticket.name, "space already gone");
            }
            Err(e) => {
                tracing::error!(ticket = %ticket.name, "space could not be deleted, kept for retry: {}", e);
                self.post_teardown_alert(ticket).await;
                return Err(DeskError::Teardown {
                    ticket: ticket.name.clone(),
                    source: e,
                });
            }
        }
        self.registry.remove(ticket.space);
        Ok(())
    }

    async fn post_teardown_alert(&self, ticket: &Ticket) {
        let staff = self
            .policy
            .staff_role()
            .map(|role| format!("{} ", mention_role(role)))
            .unwrap_or_default();
        let alert = OutboundMessage::text(format!(
            "{}This channel could not be deleted. Press the button below to try again.",
            staff
        ))
        .with_control(Control::button(
            ActionToken::CloseRequest {
                creator: ticket.creator,
            },
            "Delete Channel",
            ControlStyle::Danger,
        ));
        if let Err(e) = self.platform.post(ticket.space, alert).await {
            tracing::warn!(ticket = %ticket.name, "could not post teardown alert: {}", e);
        }
    }

    /// Render and store the transcript. In strict mode, retry up to the
    /// configured number of attempts.
    async fn archive_with_policy(&self, ticket: &Ticket, closer: &Actor) -> Result<ArchiveReceipt, ArchivalError> {
        let strict = &self.config.strict_archival;
        let attempts = if strict.enabled { strict.max_attempts.max(1) } else { 1 };

        let mut attempt = 1;
        loop {
            match self.archive_once(ticket, closer).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        ticket = %ticket.name,
                        attempt,
                        attempts,
                        "archival attempt failed, retrying: {}",
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(strict.retry_delay_ms)).await;
                }
                Err(e) => {
                    self.audit.record(
                        AuditEvent::new(closer.id.to_string(), AuditAction::ArchiveFailed)
                            .with_target(target(ticket))
                            .with_metadata(json!({ "attempts": attempt, "error": e.to_string() })),
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn archive_once(&self, ticket: &Ticket, closer: &Actor) -> Result<ArchiveReceipt, ArchivalError> {
        let history = self.platform.history(ticket.space).await.map_err(|e| {
            ArchivalError::Unavailable(format!("could not read history of {}: {}", ticket.name, e))
        })?;
        let heading = match ticket.kind {
            TicketKind::Support => format!("Support Ticket Transcript - {}", ticket.name),
            _ => format!("Transcript for #{}", ticket.name),
        };
        let rendered_at = Utc::now();
        let server_name = self.platform.server_name();
        let content = self.renderer.render(&RenderContext {
            conversation_name: &ticket.name,
            server_name: &server_name,
            heading: &heading,
            generated_at: rendered_at,
            messages: &history,
        });

        let artifact = TranscriptArtifact::new(
            ArchiveKey::new(ticket.kind.scope(), ticket.number),
            ticket.name.clone(),
            Some(closer.display_name.clone()),
            rendered_at,
            content,
        );

        let (receipt, artifact) = match self.archive.save(&artifact).await {
            Ok(receipt) => (receipt, artifact),
            // A retry after a save whose acknowledgement was lost. It only
            // counts if the stored copy reads back.
            Err(ArchivalError::AlreadyArchived { .. }) => {
                let stored = self.archive.get(&artifact.key).await?;
                tracing::warn!(ticket = %ticket.name, "transcript was already archived");
                let receipt = ArchiveReceipt {
                    key: stored.key.clone(),
                    content_sha256: stored.content_sha256.clone(),
                    store: self.archive.name().to_string(),
                };
                (receipt, stored)
            }
            Err(e) => return Err(e),
        };

        tracing::info!(ticket = %ticket.name, store = %receipt.store, "transcript archived");
        self.audit.record(
            AuditEvent::new(closer.id.to_string(), AuditAction::TranscriptArchived)
                .with_target(target(ticket))
                .with_output_hash(receipt.content_sha256.clone())
                .with_metadata(json!({ "store": receipt.store })),
        );
        self.post_closure_log(ticket, closer, &artifact).await;
        Ok(receipt)
    }

    /// Closure entry in the kind's log channel, with the transcript attached.
    async fn post_closure_log(&self, ticket: &Ticket, closer: &Actor, artifact: &TranscriptArtifact) {
        let Some(channel) = self.config.kind(ticket.kind).log_channel else {
            return;
        };
        let embed = Embed::titled(format!("{} Closed", ticket.kind.label()))
            .with_field("Channel", ticket.name.clone())
            .with_field("Closed By", closer.display_name.clone());
        let message = OutboundMessage::embed(embed).with_file(
            format!("transcript-{}.html", ticket.name),
            artifact.content.clone(),
        );
        if let Err(e) = self.platform.post(channel, message).await {
            tracing::warn!(ticket = %ticket.name, "could not post closure log entry: {}", e);
        }
    }

    /// Strict mode: the archive could not be written, so the ticket stays
    /// open with its messages and staff are told.
    async fn keep_open_after_failed_archive(&self, ticket: &Ticket, error: &ArchivalError) -> Result<(), DeskError> {
        self.registry
            .update(ticket.space, |t| t.transition(TicketState::Open))?;
        tracing::error!(
            ticket = %ticket.name,
            "transcript could not be archived, ticket kept open: {}",
            error
        );

        let staff = self
            .policy
            .staff_role()
            .map(|role| format!("{} ", mention_role(role)))
            .unwrap_or_default();
        let alert = format!(
            "{}The transcript for this ticket could not be archived, so it was not closed. \
             Please try closing it again later.",
            staff
        );
        if let Err(e) = self.platform.post(ticket.space, OutboundMessage::text(alert)).await {
            tracing::warn!(ticket = %ticket.name, "could not alert staff: {}", e);
        }
        Ok(())
    }
}

/// Audit target for a ticket: "{scope}/{number}".
fn target(ticket: &Ticket) -> String {
    format!("{}/{}", ticket.kind.scope(), ticket.number)
}
