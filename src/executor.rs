//! Action executor: applies one action to one message, remote first

use tracing::{debug, warn};

use crate::client::MailboxClient;
use crate::error::{ActionFailure, GmailError, Result};
use crate::mirror::Mirror;
use crate::models::{EmailRecord, Mailbox};
use crate::rules::Action;

/// Result of applying a single action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The remote mailbox accepted the change and the mirror was updated
    Applied,
    /// Nothing to do; the message was already where it was asked to go
    Unchanged,
    Failed(ActionFailure),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ActionOutcome::Failed(_))
    }
}

/// Applies actions against the remote mailbox and keeps the mirror in step.
///
/// The remote call always happens first. The mirror is only written once the
/// remote side confirms, so a failed call leaves it untouched.
pub struct ActionExecutor<'a> {
    client: &'a dyn MailboxClient,
    mirror: &'a mut Mirror,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(client: &'a dyn MailboxClient, mirror: &'a mut Mirror) -> Self {
        Self { client, mirror }
    }

    /// Apply `action` to message `id`.
    ///
    /// Per-message problems come back as [`ActionOutcome::Failed`]. An `Err`
    /// means the mirror itself is unusable, including
    /// [`GmailError::MirrorDiverged`] when the remote change went through but
    /// the local write did not.
    pub async fn apply(&mut self, id: &str, action: Action) -> Result<ActionOutcome> {
        let Some(record) = self.mirror.get(id)? else {
            return Ok(ActionOutcome::Failed(ActionFailure::NotFound));
        };

        match action {
            Action::MarkRead => self.set_read(&record, true).await,
            Action::MarkUnread => self.set_read(&record, false).await,
            Action::MoveTo(destination) => self.move_to(&record, destination).await,
        }
    }

    async fn set_read(&mut self, record: &EmailRecord, read: bool) -> Result<ActionOutcome> {
        if let Err(e) = self.client.set_read_state(&record.id, read).await {
            return Ok(transport_failure(&record.id, e));
        }

        self.mirror
            .set_read(&record.id, read)
            .map_err(|e| diverged(&record.id, e))?;

        debug!("Set read={} on {}", read, record.id);
        Ok(ActionOutcome::Applied)
    }

    async fn move_to(&mut self, record: &EmailRecord, destination: Mailbox) -> Result<ActionOutcome> {
        let current = record.mailbox;
        if current == destination {
            return Ok(ActionOutcome::Unchanged);
        }
        if !current.can_move_to(destination) {
            debug!("Refusing to move {} from {} to {}", record.id, current, destination);
            return Ok(ActionOutcome::Failed(ActionFailure::IllegalTransition {
                from: current,
                to: destination,
            }));
        }

        let remote = match destination {
            Mailbox::Trash => self.client.trash(&record.id).await,
            _ => {
                self.client
                    .relabel(
                        &record.id,
                        &[destination.label().to_string()],
                        &[current.label().to_string()],
                    )
                    .await
            }
        };
        if let Err(e) = remote {
            return Ok(transport_failure(&record.id, e));
        }

        self.mirror
            .set_mailbox(&record.id, destination)
            .map_err(|e| diverged(&record.id, e))?;

        debug!("Moved {} from {} to {}", record.id, current, destination);
        Ok(ActionOutcome::Applied)
    }
}

fn transport_failure(id: &str, error: GmailError) -> ActionOutcome {
    warn!("Remote call for {} failed: {}", id, error);
    ActionOutcome::Failed(ActionFailure::Transport(error.to_string()))
}

fn diverged(id: &str, error: GmailError) -> GmailError {
    GmailError::MirrorDiverged {
        message_id: id.to_string(),
        reason: error.to_string(),
    }
}
