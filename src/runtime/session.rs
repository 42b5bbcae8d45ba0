//! Conversation session actor
//!
//! The only writer of one conversation. Commands are applied one at a time in
//! arrival order; a command is committed in memory only after the store
//! accepted it, then a new snapshot is published to readers.

use super::traits::JouleStore;
use super::{Applied, SessionError};
use crate::conversation::{Appended, Conversation};
use crate::joule::{Joule, JouleId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Write requests sent to a session
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Append {
        joule: Joule,
        reply: oneshot::Sender<Result<Applied<Appended>, SessionError>>,
    },
    Rollback {
        to: JouleId,
        reply: oneshot::Sender<Result<Applied<usize>, SessionError>>,
    },
    CancelPartial {
        reply: oneshot::Sender<Result<Applied<Option<Joule>>, SessionError>>,
    },
}

pub(crate) struct ConversationSession<S>
where
    S: JouleStore + 'static,
{
    conversation_id: String,
    conversation: Arc<Conversation>,
    store: S,
    command_rx: mpsc::Receiver<SessionCommand>,
    snapshot_tx: watch::Sender<Arc<Conversation>>,
    shutdown: CancellationToken,
}

impl<S> ConversationSession<S>
where
    S: JouleStore + 'static,
{
    pub(crate) fn new(
        conversation_id: String,
        conversation: Arc<Conversation>,
        store: S,
        command_rx: mpsc::Receiver<SessionCommand>,
        snapshot_tx: watch::Sender<Arc<Conversation>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conversation_id,
            conversation,
            store,
            command_rx,
            snapshot_tx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(
            conv_id = %self.conversation_id,
            joules = self.conversation.len(),
            "Starting conversation session"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        // An in-flight bot joule must end as an error, never vanish
        if let Err(e) = self.cancel_partial().await {
            tracing::error!(
                conv_id = %self.conversation_id,
                error = %e,
                "Failed to settle partial joule on shutdown"
            );
        }

        tracing::info!(conv_id = %self.conversation_id, "Conversation session stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        // A dropped receiver means the caller gave up waiting; nothing to report
        match command {
            SessionCommand::Append { joule, reply } => {
                let _ = reply.send(self.append(joule).await);
            }
            SessionCommand::Rollback { to, reply } => {
                let _ = reply.send(self.rollback(&to).await);
            }
            SessionCommand::CancelPartial { reply } => {
                let _ = reply.send(self.cancel_partial().await);
            }
        }
    }

    async fn append(&mut self, joule: Joule) -> Result<Applied<Appended>, SessionError> {
        let joule_id = joule.id().clone();
        let mut next = Conversation::clone(&self.conversation);

        let appended = next.append(joule).map_err(|e| {
            tracing::warn!(
                conv_id = %self.conversation_id,
                joule_id = %joule_id,
                error = %e,
                "Rejected joule"
            );
            e
        })?;

        let position = next.len() - 1;
        self.store
            .put_joule(&self.conversation_id, position, &next.joules()[position])
            .await
            .map_err(SessionError::Storage)?;

        tracing::debug!(
            conv_id = %self.conversation_id,
            joule_id = %joule_id,
            ?appended,
            expected_next = %next.expected_next_type(),
            "Committed joule"
        );

        Ok(self.publish(next, appended))
    }

    async fn rollback(&mut self, to: &JouleId) -> Result<Applied<usize>, SessionError> {
        let mut next = Conversation::clone(&self.conversation);
        let removed = next.rollback(to)?;

        self.store
            .truncate(&self.conversation_id, next.len())
            .await
            .map_err(SessionError::Storage)?;

        tracing::info!(
            conv_id = %self.conversation_id,
            joule_id = %to,
            removed,
            "Rolled back conversation"
        );

        Ok(self.publish(next, removed))
    }

    async fn cancel_partial(&mut self) -> Result<Applied<Option<Joule>>, SessionError> {
        let mut next = Conversation::clone(&self.conversation);
        let Some(cancelled) = next.cancel_partial().cloned() else {
            return Ok(Applied {
                value: None,
                expected_next: self.conversation.expected_next_type(),
            });
        };

        let position = next.len() - 1;
        self.store
            .put_joule(&self.conversation_id, position, &cancelled)
            .await
            .map_err(SessionError::Storage)?;

        tracing::info!(
            conv_id = %self.conversation_id,
            joule_id = %cancelled.id(),
            "Cancelled partial joule"
        );

        Ok(self.publish(next, Some(cancelled)))
    }

    /// Commit `conversation` and report the expectation it leaves behind
    fn publish<T>(&mut self, conversation: Conversation, value: T) -> Applied<T> {
        let expected_next = conversation.expected_next_type();
        self.conversation = Arc::new(conversation);
        self.snapshot_tx.send_replace(Arc::clone(&self.conversation));
        Applied {
            value,
            expected_next,
        }
    }
}
