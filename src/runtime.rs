//! Runtime for conversation sessions
//!
//! Every conversation has exactly one session actor that owns its history.
//! Writers queue commands on the session's channel; readers see atomic
//! snapshots published after each committed write.

mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::config::EngineConfig;
use crate::conversation::{Appended, Conversation, ConversationBase, SequenceError};
use crate::joule::{Joule, JouleId, JouleType};
use session::{ConversationSession, SessionCommand};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Conversation session is closed")]
    Closed,
}

/// Outcome of a committed write.
///
/// `expected_next` is read from the state this write produced, not from a later
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    pub value: T,
    pub expected_next: JouleType,
}

/// Handle to interact with a running conversation session
#[derive(Clone)]
pub struct SessionHandle {
    conversation_id: Arc<str>,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<Arc<Conversation>>,
}

impl SessionHandle {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Append a joule. Queued behind any in-flight write on this conversation.
    pub async fn append(&self, joule: Joule) -> Result<Applied<Appended>, SessionError> {
        self.request(|reply| SessionCommand::Append { joule, reply })
            .await
    }

    /// Truncate history after `to`, keeping `to` itself
    pub async fn rollback(&self, to: JouleId) -> Result<Applied<usize>, SessionError> {
        self.request(|reply| SessionCommand::Rollback { to, reply })
            .await
    }

    /// Settle an in-flight bot joule as `Error`
    pub async fn cancel_partial(&self) -> Result<Applied<Option<Joule>>, SessionError> {
        self.request(|reply| SessionCommand::CancelPartial { reply })
            .await
    }

    /// Latest committed state, without waiting for in-flight writes
    pub fn snapshot(&self) -> Arc<Conversation> {
        Arc::clone(&self.snapshot_rx.borrow())
    }

    pub fn expected_next_type(&self) -> JouleType {
        self.snapshot_rx.borrow().expected_next_type()
    }

    pub fn last_complete_joule(&self) -> Option<Joule> {
        self.snapshot_rx.borrow().last_complete_joule().cloned()
    }

    /// Stream of snapshots, starting with the current one
    pub fn updates(&self) -> WatchStream<Arc<Conversation>> {
        WatchStream::new(self.snapshot_rx.clone())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Manager for all conversation sessions
pub struct SessionManager<S>
where
    S: JouleStore + Clone + 'static,
{
    store: S,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    command_buffer: usize,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<S> SessionManager<S>
where
    S: JouleStore + Clone + 'static,
{
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            command_buffer: config.command_buffer.max(1),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Create an empty conversation and start its session
    pub async fn create(
        &self,
        conversation_id: &str,
        base: &ConversationBase,
    ) -> Result<SessionHandle, SessionError> {
        self.store
            .create(conversation_id, base)
            .await
            .map_err(SessionError::Storage)?;
        tracing::info!(conv_id = %conversation_id, "Created conversation");
        self.get_or_create(conversation_id).await
    }

    /// Get the session for a conversation, starting it from storage if needed
    pub async fn get_or_create(&self, conversation_id: &str) -> Result<SessionHandle, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Closed);
        }

        // Check if already running
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(conversation_id) {
                if !handle.is_closed() {
                    return Ok(handle.clone());
                }
            }
        }

        // Re-check under the write lock so two callers never start two owners
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(conversation_id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }

        let conversation = self
            .store
            .load(conversation_id)
            .await
            .map_err(SessionError::Storage)?;
        let conversation = Arc::new(conversation);

        let (command_tx, command_rx) = mpsc::channel(self.command_buffer);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::clone(&conversation));

        let session = ConversationSession::new(
            conversation_id.to_string(),
            conversation,
            self.store.clone(),
            command_rx,
            snapshot_tx,
            self.shutdown.child_token(),
        );
        self.tasks.spawn(session.run());

        let handle = SessionHandle {
            conversation_id: Arc::from(conversation_id),
            command_tx,
            snapshot_rx,
        };
        sessions.insert(conversation_id.to_string(), handle.clone());

        Ok(handle)
    }

    /// Stop every session and wait for them to settle partial joules
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.sessions.write().await.clear();
        tracing::info!("All conversation sessions stopped");
    }
}
