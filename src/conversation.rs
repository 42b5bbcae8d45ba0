//! Conversation sequencer
//!
//! Owns the ordered joule history of one conversation and gates every append
//! through the transition engine.

use crate::joule::{Joule, JouleId, JouleState, JouleType};
use crate::state_machine::next_joule_type;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the sequencer. None of them mutate the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("Protocol violation: expected {expected}, got {actual}")]
    ProtocolViolation {
        expected: JouleType,
        actual: JouleType,
    },
    #[error("Joule not found: {0}")]
    NotFound(JouleId),
    #[error("Joule {id} is still partial, only an update of it can be appended")]
    PartialPending { id: JouleId },
    #[error("Duplicate joule id: {0}")]
    DuplicateId(JouleId),
}

/// Snapshot of the codebase the conversation was started against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodebaseView {
    pub view: String,
    pub all_contents_included: bool,
    pub included_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub commit: Option<String>,
}

/// Fixed prefix of every model prompt in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConversationBase {
    pub system_prompt: String,
    pub codebase_view: CodebaseView,
}

/// What a successful append did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// The joule became the new tail
    Pushed,
    /// The joule replaced a partial tail with the same id
    Replaced,
}

/// Ordered, append-only joule history plus its immutable base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "UncheckedConversation")]
pub struct Conversation {
    base: ConversationBase,
    joules: Vec<Joule>,
}

/// Wire form of a conversation before its history is replayed
#[derive(Deserialize)]
struct UncheckedConversation {
    base: ConversationBase,
    joules: Vec<Joule>,
}

impl TryFrom<UncheckedConversation> for Conversation {
    type Error = SequenceError;

    fn try_from(raw: UncheckedConversation) -> Result<Self, Self::Error> {
        Conversation::restore(raw.base, raw.joules)
    }
}

impl Conversation {
    pub fn new(base: ConversationBase) -> Self {
        Self {
            base,
            joules: Vec::new(),
        }
    }

    /// Rebuild a conversation from stored joules, replaying each through `append`.
    pub fn restore(
        base: ConversationBase,
        joules: impl IntoIterator<Item = Joule>,
    ) -> Result<Self, SequenceError> {
        let mut conversation = Self::new(base);
        for joule in joules {
            conversation.append(joule)?;
        }
        Ok(conversation)
    }

    pub fn base(&self) -> &ConversationBase {
        &self.base
    }

    pub fn joules(&self) -> &[Joule] {
        &self.joules
    }

    pub fn len(&self) -> usize {
        self.joules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joules.is_empty()
    }

    pub fn get(&self, id: &JouleId) -> Option<&Joule> {
        self.joules.iter().find(|j| j.id() == id)
    }

    /// The provisional tail, if a joule is still being produced
    pub fn partial_tail(&self) -> Option<&Joule> {
        self.joules.last().filter(|j| j.is_partial())
    }

    /// Most recent joule that is no longer partial
    pub fn last_complete_joule(&self) -> Option<&Joule> {
        self.joules.iter().rev().find(|j| !j.is_partial())
    }

    /// The joule type `append` currently requires
    pub fn expected_next_type(&self) -> JouleType {
        let last = self.joules.iter().rev().find_map(Joule::settled);
        next_joule_type(last)
    }

    /// Append a joule, or replace the partial tail it updates.
    pub fn append(&mut self, candidate: Joule) -> Result<Appended, SequenceError> {
        let expected = self.expected_next_type();
        let actual = candidate.joule_type();
        if actual != expected {
            return Err(SequenceError::ProtocolViolation { expected, actual });
        }

        if let Some(tail) = self.partial_tail() {
            if tail.id() != candidate.id() {
                return Err(SequenceError::PartialPending {
                    id: tail.id().clone(),
                });
            }
            let last = self.joules.len() - 1;
            self.joules[last] = candidate;
            return Ok(Appended::Replaced);
        }

        if self.get(candidate.id()).is_some() {
            return Err(SequenceError::DuplicateId(candidate.id().clone()));
        }

        self.joules.push(candidate);
        Ok(Appended::Pushed)
    }

    /// Truncate history after `to`, keeping `to` itself.
    ///
    /// Returns the number of discarded joules.
    pub fn rollback(&mut self, to: &JouleId) -> Result<usize, SequenceError> {
        let position = self
            .joules
            .iter()
            .position(|j| j.id() == to)
            .ok_or_else(|| SequenceError::NotFound(to.clone()))?;

        let removed = self.joules.len() - position - 1;
        self.joules.truncate(position + 1);
        Ok(removed)
    }

    /// Settle a partial tail as `Error`. Cancelled joules are kept, never dropped.
    pub fn cancel_partial(&mut self) -> Option<&Joule> {
        let tail = self.joules.last_mut().filter(|j| j.is_partial())?;
        *tail = tail.clone().with_state(JouleState::Error);
        Some(&*tail)
    }
}
