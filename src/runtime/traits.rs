//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the session actor with mock implementations.

use crate::conversation::{Conversation, ConversationBase};
use crate::db::Database;
use crate::joule::Joule;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for conversation history
#[async_trait]
pub trait JouleStore: Send + Sync {
    /// Create an empty conversation
    async fn create(&self, conv_id: &str, base: &ConversationBase) -> Result<(), String>;

    /// Load a conversation with its full, validated history
    async fn load(&self, conv_id: &str) -> Result<Conversation, String>;

    /// Write a joule at a position, replacing whatever is stored there
    async fn put_joule(&self, conv_id: &str, position: usize, joule: &Joule)
        -> Result<(), String>;

    /// Drop every joule at or after `len`
    async fn truncate(&self, conv_id: &str, len: usize) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: JouleStore + ?Sized> JouleStore for Arc<T> {
    async fn create(&self, conv_id: &str, base: &ConversationBase) -> Result<(), String> {
        (**self).create(conv_id, base).await
    }

    async fn load(&self, conv_id: &str) -> Result<Conversation, String> {
        (**self).load(conv_id).await
    }

    async fn put_joule(
        &self,
        conv_id: &str,
        position: usize,
        joule: &Joule,
    ) -> Result<(), String> {
        (**self).put_joule(conv_id, position, joule).await
    }

    async fn truncate(&self, conv_id: &str, len: usize) -> Result<(), String> {
        (**self).truncate(conv_id, len).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `JouleStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JouleStore for DatabaseStorage {
    async fn create(&self, conv_id: &str, base: &ConversationBase) -> Result<(), String> {
        self.db
            .create_conversation(conv_id, base)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn load(&self, conv_id: &str) -> Result<Conversation, String> {
        self.db.load_conversation(conv_id).map_err(|e| e.to_string())
    }

    async fn put_joule(
        &self,
        conv_id: &str,
        position: usize,
        joule: &Joule,
    ) -> Result<(), String> {
        self.db
            .put_joule(conv_id, position, joule)
            .map_err(|e| e.to_string())
    }

    async fn truncate(&self, conv_id: &str, len: usize) -> Result<(), String> {
        self.db
            .truncate_joules(conv_id, len)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
