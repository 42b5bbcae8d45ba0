//! Mock implementations for testing
//!
//! These mocks enable session testing without real I/O.

use super::traits::JouleStore;
use crate::conversation::{Conversation, ConversationBase};
use crate::joule::Joule;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StoredConversation {
    base: ConversationBase,
    joules: Vec<Joule>,
    loads: usize,
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<String, StoredConversation>,
    fail_writes: bool,
}

/// In-memory joule store with failure injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until reset
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Joules currently stored for a conversation
    pub fn joules(&self, conv_id: &str) -> Vec<Joule> {
        self.state
            .lock()
            .unwrap()
            .conversations
            .get(conv_id)
            .map(|c| c.joules.clone())
            .unwrap_or_default()
    }

    /// How many times a conversation was loaded
    pub fn load_count(&self, conv_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .conversations
            .get(conv_id)
            .map_or(0, |c| c.loads)
    }
}

#[async_trait]
impl JouleStore for MemoryStore {
    async fn create(&self, conv_id: &str, base: &ConversationBase) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if state.conversations.contains_key(conv_id) {
            return Err(format!("Conversation already exists: {conv_id}"));
        }
        state.conversations.insert(
            conv_id.to_string(),
            StoredConversation {
                base: base.clone(),
                ..StoredConversation::default()
            },
        );
        Ok(())
    }

    async fn load(&self, conv_id: &str) -> Result<Conversation, String> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .conversations
            .get_mut(conv_id)
            .ok_or_else(|| format!("Conversation not found: {conv_id}"))?;
        stored.loads += 1;
        Conversation::restore(stored.base.clone(), stored.joules.clone()).map_err(|e| e.to_string())
    }

    async fn put_joule(
        &self,
        conv_id: &str,
        position: usize,
        joule: &Joule,
    ) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err("injected write failure".to_string());
        }
        let stored = state
            .conversations
            .get_mut(conv_id)
            .ok_or_else(|| format!("Conversation not found: {conv_id}"))?;

        if position < stored.joules.len() {
            stored.joules[position] = joule.clone();
        } else if position == stored.joules.len() {
            stored.joules.push(joule.clone());
        } else {
            return Err(format!("Gap in joule positions at {position}"));
        }
        Ok(())
    }

    async fn truncate(&self, conv_id: &str, len: usize) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err("injected write failure".to_string());
        }
        let stored = state
            .conversations
            .get_mut(conv_id)
            .ok_or_else(|| format!("Conversation not found: {conv_id}"))?;
        stored.joules.truncate(len);
        Ok(())
    }
}
