//! Database schema and record types

use crate::conversation::ConversationBase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    system_prompt TEXT NOT NULL,
    codebase_view TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC);

CREATE TABLE IF NOT EXISTS joules (
    joule_id TEXT NOT NULL UNIQUE,
    conversation_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    joule_type TEXT NOT NULL,
    joule_state TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (conversation_id, sequence_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_joules_state ON joules(joule_state);
";

/// Conversation record, without its joules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub base: ConversationBase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub joule_count: i64,
}
