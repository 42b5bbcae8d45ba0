//! Database module
//!
//! Provides persistence for conversations and their joules.

mod schema;

pub use schema::*;

use crate::conversation::{Conversation, ConversationBase, SequenceError};
use crate::joule::{Joule, JouleState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Conversation already exists: {0}")]
    ConversationExists(String),
    #[error("Stored history of conversation {id} is invalid: {source}")]
    CorruptHistory {
        id: String,
        #[source]
        source: SequenceError,
    },
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new, empty conversation
    pub fn create_conversation(
        &self,
        id: &str,
        base: &ConversationBase,
    ) -> DbResult<ConversationRecord> {
        let conn = self.conn()?;
        let now = Utc::now();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(DbError::ConversationExists(id.to_string()));
        }

        conn.execute(
            "INSERT INTO conversations (id, system_prompt, codebase_view, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                id,
                base.system_prompt,
                serde_json::to_string(&base.codebase_view)?,
                now.to_rfc3339(),
            ],
        )?;

        Ok(ConversationRecord {
            id: id.to_string(),
            base: base.clone(),
            created_at: now,
            updated_at: now,
            joule_count: 0,
        })
    }

    /// Get conversation by ID
    pub fn get_conversation(&self, id: &str) -> DbResult<ConversationRecord> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.system_prompt, c.codebase_view, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM joules j WHERE j.conversation_id = c.id) as joule_count
             FROM conversations c WHERE c.id = ?1",
        )?;

        let row = stmt
            .query_row(params![id], read_conversation_row)
            .optional()?
            .ok_or_else(|| DbError::ConversationNotFound(id.to_string()))?;
        row.into_record()
    }

    /// List all conversations, most recently updated first
    pub fn list_conversations(&self) -> DbResult<Vec<ConversationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.system_prompt, c.codebase_view, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM joules j WHERE j.conversation_id = c.id) as joule_count
             FROM conversations c
             ORDER BY c.updated_at DESC",
        )?;

        let rows = stmt.query_map([], read_conversation_row)?;
        rows.map(|row| row.map_err(DbError::from).and_then(RawConversation::into_record))
            .collect()
    }

    /// Delete a conversation and all its joules
    pub fn delete_conversation(&self, id: &str) -> DbResult<()> {
        let conn = self.conn()?;

        // Joules are deleted by CASCADE
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;

        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Load a conversation and validate its history against the transition engine
    pub fn load_conversation(&self, id: &str) -> DbResult<Conversation> {
        let record = self.get_conversation(id)?;
        let joules = self.get_joules(id)?;
        Conversation::restore(record.base, joules).map_err(|source| DbError::CorruptHistory {
            id: id.to_string(),
            source,
        })
    }

    // ==================== Joule Operations ====================

    /// Store a joule at a position of the conversation.
    ///
    /// Writing to an occupied position replaces it, which is how a partial
    /// tail gets updated in place.
    pub fn put_joule(&self, conversation_id: &str, position: usize, joule: &Joule) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now();
        let content = serde_json::to_string(joule)?;

        let updated = conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), conversation_id],
        )?;
        if updated == 0 {
            return Err(DbError::ConversationNotFound(conversation_id.to_string()));
        }

        conn.execute(
            "INSERT INTO joules (joule_id, conversation_id, sequence_id, joule_type, joule_state, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(conversation_id, sequence_id) DO UPDATE SET
                joule_id = excluded.joule_id,
                joule_type = excluded.joule_type,
                joule_state = excluded.joule_state,
                content = excluded.content",
            params![
                joule.id().as_str(),
                conversation_id,
                sql_index(position),
                joule.joule_type().as_str(),
                joule.state().as_str(),
                content,
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete every joule at or after `len`. Returns the number of deleted joules.
    pub fn truncate_joules(&self, conversation_id: &str, len: usize) -> DbResult<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM joules WHERE conversation_id = ?1 AND sequence_id >= ?2",
            params![conversation_id, sql_index(len)],
        )?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), conversation_id],
        )?;
        Ok(deleted)
    }

    /// Get the joules of a conversation in insertion order
    pub fn get_joules(&self, conversation_id: &str) -> DbResult<Vec<Joule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT content FROM joules WHERE conversation_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], |row| row.get::<_, String>(0))?;
        rows.map(|content| -> DbResult<Joule> { Ok(serde_json::from_str(&content?)?) })
            .collect()
    }

    /// Settle every partial joule as `Error`.
    ///
    /// A partial joule found at startup belongs to a bot turn that was
    /// interrupted by a restart; it is kept as a failed turn so the
    /// conversation can continue from it.
    pub fn settle_partial_joules(&self) -> DbResult<usize> {
        let conn = self.conn()?;

        let partials: Vec<(String, i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, sequence_id, content FROM joules WHERE joule_state = ?1",
            )?;
            let rows = stmt.query_map(params![JouleState::Partial.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        for (conv_id, sequence_id, content) in &partials {
            let joule: Joule = serde_json::from_str(content)?;
            let settled = joule.with_state(JouleState::Error);

            conn.execute(
                "UPDATE joules SET joule_state = ?1, content = ?2
                 WHERE conversation_id = ?3 AND sequence_id = ?4",
                params![
                    settled.state().as_str(),
                    serde_json::to_string(&settled)?,
                    conv_id,
                    sequence_id,
                ],
            )?;

            tracing::info!(
                conv_id = %conv_id,
                joule_id = %settled.id(),
                "Settled interrupted partial joule as error"
            );
        }

        Ok(partials.len())
    }
}

// Helper types and functions

struct RawConversation {
    id: String,
    system_prompt: String,
    codebase_view: String,
    created_at: String,
    updated_at: String,
    joule_count: i64,
}

impl RawConversation {
    fn into_record(self) -> DbResult<ConversationRecord> {
        Ok(ConversationRecord {
            id: self.id,
            base: ConversationBase {
                system_prompt: self.system_prompt,
                codebase_view: serde_json::from_str(&self.codebase_view)?,
            },
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
            joule_count: self.joule_count,
        })
    }
}

fn read_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawConversation> {
    Ok(RawConversation {
        id: row.get(0)?,
        system_prompt: row.get(1)?,
        codebase_view: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        joule_count: row.get(5)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn sql_index(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}
