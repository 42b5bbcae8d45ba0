//! Engine configuration

use std::path::PathBuf;

const DEFAULT_COMMAND_BUFFER: usize = 32;

/// Runtime settings, read from the environment at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `SQLite` database holding conversations and joules
    pub db_path: PathBuf,
    /// Pending writes a session queues before senders wait
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("JOULE_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".joule-engine").join("joule.db")
            },
            PathBuf::from,
        );

        let command_buffer = lookup("JOULE_COMMAND_BUFFER")
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(DEFAULT_COMMAND_BUFFER);

        Self {
            db_path,
            command_buffer,
        }
    }
}
