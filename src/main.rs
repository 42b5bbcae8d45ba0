//! Joule engine - conversation turn sequencer
//!
//! Opens the conversation store, recovers interrupted bot joules and reports
//! where every stored conversation stands.

use joule_engine::config::EngineConfig;
use joule_engine::db::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "joule_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = EngineConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // A bot joule interrupted by a crash counts as cancelled
    let settled = db.settle_partial_joules()?;
    if settled > 0 {
        tracing::warn!(settled, "Settled interrupted bot joules as errors");
    }

    let records = db.list_conversations()?;
    tracing::info!(count = records.len(), "Restoring conversations");

    for record in records {
        match db.load_conversation(&record.id) {
            Ok(conversation) => tracing::info!(
                conv_id = %record.id,
                joules = conversation.len(),
                expected_next = %conversation.expected_next_type(),
                "Conversation restored"
            ),
            Err(e) => tracing::error!(
                conv_id = %record.id,
                error = %e,
                "Conversation history is corrupt"
            ),
        }
    }

    Ok(())
}
