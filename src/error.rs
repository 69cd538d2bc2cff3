//! Error types for the reconciliation core.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for reconciliation operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Analytics store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Compensation journal is corrupt: {0}")]
    JournalCorrupt(String),

    #[error("Invalid journal format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Intent not found: {0}")]
    IntentNotFound(String),

    #[error("Card {card_id} not found in deck {}", deck_path.display())]
    CardNotFound { deck_path: PathBuf, card_id: String },

    #[error("Deck read failed for {}: {message}", path.display())]
    DeckRead { path: PathBuf, message: String },

    #[error("Analytics store unavailable: {0}")]
    AnalyticsUnavailable(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;
