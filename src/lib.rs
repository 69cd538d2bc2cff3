//! # Retrace
//!
//! Crash-safe reconciliation of spaced-repetition review history across two
//! independently-failing stores: the authoritative per-deck documents and a
//! SQLite analytics database.
//!
//! ## Core Concepts
//!
//! - **Fingerprint**: deterministic string snapshot of a card's scheduling
//!   fields, compared by exact equality
//! - **Compensation intents**: durable, atomically-rewritten journal of
//!   undos whose analytics write is not yet confirmed
//! - **Replay**: startup + periodic reconciliation pass driving every
//!   pending intent to `completed` or `conflict`
//! - **Coordinator**: per-deck mutual exclusion shared by live edits and
//!   replay
//!
//! ## Example
//!
//! ```ignore
//! use retrace::{open_or_noop, DeckWriteCoordinator, ReviewSync};
//! use std::sync::Arc;
//!
//! let analytics = open_or_noop("analytics.db", workspace_root, "journal.json");
//! let sync = ReviewSync::new(decks, analytics, Arc::new(DeckWriteCoordinator::new()));
//!
//! let entry_id = sync.record_review(&event)?;
//! sync.undo_review(&event, entry_id.unwrap())?;
//!
//! // Startup + periodic reconciliation.
//! let scheduler = sync.start_scheduler(retrace::DEFAULT_REPLAY_INTERVAL);
//! ```

pub mod analytics;
pub mod coordinator;
pub mod deck;
pub mod error;
pub mod fingerprint;
pub mod journal;
pub mod replay;
pub mod sync;
pub mod types;

// Re-exports
pub use analytics::{
    open_or_noop, NoopAnalyticsRepository, ReviewAnalytics, SqliteAnalyticsRepository,
};
pub use coordinator::DeckWriteCoordinator;
pub use deck::{DeckDocument, DeckStore, MemoryDeckStore};
pub use error::{Result, SyncError};
pub use fingerprint::card_fingerprint;
pub use journal::CompensationJournal;
pub use replay::{
    ReplayDiagnostics, ReplayEngine, ReplayReport, ReplayScheduler, DEFAULT_REPLAY_INTERVAL,
    MAX_ROLLBACK_ABSENT_RETRIES,
};
pub use sync::{ReviewEvent, ReviewSync, UndoOutcome};
pub use types::*;
