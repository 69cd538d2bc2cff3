//! Error handling and degraded-mode tests.

use retrace::{
    open_or_noop, CardScheduling, CardState, DeckStore, DeckWriteCoordinator, Grade,
    MemoryDeckStore, ReviewAnalytics, ReviewEvent, ReviewSync, SchedulingSnapshot,
    SqliteAnalyticsRepository, SyncError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn card(id: &str, state: CardState) -> CardScheduling {
    CardScheduling {
        id: id.to_string(),
        stability: None,
        difficulty: None,
        state,
        learning_step: None,
        due: None,
        last_reviewed: None,
    }
}

fn snapshot(state: CardState) -> SchedulingSnapshot {
    SchedulingSnapshot {
        stability: None,
        difficulty: None,
        state,
        due: None,
    }
}

fn review_event(card_id: &str) -> ReviewEvent {
    ReviewEvent {
        deck_path: PathBuf::from("decks/geo.md"),
        deck_relative_path: "decks/geo.md".to_string(),
        grade: Grade::Good,
        previous: card(card_id, CardState::New),
        next: card(card_id, CardState::Learning),
        previous_snapshot: snapshot(CardState::New),
        next_snapshot: snapshot(CardState::Learning),
    }
}

// --- Journal Corruption ---

#[test]
fn test_corrupt_journal_fails_loads_and_replay() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("journal.json");
    std::fs::write(&journal_path, b"not json at all").unwrap();

    let repo = SqliteAnalyticsRepository::open(
        dir.path().join("analytics.db"),
        dir.path(),
        &journal_path,
    )
    .unwrap();

    let result = repo.load_pending_intents();
    assert!(matches!(result, Err(SyncError::JournalCorrupt(_))));

    let decks = Arc::new(MemoryDeckStore::new());
    let sync = ReviewSync::new(
        decks as Arc<dyn DeckStore>,
        Arc::new(repo) as Arc<dyn ReviewAnalytics>,
        Arc::new(DeckWriteCoordinator::new()),
    );
    let result = sync.replay_now();
    assert!(matches!(result, Err(SyncError::JournalCorrupt(_))));

    // The corrupt file was not clobbered or emptied.
    let raw = std::fs::read_to_string(&journal_path).unwrap();
    assert_eq!(raw, "not json at all");
}

#[test]
fn test_future_journal_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("journal.json");
    std::fs::write(&journal_path, br#"{"version": 9, "intents": []}"#).unwrap();

    let repo = SqliteAnalyticsRepository::open(
        dir.path().join("analytics.db"),
        dir.path(),
        &journal_path,
    )
    .unwrap();

    let result = repo.load_pending_intents();
    assert!(matches!(result, Err(SyncError::InvalidFormat(_))));
}

// --- Degraded Analytics ---

#[test]
fn test_reviewing_continues_when_analytics_is_unavailable() {
    let dir = TempDir::new().unwrap();
    // A directory is not a valid database file, so the health probe fails.
    let analytics = open_or_noop(dir.path(), dir.path(), dir.path().join("journal.json"));

    let decks = Arc::new(MemoryDeckStore::new());
    decks.insert_deck("decks/geo.md", vec![card("card-1", CardState::New)]);

    let sync = ReviewSync::new(
        Arc::clone(&decks) as Arc<dyn DeckStore>,
        analytics,
        Arc::new(DeckWriteCoordinator::new()),
    );

    let event = review_event("card-1");

    // The authoritative write still happens; the insert is dropped.
    let entry_id = sync.record_review(&event).unwrap();
    assert_eq!(entry_id, None);
    let doc = decks.read(Path::new("decks/geo.md")).unwrap();
    assert_eq!(doc.find_card("card-1").unwrap().state, CardState::Learning);

    // Undo still rolls the deck back and does not error.
    let outcome = sync.undo_review(&event, 0).unwrap();
    assert!(outcome.compensated_inline);
    let doc = decks.read(Path::new("decks/geo.md")).unwrap();
    assert_eq!(doc.find_card("card-1").unwrap().state, CardState::New);

    // Replay over the no-op repository is a clean no-op.
    let report = sync.replay_now().unwrap();
    assert_eq!(report.processed, 0);
}

// --- Deck Failures ---

#[test]
fn test_record_review_fails_without_touching_analytics() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(
        SqliteAnalyticsRepository::open(
            dir.path().join("analytics.db"),
            dir.path(),
            dir.path().join("journal.json"),
        )
        .unwrap(),
    );

    // Empty deck store: the authoritative write fails.
    let decks = Arc::new(MemoryDeckStore::new());
    let sync = ReviewSync::new(
        decks as Arc<dyn DeckStore>,
        Arc::clone(&repo) as Arc<dyn ReviewAnalytics>,
        Arc::new(DeckWriteCoordinator::new()),
    );

    let result = sync.record_review(&review_event("card-1"));
    assert!(matches!(result, Err(SyncError::DeckRead { .. })));

    // No history row was recorded for the failed write.
    assert!(repo.list_review_history(10).unwrap().is_empty());
    assert_eq!(repo.get_review_stats().unwrap().total_reviews, 0);
}

#[test]
fn test_undo_rollback_failure_leaves_intent_pending() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(
        SqliteAnalyticsRepository::open(
            dir.path().join("analytics.db"),
            dir.path(),
            dir.path().join("journal.json"),
        )
        .unwrap(),
    );

    let decks = Arc::new(MemoryDeckStore::new());
    decks.insert_deck("decks/geo.md", vec![card("card-1", CardState::New)]);

    let sync = ReviewSync::new(
        Arc::clone(&decks) as Arc<dyn DeckStore>,
        Arc::clone(&repo) as Arc<dyn ReviewAnalytics>,
        Arc::new(DeckWriteCoordinator::new()),
    );

    let event = review_event("card-1");
    let entry_id = sync.record_review(&event).unwrap().unwrap();

    // The deck disappears before the undo (file deleted out from under us).
    decks.remove_deck(Path::new("decks/geo.md"));

    let result = sync.undo_review(&event, entry_id);
    assert!(matches!(result, Err(SyncError::DeckRead { .. })));

    // The intent was persisted before the rollback attempt, so replay can
    // still resolve the undo later.
    let pending = repo.load_pending_intents().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].review_entry_id, entry_id);
}
