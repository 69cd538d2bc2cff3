//! Core types for the reconciliation core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Current journal file format version.
pub const JOURNAL_VERSION: u32 = 1;

/// Review grade, as recorded by the scheduler (0-3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    /// Numeric form stored in the analytics database.
    pub fn as_i64(self) -> i64 {
        match self {
            Grade::Again => 0,
            Grade::Hard => 1,
            Grade::Good => 2,
            Grade::Easy => 3,
        }
    }

    /// Parse from the stored numeric form.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Grade::Again),
            1 => Some(Grade::Hard),
            2 => Some(Grade::Good),
            3 => Some(Grade::Easy),
            _ => None,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Grade::Again => "again",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        };
        write!(f, "{}", name)
    }
}

/// Scheduling state of a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Relearning => "relearning",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CardState::New),
            "learning" => Some(CardState::Learning),
            "review" => Some(CardState::Review),
            "relearning" => Some(CardState::Relearning),
            _ => None,
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable scheduling metadata of one card as it appears in a deck document.
///
/// Numeric fields are kept in their raw string forms, exactly as the user's
/// file holds them. The fingerprint is built from these raw forms, so
/// "2.5" and "2.50" are distinct values here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardScheduling {
    /// Card identifier, unique within its deck.
    pub id: String,

    /// Raw stability field text, if present.
    pub stability: Option<String>,

    /// Raw difficulty field text, if present.
    pub difficulty: Option<String>,

    /// Scheduling state.
    pub state: CardState,

    /// Position within the learning steps, if in a learning phase.
    pub learning_step: Option<u32>,

    /// Due timestamp (ISO-8601 text), if scheduled.
    pub due: Option<String>,

    /// Last review timestamp (ISO-8601 text), if ever reviewed.
    pub last_reviewed: Option<String>,
}

/// Parsed scheduling fields recorded to the analytics store alongside a
/// review (previous and next snapshots).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSnapshot {
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub state: CardState,
    pub due: Option<DateTime<Utc>>,
}

/// Lifecycle status of a compensation intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Compensation has not been confirmed yet; replay will retry.
    Pending,
    /// Compensation confirmed in the analytics store.
    Completed,
    /// Terminal mismatch; requires operator attention, never auto-retried.
    Conflict,
}

/// One pending or resolved obligation to compensate the analytics store for
/// an undone review.
///
/// Created when an undo's analytics compensation cannot be confirmed inline;
/// mutated only through journal operations; kept for audit once resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationIntent {
    /// Opaque unique id, caller-generated.
    pub intent_id: String,

    /// Analytics review-history row to compensate.
    pub review_entry_id: i64,

    /// Deck file holding the card.
    pub deck_path: PathBuf,

    /// Card within the deck.
    pub card_id: String,

    /// Snapshot of the card immediately after scheduling, before any undo.
    pub expected_current_card_fingerprint: String,

    /// Snapshot of the card before scheduling (the state an undo restores).
    pub previous_card_fingerprint: String,

    /// When the intent was recorded.
    pub created_at: DateTime<Utc>,

    /// Number of failed attempts so far.
    pub attempt_count: u32,

    /// Lifecycle status.
    pub status: IntentStatus,

    /// Message from the most recent failure, if any.
    #[serde(default)]
    pub last_error: Option<String>,
}

/// The sole persisted form of all intents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalFile {
    pub version: u32,
    pub intents: Vec<CompensationIntent>,
}

impl Default for JournalFile {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            intents: Vec::new(),
        }
    }
}

/// Counts of unresolved journal entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JournalSummary {
    pub pending: usize,
    pub conflict: usize,
}

/// Input for recording one review in the analytics store.
#[derive(Clone, Debug)]
pub struct ScheduleReview {
    pub reviewed_at: DateTime<Utc>,
    pub deck_path: PathBuf,
    pub deck_relative_path: String,
    pub card_id: String,
    pub grade: Grade,
    pub previous: SchedulingSnapshot,
    pub next: SchedulingSnapshot,
}

/// One analytics review-history row.
///
/// Immutable at creation except for `undone_at`, set exactly once by a
/// successful compensation.
#[derive(Clone, Debug)]
pub struct ReviewHistoryEntry {
    pub id: i64,
    pub workspace_id: i64,
    pub reviewed_at: DateTime<Utc>,
    pub deck_path: String,
    pub deck_relative_path: String,
    pub card_id: String,
    pub grade: Grade,
    pub previous: SchedulingSnapshot,
    pub next: SchedulingSnapshot,
    pub undone_at: Option<DateTime<Utc>>,
}

/// Aggregate statistics over recorded reviews (undone rows excluded from
/// grade counts).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReviewStats {
    pub total_reviews: u64,
    pub undone_reviews: u64,
    pub distinct_cards: u64,
    /// Counts indexed by grade value 0-3.
    pub grade_counts: [u64; 4],
}

/// Snapshot of the repository's diagnostic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnalyticsDiagnostics {
    /// Best-effort inserts that failed and were dropped.
    pub dropped_inserts: u64,
    /// Journal bookkeeping writes that failed and were swallowed.
    pub journal_write_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_round_trip() {
        for g in [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy] {
            assert_eq!(Grade::from_i64(g.as_i64()), Some(g));
        }
        assert_eq!(Grade::from_i64(4), None);
        assert_eq!(Grade::from_i64(-1), None);
    }

    #[test]
    fn test_card_state_round_trip() {
        for s in [
            CardState::New,
            CardState::Learning,
            CardState::Review,
            CardState::Relearning,
        ] {
            assert_eq!(CardState::from_str_opt(s.as_str()), Some(s));
        }
        assert_eq!(CardState::from_str_opt("suspended"), None);
    }

    #[test]
    fn test_intent_missing_last_error_normalizes_to_none() {
        let json = r#"{
            "intentId": "a",
            "reviewEntryId": 7,
            "deckPath": "decks/geo.md",
            "cardId": "card-1",
            "expectedCurrentCardFingerprint": "fp-after",
            "previousCardFingerprint": "fp-before",
            "createdAt": "2026-01-05T10:00:00Z",
            "attemptCount": 0,
            "status": "pending"
        }"#;

        let intent: CompensationIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.last_error, None);
        assert_eq!(intent.status, IntentStatus::Pending);

        // Round-trip keeps the field, serialized as null.
        let text = serde_json::to_string_pretty(&intent).unwrap();
        assert!(text.contains("\"lastError\": null"));
    }

    #[test]
    fn test_journal_file_default_is_empty_v1() {
        let journal = JournalFile::default();
        assert_eq!(journal.version, JOURNAL_VERSION);
        assert!(journal.intents.is_empty());
    }
}
