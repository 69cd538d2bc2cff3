//! Review analytics repository.
//!
//! Best-effort writes to the SQLite history store, idempotent undo
//! compensations, and thin delegations to the compensation journal. Analytics
//! must never block or fail the authoritative scheduling write, so
//! `record_schedule` swallows every failure; the one surfaced failure mode is
//! the initial `persist_intent`, since an unpersisted intent can never be
//! reconciled later.

use crate::error::{Result, SyncError};
use crate::journal::CompensationJournal;
use crate::types::{
    AnalyticsDiagnostics, CardState, CompensationIntent, Grade, JournalSummary,
    ReviewHistoryEntry, ReviewStats, ScheduleReview, SchedulingSnapshot,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::schema::apply_schema;

/// Columns selected for `ReviewHistoryEntry` mapping.
const ENTRY_COLUMNS: &str = "id, workspace_id, reviewed_at, deck_path, deck_relative_path, \
     card_id, grade, prev_stability, prev_difficulty, prev_state, prev_due, \
     next_stability, next_difficulty, next_state, next_due, undone_at";

/// Abstraction over the analytics store.
///
/// All implementations are safe to share across threads; the replay engine
/// and request-handling code hold the same instance.
pub trait ReviewAnalytics: Send + Sync {
    /// Best-effort insert of one review. Never propagates a failure: on
    /// error the dropped-insert diagnostic is incremented and `None` is
    /// returned.
    fn record_schedule(&self, input: &ScheduleReview) -> Option<i64>;

    /// Idempotent compensation: marks the entry undone unless it already is.
    fn compensate_undo(&self, review_entry_id: i64, undone_at: DateTime<Utc>) -> Result<()>;

    /// Durably record a pending compensation intent. Failures surface so the
    /// caller can treat a failed initial persist as fatal to the undo flow.
    fn persist_intent(&self, intent: CompensationIntent) -> Result<()>;

    /// Journal bookkeeping; failures are swallowed and counted.
    fn mark_intent_completed(&self, intent_id: &str);

    /// Journal bookkeeping; failures are swallowed and counted.
    fn mark_intent_conflict(&self, intent_id: &str, message: &str);

    /// Journal bookkeeping; failures are swallowed and counted.
    fn mark_intent_pending_failure(&self, intent_id: &str, message: &str);

    /// All pending intents, in journal order. Corruption surfaces.
    fn load_pending_intents(&self) -> Result<Vec<CompensationIntent>>;

    /// Counts of pending and conflict intents.
    fn summarize_journal(&self) -> Result<JournalSummary>;

    /// Snapshot of the diagnostic counters.
    fn get_diagnostics(&self) -> AnalyticsDiagnostics;

    /// Aggregate review statistics.
    fn get_review_stats(&self) -> Result<ReviewStats>;

    /// Most recent reviews, newest first.
    fn list_review_history(&self, limit: usize) -> Result<Vec<ReviewHistoryEntry>>;

    /// Most recent reviews of one card, newest first.
    fn list_card_history(&self, card_id: &str, limit: usize) -> Result<Vec<ReviewHistoryEntry>>;
}

/// SQLite-backed repository.
///
/// Thread-safe via an internal `Mutex<Connection>`; all statements are
/// serialized, which is plenty for a single-process reviewer.
pub struct SqliteAnalyticsRepository {
    conn: Mutex<Connection>,
    journal: CompensationJournal,
    workspace_id: i64,
    dropped_inserts: AtomicU64,
    journal_write_failures: AtomicU64,
}

impl SqliteAnalyticsRepository {
    /// Open (or create) the analytics database, apply the schema, and
    /// register the workspace identity row.
    pub fn open(
        db_path: impl AsRef<Path>,
        workspace_root: impl AsRef<Path>,
        journal_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_schema(&conn)?;

        let workspace_id = register_workspace(&conn, workspace_root.as_ref())?;

        Ok(Self {
            conn: Mutex::new(conn),
            journal: CompensationJournal::new(journal_path),
            workspace_id,
            dropped_inserts: AtomicU64::new(0),
            journal_write_failures: AtomicU64::new(0),
        })
    }

    /// Workspace identity row this repository writes under.
    pub fn workspace_id(&self) -> i64 {
        self.workspace_id
    }

    fn try_record(&self, input: &ScheduleReview) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO review_history \
             (workspace_id, reviewed_at, deck_path, deck_relative_path, card_id, grade, \
              prev_stability, prev_difficulty, prev_state, prev_due, \
              next_stability, next_difficulty, next_state, next_due) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                self.workspace_id,
                input.reviewed_at.timestamp(),
                input.deck_path.to_string_lossy().into_owned(),
                input.deck_relative_path,
                input.card_id,
                input.grade.as_i64(),
                input.previous.stability,
                input.previous.difficulty,
                input.previous.state.as_str(),
                input.previous.due.map(|d| d.timestamp()),
                input.next.stability,
                input.next.difficulty,
                input.next.state.as_str(),
                input.next.due.map(|d| d.timestamp()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_journal_failure(&self, op: &str, intent_id: &str, error: &SyncError) {
        self.journal_write_failures.fetch_add(1, Ordering::Relaxed);
        warn!(op, intent_id, %error, "journal bookkeeping write failed");
    }
}

impl ReviewAnalytics for SqliteAnalyticsRepository {
    fn record_schedule(&self, input: &ScheduleReview) -> Option<i64> {
        match self.try_record(input) {
            Ok(id) => Some(id),
            Err(e) => {
                self.dropped_inserts.fetch_add(1, Ordering::Relaxed);
                warn!(card_id = %input.card_id, error = %e, "dropped review history insert");
                None
            }
        }
    }

    fn compensate_undo(&self, review_entry_id: i64, undone_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE review_history SET undone_at = ?1 \
             WHERE id = ?2 AND undone_at IS NULL",
            params![undone_at.timestamp(), review_entry_id],
        )?;
        debug!(review_entry_id, updated, "undo compensation applied");
        Ok(())
    }

    fn persist_intent(&self, intent: CompensationIntent) -> Result<()> {
        self.journal.persist_pending_intent(intent)
    }

    fn mark_intent_completed(&self, intent_id: &str) {
        if let Err(e) = self.journal.mark_completed(intent_id) {
            self.count_journal_failure("mark_completed", intent_id, &e);
        }
    }

    fn mark_intent_conflict(&self, intent_id: &str, message: &str) {
        if let Err(e) = self.journal.mark_conflict(intent_id, message) {
            self.count_journal_failure("mark_conflict", intent_id, &e);
        }
    }

    fn mark_intent_pending_failure(&self, intent_id: &str, message: &str) {
        if let Err(e) = self.journal.mark_pending_failure(intent_id, message) {
            self.count_journal_failure("mark_pending_failure", intent_id, &e);
        }
    }

    fn load_pending_intents(&self) -> Result<Vec<CompensationIntent>> {
        self.journal.load_pending_intents()
    }

    fn summarize_journal(&self) -> Result<JournalSummary> {
        self.journal.summarize()
    }

    fn get_diagnostics(&self) -> AnalyticsDiagnostics {
        AnalyticsDiagnostics {
            dropped_inserts: self.dropped_inserts.load(Ordering::Relaxed),
            journal_write_failures: self.journal_write_failures.load(Ordering::Relaxed),
        }
    }

    fn get_review_stats(&self) -> Result<ReviewStats> {
        let conn = self.conn.lock();

        let total_reviews: u64 = conn.query_row(
            "SELECT COUNT(*) FROM review_history WHERE workspace_id = ?1",
            params![self.workspace_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let undone_reviews: u64 = conn.query_row(
            "SELECT COUNT(*) FROM review_history \
             WHERE workspace_id = ?1 AND undone_at IS NOT NULL",
            params![self.workspace_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let distinct_cards: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT card_id) FROM review_history \
             WHERE workspace_id = ?1 AND undone_at IS NULL",
            params![self.workspace_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let mut grade_counts = [0u64; 4];
        let mut stmt = conn.prepare(
            "SELECT grade, COUNT(*) FROM review_history \
             WHERE workspace_id = ?1 AND undone_at IS NULL GROUP BY grade",
        )?;
        let rows = stmt.query_map(params![self.workspace_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (grade, count) = row?;
            if (0..4).contains(&grade) {
                grade_counts[grade as usize] = count as u64;
            }
        }

        Ok(ReviewStats {
            total_reviews,
            undone_reviews,
            distinct_cards,
            grade_counts,
        })
    }

    fn list_review_history(&self, limit: usize) -> Result<Vec<ReviewHistoryEntry>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM review_history \
             WHERE workspace_id = ?1 ORDER BY reviewed_at DESC, id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.workspace_id, limit as i64], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn list_card_history(&self, card_id: &str, limit: usize) -> Result<Vec<ReviewHistoryEntry>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM review_history \
             WHERE workspace_id = ?1 AND card_id = ?2 \
             ORDER BY reviewed_at DESC, id DESC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.workspace_id, card_id, limit as i64], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

/// No-op repository, substituted when the analytics store fails its startup
/// health probe so analytics unavailability never blocks the host.
#[derive(Default)]
pub struct NoopAnalyticsRepository;

impl ReviewAnalytics for NoopAnalyticsRepository {
    fn record_schedule(&self, _input: &ScheduleReview) -> Option<i64> {
        None
    }

    fn compensate_undo(&self, _review_entry_id: i64, _undone_at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }

    fn persist_intent(&self, _intent: CompensationIntent) -> Result<()> {
        Ok(())
    }

    fn mark_intent_completed(&self, _intent_id: &str) {}

    fn mark_intent_conflict(&self, _intent_id: &str, _message: &str) {}

    fn mark_intent_pending_failure(&self, _intent_id: &str, _message: &str) {}

    fn load_pending_intents(&self) -> Result<Vec<CompensationIntent>> {
        Ok(Vec::new())
    }

    fn summarize_journal(&self) -> Result<JournalSummary> {
        Ok(JournalSummary::default())
    }

    fn get_diagnostics(&self) -> AnalyticsDiagnostics {
        AnalyticsDiagnostics::default()
    }

    fn get_review_stats(&self) -> Result<ReviewStats> {
        Ok(ReviewStats::default())
    }

    fn list_review_history(&self, _limit: usize) -> Result<Vec<ReviewHistoryEntry>> {
        Ok(Vec::new())
    }

    fn list_card_history(&self, _card_id: &str, _limit: usize) -> Result<Vec<ReviewHistoryEntry>> {
        Ok(Vec::new())
    }
}

/// Startup health probe: open the SQLite repository, or fall back to the
/// no-op implementation if the store is unavailable.
pub fn open_or_noop(
    db_path: impl AsRef<Path>,
    workspace_root: impl AsRef<Path>,
    journal_path: impl AsRef<Path>,
) -> Arc<dyn ReviewAnalytics> {
    match SqliteAnalyticsRepository::open(&db_path, workspace_root, journal_path) {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            warn!(
                db_path = %db_path.as_ref().display(),
                error = %e,
                "analytics store unavailable; review history disabled"
            );
            Arc::new(NoopAnalyticsRepository)
        }
    }
}

// --- Private Helpers ---

fn register_workspace(conn: &Connection, root: &Path) -> Result<i64> {
    let root_text = root.to_string_lossy().into_owned();
    conn.execute(
        "INSERT OR IGNORE INTO workspaces (root_path, created_at) VALUES (?1, ?2)",
        params![root_text, Utc::now().timestamp()],
    )?;

    let id = conn
        .query_row(
            "SELECT id FROM workspaces WHERE root_path = ?1",
            params![root_text],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| SyncError::AnalyticsUnavailable("workspace row missing".to_string()))?;

    Ok(id)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewHistoryEntry> {
    let grade_raw: i64 = row.get(6)?;
    let prev_state: String = row.get(9)?;
    let next_state: String = row.get(13)?;

    Ok(ReviewHistoryEntry {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        reviewed_at: from_epoch(row.get(2)?),
        deck_path: row.get(3)?,
        deck_relative_path: row.get(4)?,
        card_id: row.get(5)?,
        grade: Grade::from_i64(grade_raw).unwrap_or(Grade::Again),
        previous: SchedulingSnapshot {
            stability: row.get(7)?,
            difficulty: row.get(8)?,
            state: CardState::from_str_opt(&prev_state).unwrap_or(CardState::New),
            due: row.get::<_, Option<i64>>(10)?.map(from_epoch),
        },
        next: SchedulingSnapshot {
            stability: row.get(11)?,
            difficulty: row.get(12)?,
            state: CardState::from_str_opt(&next_state).unwrap_or(CardState::New),
            due: row.get::<_, Option<i64>>(14)?.map(from_epoch),
        },
        undone_at: row.get::<_, Option<i64>>(15)?.map(from_epoch),
    })
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
