//! Review synchronization facade.
//!
//! Ties the deck store, the analytics repository, the write coordinator, and
//! the replay engine together, and implements the two mutation flows:
//! recording a review (authoritative deck write, then best-effort analytics)
//! and undoing one (durable intent first, then rollback, then the inline
//! compensation attempt). The intent is persisted before anything else so a
//! crash at any later point still leaves enough state for replay to finish
//! the compensation at least once.

use crate::analytics::ReviewAnalytics;
use crate::coordinator::DeckWriteCoordinator;
use crate::deck::DeckStore;
use crate::error::Result;
use crate::fingerprint::card_fingerprint;
use crate::replay::{ReplayEngine, ReplayReport, ReplayScheduler};
use crate::types::{
    CardScheduling, CompensationIntent, Grade, IntentStatus, ScheduleReview, SchedulingSnapshot,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One scheduling event, carrying both the raw card forms written to the
/// deck and the parsed snapshots recorded to analytics.
#[derive(Clone, Debug)]
pub struct ReviewEvent {
    pub deck_path: PathBuf,
    pub deck_relative_path: String,
    pub grade: Grade,
    /// Raw scheduling before the review (the state an undo restores).
    pub previous: CardScheduling,
    /// Raw scheduling after the review.
    pub next: CardScheduling,
    pub previous_snapshot: SchedulingSnapshot,
    pub next_snapshot: SchedulingSnapshot,
}

/// Result of an undo flow.
#[derive(Clone, Debug)]
pub struct UndoOutcome {
    /// Id of the compensation intent recorded for this undo.
    pub intent_id: String,
    /// True when the analytics compensation was confirmed inline; false when
    /// the intent was left pending for replay.
    pub compensated_inline: bool,
}

/// Facade over the reconciliation core.
pub struct ReviewSync {
    decks: Arc<dyn DeckStore>,
    analytics: Arc<dyn ReviewAnalytics>,
    coordinator: Arc<DeckWriteCoordinator>,
    engine: Arc<ReplayEngine>,
}

impl ReviewSync {
    pub fn new(
        decks: Arc<dyn DeckStore>,
        analytics: Arc<dyn ReviewAnalytics>,
        coordinator: Arc<DeckWriteCoordinator>,
    ) -> Self {
        let engine = Arc::new(ReplayEngine::new(
            Arc::clone(&analytics),
            Arc::clone(&decks),
            Arc::clone(&coordinator),
        ));
        Self {
            decks,
            analytics,
            coordinator,
            engine,
        }
    }

    /// The analytics repository, for read-only reporting.
    pub fn analytics(&self) -> &Arc<dyn ReviewAnalytics> {
        &self.analytics
    }

    /// The replay engine, for diagnostics and custom trigger plumbing.
    pub fn engine(&self) -> Arc<ReplayEngine> {
        Arc::clone(&self.engine)
    }

    /// Record a review: write the new scheduling to the source-of-truth,
    /// then best-effort record it in analytics.
    ///
    /// Returns the analytics row id, or `None` when the insert was dropped.
    /// The deck write is authoritative; its failure is the only error here.
    pub fn record_review(&self, event: &ReviewEvent) -> Result<Option<i64>> {
        self.coordinator.with_lock(&event.deck_path, || {
            self.decks
                .update(&event.deck_path, &event.next.id, &event.next)?;

            Ok(self.analytics.record_schedule(&ScheduleReview {
                reviewed_at: Utc::now(),
                deck_path: event.deck_path.clone(),
                deck_relative_path: event.deck_relative_path.clone(),
                card_id: event.next.id.clone(),
                grade: event.grade,
                previous: event.previous_snapshot,
                next: event.next_snapshot,
            }))
        })
    }

    /// Undo a review: persist a pending compensation intent, roll the
    /// source-of-truth back, then attempt the inline compensation.
    ///
    /// A failed initial persist is fatal to the undo flow (an unpersisted
    /// intent could never be reconciled); a failed inline compensation
    /// leaves the intent pending for replay.
    pub fn undo_review(&self, event: &ReviewEvent, review_entry_id: i64) -> Result<UndoOutcome> {
        self.coordinator.with_lock(&event.deck_path, || {
            let intent = CompensationIntent {
                intent_id: uuid::Uuid::new_v4().to_string(),
                review_entry_id,
                deck_path: event.deck_path.clone(),
                card_id: event.next.id.clone(),
                expected_current_card_fingerprint: card_fingerprint(&event.next),
                previous_card_fingerprint: card_fingerprint(&event.previous),
                created_at: Utc::now(),
                attempt_count: 0,
                status: IntentStatus::Pending,
                last_error: None,
            };
            let intent_id = intent.intent_id.clone();

            self.analytics.persist_intent(intent)?;

            self.decks
                .update(&event.deck_path, &event.previous.id, &event.previous)?;

            let compensated_inline =
                match self.analytics.compensate_undo(review_entry_id, Utc::now()) {
                    Ok(()) => {
                        self.analytics.mark_intent_completed(&intent_id);
                        true
                    }
                    Err(e) => {
                        debug!(
                            intent_id = %intent_id,
                            error = %e,
                            "inline compensation failed; intent left pending"
                        );
                        self.analytics
                            .mark_intent_pending_failure(&intent_id, &e.to_string());
                        false
                    }
                };

            Ok(UndoOutcome {
                intent_id,
                compensated_inline,
            })
        })
    }

    /// Run one reconciliation pass.
    pub fn replay_now(&self) -> Result<ReplayReport> {
        self.engine.replay_pending_compensation_intents()
    }

    /// Start the startup + periodic replay trigger.
    pub fn start_scheduler(&self, interval: Duration) -> ReplayScheduler {
        ReplayScheduler::start(Arc::clone(&self.engine), interval)
    }
}
