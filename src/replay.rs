//! Replay of pending compensation intents.
//!
//! One reconciliation pass re-derives ground truth from the source-of-truth
//! deck and the fingerprint function, then advances every pending intent
//! toward `completed` or `conflict`. Failure of one intent never aborts the
//! pass; remaining intents are still processed. A single-flight guard admits
//! at most one pass process-wide, and a trigger arriving while a pass runs is
//! dropped, not queued.

use crate::analytics::ReviewAnalytics;
use crate::coordinator::DeckWriteCoordinator;
use crate::deck::DeckStore;
use crate::error::Result;
use crate::fingerprint::card_fingerprint;
use crate::types::CompensationIntent;
use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rollback-absent observations tolerated before escalating to conflict.
pub const MAX_ROLLBACK_ABSENT_RETRIES: u32 = 10;

/// Interval between periodic replay passes.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one replay pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Intents examined this pass.
    pub processed: u64,
    /// Intents whose compensation was confirmed.
    pub completed: u64,
    /// Intents left pending for a later pass.
    pub retried: u64,
    /// Intents escalated to terminal conflict.
    pub conflicts: u64,
    /// True when the trigger was dropped because a pass was already running.
    pub skipped: bool,
}

/// Snapshot of the engine's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayDiagnostics {
    pub passes: u64,
    pub attempts: u64,
    pub completions: u64,
    pub retries: u64,
    pub conflicts: u64,
    pub dropped_triggers: u64,
}

enum IntentOutcome {
    Completed,
    Retried,
    Conflict,
}

/// Drives pending compensation intents to resolution.
pub struct ReplayEngine {
    analytics: Arc<dyn ReviewAnalytics>,
    decks: Arc<dyn DeckStore>,
    coordinator: Arc<DeckWriteCoordinator>,

    /// Single-flight guard: at most one pass executes at a time.
    in_flight: AtomicBool,

    passes: AtomicU64,
    attempts: AtomicU64,
    completions: AtomicU64,
    retries: AtomicU64,
    conflicts: AtomicU64,
    dropped_triggers: AtomicU64,
}

impl ReplayEngine {
    pub fn new(
        analytics: Arc<dyn ReviewAnalytics>,
        decks: Arc<dyn DeckStore>,
        coordinator: Arc<DeckWriteCoordinator>,
    ) -> Self {
        Self {
            analytics,
            decks,
            coordinator,
            in_flight: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            dropped_triggers: AtomicU64::new(0),
        }
    }

    /// Run one reconciliation pass over all pending intents.
    ///
    /// Returns a skipped report if a pass is already in flight. Journal
    /// corruption is fatal to the call; per-intent failures are not.
    pub fn replay_pending_compensation_intents(&self) -> Result<ReplayReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.dropped_triggers.fetch_add(1, Ordering::Relaxed);
            debug!("replay trigger dropped; a pass is already running");
            return Ok(ReplayReport {
                skipped: true,
                ..ReplayReport::default()
            });
        }

        let result = self.run_pass();
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Snapshot of the engine's counters.
    pub fn diagnostics(&self) -> ReplayDiagnostics {
        ReplayDiagnostics {
            passes: self.passes.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            dropped_triggers: self.dropped_triggers.load(Ordering::Relaxed),
        }
    }

    fn run_pass(&self) -> Result<ReplayReport> {
        self.passes.fetch_add(1, Ordering::Relaxed);

        let pending = self.analytics.load_pending_intents()?;
        let mut report = ReplayReport::default();

        for intent in &pending {
            report.processed += 1;
            self.attempts.fetch_add(1, Ordering::Relaxed);

            let outcome = self
                .coordinator
                .with_lock(&intent.deck_path, || self.reconcile_intent(intent));

            match outcome {
                IntentOutcome::Completed => {
                    report.completed += 1;
                    self.completions.fetch_add(1, Ordering::Relaxed);
                }
                IntentOutcome::Retried => {
                    report.retried += 1;
                    self.retries.fetch_add(1, Ordering::Relaxed);
                }
                IntentOutcome::Conflict => {
                    report.conflicts += 1;
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        debug!(
            processed = report.processed,
            completed = report.completed,
            retried = report.retried,
            conflicts = report.conflicts,
            "replay pass finished"
        );
        Ok(report)
    }

    /// Advance a single intent. Runs under the deck lock, so a live edit and
    /// this reconciliation step can never interleave.
    fn reconcile_intent(&self, intent: &CompensationIntent) -> IntentOutcome {
        let document = match self.decks.read(&intent.deck_path) {
            Ok(document) => document,
            Err(e) => {
                self.analytics
                    .mark_intent_pending_failure(&intent.intent_id, &e.to_string());
                return IntentOutcome::Retried;
            }
        };

        let card = match document.find_card(&intent.card_id) {
            Some(card) => card,
            None => {
                self.analytics
                    .mark_intent_conflict(&intent.intent_id, "card not found during replay");
                return IntentOutcome::Conflict;
            }
        };

        let current = card_fingerprint(card);

        if current == intent.previous_card_fingerprint {
            // Source-of-truth already reflects the rolled-back state.
            match self
                .analytics
                .compensate_undo(intent.review_entry_id, Utc::now())
            {
                Ok(()) => {
                    self.analytics.mark_intent_completed(&intent.intent_id);
                    IntentOutcome::Completed
                }
                Err(e) => {
                    self.analytics
                        .mark_intent_pending_failure(&intent.intent_id, &e.to_string());
                    IntentOutcome::Retried
                }
            }
        } else if current == intent.expected_current_card_fingerprint {
            // Rollback has not yet reached the source-of-truth.
            let message = "rollback not observed; compensation kept pending";
            if intent.attempt_count + 1 >= MAX_ROLLBACK_ABSENT_RETRIES {
                self.analytics
                    .mark_intent_conflict(&intent.intent_id, message);
                IntentOutcome::Conflict
            } else {
                self.analytics
                    .mark_intent_pending_failure(&intent.intent_id, message);
                IntentOutcome::Retried
            }
        } else {
            // Independent modification since the intent was recorded.
            let message = format!(
                "current fingerprint matches neither expected value for card {} in {}",
                intent.card_id,
                intent.deck_path.display()
            );
            self.analytics
                .mark_intent_conflict(&intent.intent_id, &message);
            IntentOutcome::Conflict
        }
    }
}

/// Startup and periodic trigger plumbing for the replay engine.
///
/// Runs one pass immediately on start, then one per interval tick on a
/// dedicated thread. Stopping ends the loop after any in-flight pass
/// completes; a pass is never interrupted mid-write.
pub struct ReplayScheduler {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ReplayScheduler {
    /// Spawn the scheduler thread.
    pub fn start(engine: Arc<ReplayEngine>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "replay scheduler started");
            run_once(&engine);

            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => run_once(&engine),
                }
            }
            info!("replay scheduler stopped");
        });

        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the scheduler, waiting for any in-flight pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReplayScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_once(engine: &ReplayEngine) {
    if let Err(e) = engine.replay_pending_compensation_intents() {
        warn!(error = %e, "replay pass failed");
    }
}
