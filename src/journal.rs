//! Durable journal of compensation intents.
//!
//! The journal is the sole persisted record of in-flight compensations, so
//! every mutation rewrites the file atomically: serialize to a temp file,
//! fsync, rename over the target, fsync the containing directory where the
//! platform supports it. A missing file reads as an empty journal; a
//! malformed file is a hard error, never treated as empty, since that would
//! silently discard outstanding compensations.

use crate::error::{Result, SyncError};
use crate::types::{CompensationIntent, IntentStatus, JournalFile, JournalSummary, JOURNAL_VERSION};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compensation intent journal with a single global writer.
pub struct CompensationJournal {
    /// Path to the journal file.
    path: PathBuf,

    /// Serializes all mutations so the file has exactly one active writer.
    write_lock: Mutex<()>,
}

impl CompensationJournal {
    /// Create a journal handle for the given path.
    ///
    /// The file is not touched until the first mutation.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a new pending intent.
    ///
    /// Appends the intent, then compacts so only the newest pending intent
    /// survives per `review_entry_id`. Resolved intents are never removed.
    pub fn persist_pending_intent(&self, intent: CompensationIntent) -> Result<()> {
        let _lock = self.write_lock.lock();

        let mut journal = self.load()?;
        journal.intents.push(intent);
        compact_pending(&mut journal.intents);

        self.write_atomic(&journal)
    }

    /// Mark an intent as completed and clear its last error.
    pub fn mark_completed(&self, intent_id: &str) -> Result<()> {
        self.mutate_intent(intent_id, |intent| {
            intent.status = IntentStatus::Completed;
            intent.last_error = None;
        })
    }

    /// Mark an intent as a terminal conflict.
    pub fn mark_conflict(&self, intent_id: &str, message: &str) -> Result<()> {
        self.mutate_intent(intent_id, |intent| {
            intent.status = IntentStatus::Conflict;
            intent.last_error = Some(message.to_string());
            intent.attempt_count += 1;
        })
    }

    /// Record a retryable failure: the intent stays pending.
    pub fn mark_pending_failure(&self, intent_id: &str, message: &str) -> Result<()> {
        self.mutate_intent(intent_id, |intent| {
            intent.last_error = Some(message.to_string());
            intent.attempt_count += 1;
        })
    }

    /// All intents with status pending, in journal order.
    pub fn load_pending_intents(&self) -> Result<Vec<CompensationIntent>> {
        let _lock = self.write_lock.lock();
        let journal = self.load()?;
        Ok(journal
            .intents
            .into_iter()
            .filter(|i| i.status == IntentStatus::Pending)
            .collect())
    }

    /// Every intent in the journal, resolved ones included.
    pub fn load_all_intents(&self) -> Result<Vec<CompensationIntent>> {
        let _lock = self.write_lock.lock();
        Ok(self.load()?.intents)
    }

    /// Counts of pending and conflict intents.
    pub fn summarize(&self) -> Result<JournalSummary> {
        let _lock = self.write_lock.lock();
        let journal = self.load()?;

        let mut summary = JournalSummary::default();
        for intent in &journal.intents {
            match intent.status {
                IntentStatus::Pending => summary.pending += 1,
                IntentStatus::Conflict => summary.conflict += 1,
                IntentStatus::Completed => {}
            }
        }
        Ok(summary)
    }

    // --- Private Helpers ---

    fn mutate_intent(
        &self,
        intent_id: &str,
        apply: impl FnOnce(&mut CompensationIntent),
    ) -> Result<()> {
        let _lock = self.write_lock.lock();

        let mut journal = self.load()?;
        let intent = journal
            .intents
            .iter_mut()
            .find(|i| i.intent_id == intent_id)
            .ok_or_else(|| SyncError::IntentNotFound(intent_id.to_string()))?;

        apply(intent);
        self.write_atomic(&journal)
    }

    /// Read the journal file. A missing file yields an empty journal and no
    /// file is created as a side effect.
    fn load(&self) -> Result<JournalFile> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(JournalFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        let journal: JournalFile = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::JournalCorrupt(format!("{}: {}", self.path.display(), e)))?;

        if journal.version != JOURNAL_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                journal.version
            )));
        }

        Ok(journal)
    }

    /// Rewrite the journal atomically: temp file, fsync, rename, then fsync
    /// the containing directory where the platform supports it.
    fn write_atomic(&self, journal: &JournalFile) -> Result<()> {
        let mut encoded = serde_json::to_vec_pretty(journal)?;
        encoded.push(b'\n');

        let tmp_path = temp_path(&self.path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

/// Remove older pending duplicates: only the newest pending intent survives
/// per `review_entry_id`. Completed and conflict intents are retained.
fn compact_pending(intents: &mut Vec<CompensationIntent>) {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut keep = vec![false; intents.len()];

    for (idx, intent) in intents.iter().enumerate().rev() {
        match intent.status {
            IntentStatus::Pending => {
                if seen.insert(intent.review_entry_id) {
                    keep[idx] = true;
                }
            }
            _ => keep[idx] = true,
        }
    }

    let mut idx = 0;
    intents.retain(|_| {
        let kept = keep[idx];
        idx += 1;
        kept
    });
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
