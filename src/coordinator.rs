//! Per-deck mutual exclusion for source-of-truth writes.
//!
//! Direct mutation entry points and the replay engine's per-intent step both
//! take the deck lock, so a live edit and a reconciliation pass on the same
//! deck can never interleave. Locks are keyed by normalized path, created
//! lazily, and retained for the process lifetime.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Keyed one-ticket mutual exclusion over deck paths.
pub struct DeckWriteCoordinator {
    /// Lock table, keyed by normalized path.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DeckWriteCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `operation` while holding the lock for `path`.
    ///
    /// Calls for the same normalized path are mutually exclusive; calls for
    /// different paths proceed concurrently. No fairness or ordering is
    /// guaranteed beyond mutual exclusion.
    pub fn with_lock<T>(&self, path: &Path, operation: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(path);
        let _guard = lock.lock();
        operation()
    }

    /// Number of distinct keys seen so far.
    pub fn key_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = normalize_key(path);
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key).or_default())
    }
}

impl Default for DeckWriteCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically normalize a path into a lock key.
///
/// Resolves `.` and `..` components without touching the filesystem, so keys
/// work for paths that do not exist yet and never block on I/O.
pub(crate) fn normalize_key(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_normalize_key_resolves_dot_components() {
        assert_eq!(
            normalize_key(Path::new("decks/./geo.md")),
            normalize_key(Path::new("decks/geo.md"))
        );
        assert_eq!(
            normalize_key(Path::new("decks/sub/../geo.md")),
            normalize_key(Path::new("decks/geo.md"))
        );
    }

    #[test]
    fn test_distinct_paths_get_distinct_keys() {
        assert_ne!(
            normalize_key(Path::new("decks/a.md")),
            normalize_key(Path::new("decks/b.md"))
        );
    }

    #[test]
    fn test_lock_table_grows_lazily_and_is_retained() {
        let coordinator = DeckWriteCoordinator::new();
        assert_eq!(coordinator.key_count(), 0);

        coordinator.with_lock(Path::new("decks/a.md"), || {});
        coordinator.with_lock(Path::new("decks/./a.md"), || {});
        coordinator.with_lock(Path::new("decks/b.md"), || {});

        assert_eq!(coordinator.key_count(), 2);
    }

    #[test]
    fn test_with_lock_returns_operation_result() {
        let coordinator = DeckWriteCoordinator::new();
        let value = coordinator.with_lock(Path::new("decks/a.md"), || 41 + 1);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_same_key_is_mutually_exclusive() {
        let coordinator = Arc::new(DeckWriteCoordinator::new());
        let in_section = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let in_section = Arc::clone(&in_section);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    coordinator.with_lock(Path::new("decks/shared.md"), || {
                        let prev = in_section.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "two critical sections ran concurrently");
                        std::thread::sleep(Duration::from_micros(10));
                        in_section.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
