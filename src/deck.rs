//! Source-of-truth deck interface.
//!
//! The authoritative scheduling metadata lives in per-deck documents owned by
//! the host application; parsing and round-tripping the document format is
//! out of scope here. This module defines the narrow read/find/update surface
//! the reconciliation core consumes, plus an in-memory implementation for
//! embedders and tests.

use crate::error::{Result, SyncError};
use crate::types::CardScheduling;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A parsed deck document: the cards' scheduling metadata, in document order.
#[derive(Clone, Debug, Default)]
pub struct DeckDocument {
    pub cards: Vec<CardScheduling>,
}

impl DeckDocument {
    pub fn new(cards: Vec<CardScheduling>) -> Self {
        Self { cards }
    }

    /// Locate a card by id.
    pub fn find_card(&self, card_id: &str) -> Option<&CardScheduling> {
        self.cards.iter().find(|c| c.id == card_id)
    }
}

/// Read and write access to the source-of-truth store.
///
/// Implementations must apply `update` synchronously: when it returns, the
/// new scheduling is durable in the document.
pub trait DeckStore: Send + Sync {
    /// Read and parse the deck at `path`.
    fn read(&self, path: &Path) -> Result<DeckDocument>;

    /// Replace the scheduling metadata of `card_id` within the deck.
    fn update(&self, path: &Path, card_id: &str, scheduling: &CardScheduling) -> Result<()>;
}

/// In-memory deck store.
///
/// Honors the `DeckStore` contract without a document format; hosts embed
/// their own parser-backed implementation in production.
pub struct MemoryDeckStore {
    decks: RwLock<HashMap<PathBuf, DeckDocument>>,
}

impl MemoryDeckStore {
    pub fn new() -> Self {
        Self {
            decks: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a whole deck.
    pub fn insert_deck(&self, path: impl AsRef<Path>, cards: Vec<CardScheduling>) {
        self.decks
            .write()
            .insert(path.as_ref().to_path_buf(), DeckDocument::new(cards));
    }

    /// Remove a deck, simulating a deleted file.
    pub fn remove_deck(&self, path: &Path) {
        self.decks.write().remove(path);
    }
}

impl Default for MemoryDeckStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckStore for MemoryDeckStore {
    fn read(&self, path: &Path) -> Result<DeckDocument> {
        self.decks
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::DeckRead {
                path: path.to_path_buf(),
                message: "deck not found".to_string(),
            })
    }

    fn update(&self, path: &Path, card_id: &str, scheduling: &CardScheduling) -> Result<()> {
        let mut decks = self.decks.write();
        let deck = decks.get_mut(path).ok_or_else(|| SyncError::DeckRead {
            path: path.to_path_buf(),
            message: "deck not found".to_string(),
        })?;

        let card = deck
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(|| SyncError::CardNotFound {
                deck_path: path.to_path_buf(),
                card_id: card_id.to_string(),
            })?;

        *card = scheduling.clone();
        Ok(())
    }
}
