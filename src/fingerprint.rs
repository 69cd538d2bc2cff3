//! Deterministic string snapshots of card scheduling state.
//!
//! The fingerprint is an optimistic-comparison token, not a security hash.
//! It concatenates the raw field texts so that two schedulings compare equal
//! exactly when their stored forms are identical; no normalization is applied
//! across equivalent-but-differently-formatted values.

use crate::types::CardScheduling;

/// Marker substituted for an absent field.
const NULL_MARKER: &str = "-";

/// Field separator.
const SEPARATOR: char = '|';

/// Build the fingerprint of a card's mutable scheduling fields.
///
/// Total over any valid scheduling value; exact string equality is the only
/// defined comparison on the result.
pub fn card_fingerprint(card: &CardScheduling) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(&card.id);
    for field in [
        card.stability.as_deref(),
        card.difficulty.as_deref(),
        Some(card.state.as_str()),
        card.learning_step.map(|s| s.to_string()).as_deref(),
        card.due.as_deref(),
        card.last_reviewed.as_deref(),
    ] {
        out.push(SEPARATOR);
        out.push_str(field.unwrap_or(NULL_MARKER));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardState;

    fn card() -> CardScheduling {
        CardScheduling {
            id: "card-1".to_string(),
            stability: Some("4.93".to_string()),
            difficulty: Some("5.2".to_string()),
            state: CardState::Review,
            learning_step: None,
            due: Some("2026-02-01T08:00:00Z".to_string()),
            last_reviewed: Some("2026-01-28T08:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let c = card();
        assert_eq!(card_fingerprint(&c), card_fingerprint(&c));
    }

    #[test]
    fn test_fingerprint_layout() {
        let fp = card_fingerprint(&card());
        assert_eq!(
            fp,
            "card-1|4.93|5.2|review|-|2026-02-01T08:00:00Z|2026-01-28T08:00:00Z"
        );
    }

    #[test]
    fn test_absent_fields_use_null_marker() {
        let c = CardScheduling {
            id: "fresh".to_string(),
            stability: None,
            difficulty: None,
            state: CardState::New,
            learning_step: None,
            due: None,
            last_reviewed: None,
        };
        assert_eq!(card_fingerprint(&c), "fresh|-|-|new|-|-|-");
    }

    #[test]
    fn test_raw_forms_are_not_normalized() {
        let mut a = card();
        let mut b = card();
        a.stability = Some("2.5".to_string());
        b.stability = Some("2.50".to_string());
        assert_ne!(card_fingerprint(&a), card_fingerprint(&b));
    }

    #[test]
    fn test_learning_step_changes_fingerprint() {
        let mut a = card();
        a.state = CardState::Learning;
        let mut b = a.clone();
        a.learning_step = Some(1);
        b.learning_step = Some(2);
        assert_ne!(card_fingerprint(&a), card_fingerprint(&b));
    }
}
