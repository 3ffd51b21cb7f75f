//! Merge/dedupe engine for unified lists.
//!
//! Reconciles append-only collections arriving from multiple origins
//! (channel manager, host edits). Identity is the external id when one
//! exists, else a fingerprint of source, timestamp and truncated
//! content. Existing entries always win over reprocessed incoming
//! entries with the same key, so host edits are never displaced.

use std::collections::HashSet;

use rust_decimal::Decimal;

use lodgex_core::Instant;
use lodgex_db::models::{EntrySource, UnifiedExtra, UnifiedNote, UnifiedPayment};

/// Content length used when fingerprinting entries without an id.
const FINGERPRINT_CONTENT_LEN: usize = 40;

/// An element of a unified list, as seen by the reconciler.
pub trait UnifiedEntry {
    /// External id, when the entry was imported with one.
    fn external_id(&self) -> Option<&str>;
    /// When the entry happened.
    fn timestamp(&self) -> Instant;
    /// Where the entry came from.
    fn source(&self) -> EntrySource;
    /// Content that defines identity when no external id exists.
    fn content_key(&self) -> String;
    /// Whether the entry carries meaningful content at all.
    fn is_meaningful(&self) -> bool;

    /// Deduplication key.
    fn identity(&self) -> String {
        if let Some(id) = self.external_id() {
            return format!("ext:{id}");
        }
        let content: String = self
            .content_key()
            .chars()
            .take(FINGERPRINT_CONTENT_LEN)
            .collect();
        format!(
            "fp:{}:{}:{}",
            self.source(),
            self.timestamp().epoch_seconds(),
            content
        )
    }
}

impl UnifiedEntry for UnifiedNote {
    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
    fn timestamp(&self) -> Instant {
        self.timestamp
    }
    fn source(&self) -> EntrySource {
        self.source
    }
    fn content_key(&self) -> String {
        self.text.clone()
    }
    fn is_meaningful(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl UnifiedEntry for UnifiedPayment {
    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
    fn timestamp(&self) -> Instant {
        self.timestamp
    }
    fn source(&self) -> EntrySource {
        self.source
    }
    fn content_key(&self) -> String {
        format!("{}:{}", self.amount, self.currency)
    }
    fn is_meaningful(&self) -> bool {
        self.amount != Decimal::ZERO
    }
}

impl UnifiedEntry for UnifiedExtra {
    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
    fn timestamp(&self) -> Instant {
        self.timestamp
    }
    fn source(&self) -> EntrySource {
        self.source
    }
    fn content_key(&self) -> String {
        format!("{}:{}", self.amount, self.description)
    }
    fn is_meaningful(&self) -> bool {
        self.amount != Decimal::ZERO
    }
}

/// Reconcile an existing unified list with freshly fetched entries.
///
/// Existing entries come first, so a reprocessed external entry with a
/// key already present never displaces what is stored. Entries without
/// meaningful content are dropped. The result is sorted ascending by
/// timestamp at seconds resolution (stable, so equal-second entries
/// keep their insertion order).
#[must_use]
pub fn reconcile<T: UnifiedEntry + Clone>(existing: &[T], incoming: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut merged: Vec<T> = existing
        .iter()
        .chain(incoming.iter())
        .filter(|entry| entry.is_meaningful())
        .filter(|entry| seen.insert(entry.identity()))
        .cloned()
        .collect();
    merged.sort_by_key(|entry| entry.timestamp().epoch_seconds());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn note(external_id: Option<&str>, text: &str, secs: i64, source: EntrySource) -> UnifiedNote {
        UnifiedNote {
            timestamp: Instant::from_epoch_seconds(secs),
            actor: match source {
                EntrySource::External => "channel".to_string(),
                EntrySource::Host => "host".to_string(),
            },
            source,
            external_id: external_id.map(String::from),
            text: text.to_string(),
        }
    }

    fn payment(external_id: Option<&str>, amount: Decimal, secs: i64) -> UnifiedPayment {
        UnifiedPayment {
            timestamp: Instant::from_epoch_seconds(secs),
            actor: "channel".to_string(),
            source: EntrySource::External,
            external_id: external_id.map(String::from),
            amount,
            currency: "USD".to_string(),
            method: None,
        }
    }

    #[test]
    fn test_dedupe_by_external_id() {
        let existing = vec![note(Some("w1"), "a", 100, EntrySource::External)];
        let incoming = vec![
            note(Some("w1"), "a", 100, EntrySource::External),
            note(Some("w2"), "b", 200, EntrySource::External),
        ];
        let merged = reconcile(&existing, &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].external_id.as_deref(), Some("w1"));
        assert_eq!(merged[1].external_id.as_deref(), Some("w2"));
    }

    #[test]
    fn test_existing_entry_wins_over_reprocessed_incoming() {
        // Same external id, different text upstream: the stored copy stays.
        let existing = vec![note(Some("w1"), "host edited this", 100, EntrySource::External)];
        let incoming = vec![note(Some("w1"), "upstream version", 100, EntrySource::External)];
        let merged = reconcile(&existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "host edited this");
    }

    #[test]
    fn test_fingerprint_dedupes_entries_without_external_id() {
        let existing = vec![note(None, "call guest", 100, EntrySource::Host)];
        let incoming = vec![note(None, "call guest", 100, EntrySource::Host)];
        assert_eq!(reconcile(&existing, &incoming).len(), 1);

        // Same content from a different source is a different entry.
        let other_source = vec![note(None, "call guest", 100, EntrySource::External)];
        assert_eq!(reconcile(&existing, &other_source).len(), 2);
    }

    #[test]
    fn test_empty_and_zero_entries_dropped() {
        let notes = vec![
            note(None, "   ", 100, EntrySource::External),
            note(None, "real", 200, EntrySource::External),
        ];
        assert_eq!(reconcile(&notes, &[]).len(), 1);

        let payments = vec![
            payment(Some("p0"), Decimal::ZERO, 100),
            payment(Some("p1"), dec!(60), 200),
        ];
        let merged = reconcile(&payments, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].external_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_sorted_by_timestamp_ascending() {
        let existing = vec![note(Some("late"), "late", 900, EntrySource::Host)];
        let incoming = vec![
            note(Some("early"), "early", 100, EntrySource::External),
            note(Some("mid"), "mid", 500, EntrySource::External),
        ];
        let merged = reconcile(&existing, &incoming);
        let order: Vec<_> = merged
            .iter()
            .map(|n| n.external_id.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_long_content_fingerprint_truncated() {
        let long_a = "x".repeat(200);
        let long_b = format!("{}{}", "x".repeat(200), "tail beyond the fingerprint");
        let a = note(None, &long_a, 100, EntrySource::Host);
        let b = note(None, &long_b, 100, EntrySource::Host);
        // Identical within the truncated window: treated as the same entry.
        assert_eq!(reconcile(&[a], &[b]).len(), 1);
    }
}
