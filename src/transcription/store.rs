//! Idempotent accumulation of transcript content
//!
//! Segments are keyed by their derived id and kept in first-insertion order:
//! a re-delivered segment replaces its content in place and never moves.

use super::messages::{format_time, Segment, SegmentId};
use std::collections::HashMap;

/// Rendered transcript content of the current job
#[derive(Debug, Default, Clone)]
pub struct SegmentStore {
    segments: Vec<Segment>,
    positions: HashMap<SegmentId, usize>,
    full_text: Option<String>,
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment, or replace the content of the one with the same id
    pub fn upsert(&mut self, segment: Segment) -> Upsert {
        let segment = segment.normalized();
        let id = segment.id();
        match self.positions.get(&id) {
            Some(&index) => {
                self.segments[index] = segment;
                Upsert::Replaced
            }
            None => {
                self.positions.insert(id, self.segments.len());
                self.segments.push(segment);
                Upsert::Inserted
            }
        }
    }

    /// Set the undivided transcript
    pub fn set_full_text(&mut self, text: impl Into<String>) {
        self.full_text = Some(text.into());
    }

    /// True only if nothing was ever upserted and no full text was set
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.full_text.is_none()
    }

    pub fn reset(&mut self) {
        self.segments.clear();
        self.positions.clear();
        self.full_text = None;
    }

    /// Segments in first-insertion order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.positions.get(&id).map(|&index| &self.segments[index])
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn full_text(&self) -> Option<&str> {
        self.full_text.as_deref()
    }

    /// Plain-text view of what has been rendered
    ///
    /// One line per segment when segments exist, otherwise the full text.
    /// Speaker labels follow the same rule as the rendered view.
    pub fn plain_text(&self, diarization_enabled: bool) -> String {
        if self.segments.is_empty() {
            return self.full_text.clone().unwrap_or_default();
        }

        self.segments
            .iter()
            .map(|segment| {
                let text = segment.text.trim();
                let times = format!("[{} - {}]", format_time(segment.start), format_time(segment.end));
                if diarization_enabled || segment.has_known_speaker() {
                    format!("{}: {} {}", segment.speaker, text, times)
                } else {
                    format!("{} {}", text, times)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::messages::UNKNOWN_SPEAKER;

    fn seg(start: f64, text: &str) -> Segment {
        Segment::new(UNKNOWN_SPEAKER, text, start, start + 1.0)
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = SegmentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_redelivery_replaces_in_place() {
        let mut store = SegmentStore::new();
        assert_eq!(store.upsert(seg(0.0, "a")), Upsert::Inserted);
        assert_eq!(store.upsert(seg(1.5, "first")), Upsert::Inserted);
        assert_eq!(store.upsert(seg(3.0, "c")), Upsert::Inserted);
        assert_eq!(store.upsert(seg(1.5, "second")), Upsert::Replaced);

        let texts: Vec<_> = store.segments().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "second", "c"]);
        assert_eq!(store.get(SegmentId(1500)).unwrap().text, "second");
    }

    #[test]
    fn test_converges_to_one_entry_per_id() {
        let mut store = SegmentStore::new();
        // Out of order, with duplicates; last value wins, first position sticks
        let deliveries = [
            (2.0, "b1"),
            (0.5, "a1"),
            (2.0, "b2"),
            (4.25, "c1"),
            (0.5, "a2"),
            (2.0, "b3"),
        ];
        for (start, text) in deliveries {
            store.upsert(seg(start, text));
        }

        assert_eq!(store.len(), 3);
        let ids: Vec<_> = store.segments().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![SegmentId(2000), SegmentId(500), SegmentId(4250)]);
        let texts: Vec<_> = store.segments().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["b3", "a2", "c1"]);
    }

    #[test]
    fn test_same_millisecond_shares_id() {
        let mut store = SegmentStore::new();
        store.upsert(seg(1.5001, "x"));
        assert_eq!(store.upsert(seg(1.5009, "y")), Upsert::Replaced);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_full_text_marks_non_empty() {
        let mut store = SegmentStore::new();
        store.set_full_text("");
        assert!(!store.is_empty());
        assert_eq!(store.full_text(), Some(""));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut store = SegmentStore::new();
        store.upsert(seg(0.0, "a"));
        store.set_full_text("a");
        store.reset();
        assert!(store.is_empty());
        assert!(store.get(SegmentId(0)).is_none());
        assert_eq!(store.upsert(seg(0.0, "b")), Upsert::Inserted);
    }

    #[test]
    fn test_plain_text_speaker_rule() {
        let mut store = SegmentStore::new();
        store.upsert(Segment::new(UNKNOWN_SPEAKER, " hi ", 0.0, 2.0));
        store.upsert(Segment::new("SPEAKER_01", "there", 62.0, 65.5));

        assert_eq!(
            store.plain_text(false),
            "hi [00:00 - 00:02]\nSPEAKER_01: there [01:02 - 01:05]"
        );
        assert_eq!(
            store.plain_text(true),
            "UNKNOWN: hi [00:00 - 00:02]\nSPEAKER_01: there [01:02 - 01:05]"
        );
    }

    #[test]
    fn test_plain_text_falls_back_to_full_text() {
        let mut store = SegmentStore::new();
        assert_eq!(store.plain_text(false), "");
        store.set_full_text("whole transcript");
        assert_eq!(store.plain_text(false), "whole transcript");
    }
}
