//! CacheEntry: the ordered, de-duplicated bar series held for one key.
//!
//! Rows are kept sorted strictly descending by timestamp (most recent first).
//! Every constructor and mutator re-establishes that invariant, so callers can
//! rely on `rows()[0]` being the latest bar.

use super::bar::Bar;
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    rows: Vec<Bar>,
}

impl CacheEntry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize arbitrary provider output: sort descending, drop repeated
    /// timestamps (the first occurrence in input order wins).
    pub fn from_unsorted(bars: Vec<Bar>) -> Self {
        let mut seen = HashSet::with_capacity(bars.len());
        let mut rows: Vec<Bar> = bars
            .into_iter()
            .filter(|b| seen.insert(b.timestamp_ms))
            .collect();
        rows.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Self { rows }
    }

    pub fn rows(&self) -> &[Bar] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent bar.
    pub fn latest(&self) -> Option<&Bar> {
        self.rows.first()
    }

    /// Oldest bar.
    pub fn earliest(&self) -> Option<&Bar> {
        self.rows.last()
    }

    /// `(oldest date, newest date)`, or `None` when empty.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.earliest()?.date(), self.latest()?.date()))
    }

    /// Merge freshly fetched rows into this entry.
    ///
    /// Incoming rows whose timestamp is already held are discarded; existing
    /// rows are never overwritten. Returns the number of rows added.
    pub fn merge(&mut self, incoming: Vec<Bar>) -> usize {
        let mut known: HashSet<i64> = self.rows.iter().map(|b| b.timestamp_ms).collect();
        let before = self.rows.len();
        for bar in incoming {
            if known.insert(bar.timestamp_ms) {
                self.rows.push(bar);
            }
        }
        let added = self.rows.len() - before;
        if added > 0 {
            self.rows.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        }
        added
    }

    /// Keep only rows matching `keep`. Order is preserved.
    pub fn retain(&mut self, keep: impl FnMut(&Bar) -> bool) {
        self.rows.retain(keep);
    }

    /// True if rows are strictly descending by timestamp.
    pub fn is_strictly_descending(&self) -> bool {
        self.rows
            .windows(2)
            .all(|w| w[0].timestamp_ms > w[1].timestamp_ms)
    }
}
