//! Request-window filtering and age-based retention.

use crate::domain::CacheEntry;
use chrono::{Duration, NaiveDate};

/// Trims an entry to the requested window and, when enabled, to the
/// retention horizon.
#[derive(Debug, Clone, Copy)]
pub struct RetentionTrimmer {
    pub discard_old_data: bool,
}

impl RetentionTrimmer {
    pub fn new(discard_old_data: bool) -> Self {
        Self { discard_old_data }
    }

    /// Keep rows with `start <= date <= end`; additionally drop rows dated
    /// before `today - retention_window_days` when retention is on.
    /// Descending order is preserved.
    pub fn trim(
        &self,
        entry: CacheEntry,
        start: NaiveDate,
        end: NaiveDate,
        retention_window_days: u32,
        today: NaiveDate,
    ) -> CacheEntry {
        window(self.retain_recent(entry, retention_window_days, today), start, end)
    }

    /// Age-based half of [`trim`](Self::trim). This is what gets persisted:
    /// a narrow request must not shrink the cached series.
    pub fn retain_recent(
        &self,
        mut entry: CacheEntry,
        retention_window_days: u32,
        today: NaiveDate,
    ) -> CacheEntry {
        if self.discard_old_data {
            let cutoff = retention_cutoff(today, retention_window_days);
            entry.retain(|bar| bar.date() >= cutoff);
        }
        entry
    }
}

fn window(mut entry: CacheEntry, start: NaiveDate, end: NaiveDate) -> CacheEntry {
    entry.retain(|bar| {
        let date = bar.date();
        date >= start && date <= end
    });
    entry
}

/// Oldest date allowed to remain cached.
pub fn retention_cutoff(today: NaiveDate, retention_window_days: u32) -> NaiveDate {
    today - Duration::days(i64::from(retention_window_days))
}
