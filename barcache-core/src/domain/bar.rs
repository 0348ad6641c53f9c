//! Bar: one daily OHLCV record as delivered by the aggregates API.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar keyed by the UTC start-of-day timestamp in milliseconds.
///
/// Field names on the wire match the aggregates payload (`t`, `o`, `h`, `l`, `c`, `v`),
/// which is also the column layout of the on-disk artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: i64,
}

impl Bar {
    /// Build a bar stamped at the start of `date` (UTC).
    pub fn on_date(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            timestamp_ms: day_start_ms(date),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// UTC calendar date of this bar.
    pub fn date(&self) -> NaiveDate {
        date_of_ms(self.timestamp_ms)
    }
}

/// UTC calendar date containing the given epoch-millisecond instant.
///
/// Out-of-range instants collapse to the epoch date.
pub fn date_of_ms(timestamp_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .date_naive()
}

/// Epoch milliseconds of 00:00:00 UTC on `date`.
pub fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_roundtrips_through_start_of_day() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let bar = Bar::on_date(d, 1.0, 2.0, 0.5, 1.5, 10);
        assert_eq!(bar.timestamp_ms, 1_704_844_800_000);
        assert_eq!(bar.date(), d);
    }

    #[test]
    fn intraday_timestamp_maps_to_same_date() {
        // 2024-01-10 21:00 UTC (a typical session-close stamp)
        assert_eq!(
            date_of_ms(1_704_920_400_000),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
    }

    #[test]
    fn deserializes_wire_names() {
        let bar: Bar =
            serde_json::from_str(r#"{"t":1704844800000,"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":10}"#)
                .unwrap();
        assert_eq!(bar.volume, 10);
        assert_eq!(bar.close, 1.5);
    }
}
