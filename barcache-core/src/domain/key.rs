use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A symbol that cannot name an artifact file inside the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid symbol {0:?}: must be non-empty without path separators or '..'")]
pub struct InvalidSymbol(pub String);

/// Bar granularity. Only daily bars are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Day,
}

impl Timespan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timespan::Day => "day",
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one cached series: one artifact file and one metadata record.
///
/// The `Display` form `{symbol}_{timespan}_{retention_window_days}` is the
/// artifact file stem and the metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub timespan: Timespan,
    pub retention_window_days: u32,
}

impl CacheKey {
    pub fn daily(
        symbol: impl Into<String>,
        retention_window_days: u32,
    ) -> Result<Self, InvalidSymbol> {
        let symbol = symbol.into();
        if symbol.is_empty()
            || symbol.contains("..")
            || symbol.contains(['/', '\\', '\0'])
        {
            return Err(InvalidSymbol(symbol));
        }
        Ok(Self {
            symbol,
            timespan: Timespan::Day,
            retention_window_days,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.symbol, self.timespan, self.retention_window_days
        )
    }
}
