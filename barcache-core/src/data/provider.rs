//! FetchClient trait and structured error types.
//!
//! The FetchClient trait abstracts over the upstream time-series API so the
//! reconciler can be driven by the Polygon client in production and by a
//! scripted mock in tests. The cache layer sits above this trait; clients
//! don't know about the cache.

use crate::domain::{Bar, InvalidSymbol};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single upstream fetch. Never retried inside the core.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("HTTP {status} for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider reported an error: {0}")]
    Provider(String),
}

/// Hard failures surfaced to callers of the market-data layer.
///
/// Cache-layer anomalies are not represented here: they degrade to a cache
/// miss inside the store and index.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InvalidSymbol(#[from] InvalidSymbol),

    #[error("cache directory {path}: {source}")]
    CacheDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Upstream source of daily bars.
///
/// The returned rows may come in any order and may overlap already-cached
/// rows; the reconciler normalizes them.
pub trait FetchClient: Send + Sync {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Fetch daily bars for `symbol` over the inclusive range `[start, end]`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<Bar>, TransportError>;
}

impl<T: FetchClient + ?Sized> FetchClient for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, TransportError> {
        (**self).fetch(symbol, start, end)
    }
}

impl<T: FetchClient + ?Sized> FetchClient for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, TransportError> {
        (**self).fetch(symbol, start, end)
    }
}

impl<T: FetchClient + ?Sized> FetchClient for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, TransportError> {
        (**self).fetch(symbol, start, end)
    }
}
