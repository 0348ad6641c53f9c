//! barcache core — incremental daily-bar cache.
//!
//! This crate decides, for a requested `(symbol, date range)`, whether cached
//! bars suffice and what must be fetched upstream:
//! - Domain types (bars, cache keys, ordered de-duplicated entries)
//! - FetchClient contract, Polygon.io client, rate-limit decorator
//! - Parquet artifact store with lazy expiry and atomic writes
//! - Metadata sidecar, retention trimming, startup sweep
//! - The reconciler tying them together

pub mod clock;
pub mod config;
pub mod data;
pub mod domain;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::MarketDataConfig;
pub use data::{DataError, FetchClient, Reconciler, TransportError};
pub use domain::{Bar, CacheEntry, CacheKey};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads by callers are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Bar>();
        require_sync::<Bar>();
        require_send::<CacheEntry>();
        require_sync::<CacheEntry>();
        require_send::<CacheKey>();
        require_sync::<CacheKey>();
        require_send::<data::MetadataRecord>();
        require_sync::<data::MetadataRecord>();
        require_send::<data::PolygonClient>();
        require_sync::<data::PolygonClient>();
        require_send::<data::RateLimitedClient<data::PolygonClient>>();
        require_sync::<data::RateLimitedClient<data::PolygonClient>>();
        require_send::<DataError>();
        require_sync::<DataError>();
    }

    /// Architecture contract: FetchClient is object-safe so decorators and
    /// mocks can be swapped behind `Box<dyn FetchClient>`.
    #[test]
    fn fetch_client_is_object_safe() {
        fn _accepts(_: &dyn FetchClient) {}
    }
}
