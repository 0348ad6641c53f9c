//! Market-data acquisition and the incremental on-disk cache.

pub mod cache;
pub mod meta;
pub mod polygon;
pub mod provider;
pub mod rate_limit;
pub mod reconcile;
pub mod retention;
pub mod sweep;

pub use cache::{ArtifactInfo, CacheError, CacheStore};
pub use meta::{MetadataIndex, MetadataRecord};
pub use polygon::PolygonClient;
pub use provider::{DataError, FetchClient, TransportError};
pub use rate_limit::{RateLimitedClient, RateLimiter};
pub use reconcile::{plan_fetch, FetchPlan, Reconciler, ReconcilerOptions};
pub use retention::RetentionTrimmer;
pub use sweep::{CacheSweeper, SweepReport};
