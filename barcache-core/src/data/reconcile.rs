//! Incremental fetch reconciliation.
//!
//! For a `(symbol, [start, end])` request the reconciler decides how much must
//! come from upstream, merges it into the cached series, applies retention and
//! writes it back together with the key's metadata record. The caller gets the
//! rows inside `[start, end]`; the request window never shrinks what is stored.
//!
//! Fetch-mode rules, first match wins:
//! 1. forced full fetch → fetch `[start, end]`, replace the entry
//! 2. metadata present and `end > meta.end` → fetch the single day after `meta.end`, merge
//! 3. cached entry non-empty → fetch `[latest + 1, end]` if that start is before `end`, merge
//! 4. otherwise (miss) → fetch `[start, end]`
//!
//! Rules 2 and 3 are kept distinct: the sidecar and the artifact can drift apart
//! (an artifact evicted while its record survives), and rule 3 is the fallback
//! when there is no usable record.

use super::cache::CacheStore;
use super::meta::{MetadataIndex, MetadataRecord};
use super::polygon::PolygonClient;
use super::provider::{DataError, FetchClient};
use super::rate_limit::{RateLimitedClient, RateLimiter};
use super::retention::RetentionTrimmer;
use super::sweep::{CacheSweeper, SweepReport};
use crate::clock::{Clock, SystemClock};
use crate::config::MarketDataConfig;
use crate::domain::{CacheEntry, CacheKey};
use chrono::{Duration, NaiveDate};
use std::path::PathBuf;

/// The fetch decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Forced refetch of the whole window; result replaces the cache.
    Full { start: NaiveDate, end: NaiveDate },
    /// Single day following the metadata's recorded end.
    DiffByMetadata { start: NaiveDate, end: NaiveDate },
    /// Tail after the cached entry's most recent row.
    DiffByEntry { start: NaiveDate, end: NaiveDate },
    /// Cached entry already reaches the requested end; no fetch.
    Covered,
    /// Nothing usable cached; fetch the whole window.
    Miss { start: NaiveDate, end: NaiveDate },
}

impl FetchPlan {
    /// Upstream window to request, if any.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            FetchPlan::Full { start, end }
            | FetchPlan::DiffByMetadata { start, end }
            | FetchPlan::DiffByEntry { start, end }
            | FetchPlan::Miss { start, end } => Some((start, end)),
            FetchPlan::Covered => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchPlan::Full { .. } => "full",
            FetchPlan::DiffByMetadata { .. } => "diff-metadata",
            FetchPlan::DiffByEntry { .. } => "diff-entry",
            FetchPlan::Covered => "covered",
            FetchPlan::Miss { .. } => "miss",
        }
    }
}

/// Pick the fetch mode for a request.
pub fn plan_fetch(
    entry: Option<&CacheEntry>,
    meta: Option<&MetadataRecord>,
    start: NaiveDate,
    end: NaiveDate,
    force_full_fetch: bool,
) -> FetchPlan {
    if force_full_fetch {
        return FetchPlan::Full { start, end };
    }

    if let Some(meta) = meta {
        if end > meta.range_end {
            let day = meta.range_end + Duration::days(1);
            return FetchPlan::DiffByMetadata {
                start: day,
                end: day,
            };
        }
    }

    if let Some(latest) = entry.and_then(CacheEntry::latest) {
        let next = latest.date() + Duration::days(1);
        return if next < end {
            FetchPlan::DiffByEntry { start: next, end }
        } else {
            FetchPlan::Covered
        };
    }

    FetchPlan::Miss { start, end }
}

/// Settings for opening a reconciler on a cache directory.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub cache_dir: PathBuf,
    pub cache_expiry_days: u32,
    pub retention_window_days: u32,
    pub discard_old_data: bool,
    pub force_full_fetch: bool,
}

impl ReconcilerOptions {
    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self {
            cache_dir: config.cache.dir.clone(),
            cache_expiry_days: config.cache.expiry_days,
            retention_window_days: config.data.keep_days,
            discard_old_data: config.data.discard_old_data,
            force_full_fetch: config.cache.force_full_fetch,
        }
    }
}

/// Owns the cache store, the metadata index and the upstream client for one
/// cache directory. Not safe to share a directory between processes.
pub struct Reconciler<C> {
    client: C,
    store: CacheStore,
    index: MetadataIndex,
    trimmer: RetentionTrimmer,
    retention_window_days: u32,
    force_full_fetch: bool,
    clock: Box<dyn Clock>,
    startup_sweep: SweepReport,
}

impl Reconciler<Box<dyn FetchClient>> {
    /// Build the production stack: Polygon client, optional rate limiter,
    /// system clock. Credential problems fail here, before any fetch.
    pub fn from_config(config: &MarketDataConfig) -> Result<Self, DataError> {
        let polygon = PolygonClient::new(
            config.api_key(),
            config.polygon.base_url.clone(),
            config.request_timeout(),
        )?;

        let client: Box<dyn FetchClient> = match config.rate_limit {
            Some(rl) => Box::new(RateLimitedClient::new(
                polygon,
                RateLimiter::new(rl.max_calls, std::time::Duration::from_secs(rl.period_secs)),
            )),
            None => Box::new(polygon),
        };

        Self::open(client, ReconcilerOptions::from_config(config))
    }
}

impl<C: FetchClient> Reconciler<C> {
    /// Open the cache directory, sweep expired files and load the sidecar.
    pub fn open(client: C, options: ReconcilerOptions) -> Result<Self, DataError> {
        let store = CacheStore::open(&options.cache_dir, options.cache_expiry_days)?;

        let startup_sweep = CacheSweeper::new(options.cache_expiry_days)
            .sweep(store.cache_dir())
            .unwrap_or_else(|e| {
                tracing::warn!(dir = %store.cache_dir().display(), error = %e, "startup sweep failed");
                SweepReport::default()
            });

        let mut index = MetadataIndex::load(MetadataIndex::path_in(store.cache_dir()));
        let dropped = startup_sweep
            .swept_keys
            .iter()
            .filter(|key| index.remove(key).is_some())
            .count();
        if dropped > 0 {
            if let Err(e) = index.save() {
                tracing::warn!(error = %e, "failed to save metadata after sweep");
            }
        }

        Ok(Self {
            client,
            store,
            index,
            trimmer: RetentionTrimmer::new(options.discard_old_data),
            retention_window_days: options.retention_window_days,
            force_full_fetch: options.force_full_fetch,
            clock: Box::new(SystemClock),
            startup_sweep,
        })
    }

    /// Replace the wall clock (tests, replays).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Fetch daily bars for `symbol` over `[start, end]` using the configured
    /// full-fetch setting.
    pub fn fetch(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CacheEntry, DataError> {
        self.fetch_with(symbol, start, end, self.force_full_fetch)
    }

    /// Fetch daily bars for `symbol` over `[start, end]`.
    ///
    /// Only transport failures are returned as errors; in that case nothing is
    /// written. Cache write failures are logged and the data still returned.
    pub fn fetch_with(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        force_full_fetch: bool,
    ) -> Result<CacheEntry, DataError> {
        let key = CacheKey::daily(symbol, self.retention_window_days)?;
        let key_str = key.to_string();

        let cached = self.store.get(&key);
        let meta = self.index.get(&key_str).copied();
        let plan = plan_fetch(cached.as_ref(), meta.as_ref(), start, end, force_full_fetch);

        tracing::info!(
            key = %key_str,
            mode = plan.label(),
            window = ?plan.window(),
            cached_rows = cached.as_ref().map_or(0, CacheEntry::len),
            "reconciling"
        );

        let merged = match plan {
            FetchPlan::Full { start, end } | FetchPlan::Miss { start, end } => {
                CacheEntry::from_unsorted(self.client.fetch(symbol, start, end)?)
            }
            FetchPlan::DiffByMetadata { start, end } | FetchPlan::DiffByEntry { start, end } => {
                let fetched = self.client.fetch(symbol, start, end)?;
                let mut entry = cached.unwrap_or_default();
                let added = entry.merge(fetched);
                tracing::debug!(key = %key_str, added, "merged diff rows");
                entry
            }
            FetchPlan::Covered => cached.unwrap_or_default(),
        };

        let now = self.clock.now();
        let today = self.clock.today();
        let retained = self
            .trimmer
            .retain_recent(merged, self.retention_window_days, today);
        let view = self
            .trimmer
            .trim(retained.clone(), start, end, self.retention_window_days, today);

        if let Err(e) = self.store.put(&key, &retained) {
            tracing::warn!(key = %key_str, error = %e, "failed to persist cache entry");
            return Ok(view);
        }

        if let Some((range_start, range_end)) = retained.date_range() {
            let last_updated = meta.map_or(now.timestamp(), |m| m.last_updated.max(now.timestamp()));
            self.index.set(
                key_str.clone(),
                MetadataRecord {
                    range_start,
                    range_end,
                    last_updated,
                },
            );
            if let Err(e) = self.index.save() {
                tracing::warn!(key = %key_str, error = %e, "failed to save metadata sidecar");
            }
        }

        Ok(view)
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.index
    }

    /// What the sweep at construction removed.
    pub fn startup_sweep(&self) -> &SweepReport {
        &self.startup_sweep
    }
}
