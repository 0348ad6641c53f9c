//! Parquet-backed artifact store, one file per cache key.
//!
//! Layout: `{cache_dir}/{symbol}_{timespan}_{retention}.parquet`
//!
//! - Atomic writes (write to .tmp, fsync, rename into place)
//! - Lazy eviction: an artifact older than the expiry threshold is deleted on read
//! - Schema validation on load; unreadable files are quarantined and read as a miss
//! - Per-instance memo of decoded entries, valid only while the artifact is fresh

use super::provider::DataError;
use crate::domain::{Bar, CacheEntry, CacheKey};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub const ARTIFACT_EXT: &str = "parquet";
pub const TMP_EXT: &str = "parquet.tmp";
pub const QUARANTINE_EXT: &str = "parquet.quarantined";

const COLUMNS: [&str; 6] = ["t", "o", "h", "l", "c", "v"];
const SECS_PER_DAY: f64 = 86_400.0;

/// Soft failures of the cache layer. Logged, then treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("schema mismatch: {0}")]
    Schema(String),
}

/// Summary of one artifact on disk.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub age_days: f64,
}

/// On-disk store for cache entries.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    expiry_days: u32,
    memo: HashMap<CacheKey, CacheEntry>,
}

impl CacheStore {
    /// Open (and create if needed) a cache directory.
    pub fn open(cache_dir: impl Into<PathBuf>, expiry_days: u32) -> Result<Self, DataError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|source| DataError::CacheDir {
            path: cache_dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            cache_dir,
            expiry_days,
            memo: HashMap::new(),
        })
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn expiry_days(&self) -> u32 {
        self.expiry_days
    }

    /// Path to the artifact for a key.
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{key}.{ARTIFACT_EXT}"))
    }

    /// Load the entry for `key`, or `None` on a miss.
    ///
    /// A miss covers: no artifact, an expired artifact (deleted here), and an
    /// artifact that fails to decode (quarantined here).
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.artifact_path(key);

        let Some(age_days) = file_age_days(&path) else {
            self.memo.remove(key);
            tracing::debug!(%key, "cache miss: no artifact");
            return None;
        };

        if age_days >= f64::from(self.expiry_days) {
            tracing::info!(%key, age_days, expiry_days = self.expiry_days, "evicting expired artifact");
            self.memo.remove(key);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete expired artifact");
            }
            return None;
        }

        if let Some(entry) = self.memo.get(key) {
            tracing::debug!(%key, rows = entry.len(), "cache hit (memo)");
            return Some(entry.clone());
        }

        match read_artifact(&path) {
            Ok(entry) => {
                tracing::debug!(%key, rows = entry.len(), "cache hit (disk)");
                self.memo.insert(key.clone(), entry.clone());
                Some(entry)
            }
            Err(e) => {
                let quarantine = path.with_extension(QUARANTINE_EXT);
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "quarantining unreadable artifact"
                );
                let _ = fs::rename(&path, &quarantine);
                None
            }
        }
    }

    /// Persist `entry` for `key`, replacing any previous artifact atomically.
    pub fn put(&mut self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.artifact_path(key);
        write_artifact(entry, &path)?;
        self.memo.insert(key.clone(), entry.clone());
        Ok(())
    }

    /// Delete the artifact for `key`. Returns whether a file was removed.
    pub fn remove(&mut self, key: &CacheKey) -> Result<bool, CacheError> {
        self.memo.remove(key);
        let path = self.artifact_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate artifacts currently on disk, sorted by key.
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>, CacheError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            out.push(ArtifactInfo {
                key,
                size_bytes,
                age_days: file_age_days(&path).unwrap_or(0.0),
                path,
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

/// Age of a file in fractional days from its modification time, or `None`
/// if it does not exist. Modification times in the future count as age zero.
pub(crate) fn file_age_days(path: &Path) -> Option<f64> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Some(age.as_secs_f64() / SECS_PER_DAY)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert an entry to a Polars DataFrame with the artifact column layout.
fn entry_to_dataframe(entry: &CacheEntry) -> Result<DataFrame, CacheError> {
    let rows = entry.rows();
    let ts: Vec<i64> = rows.iter().map(|b| b.timestamp_ms).collect();
    let opens: Vec<f64> = rows.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = rows.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = rows.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = rows.iter().map(|b| b.close).collect();
    let volumes: Vec<i64> = rows.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("t".into(), ts),
        Column::new("o".into(), opens),
        Column::new("h".into(), highs),
        Column::new("l".into(), lows),
        Column::new("c".into(), closes),
        Column::new("v".into(), volumes),
    ])
    .map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))
}

/// Write an entry to `path` via a temporary sibling and an atomic rename.
pub fn write_artifact(entry: &CacheEntry, path: &Path) -> Result<(), CacheError> {
    let mut df = entry_to_dataframe(entry)?;
    let tmp_path = path.with_extension(TMP_EXT);

    match write_then_rename(&mut df, &tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Clean up temp file on failure
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_then_rename(df: &mut DataFrame, tmp_path: &Path, path: &Path) -> Result<(), CacheError> {
    let mut file = fs::File::create(tmp_path)?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .map_err(|e| CacheError::Parquet(format!("write parquet: {e}")))?;
    file.sync_all()?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Load an artifact and validate its schema.
pub fn read_artifact(path: &Path) -> Result<CacheEntry, CacheError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Parquet(format!("read: {e}")))?;

    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(CacheError::Schema(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_entry(&df)
}

/// Convert a validated DataFrame back into an entry.
fn dataframe_to_entry(df: &DataFrame) -> Result<CacheEntry, CacheError> {
    let typed = |name: &str, e: PolarsError| CacheError::Schema(format!("{name} column type: {e}"));
    let column = |name: &str| {
        df.column(name)
            .map_err(|e| CacheError::Schema(format!("column {name}: {e}")))
    };

    let ts = column("t")?;
    let ts = ts.i64().map_err(|e| typed("t", e))?;
    let opens = column("o")?;
    let opens = opens.f64().map_err(|e| typed("o", e))?;
    let highs = column("h")?;
    let highs = highs.f64().map_err(|e| typed("h", e))?;
    let lows = column("l")?;
    let lows = lows.f64().map_err(|e| typed("l", e))?;
    let closes = column("c")?;
    let closes = closes.f64().map_err(|e| typed("c", e))?;
    let volumes = column("v")?;
    let volumes = volumes.i64().map_err(|e| typed("v", e))?;

    let null_at = |col: &str, i: usize| CacheError::Schema(format!("null {col} at row {i}"));

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        bars.push(Bar {
            timestamp_ms: ts.get(i).ok_or_else(|| null_at("t", i))?,
            open: opens.get(i).ok_or_else(|| null_at("o", i))?,
            high: highs.get(i).ok_or_else(|| null_at("h", i))?,
            low: lows.get(i).ok_or_else(|| null_at("l", i))?,
            close: closes.get(i).ok_or_else(|| null_at("c", i))?,
            volume: volumes.get(i).ok_or_else(|| null_at("v", i))?,
        });
    }

    Ok(CacheEntry::from_unsorted(bars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn sample_entry() -> CacheEntry {
        CacheEntry::from_unsorted(vec![
            Bar::on_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 100.0, 102.0, 99.0, 101.0, 1000),
            Bar::on_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 101.0, 103.0, 100.0, 102.0, 1100),
        ])
    }

    fn age_file(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * 86_400);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn put_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::daily("SPY", 260).unwrap();

        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        store.put(&key, &sample_entry()).unwrap();
        assert!(dir.path().join("SPY_day_260.parquet").exists());
        assert!(!dir.path().join("SPY_day_260.parquet.tmp").exists());

        // Fresh store: no memo, must decode from disk
        let mut reopened = CacheStore::open(dir.path(), 3).unwrap();
        let loaded = reopened.get(&key).unwrap();
        assert_eq!(loaded, sample_entry());
        assert_eq!(loaded.latest().unwrap().close, 102.0);
    }

    #[test]
    fn empty_entry_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::daily("NONE", 260).unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        store.put(&key, &CacheEntry::empty()).unwrap();

        let mut reopened = CacheStore::open(dir.path(), 3).unwrap();
        assert_eq!(reopened.get(&key), Some(CacheEntry::empty()));
    }

    #[test]
    fn missing_artifact_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        assert!(store.get(&CacheKey::daily("QQQ", 260).unwrap()).is_none());
    }

    #[test]
    fn expired_artifact_is_evicted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::daily("SPY", 260).unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        store.put(&key, &sample_entry()).unwrap();

        age_file(&store.artifact_path(&key), 4);

        assert!(store.get(&key).is_none());
        assert!(!store.artifact_path(&key).exists());
    }

    #[test]
    fn corrupt_artifact_is_quarantined_and_missed() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::daily("BAD", 260).unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        fs::write(store.artifact_path(&key), b"definitely not parquet").unwrap();

        assert!(store.get(&key).is_none());
        assert!(!store.artifact_path(&key).exists());
        assert!(dir.path().join("BAD_day_260.parquet.quarantined").exists());
    }

    #[test]
    fn externally_deleted_artifact_drops_memo() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::daily("SPY", 260).unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        store.put(&key, &sample_entry()).unwrap();
        fs::remove_file(store.artifact_path(&key)).unwrap();

        assert!(store.get(&key).is_none());
    }

    #[test]
    fn list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CacheStore::open(dir.path(), 3).unwrap();
        store.put(&CacheKey::daily("B", 10).unwrap(), &sample_entry()).unwrap();
        store.put(&CacheKey::daily("A", 10).unwrap(), &sample_entry()).unwrap();
        fs::write(dir.path().join("meta.json"), "{}").unwrap();

        let keys: Vec<String> = store.list_artifacts().unwrap().into_iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["A_day_10", "B_day_10"]);

        assert!(store.remove(&CacheKey::daily("A", 10).unwrap()).unwrap());
        assert!(!store.remove(&CacheKey::daily("A", 10).unwrap()).unwrap());
        assert_eq!(store.list_artifacts().unwrap().len(), 1);
    }
}
