//! Metadata sidecar: per-key date coverage and last-update time.
//!
//! Stored as `{cache_dir}/meta.json`:
//!
//! ```json
//! { "SPY_day_260": { "start": "2024-01-02", "end": "2024-03-28", "last_updated": 1711670400 } }
//! ```

use super::cache::CacheError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const META_FILE: &str = "meta.json";

/// Coverage record for one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "start")]
    pub range_start: NaiveDate,
    #[serde(rename = "end")]
    pub range_end: NaiveDate,
    /// Epoch seconds of the last fetch that produced rows.
    pub last_updated: i64,
}

/// In-memory view of the sidecar file. Loaded once, saved after each mutating fetch.
#[derive(Debug)]
pub struct MetadataIndex {
    path: PathBuf,
    records: BTreeMap<String, MetadataRecord>,
}

impl MetadataIndex {
    /// Sidecar location for a cache directory.
    pub fn path_in(cache_dir: &Path) -> PathBuf {
        cache_dir.join(META_FILE)
    }

    /// Load the sidecar at `path`. Absent or unreadable files yield an empty
    /// index; records with `start > end` are dropped.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, MetadataRecord>>(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt metadata sidecar");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "metadata sidecar unreadable");
                BTreeMap::new()
            }
        };

        let mut index = Self { path, records };
        index.records.retain(|key, rec| {
            let valid = rec.range_start <= rec.range_end;
            if !valid {
                tracing::warn!(%key, "dropping metadata record with inverted range");
            }
            valid
        });
        index
    }

    /// Write the full index (tmp + rename).
    pub fn save(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| CacheError::Schema(format!("meta serialization: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&MetadataRecord> {
        self.records.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, record: MetadataRecord) {
        self.records.insert(key.into(), record);
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataRecord> {
        self.records.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
