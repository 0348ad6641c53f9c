//! Startup sweep of expired cache files.
//!
//! Deletes artifacts, leftover temp files and quarantined files whose
//! modification time is more than `expiry_days` old. The metadata sidecar is
//! never touched here; the caller drops the records of swept keys.

use super::cache::{file_age_days, CacheError, ARTIFACT_EXT, QUARANTINE_EXT, TMP_EXT};
use super::meta::META_FILE;
use std::fs;
use std::path::{Path, PathBuf};

/// What a sweep removed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    /// Key strings of artifacts that were deleted.
    pub swept_keys: Vec<String>,
    /// Other files deleted (temporary or quarantined leftovers).
    pub swept_other: Vec<PathBuf>,
    /// Expired files that could not be deleted.
    pub failed: Vec<PathBuf>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.swept_keys.len() + self.swept_other.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSweeper {
    expiry_days: u32,
}

impl CacheSweeper {
    pub fn new(expiry_days: u32) -> Self {
        Self { expiry_days }
    }

    /// Scan `cache_dir` once and delete every expired cache file.
    pub fn sweep(&self, cache_dir: &Path) -> Result<SweepReport, CacheError> {
        let mut report = SweepReport::default();
        let threshold = f64::from(self.expiry_days);

        for entry in fs::read_dir(cache_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == META_FILE {
                continue;
            }

            let kind = classify(name);
            if kind == FileKind::Foreign {
                continue;
            }

            let Some(age_days) = file_age_days(&path) else {
                continue;
            };
            if age_days <= threshold {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => match kind {
                    FileKind::Artifact(key) => report.swept_keys.push(key),
                    _ => report.swept_other.push(path),
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to sweep expired file");
                    report.failed.push(path);
                }
            }
        }

        report.swept_keys.sort();
        if report.removed() > 0 {
            tracing::info!(
                dir = %cache_dir.display(),
                artifacts = report.swept_keys.len(),
                other = report.swept_other.len(),
                expiry_days = self.expiry_days,
                "swept expired cache files"
            );
        }
        Ok(report)
    }
}

#[derive(Debug, PartialEq)]
enum FileKind {
    Artifact(String),
    Leftover,
    Foreign,
}

fn classify(name: &str) -> FileKind {
    if name.ends_with(&format!(".{TMP_EXT}"))
        || name.ends_with(&format!(".{QUARANTINE_EXT}"))
        || name.ends_with(".json.tmp")
    {
        return FileKind::Leftover;
    }
    match name.strip_suffix(&format!(".{ARTIFACT_EXT}")) {
        Some(stem) if !stem.is_empty() => FileKind::Artifact(stem.to_string()),
        _ => FileKind::Foreign,
    }
}
