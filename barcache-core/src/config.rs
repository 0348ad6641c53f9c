//! Market-data configuration, loaded from TOML.
//!
//! ```toml
//! [polygon]
//! api_key = "..."            # or leave empty and export POLYGON_API_KEY
//!
//! [cache]
//! dir = "market_cache"
//! expiry_days = 3
//! force_full_fetch = false
//!
//! [data]
//! keep_days = 260
//! discard_old_data = true
//!
//! [rate_limit]               # optional
//! max_calls = 5
//! period_secs = 60
//! ```

use crate::data::polygon::DEFAULT_BASE_URL;
use crate::data::DataError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "POLYGON_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub polygon: PolygonConfig,
    pub cache: CacheConfig,
    pub data: RetentionConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Artifacts older than this many days are evicted on read and swept at startup.
    pub expiry_days: u32,
    /// Ignore cached rows and refetch the whole requested window.
    pub force_full_fetch: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("market_cache"),
            expiry_days: 3,
            force_full_fetch: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Retention window in days; also part of the cache key.
    pub keep_days: u32,
    pub discard_old_data: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_days: 260,
            discard_old_data: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub period_secs: u64,
}

impl MarketDataConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::Configuration(format!("read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DataError::Configuration(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DataError> {
        if let Some(rl) = &self.rate_limit {
            if rl.max_calls == 0 || rl.period_secs == 0 {
                return Err(DataError::Configuration(
                    "rate_limit.max_calls and rate_limit.period_secs must be positive".into(),
                ));
            }
        }
        if self.polygon.timeout_secs == 0 {
            return Err(DataError::Configuration(
                "polygon.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The configured API key, falling back to `POLYGON_API_KEY` when the
    /// file leaves it blank.
    pub fn api_key(&self) -> String {
        if !self.polygon.api_key.trim().is_empty() {
            return self.polygon.api_key.clone();
        }
        std::env::var(API_KEY_ENV).unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.polygon.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let cfg = MarketDataConfig::from_toml("[polygon]\napi_key = \"abc\"\n").unwrap();
        assert_eq!(cfg.cache.expiry_days, 3);
        assert_eq!(cfg.cache.dir, PathBuf::from("market_cache"));
        assert!(!cfg.cache.force_full_fetch);
        assert_eq!(cfg.data.keep_days, 260);
        assert!(cfg.data.discard_old_data);
        assert!(cfg.rate_limit.is_none());
        assert_eq!(cfg.api_key(), "abc");
    }

    #[test]
    fn full_config_parses() {
        let cfg = MarketDataConfig::from_toml(
            r#"
[polygon]
api_key = "abc"
base_url = "http://localhost:9999"

[cache]
dir = "/tmp/bars"
expiry_days = 1
force_full_fetch = true

[data]
keep_days = 365
discard_old_data = false

[rate_limit]
max_calls = 5
period_secs = 60
"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.expiry_days, 1);
        assert!(cfg.cache.force_full_fetch);
        assert_eq!(cfg.data.keep_days, 365);
        assert_eq!(cfg.rate_limit.unwrap().max_calls, 5);
        assert_eq!(cfg.polygon.base_url, "http://localhost:9999");
    }

    #[test]
    fn example_config_parses() {
        let cfg = MarketDataConfig::from_toml(include_str!("../../barcache.example.toml")).unwrap();
        assert_eq!(cfg.cache.expiry_days, 3);
        assert_eq!(cfg.rate_limit.unwrap().period_secs, 60);
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = MarketDataConfig::from_toml("[cache\nexpiry_days = ").unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let err = MarketDataConfig::from_toml("[rate_limit]\nmax_calls = 0\nperiod_secs = 60\n")
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }
}
