//! barcache CLI — fetch and cache management commands.
//!
//! Commands:
//! - `fetch`: reconcile daily bars for symbols against the local cache
//! - `cache status`: report cached keys, date ranges and artifact sizes
//! - `cache sweep`: delete expired artifacts now

use anyhow::{Context, Result};
use barcache_core::data::cache::read_artifact;
use barcache_core::data::{CacheStore, CacheSweeper, MetadataIndex, Reconciler};
use barcache_core::MarketDataConfig;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barcache",
    about = "barcache: incremental daily-bar cache for the Polygon.io aggregates API"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when absent.
    #[arg(long, global = true, default_value = "barcache.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily bars, downloading only what the cache lacks.
    Fetch {
        /// Symbols to fetch (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to the retention window before `end`.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        end: Option<String>,

        /// Refetch the whole window, replacing cached rows.
        #[arg(long, default_value_t = false)]
        force_full: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached keys, date ranges and artifact sizes.
    Status,
    /// Delete artifacts older than the configured expiry.
    Sweep,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch {
            symbols,
            start,
            end,
            force_full,
        } => run_fetch(&config, symbols, start, end, force_full),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Sweep => run_cache_sweep(&config),
        },
    }
}

fn load_config(path: &Path) -> Result<MarketDataConfig> {
    if path.exists() {
        Ok(MarketDataConfig::from_file(path)?)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(MarketDataConfig::default())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn run_fetch(
    config: &MarketDataConfig,
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    force_full: bool,
) -> Result<()> {
    let end_date = end
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(|| Utc::now().date_naive());

    let start_date = start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(|| end_date - chrono::Duration::days(i64::from(config.data.keep_days)));

    if start_date > end_date {
        anyhow::bail!("start {start_date} is after end {end_date}");
    }

    let mut reconciler = Reconciler::from_config(config)?;
    let force = force_full || config.cache.force_full_fetch;

    let mut failed = 0;
    for symbol in &symbols {
        match reconciler.fetch_with(symbol, start_date, end_date, force) {
            Ok(entry) => match entry.date_range() {
                Some((first, last)) => {
                    println!("{symbol:<8} {:>6} bars  {first} to {last}", entry.len())
                }
                None => println!("{symbol:<8} {:>6} bars", 0),
            },
            Err(e) => {
                eprintln!("FAIL: {symbol}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed}/{} symbols failed", symbols.len());
    }
    Ok(())
}

fn run_cache_status(config: &MarketDataConfig) -> Result<()> {
    let cache_dir = &config.cache.dir;
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = CacheStore::open(cache_dir, config.cache.expiry_days)?;
    let index = MetadataIndex::load(MetadataIndex::path_in(cache_dir));
    let artifacts = store.list_artifacts()?;

    if artifacts.is_empty() && index.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
    println!("Cache: {}", cache_dir.display());
    println!("Artifacts: {}", artifacts.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<22} {:>6} {:<25} {:>10} {:>8}  {}",
        "Key", "Rows", "Date Range", "Size", "Age", "Last Updated"
    );
    println!("{}", "-".repeat(96));

    for artifact in &artifacts {
        let (rows, range) = match read_artifact(&artifact.path) {
            Ok(entry) => (
                entry.len().to_string(),
                entry
                    .date_range()
                    .map(|(a, b)| format!("{a} to {b}"))
                    .unwrap_or_else(|| "(empty)".into()),
            ),
            Err(_) => ("?".into(), "(unreadable)".into()),
        };
        let updated = index
            .get(&artifact.key)
            .map(|m| format_epoch(m.last_updated))
            .unwrap_or_else(|| "(no meta)".into());
        let expired = if artifact.age_days >= f64::from(config.cache.expiry_days) {
            " expired"
        } else {
            ""
        };
        println!(
            "{:<22} {:>6} {:<25} {:>10} {:>7.1}d  {updated}{expired}",
            artifact.key,
            rows,
            range,
            format_size(artifact.size_bytes),
            artifact.age_days
        );
    }

    let orphaned: Vec<&str> = index
        .iter()
        .map(|(k, _)| k)
        .filter(|k| !artifacts.iter().any(|a| a.key == *k))
        .collect();
    if !orphaned.is_empty() {
        println!();
        println!("Metadata without artifact: {}", orphaned.join(", "));
    }

    Ok(())
}

fn run_cache_sweep(config: &MarketDataConfig) -> Result<()> {
    let cache_dir = &config.cache.dir;
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let report = CacheSweeper::new(config.cache.expiry_days).sweep(cache_dir)?;

    let mut index = MetadataIndex::load(MetadataIndex::path_in(cache_dir));
    let dropped = report
        .swept_keys
        .iter()
        .filter(|k| index.remove(k).is_some())
        .count();
    if dropped > 0 {
        index.save()?;
    }

    for key in &report.swept_keys {
        println!("  Removed {key}");
    }
    for path in &report.failed {
        eprintln!("  Could not remove {}", path.display());
    }
    println!(
        "Swept {} file(s) older than {} day(s); {} metadata record(s) dropped",
        report.removed(),
        config.cache.expiry_days,
        dropped
    );
    Ok(())
}

fn format_epoch(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_fetch() {
        let cli = Cli::try_parse_from([
            "barcache", "fetch", "SPY", "QQQ", "--start", "2024-01-01", "--force-full",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch {
                symbols,
                start,
                end,
                force_full,
            } => {
                assert_eq!(symbols, vec!["SPY", "QQQ"]);
                assert_eq!(start.as_deref(), Some("2024-01-01"));
                assert!(end.is_none());
                assert!(force_full);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn cli_parses_cache_status_with_config() {
        let cli = Cli::try_parse_from(["barcache", "cache", "status", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Status
            }
        ));
    }

    #[test]
    fn fetch_requires_symbols() {
        assert!(Cli::try_parse_from(["barcache", "fetch"]).is_err());
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1_048_576), "3.0 MB");
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(parse_date("2024-13-01").is_err());
        assert_eq!(
            parse_date("2024-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
    }
}
