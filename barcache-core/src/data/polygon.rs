//! Polygon.io aggregates provider.
//!
//! Fetches daily OHLCV bars from the v2 aggregates endpoint. One HTTP request
//! per call: rate control is layered on by `RateLimitedClient` and retries are
//! the caller's business.

use super::provider::{DataError, FetchClient, TransportError};
use crate::domain::Bar;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Values that ship in sample configs and are never valid keys.
const PLACEHOLDER_KEYS: &[&str] = &[
    "your_api_key",
    "your-api-key",
    "<api_key>",
    "api_key",
    "changeme",
    "dummy",
    "xxx",
];

/// Aggregates endpoint response.
#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    results: Option<Vec<AggBar>>,
    error: Option<String>,
    message: Option<String>,
}

/// One aggregate row. Volume is sometimes reported fractional.
#[derive(Debug, Deserialize)]
struct AggBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

/// Polygon.io daily-aggregates client.
pub struct PolygonClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for PolygonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PolygonClient {
    /// Build a client. Fails fast on a missing or placeholder API key.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let api_key = api_key.into();
        validate_api_key(&api_key)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Aggregates URL without the API key (safe to log).
    fn aggs_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{symbol}/range/1/day/{start}/{end}\
             ?adjusted=true&sort=desc&limit=50000",
            self.base_url
        )
    }

    /// Parse an aggregates payload into bars. A missing `results` array is
    /// a legitimate empty answer (e.g. a range covering only a holiday).
    fn parse_response(symbol: &str, resp: AggsResponse) -> Result<Vec<Bar>, TransportError> {
        if resp.status.as_deref() == Some("ERROR") {
            let msg = resp
                .error
                .or(resp.message)
                .unwrap_or_else(|| format!("unspecified error for {symbol}"));
            return Err(TransportError::Provider(msg));
        }

        Ok(resp
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|r| Bar {
                timestamp_ms: r.t,
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
                volume: r.v as i64,
            })
            .collect())
    }
}

impl FetchClient for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, TransportError> {
        let url = self.aggs_url(symbol, start, end);
        tracing::debug!(%url, "requesting aggregates");

        let resp = self
            .client
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .map_err(|e| TransportError::NetworkUnreachable(e.without_url().to_string()))?;

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(TransportError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(TransportError::AuthenticationRejected(format!(
                "HTTP {status} from polygon for {symbol}"
            )));
        }

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let body: AggsResponse = resp.json().map_err(|e| {
            TransportError::ResponseFormatChanged(format!(
                "failed to parse response for {symbol}: {}",
                e.without_url()
            ))
        })?;

        Self::parse_response(symbol, body)
    }
}

fn validate_api_key(api_key: &str) -> Result<(), DataError> {
    let trimmed = api_key.trim();
    if trimmed.is_empty() {
        return Err(DataError::Configuration(
            "polygon API key is missing (set [polygon].api_key or POLYGON_API_KEY)".into(),
        ));
    }
    if PLACEHOLDER_KEYS
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p))
    {
        return Err(DataError::Configuration(format!(
            "polygon API key '{trimmed}' is a placeholder"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PolygonClient {
        PolygonClient::new("k3y", "https://example.test/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rejects_missing_and_placeholder_keys() {
        for key in ["", "   ", "YOUR_API_KEY", "changeme"] {
            let err = PolygonClient::new(key, DEFAULT_BASE_URL, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, DataError::Configuration(_)), "key {key:?}");
        }
    }

    #[test]
    fn url_has_range_and_no_key() {
        let url = client().aggs_url(
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
        );
        assert_eq!(
            url,
            "https://example.test/v2/aggs/ticker/AAPL/range/1/day/2024-01-11/2024-01-12\
             ?adjusted=true&sort=desc&limit=50000"
        );
        assert!(!url.contains("k3y"));
    }

    #[test]
    fn parses_results_with_fractional_volume() {
        let resp: AggsResponse = serde_json::from_str(
            r#"{"status":"OK","resultsCount":1,"results":[
                {"t":1704844800000,"o":99.0,"h":101.0,"l":98.0,"c":100.0,"v":1234.7,"vw":100.1}
            ]}"#,
        )
        .unwrap();
        let bars = PolygonClient::parse_response("AAPL", resp).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 1234);
        assert_eq!(bars[0].close, 100.0);
    }

    #[test]
    fn missing_results_is_empty_not_error() {
        let resp: AggsResponse =
            serde_json::from_str(r#"{"status":"OK","resultsCount":0}"#).unwrap();
        assert!(PolygonClient::parse_response("AAPL", resp).unwrap().is_empty());
    }

    #[test]
    fn error_status_is_provider_error() {
        let resp: AggsResponse =
            serde_json::from_str(r#"{"status":"ERROR","error":"Unknown API Key"}"#).unwrap();
        let err = PolygonClient::parse_response("AAPL", resp).unwrap_err();
        assert!(matches!(err, TransportError::Provider(ref m) if m == "Unknown API Key"));
    }
}
