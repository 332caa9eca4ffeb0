//! Yahoo Finance chart API client.
//!
//! One GET per symbol against the v8 chart endpoint. Each HTTP outcome is
//! classified as final, retryable or fatal; retryable outcomes back off
//! exponentially and count against the shared circuit breaker. The ticker is
//! pushed as a single URL path segment, so index (`^NSEI`) and FX or futures
//! (`INR=X`, `CL=F`) symbols never split the path.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawBar};
use chrono::{NaiveDate, NaiveTime};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for [`YahooProvider`].
#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com/v8/finance/chart".into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<Series>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(rename = "timestamp")]
    timestamps: Option<Vec<i64>>,
    indicators: SeriesIndicators,
}

#[derive(Debug, Deserialize)]
struct SeriesIndicators {
    quote: Vec<Ohlcv>,
    #[serde(rename = "adjclose", default)]
    adjusted: Vec<Adjusted>,
}

type Column<T> = Vec<Option<T>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Ohlcv {
    open: Column<f64>,
    high: Column<f64>,
    low: Column<f64>,
    close: Column<f64>,
    volume: Column<u64>,
}

#[derive(Debug, Deserialize)]
struct Adjusted {
    adjclose: Column<f64>,
}

fn cell<T: Copy>(column: &[Option<T>], i: usize) -> Option<T> {
    column.get(i).copied().flatten()
}

fn format_error(detail: impl std::fmt::Display) -> DataError {
    DataError::BadResponse(detail.to_string())
}

/// Turn one chart payload into bars sorted by date.
///
/// Rows where both close and adjusted close are null (exchange holidays)
/// are dropped, as is any row whose UTC date does not advance past the
/// previous one.
fn bars_from_envelope(symbol: &str, envelope: Envelope) -> Result<Vec<RawBar>, DataError> {
    let Chart { result, error } = envelope.chart;
    let series = match (result, error) {
        (Some(list), _) => list
            .into_iter()
            .next()
            .ok_or_else(|| format_error("result array is empty"))?,
        (None, Some(e)) if e.code == "Not Found" => {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
        (None, Some(e)) => return Err(format_error(format!("{}: {}", e.code, e.description))),
        (None, None) => return Err(format_error("empty result with no error")),
    };

    let timestamps = series.timestamps.ok_or_else(|| format_error("no timestamps"))?;
    let SeriesIndicators { quote, adjusted } = series.indicators;
    let ohlcv = quote
        .into_iter()
        .next()
        .ok_or_else(|| format_error("no quote data"))?;
    let adjclose = adjusted.into_iter().next().map(|a| a.adjclose).unwrap_or_default();

    let mut bars: Vec<RawBar> = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| format_error(format!("invalid timestamp: {ts}")))?;

        let close = cell(&ohlcv.close, i);
        let adj = cell(&adjclose, i);
        if close.is_none() && adj.is_none() {
            continue;
        }
        if bars.last().is_some_and(|prev| prev.date >= date) {
            debug!(symbol, %date, "dropping out-of-order bar");
            continue;
        }

        let nan = f64::NAN;
        bars.push(RawBar {
            date,
            open: cell(&ohlcv.open, i).unwrap_or(nan),
            high: cell(&ohlcv.high, i).unwrap_or(nan),
            low: cell(&ohlcv.low, i).unwrap_or(nan),
            close: close.unwrap_or(nan),
            volume: cell(&ohlcv.volume, i).unwrap_or(0),
            adj_close: adj.unwrap_or(nan),
        });
    }

    if bars.is_empty() {
        return Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}

// ── HTTP outcome classification ─────────────────────────────────────

/// What to do after a non-success HTTP status.
#[derive(Debug)]
enum Outcome {
    /// Give up immediately.
    Fatal(DataError),
    /// Count a breaker failure and try again.
    Retry(DataError),
    /// Trip the breaker and stop.
    Blocked,
}

fn classify_status(status: StatusCode, symbol: &str, retry_after: Option<u64>) -> Outcome {
    match status {
        StatusCode::FORBIDDEN => Outcome::Blocked,
        StatusCode::TOO_MANY_REQUESTS => Outcome::Retry(DataError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        }),
        StatusCode::UNAUTHORIZED => Outcome::Fatal(DataError::Unauthorized(
            "Yahoo Finance requires authentication".into(),
        )),
        StatusCode::NOT_FOUND => Outcome::Fatal(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        other => Outcome::Retry(DataError::Other(format!("HTTP {other} for {symbol}"))),
    }
}

/// Blocking Yahoo Finance provider sharing a circuit breaker with its callers.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    config: YahooConfig,
    endpoint: Url,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        Self::with_config(breaker, YahooConfig::default())
    }

    pub fn with_config(breaker: Arc<CircuitBreaker>, config: YahooConfig) -> Result<Self, DataError> {
        let endpoint = Url::parse(&config.base_url)
            .map_err(|e| DataError::Other(format!("invalid chart endpoint '{}': {e}", config.base_url)))?;
        if endpoint.cannot_be_a_base() {
            return Err(DataError::Other(format!(
                "chart endpoint '{}' cannot take a symbol path",
                config.base_url
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            breaker,
            config,
            endpoint,
        })
    }

    /// Chart URL for `[start, end]`; `period2` is exclusive, so it points at
    /// the midnight after `end`.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Url {
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp().to_string();
        let mut url = self.endpoint.clone();
        // Checked in `with_config`: the endpoint can be a base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(symbol);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("period1", &midnight(start))
            .append_pair("period2", &midnight(end + chrono::Duration::days(1)))
            .append_pair("interval", "1d")
            .append_pair("includeAdjustedClose", "true");
        url
    }

    fn request(&self, symbol: &str, url: &Url) -> Result<Vec<RawBar>, DataError> {
        let mut last_error = DataError::Other("max retries exceeded".into());

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }
            if !self.breaker.is_allowed() {
                return Err(DataError::ProviderBlocked);
            }

            let resp = match self.client.get(url.clone()).send() {
                Ok(r) => r,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.breaker.record_failure();
                    last_error = DataError::Network(e.to_string());
                    continue;
                }
                Err(e) => return Err(DataError::Network(e.to_string())),
            };

            let status = resp.status();
            if status.is_success() {
                let envelope: Envelope = resp
                    .json()
                    .map_err(|e| format_error(format!("unreadable chart for {symbol}: {e}")))?;
                let bars = bars_from_envelope(symbol, envelope)?;
                self.breaker.record_success();
                return Ok(bars);
            }

            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            match classify_status(status, symbol, retry_after) {
                Outcome::Blocked => {
                    self.breaker.trip();
                    return Err(DataError::ProviderBlocked);
                }
                Outcome::Fatal(e) => return Err(e),
                Outcome::Retry(e) => {
                    warn!(symbol, %status, "request failed");
                    self.breaker.record_failure();
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<FetchResult, DataError> {
        let url = self.chart_url(symbol, start, end);
        let bars = self.request(symbol, &url)?;
        debug!(symbol, bars = bars.len(), "fetched");
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<RawBar>, DataError> {
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        bars_from_envelope("^NSEI", envelope)
    }

    fn provider(base_url: &str) -> YahooProvider {
        let config = YahooConfig {
            base_url: base_url.into(),
            ..YahooConfig::default()
        };
        YahooProvider::with_config(Arc::new(CircuitBreaker::default_provider()), config).unwrap()
    }

    fn last_segment(url: &Url) -> String {
        url.path_segments().and_then(|mut s| s.next_back()).unwrap().to_string()
    }

    #[test]
    fn ticker_is_a_single_path_segment() {
        let yahoo = provider("https://example.test/v8/finance/chart");
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let fx = yahoo.chart_url("INR=X", day, day);
        assert_eq!(last_segment(&fx), "INR=X");
        assert_eq!(fx.path_segments().unwrap().count(), 4);

        let index = yahoo.chart_url("^NSEBANK", day, day);
        assert!(index.path().ends_with("NSEBANK"));
        assert_eq!(index.path_segments().unwrap().count(), 4);

        let odd = yahoo.chart_url("A/B", day, day);
        assert_eq!(last_segment(&odd), "A%2FB");
    }

    #[test]
    fn chart_url_covers_end_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let url = provider("https://example.test/chart/").chart_url("^NSEI", day, day);
        assert_eq!(url.host_str(), Some("example.test"));
        assert!(url.path().starts_with("/chart/"));
        assert_eq!(url.path_segments().unwrap().count(), 2);
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("period1".into(), "1704067200".into())));
        assert!(query.contains(&("period2".into(), "1704153600".into())));
        assert!(query.contains(&("interval".into(), "1d".into())));
    }

    #[test]
    fn rejects_unusable_endpoint() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        for base_url in ["not a url", "mailto:charts@example.test"] {
            let config = YahooConfig {
                base_url: base_url.into(),
                ..YahooConfig::default()
            };
            assert!(YahooProvider::with_config(breaker.clone(), config).is_err());
        }
    }

    #[test]
    fn parses_bars_and_skips_holidays() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704153600,1704240000,1704326400],
            "indicators":{
                "quote":[{"open":[100.0,null,102.0],"high":[101.0,null,103.0],
                          "low":[99.0,null,101.0],"close":[100.5,null,102.5],
                          "volume":[10,null,12]}],
                "adjclose":[{"adjclose":[100.4,null,102.4]}]
            }}],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].adj_close, 102.4);
        assert_eq!(bars[1].volume, 12);
    }

    #[test]
    fn missing_adjclose_block_is_nan() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704153600],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[80.0],"volume":[0]}]}
            }],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert!(bars[0].adj_close.is_nan());
        assert_eq!(bars[0].price(), 80.0);
    }

    #[test]
    fn duplicate_utc_dates_keep_the_first() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704153600,1704160800],
            "indicators":{"quote":[{"close":[10.0,11.0]}]}
            }],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 10.0);
        assert!(bars[0].open.is_nan());
    }

    #[test]
    fn not_found_maps_to_symbol_error() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse(json), Err(DataError::SymbolNotFound { .. })));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "X", None),
            Outcome::Blocked
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "X", None),
            Outcome::Fatal(DataError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "X", None),
            Outcome::Fatal(DataError::Unauthorized(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "X", Some(7)),
            Outcome::Retry(DataError::RateLimited { retry_after_secs: 7 })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "X", None),
            Outcome::Retry(DataError::Other(_))
        ));
    }
}
