//! Yahoo Finance source over the v8 chart API.
//!
//! Yahoo has no official API and changes its response format without
//! notice; every shape mismatch surfaces as `SourceError::ResponseFormat`.
//! Retry and failover belong to the orchestrator, so each call here makes
//! exactly one request.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::catalog::builtin_listings;
use crate::domain::error::{EtfDeskError, SourceError};
use crate::domain::raw::{EtfListing, RawSeries, RawValue};
use crate::ports::source_port::{SourcePort, SourceTier};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

pub struct YahooSource {
    client: reqwest::blocking::Client,
}

impl YahooSource {
    pub fn new(timeout: Duration) -> Result<Self, EtfDeskError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EtfDeskError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Mainland codes need an exchange suffix: `5xxxxx` trades in Shanghai,
    /// `1xxxxx` in Shenzhen.
    pub fn yahoo_symbol(symbol: &str) -> String {
        let symbol = symbol.trim().to_uppercase();
        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_digit()) {
            match symbol.as_bytes()[0] {
                b'5' => return format!("{symbol}.SS"),
                b'1' => return format!("{symbol}.SZ"),
                _ => {}
            }
        }
        symbol
    }

    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = (end + chrono::Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp()
            - 1;
        format!(
            "{CHART_URL}/{}?period1={start_ts}&period2={end_ts}&interval=1d",
            Self::yahoo_symbol(symbol)
        )
    }

    /// Turns a chart response body into raw rows. Days on which every field
    /// is null (holidays) are skipped; partially null days are kept for the
    /// validator to fill.
    pub(crate) fn parse_chart(symbol: &str, body: &str) -> Result<RawSeries, SourceError> {
        let resp: ChartResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::ResponseFormat(format!("chart response for {symbol}: {e}")))?;

        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => SourceError::ResponseFormat(format!("{}: {}", err.code, err.description)),
            None => SourceError::ResponseFormat("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormat("result array is empty".into()))?;
        let Some(timestamps) = data.timestamp else {
            return Err(SourceError::Empty);
        };
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormat("no quote data".into()))?;

        let mut raw = RawSeries::new(symbol, &["date", "open", "high", "low", "close", "volume"]);
        for (i, &ts) in timestamps.iter().enumerate() {
            let cell = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            let values = [
                cell(&quote.open),
                cell(&quote.high),
                cell(&quote.low),
                cell(&quote.close),
                cell(&quote.volume),
            ];
            if values.iter().all(Option::is_none) {
                continue;
            }
            let mut row = Vec::with_capacity(6);
            row.push(RawValue::Number(ts as f64));
            row.extend(values.into_iter().map(RawValue::from));
            raw.push_row(row);
        }
        Ok(raw)
    }
}

impl SourcePort for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Primary
    }

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError> {
        let url = Self::chart_url(symbol, start, end);
        tracing::debug!(symbol, %url, "requesting yahoo chart");
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        let body = resp.text().map_err(|e| SourceError::Network(e.to_string()))?;
        match Self::parse_chart(symbol, &body) {
            Err(SourceError::ResponseFormat(_)) if !status.is_success() => {
                Err(SourceError::Network(format!("HTTP {status} for {symbol}")))
            }
            other => other,
        }
    }

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError> {
        builtin_listings(market).ok_or_else(|| SourceError::Other(format!("unknown market '{market}'")))
    }

    fn test_connection(&self) -> bool {
        self.client
            .get(SEARCH_URL)
            .query(&[("q", "SPY"), ("quotesCount", "1")])
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
