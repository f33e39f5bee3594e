//! Alpha Vantage source (`TIME_SERIES_DAILY`).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::catalog::builtin_listings;
use crate::domain::error::{EtfDeskError, SourceError};
use crate::domain::raw::{EtfListing, RawSeries, RawValue};
use crate::ports::source_port::{SourcePort, SourceTier};

const BASE_URL: &str = "https://www.alphavantage.co/query";

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)", default)]
    time_series: Option<BTreeMap<String, DailyBar>>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

pub struct AlphaVantageSource {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl AlphaVantageSource {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, EtfDeskError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtfDeskError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// Keeps the provider's numbered column names and drops days outside
    /// `[start, end]`.
    pub(crate) fn parse_daily(
        symbol: &str,
        body: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError> {
        let resp: DailyResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::ResponseFormat(format!("daily series for {symbol}: {e}")))?;

        if resp.error_message.is_some() {
            return Err(SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if resp.note.is_some() || resp.information.is_some() {
            return Err(SourceError::RateLimited);
        }
        let series = resp
            .time_series
            .ok_or_else(|| SourceError::ResponseFormat("missing 'Time Series (Daily)'".into()))?;

        let mut raw = RawSeries::new(
            symbol,
            &["date", "1. open", "2. high", "3. low", "4. close", "5. volume"],
        );
        for (day, bar) in &series {
            let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            raw.push_row(vec![
                RawValue::from(date),
                RawValue::from(bar.open.as_str()),
                RawValue::from(bar.high.as_str()),
                RawValue::from(bar.low.as_str()),
                RawValue::from(bar.close.as_str()),
                RawValue::from(bar.volume.as_str()),
            ]);
        }
        Ok(raw)
    }
}

impl SourcePort for AlphaVantageSource {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Secondary
    }

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError> {
        tracing::debug!(symbol, "requesting alpha vantage daily series");
        let resp = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", "full"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Network(format!("HTTP {status} for {symbol}")));
        }
        let body = resp.text().map_err(|e| SourceError::Network(e.to_string()))?;
        Self::parse_daily(symbol, &body, start, end)
    }

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError> {
        builtin_listings(market).ok_or_else(|| SourceError::Other(format!("unknown market '{market}'")))
    }

    fn test_connection(&self) -> bool {
        self.client
            .get(BASE_URL)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", "SPY"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
