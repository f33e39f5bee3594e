#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use etfdesk::adapters::json_portfolio_store::JsonPortfolioStore;
use etfdesk::adapters::memory_cache::MemoryCache;
use etfdesk::domain::desk::EtfDesk;
use etfdesk::domain::error::SourceError;
pub use etfdesk::domain::ohlcv::PriceBar;
use etfdesk::domain::raw::{EtfListing, RawSeries, RawValue};
use etfdesk::domain::settings::Settings;
use etfdesk::ports::clock_port::Clock;
use etfdesk::ports::source_port::{SourcePort, SourceTier};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Source whose behaviour is fixed up front: canned bars per symbol, an
/// optional failure for the first N (or all) calls, and a settable probe result.
pub struct ScriptedSource {
    name: String,
    tier: SourceTier,
    series: HashMap<String, Vec<PriceBar>>,
    listings: HashMap<String, Vec<EtfListing>>,
    failure: Option<SourceError>,
    fail_first: usize,
    calls: AtomicUsize,
    probe_ok: AtomicBool,
}

impl ScriptedSource {
    pub fn new(name: &str, tier: SourceTier) -> Self {
        Self {
            name: name.to_string(),
            tier,
            series: HashMap::new(),
            listings: HashMap::new(),
            failure: None,
            fail_first: 0,
            calls: AtomicUsize::new(0),
            probe_ok: AtomicBool::new(true),
        }
    }

    pub fn with_series(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.series.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_listing(mut self, market: &str, listings: Vec<EtfListing>) -> Self {
        self.listings.insert(market.to_string(), listings);
        self
    }

    /// Every call fails with `error`.
    pub fn failing(mut self, error: SourceError) -> Self {
        self.failure = Some(error);
        self.fail_first = usize::MAX;
        self
    }

    /// The first `n` calls fail with a network error.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.failure = Some(SourceError::Network("connection reset".into()));
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_probe(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    fn next_call_fails(&self) -> Option<SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            self.failure.clone()
        } else {
            None
        }
    }
}

pub fn raw_from_bars(symbol: &str, bars: &[PriceBar]) -> RawSeries {
    let mut raw = RawSeries::new(symbol, &["date", "open", "high", "low", "close", "volume"]);
    for b in bars {
        raw.push_row(vec![
            RawValue::from(b.date),
            RawValue::Number(b.open),
            RawValue::Number(b.high),
            RawValue::Number(b.low),
            RawValue::Number(b.close),
            RawValue::Number(b.volume as f64),
        ]);
    }
    raw
}

impl SourcePort for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> SourceTier {
        self.tier
    }

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError> {
        if let Some(err) = self.next_call_fails() {
            return Err(err);
        }
        let bars = self.series.get(symbol).ok_or_else(|| SourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
        let in_range: Vec<PriceBar> = bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect();
        Ok(raw_from_bars(symbol, &in_range))
    }

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError> {
        if let Some(err) = self.next_call_fails() {
            return Err(err);
        }
        Ok(self.listings.get(market).cloned().unwrap_or_default())
    }

    fn test_connection(&self) -> bool {
        self.probe_ok.load(Ordering::SeqCst)
    }
}

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    /// Noon UTC on `date`.
    pub fn at(date: NaiveDate) -> Self {
        let now = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
        ManualClock(Mutex::new(now))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day starting at `start`, with a ±0.5 range around
/// each close. Closes should carry at most two decimals.
pub fn bars_from_closes(start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000 + i as u64,
        })
        .collect()
}

pub fn rising_closes(n: usize, from: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| from + step * i as f64).collect()
}

pub fn falling_closes(n: usize, from: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| from - step * i as f64).collect()
}

/// Defaults with no retry delay.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.data.retry_delay_ms = 0;
    settings
}

/// Desk over the given sources with an in-memory cache and a portfolio file
/// inside `dir`.
pub fn desk_with(
    sources: Vec<Arc<dyn SourcePort>>,
    clock: Arc<ManualClock>,
    dir: &Path,
) -> EtfDesk {
    let cache = Arc::new(MemoryCache::new(clock.clone()));
    let store = Box::new(JsonPortfolioStore::new(dir.join("portfolio.json")));
    EtfDesk::new(sources, cache, store, clock, &fast_settings()).unwrap()
}
