//! Deterministic synthetic price source, the last-resort fallback.
//!
//! Bars are a random walk seeded from the symbol, so the same request
//! always yields the same series. Only weekdays are generated.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::catalog::builtin_listings;
use crate::domain::error::SourceError;
use crate::domain::raw::{EtfListing, RawSeries, RawValue};
use crate::ports::source_port::{SourcePort, SourceTier};

const DAILY_DRIFT: f64 = 0.001;
const DAILY_VOLATILITY: f64 = 0.02;
const INTRADAY_VOLATILITY: f64 = 0.01;
const OPEN_GAP_VOLATILITY: f64 = 0.005;
const PRICE_FLOOR: f64 = 0.1;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticSource;

impl SyntheticSource {
    pub fn new() -> Self {
        SyntheticSource
    }
}

fn symbol_seed(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(11_u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as u64))
}

/// Box-Muller draw from N(mean, sd).
fn gaussian(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

impl SourcePort for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Synthetic
    }

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError> {
        let dates = weekdays(start, end);
        if dates.is_empty() {
            return Err(SourceError::Empty);
        }

        let seed = symbol_seed(symbol);
        let mut rng = StdRng::seed_from_u64(seed);
        let base_price = 5.0 + (seed % 100) as f64 / 10.0;

        let mut closes = Vec::with_capacity(dates.len());
        closes.push(base_price);
        for _ in 1..dates.len() {
            let ret = gaussian(&mut rng, DAILY_DRIFT, DAILY_VOLATILITY);
            let prev = closes[closes.len() - 1];
            closes.push((prev * (1.0 + ret)).max(PRICE_FLOOR));
        }

        let mut raw = RawSeries::new(symbol, &["date", "open", "high", "low", "close", "volume"]);
        for (i, date) in dates.iter().enumerate() {
            let close = closes[i];
            let swing = gaussian(&mut rng, 0.0, INTRADAY_VOLATILITY).abs();
            let open = if i == 0 {
                close
            } else {
                closes[i - 1] * (1.0 + gaussian(&mut rng, 0.0, OPEN_GAP_VOLATILITY))
            };
            let high = (close * (1.0 + swing)).max(open).max(close);
            let low = (close * (1.0 - swing)).min(open).min(close);
            let volume: u64 = rng.gen_range(1_000_000..10_000_000);

            raw.push_row(vec![
                RawValue::from(*date),
                RawValue::Number(round2(open)),
                RawValue::Number(round2(high)),
                RawValue::Number(round2(low)),
                RawValue::Number(round2(close)),
                RawValue::Number(volume as f64),
            ]);
        }

        tracing::debug!(symbol, rows = raw.len(), "generated synthetic series");
        Ok(raw)
    }

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError> {
        builtin_listings(market).ok_or_else(|| SourceError::Other(format!("unknown market '{market}'")))
    }

    fn test_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validator::DataValidator;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn same_symbol_same_series() {
        let source = SyntheticSource::new();
        let a = source.fetch_series("510300", d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        let b = source.fetch_series("510300", d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        assert_eq!(a, b);
        let c = source.fetch_series("SPY", d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        assert_ne!(a.rows, c.rows);
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let source = SyntheticSource::new();
        let err = source.fetch_series("SPY", d(2024, 1, 6), d(2024, 1, 7)).unwrap_err();
        assert!(matches!(err, SourceError::Empty));
    }

    #[test]
    fn output_passes_validation() {
        let source = SyntheticSource::new();
        let raw = source.fetch_series("QQQ", d(2024, 1, 1), d(2024, 6, 30)).unwrap();
        let validated = DataValidator::default().validate(&raw).unwrap();
        assert_eq!(validated.series.len(), raw.len());
        assert_eq!(validated.report.repaired_rows, 0);
        assert!(validated
            .series
            .bars()
            .iter()
            .all(|b| !matches!(b.date.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn lists_builtin_catalog() {
        let source = SyntheticSource::new();
        assert_eq!(source.fetch_symbol_list("US").unwrap().len(), 4);
        assert!(source.fetch_symbol_list("XX").is_err());
    }
}
