//! Validated daily OHLCV bars and series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::error::EtfDeskError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// `low <= open,close <= high` with every price finite and positive.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.low <= self.high
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }
}

/// Ordered bars for one symbol, strictly increasing by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, EtfDeskError> {
        let series = PriceSeries {
            symbol: symbol.into(),
            bars,
        };
        series.check()?;
        Ok(series)
    }

    /// Re-checks the ordering and bar invariants, e.g. after deserialization.
    pub fn check(&self) -> Result<(), EtfDeskError> {
        for pair in self.bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(EtfDeskError::validation(format!(
                    "{}: dates not strictly increasing at {}",
                    self.symbol, pair[1].date
                )));
            }
        }
        if let Some(bad) = self.bars.iter().find(|b| !b.is_consistent()) {
            return Err(EtfDeskError::validation(format!(
                "{}: inconsistent bar on {}",
                self.symbol, bad.date
            )));
        }
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }
}
