//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorType`: Indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Points inside the warmup window carry `valid == false` and a value of 0.0.

pub mod drawdown;
pub mod rsi;
pub mod sma;

use chrono::NaiveDate;
use std::fmt;

use crate::domain::error::EtfDeskError;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

impl IndicatorPoint {
    pub(crate) fn warmup(date: NaiveDate) -> Self {
        IndicatorPoint {
            date,
            valid: false,
            value: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
}

impl IndicatorType {
    pub fn period(&self) -> usize {
        match self {
            IndicatorType::Sma(p) | IndicatorType::Rsi(p) => *p,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at the final index, if that point is past warmup.
    pub fn latest(&self) -> Option<f64> {
        self.values.last().filter(|p| p.valid).map(|p| p.value)
    }

    /// Most recent valid value anywhere in the series.
    pub fn latest_valid(&self) -> Option<f64> {
        self.values.iter().rev().find(|p| p.valid).map(|p| p.value)
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|p| p.valid).count()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
        }
    }
}

pub(crate) fn check_inputs(
    indicator: IndicatorType,
    len: usize,
) -> Result<(), EtfDeskError> {
    if indicator.period() == 0 {
        return Err(EtfDeskError::calculation(format!(
            "{indicator}: period must be at least 1"
        )));
    }
    if len == 0 {
        return Err(EtfDeskError::calculation(format!(
            "{indicator}: empty price series"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(day: u32, valid: bool, value: f64) -> IndicatorPoint {
        IndicatorPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            valid,
            value,
        }
    }

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
        assert_eq!(IndicatorType::Rsi(14).to_string(), "RSI(14)");
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Sma(5), "sma5");
        map.insert(IndicatorType::Sma(20), "sma20");
        map.insert(IndicatorType::Rsi(14), "rsi14");

        assert_eq!(map.get(&IndicatorType::Sma(20)), Some(&"sma20"));
        assert_eq!(map.get(&IndicatorType::Rsi(14)), Some(&"rsi14"));
        assert_eq!(map.get(&IndicatorType::Rsi(5)), None);
    }

    #[test]
    fn latest_requires_final_point_valid() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![point(1, true, 1.0), point(2, false, 0.0)],
        };
        assert_eq!(series.latest(), None);
        assert_eq!(series.latest_valid(), Some(1.0));
        assert_eq!(series.valid_count(), 1);
    }

    #[test]
    fn zero_period_rejected() {
        let err = check_inputs(IndicatorType::Sma(0), 10).unwrap_err();
        assert!(matches!(err, EtfDeskError::Calculation { .. }));
    }

    #[test]
    fn empty_input_rejected() {
        let err = check_inputs(IndicatorType::Rsi(14), 0).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
