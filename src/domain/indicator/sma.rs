//! Simple moving average over closing prices.
//!
//! Warmup: the first `period - 1` points are invalid.

use crate::domain::error::EtfDeskError;
use crate::domain::indicator::{check_inputs, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_sma(bars: &[PriceBar], period: usize) -> Result<IndicatorSeries, EtfDeskError> {
    let indicator_type = IndicatorType::Sma(period);
    check_inputs(indicator_type, bars.len())?;

    let mut values = Vec::with_capacity(bars.len());
    let mut window_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        window_sum += bar.close;
        if i >= period {
            window_sum -= bars[i - period].close;
        }

        if i + 1 < period {
            values.push(IndicatorPoint::warmup(bar.date));
        } else {
            values.push(IndicatorPoint {
                date: bar.date,
                valid: true,
                value: window_sum / period as f64,
            });
        }
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn sma_warmup_then_values() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_sma(&bars, 3).unwrap();

        assert_eq!(series.values.len(), 5);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert_relative_eq!(series.values[2].value, 2.0);
        assert_relative_eq!(series.values[3].value, 3.0);
        assert_relative_eq!(series.values[4].value, 4.0);
    }

    #[test]
    fn sma_period_one_is_close() {
        let bars = make_bars(&[10.0, 11.5, 9.25]);
        let series = calculate_sma(&bars, 1).unwrap();
        let values: Vec<f64> = series.values.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![10.0, 11.5, 9.25]);
    }

    #[test]
    fn sma_shorter_than_period_is_all_invalid() {
        let bars = make_bars(&[1.0, 2.0]);
        let series = calculate_sma(&bars, 5).unwrap();
        assert_eq!(series.valid_count(), 0);
        assert_eq!(series.latest(), None);
    }

    #[test]
    fn sma_rejects_zero_period() {
        let bars = make_bars(&[1.0, 2.0]);
        assert!(calculate_sma(&bars, 0).is_err());
    }

    #[test]
    fn sma_rejects_empty_input() {
        assert!(calculate_sma(&[], 5).is_err());
    }
}
