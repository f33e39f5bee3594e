//! RSI (Relative Strength Index) over closing prices.
//!
//! Uses a simple trailing mean of gains and losses over the last `period`
//! price changes:
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//!
//! If avg_loss == 0: RSI = 50 (flat or one-sided windows read as neutral).
//!
//! Warmup: the first `period` bars are invalid (need `period` price changes).

use crate::domain::error::EtfDeskError;
use crate::domain::indicator::{check_inputs, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub const NEUTRAL_RSI: f64 = 50.0;

pub fn calculate_rsi(bars: &[PriceBar], period: usize) -> Result<IndicatorSeries, EtfDeskError> {
    let indicator_type = IndicatorType::Rsi(period);
    check_inputs(indicator_type, bars.len())?;

    let mut values = Vec::with_capacity(bars.len());
    values.push(IndicatorPoint::warmup(bars[0].date));

    let mut gains: Vec<f64> = Vec::with_capacity(bars.len());
    let mut losses: Vec<f64> = Vec::with_capacity(bars.len());
    for pair in bars.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let idx = i - 1;
        if idx + 1 < period {
            values.push(IndicatorPoint::warmup(bar.date));
            continue;
        }

        let window = idx + 1 - period..=idx;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;
        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: rsi_from_averages(avg_gain, avg_loss),
        });
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return NEUTRAL_RSI;
    }
    let rsi = 100.0 - (100.0 / (1.0 + avg_gain / avg_loss));
    rsi.clamp(0.0, 100.0)
}
