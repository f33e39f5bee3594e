//! Technical snapshot: moving averages, RSI, drawdown and trend for one series.

use std::fmt;

use serde::Serialize;

use crate::domain::error::EtfDeskError;
use crate::domain::indicator::drawdown::max_drawdown;
use crate::domain::indicator::rsi::{calculate_rsi, NEUTRAL_RSI};
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::ohlcv::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendStatus {
    Rising,
    Falling,
    Ranging,
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendStatus::Rising => write!(f, "rising"),
            TrendStatus::Falling => write!(f, "falling"),
            TrendStatus::Ranging => write!(f, "ranging"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RsiCondition {
    Overbought,
    Oversold,
    Normal,
}

impl fmt::Display for RsiCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsiCondition::Overbought => write!(f, "overbought"),
            RsiCondition::Oversold => write!(f, "oversold"),
            RsiCondition::Normal => write!(f, "normal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub ma_periods: Vec<usize>,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub rsi_neutral: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ma_periods: vec![5, 20, 30],
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            rsi_neutral: 50.0,
        }
    }
}

impl IndicatorConfig {
    /// The three shortest periods, ascending. These drive trend classification.
    pub fn trend_periods(&self) -> Result<[usize; 3], EtfDeskError> {
        let mut periods = self.ma_periods.clone();
        periods.sort_unstable();
        periods.dedup();
        match periods.as_slice() {
            [short, mid, long, ..] => Ok([*short, *mid, *long]),
            _ => Err(EtfDeskError::calculation(
                "trend classification needs at least three distinct MA periods",
            )),
        }
    }

    pub fn rsi_condition(&self, rsi: Option<f64>) -> RsiCondition {
        let value = rsi.filter(|v| v.is_finite()).unwrap_or(NEUTRAL_RSI);
        if value > self.rsi_overbought {
            RsiCondition::Overbought
        } else if value < self.rsi_oversold {
            RsiCondition::Oversold
        } else {
            RsiCondition::Normal
        }
    }
}

/// Derived view of a series. Recomputed on demand, never persisted.
#[derive(Debug, Clone)]
pub struct TechnicalSnapshot {
    pub symbol: String,
    /// One series per configured period, ascending by period.
    pub moving_averages: Vec<IndicatorSeries>,
    pub rsi: IndicatorSeries,
    pub max_drawdown: f64,
    pub trend: TrendStatus,
    /// Latest short/mid/long MA values, when all three are defined.
    pub trend_mas: Option<(f64, f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestValues {
    pub moving_averages: Vec<(usize, Option<f64>)>,
    pub rsi: Option<f64>,
    pub max_drawdown: f64,
    pub trend: TrendStatus,
}

impl TechnicalSnapshot {
    pub fn latest_ma(&self, period: usize) -> Option<f64> {
        self.moving_averages
            .iter()
            .find(|s| s.indicator_type.period() == period)
            .and_then(IndicatorSeries::latest_valid)
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        self.rsi.latest()
    }

    /// Latest RSI with an undefined value read as neutral.
    pub fn rsi_or_neutral(&self) -> f64 {
        self.latest_rsi()
            .filter(|v| v.is_finite())
            .unwrap_or(NEUTRAL_RSI)
    }

    pub fn latest_values(&self) -> LatestValues {
        LatestValues {
            moving_averages: self
                .moving_averages
                .iter()
                .map(|s| (s.indicator_type.period(), s.latest_valid()))
                .collect(),
            rsi: self.latest_rsi(),
            max_drawdown: self.max_drawdown,
            trend: self.trend,
        }
    }
}

pub fn classify_trend(short: Option<f64>, mid: Option<f64>, long: Option<f64>) -> TrendStatus {
    match (short, mid, long) {
        (Some(s), Some(m), Some(l)) if s > m && m > l => TrendStatus::Rising,
        (Some(s), Some(m), Some(l)) if s < m && m < l => TrendStatus::Falling,
        _ => TrendStatus::Ranging,
    }
}

pub fn compute_snapshot(
    series: &PriceSeries,
    config: &IndicatorConfig,
) -> Result<TechnicalSnapshot, EtfDeskError> {
    if series.is_empty() {
        return Err(EtfDeskError::calculation(format!(
            "{}: cannot compute indicators on an empty series",
            series.symbol()
        )));
    }
    let [short, mid, long] = config.trend_periods()?;

    let mut periods = config.ma_periods.clone();
    periods.sort_unstable();
    periods.dedup();

    let moving_averages = periods
        .iter()
        .map(|&p| calculate_sma(series.bars(), p))
        .collect::<Result<Vec<_>, _>>()?;
    let rsi = calculate_rsi(series.bars(), config.rsi_period)?;
    let max_drawdown = max_drawdown(&series.closes());

    let latest = |period: usize| {
        moving_averages
            .iter()
            .find(|s| s.indicator_type.period() == period)
            .and_then(IndicatorSeries::latest)
    };
    let (ma_s, ma_m, ma_l) = (latest(short), latest(mid), latest(long));
    let trend = classify_trend(ma_s, ma_m, ma_l);
    let trend_mas = match (ma_s, ma_m, ma_l) {
        (Some(s), Some(m), Some(l)) => Some((s, m, l)),
        _ => None,
    };

    tracing::debug!(
        symbol = series.symbol(),
        %trend,
        max_drawdown,
        rsi = ?rsi.latest(),
        "computed technical snapshot"
    );

    Ok(TechnicalSnapshot {
        symbol: series.symbol().to_string(),
        moving_averages,
        rsi,
        max_drawdown,
        trend,
        trend_mas,
    })
}
