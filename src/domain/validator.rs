//! Raw payload validation and normalization.
//!
//! Stages, in order:
//!
//! 1. Map provider column names onto the canonical schema
//! 2. Require date/open/high/low/close/volume
//! 3. Coerce cells; unparsable values become missing
//! 4. Drop undated rows, sort, keep the last row per date, forward-fill prices
//! 5. Integrity check: more than 10% violating rows fails, the rest are repaired
//! 6. Round prices to the configured precision
//! 7. Require at least `min_rows` rows
//!
//! Outlier flagging and calendar-gap warnings are reported, never applied.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::domain::error::EtfDeskError;
use crate::domain::ohlcv::{PriceBar, PriceSeries};
use crate::domain::raw::{RawSeries, RawValue};

pub const MAX_VIOLATION_RATIO: f64 = 0.10;
pub const MAX_GAP_DAYS: i64 = 7;
pub const MAX_GAP_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Date,
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Date => "date",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        };
        f.write_str(name)
    }
}

/// Maps a provider column name onto the canonical schema.
///
/// Accepts lowercase and capitalised names, Alpha Vantage's numbered names
/// (`"1. open"`) and the mainland provider names. Adjusted close and any
/// unknown column map to `None`.
pub fn canonical_field(column: &str) -> Option<Field> {
    let trimmed = column.trim();
    match trimmed {
        "日期" => return Some(Field::Date),
        "开盘" => return Some(Field::Open),
        "最高" => return Some(Field::High),
        "最低" => return Some(Field::Low),
        "收盘" => return Some(Field::Close),
        "成交量" => return Some(Field::Volume),
        _ => {}
    }

    let lower = trimmed.to_ascii_lowercase();
    let name = match lower.split_once(". ") {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => lower.as_str(),
    };
    match name {
        "date" | "datetime" | "timestamp" | "time" | "trade_date" => Some(Field::Date),
        "open" => Some(Field::Open),
        "high" => Some(Field::High),
        "low" => Some(Field::Low),
        "close" => Some(Field::Close),
        "volume" | "vol" => Some(Field::Volume),
        _ => None,
    }
}

/// Parses a date cell. Text accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY/MM/DD`, `YYYYMMDD` or a Unix timestamp;
/// numeric cells are Unix timestamps in seconds.
pub fn parse_date_value(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Missing => None,
        RawValue::Number(n) => date_from_timestamp(*n),
        RawValue::Text(s) => {
            let s = s.trim();
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(d);
            }
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt.date());
                }
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
                return Some(d);
            }
            if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
            }
            s.parse::<f64>().ok().and_then(date_from_timestamp)
        }
    }
}

fn date_from_timestamp(ts: f64) -> Option<NaiveDate> {
    if !ts.is_finite() {
        return None;
    }
    DateTime::from_timestamp(ts.trunc() as i64, 0).map(|dt| dt.date_naive())
}

/// Parses a numeric cell; thousands separators are stripped, non-finite is missing.
pub fn parse_number_value(value: &RawValue) -> Option<f64> {
    let n = match value {
        RawValue::Missing => return None,
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

/// 6-digit mainland code or 2-5 ASCII letters.
pub fn validate_etf_code(code: &str) -> bool {
    let code = code.trim();
    let mainland = code.len() == 6 && code.chars().all(|c| c.is_ascii_digit());
    let us = (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    mainland || us
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutlierMethod {
    Iqr,
    ZScore,
}

impl FromStr for OutlierMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "zscore" | "z-score" => Ok(OutlierMethod::ZScore),
            other => Err(format!("unknown outlier method '{other}', expected iqr or zscore")),
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMethod::Iqr => write!(f, "iqr"),
            OutlierMethod::ZScore => write!(f, "zscore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub price_precision: u32,
    pub min_rows: usize,
    pub outlier_detection: bool,
    pub outlier_method: OutlierMethod,
    pub outlier_threshold: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            price_precision: 2,
            min_rows: 30,
            outlier_detection: false,
            outlier_method: OutlierMethod::Iqr,
            outlier_threshold: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_rows: usize,
    pub duplicate_dates: usize,
    pub filled_values: usize,
    pub repaired_rows: usize,
    pub outlier_dates: Vec<NaiveDate>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Validated {
    pub series: PriceSeries,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, Copy)]
struct Row {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct FilledRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl FilledRow {
    /// The row with high and low widened to cover open and close.
    fn widened(self) -> FilledRow {
        FilledRow {
            high: self.high.max(self.open).max(self.close).max(self.low),
            low: self.low.min(self.open).min(self.close).min(self.high),
            ..self
        }
    }

    fn violates_invariants(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().any(|p| *p <= 0.0)
            || self.low > self.high
            || self.open < self.low
            || self.open > self.high
            || self.close < self.low
            || self.close > self.high
            || self.volume < 0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataValidator {
    config: ValidatorConfig,
}

impl DataValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        DataValidator { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn validate(&self, raw: &RawSeries) -> Result<Validated, EtfDeskError> {
        let symbol = raw.symbol.as_str();
        let mut report = ValidationReport {
            input_rows: raw.len(),
            ..ValidationReport::default()
        };

        let columns = map_columns(raw)?;
        let rows = coerce_rows(raw, &columns, &mut report);
        let rows = dedupe_sorted(rows, &mut report);
        let filled = forward_fill(rows, &mut report);
        let repaired = self.check_integrity(symbol, filled, &mut report)?;

        if repaired.len() < self.config.min_rows {
            return Err(EtfDeskError::validation(format!(
                "{symbol}: {} rows after cleaning, at least {} required",
                repaired.len(),
                self.config.min_rows
            )));
        }

        let series = PriceSeries::new(symbol, repaired)?;
        report.output_rows = series.len();

        check_gaps(&series, &mut report);
        if self.config.outlier_detection {
            report.outlier_dates = detect_outliers(
                &series,
                self.config.outlier_method,
                self.config.outlier_threshold,
            );
            if !report.outlier_dates.is_empty() {
                let msg = format!(
                    "{} close-price outliers flagged ({})",
                    report.outlier_dates.len(),
                    self.config.outlier_method
                );
                tracing::warn!(symbol, "{msg}");
                report.warnings.push(msg);
            }
        }

        if report.dropped_rows > 0 || report.filled_values > 0 || report.repaired_rows > 0 {
            tracing::debug!(
                symbol,
                dropped = report.dropped_rows,
                filled = report.filled_values,
                repaired = report.repaired_rows,
                duplicates = report.duplicate_dates,
                "validator cleaned input"
            );
        }

        Ok(Validated { series, report })
    }

    /// Counts invariant violations, fails above the budget, otherwise rounds
    /// and repairs every row so the output satisfies the bar invariant.
    fn check_integrity(
        &self,
        symbol: &str,
        rows: Vec<FilledRow>,
        report: &mut ValidationReport,
    ) -> Result<Vec<PriceBar>, EtfDeskError> {
        if rows.is_empty() {
            return Err(EtfDeskError::validation(format!(
                "{symbol}: no usable rows"
            )));
        }

        let violations = rows.iter().filter(|r| r.violates_invariants()).count();
        let ratio = violations as f64 / rows.len() as f64;
        if ratio > MAX_VIOLATION_RATIO {
            return Err(EtfDeskError::validation(format!(
                "{symbol}: {violations} of {} rows violate OHLCV integrity ({:.1}% > {:.0}%)",
                rows.len(),
                ratio * 100.0,
                MAX_VIOLATION_RATIO * 100.0
            )));
        }
        if violations > 0 {
            let msg = format!("{violations} rows violated OHLCV integrity and were repaired or dropped");
            tracing::warn!(symbol, "{msg}");
            report.warnings.push(msg);
        }

        let precision = self.config.price_precision;
        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let open = round_to(row.open, precision);
            let high = round_to(row.high, precision);
            let low = round_to(row.low, precision);
            let close = round_to(row.close, precision);

            if [open, high, low, close].iter().any(|p| *p <= 0.0) {
                report.dropped_rows += 1;
                continue;
            }

            let new_high = high.max(open).max(close).max(low);
            let new_low = low.min(open).min(close).min(high);
            let volume = row.volume.round();
            if new_high != high || new_low != low || volume < 0.0 {
                report.repaired_rows += 1;
            }

            bars.push(PriceBar {
                date: row.date,
                open,
                high: new_high,
                low: new_low,
                close,
                volume: volume.max(0.0) as u64,
            });
        }
        Ok(bars)
    }
}

fn map_columns(raw: &RawSeries) -> Result<BTreeMap<Field, usize>, EtfDeskError> {
    let mut columns = BTreeMap::new();
    for (idx, name) in raw.columns.iter().enumerate() {
        if let Some(field) = canonical_field(name) {
            columns.entry(field).or_insert(idx);
        }
    }

    let missing: Vec<String> = Field::ALL
        .iter()
        .filter(|f| !columns.contains_key(f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EtfDeskError::validation(format!(
            "{}: missing required columns: {}",
            raw.symbol,
            missing.join(", ")
        )));
    }
    Ok(columns)
}

fn coerce_rows(
    raw: &RawSeries,
    columns: &BTreeMap<Field, usize>,
    report: &mut ValidationReport,
) -> Vec<Row> {
    let cell = |row: &[RawValue], field: Field| -> Option<RawValue> {
        columns.get(&field).and_then(|&i| row.get(i)).cloned()
    };
    let number = |row: &[RawValue], field: Field| {
        cell(row, field).as_ref().and_then(parse_number_value)
    };

    let mut rows = Vec::with_capacity(raw.len());
    for values in &raw.rows {
        let values = values.as_slice();
        let Some(date) = cell(values, Field::Date).as_ref().and_then(parse_date_value) else {
            report.dropped_rows += 1;
            continue;
        };
        rows.push(Row {
            date,
            open: number(values, Field::Open),
            high: number(values, Field::High),
            low: number(values, Field::Low),
            close: number(values, Field::Close),
            volume: number(values, Field::Volume),
        });
    }
    rows
}

/// Sorts by date; for repeated dates the row appearing last in the input wins.
fn dedupe_sorted(mut rows: Vec<Row>, report: &mut ValidationReport) -> Vec<Row> {
    rows.sort_by_key(|r| r.date);
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(last) if last.date == row.date => {
                *last = row;
                report.duplicate_dates += 1;
            }
            _ => out.push(row),
        }
    }
    out
}

fn forward_fill(rows: Vec<Row>, report: &mut ValidationReport) -> Vec<FilledRow> {
    let mut prev: Option<FilledRow> = None;
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let mut fill = |value: Option<f64>, from_prev: Option<f64>| match (value, from_prev) {
            (Some(v), _) => Some(v),
            (None, Some(p)) => {
                report.filled_values += 1;
                Some(p)
            }
            (None, None) => None,
        };
        let open = fill(row.open, prev.map(|p| p.open));
        let high = fill(row.high, prev.map(|p| p.high));
        let low = fill(row.low, prev.map(|p| p.low));
        let close = fill(row.close, prev.map(|p| p.close));

        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
            report.dropped_rows += 1;
            continue;
        };
        let filled = FilledRow {
            date: row.date,
            open,
            high,
            low,
            close,
            volume: row.volume.unwrap_or(0.0),
        };
        // Later gaps copy the widened row, never an unrepaired high/low.
        prev = Some(filled.widened());
        out.push(filled);
    }

    if report.filled_values > 0 {
        tracing::debug!(filled = report.filled_values, "forward-filled missing prices");
    }
    out
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn check_gaps(series: &PriceSeries, report: &mut ValidationReport) {
    let dates = series.dates();
    let large_gaps = dates
        .windows(2)
        .filter(|w| (w[1] - w[0]).num_days() > MAX_GAP_DAYS)
        .count();
    if large_gaps as f64 > dates.len() as f64 * MAX_GAP_RATIO {
        let msg = format!("{large_gaps} calendar gaps longer than {MAX_GAP_DAYS} days");
        tracing::warn!(symbol = series.symbol(), "{msg}");
        report.warnings.push(msg);
    }
}

/// Flags close prices outside `[Q1 - k*IQR, Q3 + k*IQR]` or with `|z| > k`.
pub fn detect_outliers(series: &PriceSeries, method: OutlierMethod, k: f64) -> Vec<NaiveDate> {
    let closes = series.closes();
    if closes.len() < 3 {
        return Vec::new();
    }

    let is_outlier: Box<dyn Fn(f64) -> bool> = match method {
        OutlierMethod::Iqr => {
            let mut sorted = closes.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            let (lower, upper) = (q1 - k * iqr, q3 + k * iqr);
            Box::new(move |v| v < lower || v > upper)
        }
        OutlierMethod::ZScore => {
            let n = closes.len() as f64;
            let mean = closes.iter().sum::<f64>() / n;
            let var = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let std = var.sqrt();
            if std == 0.0 {
                return Vec::new();
            }
            Box::new(move |v| ((v - mean) / std).abs() > k)
        }
    };

    series
        .bars()
        .iter()
        .filter(|b| is_outlier(b.close))
        .map(|b| b.date)
        .collect()
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
