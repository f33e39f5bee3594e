//! Untyped tabular payloads as delivered by source adapters.
//!
//! Adapters pass provider column names through unchanged; the validator
//! maps them onto the canonical schema and coerces each cell.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(v: Option<f64>) -> Self {
        v.map(RawValue::Number).unwrap_or(RawValue::Missing)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            RawValue::Missing
        } else {
            RawValue::Text(trimmed.to_string())
        }
    }
}

impl From<NaiveDate> for RawValue {
    fn from(d: NaiveDate) -> Self {
        RawValue::Text(d.format("%Y-%m-%d").to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub symbol: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawSeries {
    pub fn new(symbol: impl Into<String>, columns: &[&str]) -> Self {
        RawSeries {
            symbol: symbol.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One tradable fund in a market listing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EtfListing {
    pub symbol: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_missing() {
        assert_eq!(RawValue::from("  "), RawValue::Missing);
        assert_eq!(RawValue::from(" 1.5 "), RawValue::Text("1.5".into()));
    }

    #[test]
    fn optional_number() {
        assert_eq!(RawValue::from(None), RawValue::Missing);
        assert_eq!(RawValue::from(Some(2.0)), RawValue::Number(2.0));
    }

    #[test]
    fn push_rows() {
        let mut raw = RawSeries::new("SPY", &["date", "close"]);
        assert!(raw.is_empty());
        raw.push_row(vec!["2024-01-02".into(), 470.0.into()]);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.columns, vec!["date", "close"]);
    }
}
