//! Local CSV mirror source.
//!
//! Layout: `{base_path}/{SYMBOL}.csv`, one file per fund, any header names
//! the validator recognizes.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::domain::error::SourceError;
use crate::domain::raw::{EtfListing, RawSeries, RawValue};
use crate::domain::validator::{canonical_field, parse_date_value, validate_etf_code, Field};
use crate::ports::source_port::{SourcePort, SourceTier};

pub struct CsvSource {
    base_path: PathBuf,
}

impl CsvSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.csv", symbol.trim().to_uppercase()))
    }
}

fn in_market(symbol: &str, market: &str) -> bool {
    match market.trim().to_ascii_uppercase().as_str() {
        "A" => symbol.chars().all(|c| c.is_ascii_digit()),
        "US" => symbol.chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

impl SourcePort for CsvSource {
    fn name(&self) -> &str {
        "csv_mirror"
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
        let path = self.csv_path(symbol);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            Err(e) => {
                return Err(SourceError::Other(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| SourceError::ResponseFormat(format!("CSV header error: {}", e)))?
            .clone();
        let columns: Vec<&str> = headers.iter().collect();
        let date_idx = columns
            .iter()
            .position(|c| canonical_field(c) == Some(Field::Date));

        let mut raw = RawSeries::new(symbol, &columns);
        for result in rdr.records() {
            let record =
                result.map_err(|e| SourceError::ResponseFormat(format!("CSV parse error: {}", e)))?;
            let row: Vec<RawValue> = (0..columns.len())
                .map(|i| record.get(i).map(RawValue::from).unwrap_or(RawValue::Missing))
                .collect();

            let date = date_idx.and_then(|i| parse_date_value(&row[i]));
            if let Some(date) = date {
                if date < start || date > end {
                    continue;
                }
            }
            raw.push_row(row);
        }

        tracing::debug!(symbol, rows = raw.len(), path = %path.display(), "read csv mirror");
        Ok(raw)
    }

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError> {
        let dir = fs::read_dir(&self.base_path).map_err(|e| {
            SourceError::Other(format!("failed to list {}: {}", self.base_path.display(), e))
        })?;
        let mut listings = Vec::new();
        for item in dir {
            let path = item
                .map_err(|e| SourceError::Other(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_etf_code(symbol) && in_market(symbol, market) {
                listings.push(EtfListing {
                    symbol: symbol.to_string(),
                    name: symbol.to_string(),
                });
            }
        }
        listings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(listings)
    }

    fn test_connection(&self) -> bool {
        self.base_path.is_dir()
    }
}
