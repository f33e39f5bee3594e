//! Market data source port.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::domain::error::SourceError;
use crate::domain::raw::{EtfListing, RawSeries};

/// Static priority band. Sources are tried Primary first, Synthetic last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SourceTier {
    Primary,
    Secondary,
    Synthetic,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Primary => write!(f, "primary"),
            SourceTier::Secondary => write!(f, "secondary"),
            SourceTier::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Uniform access to one external data provider.
///
/// Implementations return provider column names untouched; standardization
/// happens in the validator.
pub trait SourcePort: Send + Sync {
    fn name(&self) -> &str;

    fn tier(&self) -> SourceTier;

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, SourceError>;

    fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, SourceError>;

    fn test_connection(&self) -> bool;
}
