//! Portfolio configuration persisted as one JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::atomic_file::write_atomic;
use crate::domain::error::EtfDeskError;
use crate::domain::portfolio::PortfolioConfig;
use crate::ports::portfolio_store_port::PortfolioStore;

pub struct JsonPortfolioStore {
    path: PathBuf,
}

impl JsonPortfolioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PortfolioStore for JsonPortfolioStore {
    fn load(&self) -> Result<Option<PortfolioConfig>, EtfDeskError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_slice(&bytes).map_err(|e| {
            EtfDeskError::configuration(format!(
                "unreadable portfolio file {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(config))
    }

    fn save(&self, config: &PortfolioConfig) -> Result<(), EtfDeskError> {
        let bytes = serde_json::to_vec_pretty(config)?;
        write_atomic(&self.path, &bytes)?;
        tracing::debug!(path = %self.path.display(), "portfolio configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn config() -> PortfolioConfig {
        PortfolioConfig {
            etf_weights: BTreeMap::from([("510300".to_string(), 0.6), ("SPY".to_string(), 0.4)]),
            rebalance_threshold: 0.05,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPortfolioStore::new(dir.path().join("portfolio.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPortfolioStore::new(dir.path().join("nested/portfolio.json"));
        store.save(&config()).unwrap();
        assert_eq!(store.load().unwrap(), Some(config()));

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"etf_weights\""));
        assert!(text.contains("\"rebalance_threshold\""));
        assert!(text.contains("\"created_at\""));
    }

    #[test]
    fn corrupt_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(&path, "{").unwrap();
        let err = JsonPortfolioStore::new(path).load().unwrap_err();
        assert!(matches!(err, EtfDeskError::Configuration { .. }));
    }
}
