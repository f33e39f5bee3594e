//! Persistence port for the portfolio configuration.

use crate::domain::error::EtfDeskError;
use crate::domain::portfolio::PortfolioConfig;

pub trait PortfolioStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<PortfolioConfig>, EtfDeskError>;

    /// Rewrites the stored record in full.
    fn save(&self, config: &PortfolioConfig) -> Result<(), EtfDeskError>;
}
