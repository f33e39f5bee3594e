//! Target weights versus current holdings, deviation, and rebalance actions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::EtfDeskError;
use crate::domain::orchestrator::SourceOrchestrator;
use crate::ports::clock_port::Clock;
use crate::ports::portfolio_store_port::PortfolioStore;

/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 0.001;

pub const DEFAULT_REBALANCE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub etf_weights: BTreeMap<String, f64>,
    pub rebalance_threshold: f64,
    pub created_at: DateTime<Utc>,
}

impl PortfolioConfig {
    pub fn total_weight(&self) -> f64 {
        self.etf_weights.values().sum()
    }

    /// Full invariant check, applied on load and by `update_weights`.
    pub fn validate(&self) -> Result<(), EtfDeskError> {
        check_threshold(self.rebalance_threshold)?;
        check_weights(&self.etf_weights)
    }
}

fn check_threshold(threshold: f64) -> Result<(), EtfDeskError> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(EtfDeskError::configuration(format!(
            "rebalance threshold must be in (0, 1), got {threshold}"
        )));
    }
    Ok(())
}

fn check_weight(symbol: &str, weight: f64) -> Result<(), EtfDeskError> {
    if !(0.0..=1.0).contains(&weight) {
        return Err(EtfDeskError::configuration(format!(
            "weight for {symbol} must be in [0, 1], got {weight}"
        )));
    }
    Ok(())
}

fn check_weights(weights: &BTreeMap<String, f64>) -> Result<(), EtfDeskError> {
    if weights.is_empty() {
        return Ok(());
    }
    for (symbol, weight) in weights {
        check_weight(symbol, *weight)?;
    }
    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EtfDeskError::configuration(format!(
            "weights must sum to 1.0 (±{WEIGHT_TOLERANCE}), got {total:.4}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Buy => write!(f, "BUY"),
            ActionKind::Sell => write!(f, "SELL"),
            ActionKind::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceAction {
    pub symbol: String,
    pub action: ActionKind,
    pub current_weight: f64,
    pub target_weight: f64,
    pub deviation: f64,
    pub suggested_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioStatus {
    pub current_weights: BTreeMap<String, f64>,
    pub target_weights: BTreeMap<String, f64>,
    pub deviations: BTreeMap<String, f64>,
    pub total_value: f64,
    pub needs_rebalance: bool,
}

/// Portfolio configuration plus the session's holdings.
///
/// Every configuration mutation is persisted in full through the store
/// before it returns. Holdings live in memory only.
pub struct PortfolioEngine {
    store: Box<dyn PortfolioStore>,
    orchestrator: Arc<SourceOrchestrator>,
    clock: Arc<dyn Clock>,
    config: Option<PortfolioConfig>,
    holdings: BTreeMap<String, f64>,
    default_threshold: f64,
    price_window_days: i64,
}

impl PortfolioEngine {
    pub fn new(
        store: Box<dyn PortfolioStore>,
        orchestrator: Arc<SourceOrchestrator>,
        clock: Arc<dyn Clock>,
        default_threshold: f64,
        price_window_days: i64,
    ) -> Self {
        PortfolioEngine {
            store,
            orchestrator,
            clock,
            config: None,
            holdings: BTreeMap::new(),
            default_threshold,
            price_window_days,
        }
    }

    /// Loads the persisted configuration, rejecting one that breaks the
    /// weight or threshold invariants.
    pub fn load(&mut self) -> Result<Option<&PortfolioConfig>, EtfDeskError> {
        let loaded = self.store.load()?;
        if let Some(config) = &loaded {
            config.validate()?;
            tracing::info!(etfs = config.etf_weights.len(), "portfolio configuration loaded");
        }
        self.config = loaded;
        Ok(self.config.as_ref())
    }

    pub fn config(&self) -> Option<&PortfolioConfig> {
        self.config.as_ref()
    }

    fn config_or_err(&self) -> Result<&PortfolioConfig, EtfDeskError> {
        self.config
            .as_ref()
            .ok_or_else(|| EtfDeskError::configuration("no portfolio configuration exists"))
    }

    fn empty_config(&self) -> PortfolioConfig {
        PortfolioConfig {
            etf_weights: BTreeMap::new(),
            rebalance_threshold: self.default_threshold,
            created_at: self.clock.now(),
        }
    }

    /// Saves `candidate` and only then makes it current, so a failed save
    /// leaves the engine untouched.
    fn commit(&mut self, candidate: PortfolioConfig) -> Result<(), EtfDeskError> {
        self.store.save(&candidate)?;
        self.config = Some(candidate);
        Ok(())
    }

    /// Adds or replaces one target weight. The global sum is not checked.
    pub fn add_etf(&mut self, symbol: &str, weight: f64) -> Result<(), EtfDeskError> {
        check_weight(symbol, weight)?;
        let mut candidate = match &self.config {
            Some(config) => config.clone(),
            None => self.empty_config(),
        };
        candidate.etf_weights.insert(symbol.to_string(), weight);
        self.commit(candidate)?;
        tracing::info!(symbol, weight, "etf added to portfolio");
        Ok(())
    }

    /// Removes a target and any holding of it. The global sum is not checked.
    pub fn remove_etf(&mut self, symbol: &str) -> Result<(), EtfDeskError> {
        let mut candidate = self.config_or_err()?.clone();
        if candidate.etf_weights.remove(symbol).is_none() {
            return Err(EtfDeskError::configuration(format!(
                "{symbol} is not in the portfolio"
            )));
        }
        self.commit(candidate)?;
        self.holdings.remove(symbol);
        tracing::info!(symbol, "etf removed from portfolio");
        Ok(())
    }

    /// Replaces the whole weight map. Rejects the change unless the weights
    /// sum to 1.0 within [`WEIGHT_TOLERANCE`].
    pub fn update_weights(&mut self, weights: BTreeMap<String, f64>) -> Result<(), EtfDeskError> {
        if weights.is_empty() {
            return Err(EtfDeskError::configuration("weight map is empty"));
        }
        check_weights(&weights)?;
        let count = weights.len();
        let mut candidate = match &self.config {
            Some(config) => config.clone(),
            None => self.empty_config(),
        };
        candidate.etf_weights = weights;
        self.commit(candidate)?;
        tracing::info!(etfs = count, "target weights updated");
        Ok(())
    }

    pub fn set_rebalance_threshold(&mut self, threshold: f64) -> Result<(), EtfDeskError> {
        check_threshold(threshold)?;
        let mut candidate = self.config_or_err()?.clone();
        candidate.rebalance_threshold = threshold;
        self.commit(candidate)?;
        tracing::info!(threshold, "rebalance threshold updated");
        Ok(())
    }

    pub fn update_holdings(&mut self, holdings: BTreeMap<String, f64>) -> Result<(), EtfDeskError> {
        for (symbol, quantity) in &holdings {
            if !(quantity.is_finite() && *quantity >= 0.0) {
                return Err(EtfDeskError::configuration(format!(
                    "holding for {symbol} must be a non-negative quantity, got {quantity}"
                )));
            }
        }
        tracing::info!(etfs = holdings.len(), "holdings updated");
        self.holdings = holdings;
        Ok(())
    }

    pub fn holdings(&self) -> &BTreeMap<String, f64> {
        &self.holdings
    }

    /// Sum of quantity × price over held symbols. Symbols without a price
    /// are skipped.
    pub fn portfolio_value(&self, prices: &BTreeMap<String, f64>) -> f64 {
        let mut total = 0.0;
        for (symbol, quantity) in &self.holdings {
            match prices.get(symbol) {
                Some(price) => total += quantity * price,
                None => tracing::warn!(symbol = %symbol, "missing price, holding skipped"),
            }
        }
        tracing::debug!(total, "portfolio value");
        total
    }

    /// Weight of every priced holding in the total value; all zero when the
    /// portfolio is worth nothing.
    pub fn current_weights(&self, prices: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let total = self.portfolio_value(prices);
        self.holdings
            .iter()
            .filter_map(|(symbol, quantity)| {
                let price = prices.get(symbol)?;
                let weight = if total > 0.0 {
                    quantity * price / total
                } else {
                    0.0
                };
                Some((symbol.clone(), weight))
            })
            .collect()
    }

    /// `|current − target|` for every target symbol.
    pub fn compute_deviation(
        &self,
        prices: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, f64>, EtfDeskError> {
        let config = self.config_or_err()?;
        let current = self.current_weights(prices);
        Ok(config
            .etf_weights
            .iter()
            .map(|(symbol, target)| {
                let weight = current.get(symbol).copied().unwrap_or(0.0);
                (symbol.clone(), (weight - target).abs())
            })
            .collect())
    }

    /// One action per target symbol, largest deviation first, ties by symbol.
    /// `threshold` overrides the configured rebalance threshold and must lie
    /// in (0, 1) like the stored one.
    pub fn rebalance_suggestions(
        &self,
        prices: &BTreeMap<String, f64>,
        threshold: Option<f64>,
    ) -> Result<Vec<RebalanceAction>, EtfDeskError> {
        let config = self.config_or_err()?;
        if let Some(t) = threshold {
            check_threshold(t)?;
        }
        let threshold = threshold.unwrap_or(config.rebalance_threshold);
        let current = self.current_weights(prices);
        let total = self.portfolio_value(prices);

        let mut actions: Vec<RebalanceAction> = config
            .etf_weights
            .iter()
            .map(|(symbol, &target)| {
                let current_weight = current.get(symbol).copied().unwrap_or(0.0);
                let deviation = (current_weight - target).abs();
                let (action, suggested_amount) = if deviation > threshold {
                    let kind = if current_weight > target {
                        ActionKind::Sell
                    } else {
                        ActionKind::Buy
                    };
                    (kind, deviation * total)
                } else {
                    (ActionKind::Hold, 0.0)
                };
                RebalanceAction {
                    symbol: symbol.clone(),
                    action,
                    current_weight,
                    target_weight: target,
                    deviation,
                    suggested_amount,
                }
            })
            .collect();

        actions.sort_by(|a, b| {
            b.deviation
                .total_cmp(&a.deviation)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        tracing::info!(actions = actions.len(), threshold, "rebalance suggestions computed");
        Ok(actions)
    }

    pub fn status(&self, prices: &BTreeMap<String, f64>) -> Result<PortfolioStatus, EtfDeskError> {
        let config = self.config_or_err()?;
        let deviations = self.compute_deviation(prices)?;
        let needs_rebalance = deviations
            .values()
            .any(|d| *d > config.rebalance_threshold);
        Ok(PortfolioStatus {
            current_weights: self.current_weights(prices),
            target_weights: config.etf_weights.clone(),
            deviations,
            total_value: self.portfolio_value(prices),
            needs_rebalance,
        })
    }

    /// Latest close of every target symbol as of `as_of`. Symbols whose data
    /// cannot be fetched are left out.
    pub fn market_prices(&self, as_of: NaiveDate) -> Result<BTreeMap<String, f64>, EtfDeskError> {
        let config = self.config_or_err()?;
        let mut prices = BTreeMap::new();
        for symbol in config.etf_weights.keys() {
            match self
                .orchestrator
                .latest_close(symbol, as_of, self.price_window_days)
            {
                Ok(price) => {
                    prices.insert(symbol.clone(), price);
                }
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "no market price"),
            }
        }
        Ok(prices)
    }
}
