//! Entry point for callers: the data, signal and portfolio operations behind
//! one explicitly wired instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::catalog::MARKETS;
use crate::domain::error::EtfDeskError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::orchestrator::{SourceOrchestrator, SourceState};
use crate::domain::portfolio::{PortfolioConfig, PortfolioEngine, RebalanceAction};
use crate::domain::raw::EtfListing;
use crate::domain::settings::Settings;
use crate::domain::signal::{BuySignal, SignalEvaluator};
use crate::domain::validator::{validate_etf_code, DataValidator};
use crate::ports::cache_port::{CacheStats, CacheStore};
use crate::ports::clock_port::Clock;
use crate::ports::portfolio_store_port::PortfolioStore;
use crate::ports::source_port::SourcePort;

pub struct EtfDesk {
    orchestrator: Arc<SourceOrchestrator>,
    signals: SignalEvaluator,
    portfolio: PortfolioEngine,
    clock: Arc<dyn Clock>,
}

/// Trims and upper-cases `symbol`, rejecting anything that is not an ETF code.
pub fn normalize_symbol(symbol: &str) -> Result<String, EtfDeskError> {
    let symbol = symbol.trim().to_uppercase();
    if !validate_etf_code(&symbol) {
        return Err(EtfDeskError::validation(format!(
            "'{symbol}' is not a valid ETF code (6 digits or 2-5 letters)"
        )));
    }
    Ok(symbol)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, EtfDeskError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        EtfDeskError::validation(format!("invalid date '{value}', expected YYYY-MM-DD"))
    })
}

impl EtfDesk {
    /// Wires the engines around caller-supplied sources, cache and store, and
    /// loads any persisted portfolio configuration.
    pub fn new(
        sources: Vec<Arc<dyn SourcePort>>,
        cache: Arc<dyn CacheStore>,
        store: Box<dyn PortfolioStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Result<Self, EtfDeskError> {
        if sources.is_empty() {
            return Err(EtfDeskError::configuration("no data sources configured"));
        }
        let orchestrator = Arc::new(SourceOrchestrator::new(
            sources,
            cache,
            DataValidator::new(settings.validator_config()),
            settings.orchestrator_config(),
        ));
        let signals = SignalEvaluator::new(
            orchestrator.clone(),
            clock.clone(),
            settings.indicators.clone(),
            settings.signals.clone(),
        );
        let mut portfolio = PortfolioEngine::new(
            store,
            orchestrator.clone(),
            clock.clone(),
            settings.portfolio.default_rebalance_threshold,
            settings.signals.default_window_days,
        );
        portfolio.load()?;

        Ok(EtfDesk {
            orchestrator,
            signals,
            portfolio,
            clock,
        })
    }

    /// Default stack: HTTP sources when compiled in, the optional CSV
    /// mirror, the synthetic fallback, a file cache and a JSON portfolio file.
    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self, EtfDeskError> {
        use crate::adapters::csv_source::CsvSource;
        use crate::adapters::file_cache::FileCache;
        use crate::adapters::json_portfolio_store::JsonPortfolioStore;
        use crate::adapters::synthetic_source::SyntheticSource;

        let mut sources: Vec<Arc<dyn SourcePort>> = Vec::new();

        #[cfg(feature = "http")]
        {
            use crate::adapters::alphavantage_source::AlphaVantageSource;
            use crate::adapters::yahoo_source::YahooSource;

            if settings.sources.primary_enabled {
                sources.push(Arc::new(YahooSource::new(settings.request_timeout())?));
            }
            if settings.sources.secondary_enabled {
                sources.push(Arc::new(AlphaVantageSource::new(
                    settings.sources.alphavantage_api_key.clone(),
                    settings.request_timeout(),
                )?));
            }
        }
        if settings.sources.secondary_enabled {
            if let Some(dir) = &settings.sources.csv_dir {
                sources.push(Arc::new(CsvSource::new(dir.clone())));
            }
        }
        if settings.sources.synthetic_enabled {
            sources.push(Arc::new(SyntheticSource::new()));
        }

        let cache = Arc::new(FileCache::new(settings.data.cache_dir.clone(), clock.clone()));
        let store = Box::new(JsonPortfolioStore::new(settings.portfolio.config_file.clone()));
        tracing::debug!(sources = sources.len(), cache_dir = %settings.data.cache_dir.display(), "wiring default stack");
        Self::new(sources, cache, store, clock, settings)
    }

    pub fn get_etf_data(&self, symbol: &str, start: &str, end: &str) -> Result<PriceSeries, EtfDeskError> {
        let symbol = normalize_symbol(symbol)?;
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        self.orchestrator.fetch_series(&symbol, start, end)
    }

    pub fn get_etf_list(&self, market: &str) -> Result<Vec<EtfListing>, EtfDeskError> {
        let market = market.trim().to_uppercase();
        if !MARKETS.contains(&market.as_str()) {
            return Err(EtfDeskError::validation(format!(
                "unknown market '{market}', expected one of {}",
                MARKETS.join(", ")
            )));
        }
        self.orchestrator.fetch_symbol_list(&market)
    }

    pub fn generate_buy_signal(
        &self,
        symbol: &str,
        series: Option<&PriceSeries>,
    ) -> Result<BuySignal, EtfDeskError> {
        let symbol = normalize_symbol(symbol)?;
        self.signals.generate(&symbol, series)
    }

    pub fn get_portfolio_config(&self) -> Option<&PortfolioConfig> {
        self.portfolio.config()
    }

    pub fn get_rebalance_suggestions(
        &self,
        prices: &BTreeMap<String, f64>,
    ) -> Result<Vec<RebalanceAction>, EtfDeskError> {
        self.portfolio.rebalance_suggestions(prices, None)
    }

    /// Latest closes of the portfolio's target symbols as of today.
    pub fn market_prices(&self) -> Result<BTreeMap<String, f64>, EtfDeskError> {
        self.portfolio.market_prices(self.clock.today())
    }

    /// Evicts every cache entry. Safe to call repeatedly.
    pub fn clear_cache(&self) -> Result<usize, EtfDeskError> {
        let removed = self.orchestrator.cache().clear()?;
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }

    pub fn prune_cache(&self) -> Result<usize, EtfDeskError> {
        self.orchestrator.cache().clear_expired()
    }

    pub fn cache_stats(&self) -> Result<CacheStats, EtfDeskError> {
        self.orchestrator.cache().stats()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn portfolio(&self) -> &PortfolioEngine {
        &self.portfolio
    }

    pub fn portfolio_mut(&mut self) -> &mut PortfolioEngine {
        &mut self.portfolio
    }

    pub fn signals(&self) -> &SignalEvaluator {
        &self.signals
    }

    pub fn source_states(&self) -> Vec<SourceState> {
        self.orchestrator.source_states()
    }

    pub fn probe_sources(&self) -> Vec<SourceState> {
        self.orchestrator.probe_all()
    }

    pub fn orchestrator(&self) -> &Arc<SourceOrchestrator> {
        &self.orchestrator
    }
}
