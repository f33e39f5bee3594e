//! Runtime settings: read from a [`ConfigPort`], overridden from the
//! environment, then validated as a whole.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::error::EtfDeskError;
use crate::domain::orchestrator::{OrchestratorConfig, RetryPolicy};
use crate::domain::portfolio::DEFAULT_REBALANCE_THRESHOLD;
use crate::domain::signal::SignalConfig;
use crate::domain::technical::IndicatorConfig;
use crate::domain::validator::{OutlierMethod, ValidatorConfig};
use crate::ports::config_port::ConfigPort;

pub const ENV_CACHE_DIR: &str = "ETF_CACHE_DIR";
pub const ENV_CACHE_EXPIRY_HOURS: &str = "ETF_CACHE_EXPIRY_HOURS";
pub const ENV_LOG_LEVEL: &str = "ETF_LOG_LEVEL";
pub const ENV_PORTFOLIO_FILE: &str = "ETF_PORTFOLIO_FILE";
pub const ENV_ALPHAVANTAGE_KEY: &str = "ALPHAVANTAGE_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub cache_dir: PathBuf,
    pub cache_expiry_hours: i64,
    pub symbol_list_expiry_hours: i64,
    pub max_retries: i64,
    pub retry_delay_ms: i64,
    pub request_timeout_secs: i64,
    pub price_precision: i64,
    pub min_rows: i64,
    pub outlier_detection: bool,
    pub outlier_method: String,
    pub outlier_threshold: f64,
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            cache_dir: PathBuf::from("data/cache"),
            cache_expiry_hours: 24,
            symbol_list_expiry_hours: 72,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 30,
            price_precision: 2,
            min_rows: 30,
            outlier_detection: false,
            outlier_method: "iqr".to_string(),
            outlier_threshold: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub primary_enabled: bool,
    pub secondary_enabled: bool,
    pub synthetic_enabled: bool,
    pub csv_dir: Option<PathBuf>,
    pub alphavantage_api_key: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            primary_enabled: true,
            secondary_enabled: true,
            synthetic_enabled: true,
            csv_dir: None,
            alphavantage_api_key: "demo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSettings {
    pub config_file: PathBuf,
    pub default_rebalance_threshold: f64,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        PortfolioSettings {
            config_file: PathBuf::from("data/portfolio_config.json"),
            default_rebalance_threshold: DEFAULT_REBALANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub data: DataSettings,
    pub sources: SourceSettings,
    pub indicators: IndicatorConfig,
    pub signals: SignalConfig,
    pub portfolio: PortfolioSettings,
    pub log_level: Option<String>,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EtfDeskError {
    EtfDeskError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_periods(value: &str) -> Result<Vec<usize>, EtfDeskError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| invalid("indicators", "ma_periods", format!("'{s}' is not a period")))
        })
        .collect()
}

impl Settings {
    /// Reads every section, falling back to defaults for absent keys.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EtfDeskError> {
        let d = DataSettings::default();
        let data = DataSettings {
            cache_dir: config
                .get_string("data", "cache_dir")
                .map(PathBuf::from)
                .unwrap_or(d.cache_dir),
            cache_expiry_hours: config.get_int("data", "cache_expiry_hours", d.cache_expiry_hours),
            symbol_list_expiry_hours: config.get_int(
                "data",
                "symbol_list_expiry_hours",
                d.symbol_list_expiry_hours,
            ),
            max_retries: config.get_int("data", "max_retries", d.max_retries),
            retry_delay_ms: config.get_int("data", "retry_delay_ms", d.retry_delay_ms),
            request_timeout_secs: config.get_int(
                "data",
                "request_timeout_secs",
                d.request_timeout_secs,
            ),
            price_precision: config.get_int("data", "price_precision", d.price_precision),
            min_rows: config.get_int("data", "min_rows", d.min_rows),
            outlier_detection: config.get_bool("data", "outlier_detection", d.outlier_detection),
            outlier_method: config
                .get_string("data", "outlier_method")
                .unwrap_or(d.outlier_method),
            outlier_threshold: config.get_double("data", "outlier_threshold", d.outlier_threshold),
        };

        let s = SourceSettings::default();
        let sources = SourceSettings {
            primary_enabled: config.get_bool("sources", "primary_enabled", s.primary_enabled),
            secondary_enabled: config.get_bool("sources", "secondary_enabled", s.secondary_enabled),
            synthetic_enabled: config.get_bool("sources", "synthetic_enabled", s.synthetic_enabled),
            csv_dir: config
                .get_string("sources", "csv_dir")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            alphavantage_api_key: config
                .get_string("sources", "alphavantage_api_key")
                .unwrap_or(s.alphavantage_api_key),
        };

        let i = IndicatorConfig::default();
        let indicators = IndicatorConfig {
            ma_periods: match config.get_string("indicators", "ma_periods") {
                Some(v) => parse_periods(&v)?,
                None => i.ma_periods,
            },
            rsi_period: usize::try_from(config.get_int("indicators", "rsi_period", i.rsi_period as i64))
                .map_err(|_| invalid("indicators", "rsi_period", "must be non-negative"))?,
            rsi_overbought: config.get_double("indicators", "rsi_overbought", i.rsi_overbought),
            rsi_oversold: config.get_double("indicators", "rsi_oversold", i.rsi_oversold),
            rsi_neutral: config.get_double("indicators", "rsi_neutral", i.rsi_neutral),
        };

        let sig = SignalConfig::default();
        let signals = SignalConfig {
            max_drawdown_threshold: config.get_double(
                "signals",
                "max_drawdown_threshold",
                sig.max_drawdown_threshold,
            ),
            default_window_days: config.get_int("signals", "default_window_days", sig.default_window_days),
        };

        let p = PortfolioSettings::default();
        let portfolio = PortfolioSettings {
            config_file: config
                .get_string("portfolio", "config_file")
                .map(PathBuf::from)
                .unwrap_or(p.config_file),
            default_rebalance_threshold: config.get_double(
                "portfolio",
                "default_rebalance_threshold",
                p.default_rebalance_threshold,
            ),
        };

        Ok(Settings {
            data,
            sources,
            indicators,
            signals,
            portfolio,
            log_level: config.get_string("logging", "level"),
        })
    }

    /// Applies environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), EtfDeskError> {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.data.cache_dir = PathBuf::from(dir);
        }
        if let Some(hours) = lookup(ENV_CACHE_EXPIRY_HOURS) {
            self.data.cache_expiry_hours = hours
                .trim()
                .parse()
                .map_err(|_| invalid("env", ENV_CACHE_EXPIRY_HOURS, format!("'{hours}' is not an integer")))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }
        if let Some(file) = lookup(ENV_PORTFOLIO_FILE) {
            self.portfolio.config_file = PathBuf::from(file);
        }
        if let Some(key) = lookup(ENV_ALPHAVANTAGE_KEY) {
            self.sources.alphavantage_api_key = key;
        }
        Ok(())
    }

    /// Config file, then process environment, then validation.
    pub fn load(config: &dyn ConfigPort) -> Result<Self, EtfDeskError> {
        let mut settings = Settings::from_config(config)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            price_precision: u32::try_from(self.data.price_precision).unwrap_or(2),
            min_rows: usize::try_from(self.data.min_rows).unwrap_or(1),
            outlier_detection: self.data.outlier_detection,
            outlier_method: self.data.outlier_method.parse().unwrap_or(OutlierMethod::Iqr),
            outlier_threshold: self.data.outlier_threshold,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                max_retries: u32::try_from(self.data.max_retries).unwrap_or(1),
                retry_delay: Duration::from_millis(u64::try_from(self.data.retry_delay_ms).unwrap_or(0)),
            },
            series_ttl: chrono::Duration::hours(self.data.cache_expiry_hours),
            symbol_list_ttl: chrono::Duration::hours(self.data.symbol_list_expiry_hours),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.data.request_timeout_secs).unwrap_or(30))
    }
}

pub fn validate_settings(settings: &Settings) -> Result<(), EtfDeskError> {
    validate_data(&settings.data)?;
    validate_sources(&settings.sources)?;
    validate_indicators(&settings.indicators)?;
    validate_signals(&settings.signals)?;
    validate_portfolio(&settings.portfolio)?;
    Ok(())
}

fn validate_data(data: &DataSettings) -> Result<(), EtfDeskError> {
    if data.max_retries < 1 {
        return Err(invalid("data", "max_retries", "max_retries must be at least 1"));
    }
    if data.retry_delay_ms < 0 {
        return Err(invalid("data", "retry_delay_ms", "retry_delay_ms must be non-negative"));
    }
    if data.request_timeout_secs < 1 {
        return Err(invalid("data", "request_timeout_secs", "request_timeout_secs must be positive"));
    }
    if data.cache_expiry_hours <= 0 {
        return Err(invalid("data", "cache_expiry_hours", "cache_expiry_hours must be positive"));
    }
    if data.symbol_list_expiry_hours <= 0 {
        return Err(invalid(
            "data",
            "symbol_list_expiry_hours",
            "symbol_list_expiry_hours must be positive",
        ));
    }
    if !(0..=8).contains(&data.price_precision) {
        return Err(invalid("data", "price_precision", "price_precision must be between 0 and 8"));
    }
    if data.min_rows < 1 {
        return Err(invalid("data", "min_rows", "min_rows must be at least 1"));
    }
    if let Err(e) = data.outlier_method.parse::<OutlierMethod>() {
        return Err(invalid("data", "outlier_method", e));
    }
    if !(data.outlier_threshold > 0.0) {
        return Err(invalid("data", "outlier_threshold", "outlier_threshold must be positive"));
    }
    Ok(())
}

fn validate_sources(sources: &SourceSettings) -> Result<(), EtfDeskError> {
    if !(sources.primary_enabled || sources.secondary_enabled || sources.synthetic_enabled) {
        return Err(invalid("sources", "synthetic_enabled", "at least one source must be enabled"));
    }
    Ok(())
}

fn validate_indicators(indicators: &IndicatorConfig) -> Result<(), EtfDeskError> {
    if indicators.ma_periods.iter().any(|p| *p == 0) {
        return Err(invalid("indicators", "ma_periods", "periods must be positive"));
    }
    if indicators.trend_periods().is_err() {
        return Err(invalid("indicators", "ma_periods", "at least three distinct periods are required"));
    }
    if indicators.rsi_period < 1 {
        return Err(invalid("indicators", "rsi_period", "rsi_period must be at least 1"));
    }
    let ordered = 0.0 <= indicators.rsi_oversold
        && indicators.rsi_oversold < indicators.rsi_neutral
        && indicators.rsi_neutral < indicators.rsi_overbought
        && indicators.rsi_overbought <= 100.0;
    if !ordered {
        return Err(invalid(
            "indicators",
            "rsi_neutral",
            "expected 0 <= rsi_oversold < rsi_neutral < rsi_overbought <= 100",
        ));
    }
    Ok(())
}

fn validate_signals(signals: &SignalConfig) -> Result<(), EtfDeskError> {
    let t = signals.max_drawdown_threshold;
    if !(t > 0.0 && t < 1.0) {
        return Err(invalid("signals", "max_drawdown_threshold", "must be between 0 and 1"));
    }
    if signals.default_window_days < 1 {
        return Err(invalid("signals", "default_window_days", "must be at least 1"));
    }
    Ok(())
}

fn validate_portfolio(portfolio: &PortfolioSettings) -> Result<(), EtfDeskError> {
    let t = portfolio.default_rebalance_threshold;
    if !(t > 0.0 && t < 1.0) {
        return Err(invalid("portfolio", "default_rebalance_threshold", "must be between 0 and 1"));
    }
    Ok(())
}
