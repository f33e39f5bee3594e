//! Concrete adapter implementations for ports.

#[cfg(feature = "http")]
pub mod alphavantage_source;
pub mod atomic_file;
pub mod csv_source;
pub mod file_cache;
pub mod file_config_adapter;
pub mod json_portfolio_store;
pub mod memory_cache;
pub mod synthetic_source;
pub mod system_clock;
#[cfg(feature = "http")]
pub mod yahoo_source;
