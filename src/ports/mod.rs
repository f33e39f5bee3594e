//! Traits at the I/O seams.

pub mod cache_port;
pub mod clock_port;
pub mod config_port;
pub mod portfolio_store_port;
pub mod source_port;
