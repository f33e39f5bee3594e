//! Core domain types, engines and services.

pub mod ohlcv;
pub mod raw;
pub mod error;
pub mod cache_key;
pub mod catalog;
pub mod validator;
pub mod indicator;
pub mod technical;
pub mod signal;
pub mod orchestrator;
pub mod portfolio;
pub mod settings;
pub mod desk;
