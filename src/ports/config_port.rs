//! Configuration access port.
//!
//! Lookups never fail: a missing or unparsable value yields the caller's
//! default, and range checks happen once the settings are assembled.

pub trait ConfigPort {
    /// Raw value of `[section] key`, if present.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    /// Accepts true/yes/on/1 and false/no/off/0.
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
