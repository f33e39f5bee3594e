//! INI file configuration adapter.

use crate::domain::error::EtfDeskError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EtfDeskError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EtfDeskError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EtfDeskError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EtfDeskError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Empty configuration: every lookup falls back to its default.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_sections() {
        let content = r#"
[data]
cache_dir = /var/cache/etfdesk
max_retries = 5

[indicators]
ma_periods = 5,20,30
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "cache_dir"),
            Some("/var/cache/etfdesk".to_string())
        );
        assert_eq!(adapter.get_int("data", "max_retries", 3), 5);
        assert_eq!(
            adapter.get_string("indicators", "ma_periods"),
            Some("5,20,30".to_string())
        );
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[data]\nmin_rows = 10\n").unwrap();
        assert_eq!(adapter.get_string("data", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_int("data", "missing", 42), 42);
        assert_eq!(adapter.get_double("signals", "max_drawdown_threshold", 0.2), 0.2);
        assert!(adapter.get_bool("sources", "primary_enabled", true));
    }

    #[test]
    fn non_numeric_values_fall_back() {
        let adapter = FileConfigAdapter::from_string(
            "[data]\nmax_retries = abc\noutlier_threshold = wide\n",
        )
        .unwrap();
        assert_eq!(adapter.get_int("data", "max_retries", 3), 3);
        assert_eq!(adapter.get_double("data", "outlier_threshold", 1.5), 1.5);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[signals]\nmax_drawdown_threshold = 0.25\n").unwrap();
        assert_eq!(
            adapter.get_double("signals", "max_drawdown_threshold", 0.0),
            0.25
        );
    }

    #[test]
    fn get_bool_variants() {
        let adapter = FileConfigAdapter::from_string(
            "[sources]\na = true\nb = yes\nc = 1\nd = off\ne = no\nf = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("sources", "a", false));
        assert!(adapter.get_bool("sources", "b", false));
        assert!(adapter.get_bool("sources", "c", false));
        assert!(!adapter.get_bool("sources", "d", true));
        assert!(!adapter.get_bool("sources", "e", true));
        assert!(adapter.get_bool("sources", "f", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[portfolio]\nconfig_file = /tmp/p.json\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("portfolio", "config_file"),
            Some("/tmp/p.json".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(EtfDeskError::ConfigParse { .. })));
    }

    #[test]
    fn empty_has_no_values() {
        let adapter = FileConfigAdapter::empty();
        assert_eq!(adapter.get_string("data", "cache_dir"), None);
    }
}
