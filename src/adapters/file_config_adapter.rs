//! INI file configuration adapter.

use crate::domain::error::HorseError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HorseError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| HorseError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, HorseError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| HorseError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
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
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{EnsembleConfig, FeedConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[storage]
sqlite_path = /var/lib/luckyhorse/trades.db
pool_size = 4

[feed]
path = /data/bitstampUSD.csv
exchange_id = 1
name = bitstamp
start = 2015-03-01

[ensemble]
wrongness_hist = 20
sampling_probability = 0.25
predictors = ToyPredictor, LinGradient
seed = 7

[logging]
level = debug
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(
            adapter.get_string("storage", "sqlite_path"),
            Some("/var/lib/luckyhorse/trades.db".to_string())
        );
        assert_eq!(adapter.get_int("storage", "pool_size", 1), 4);
        assert_eq!(adapter.get_double("ensemble", "sampling_probability", 0.0), 0.25);
        assert_eq!(adapter.get_list("ensemble", "predictors"), vec!["ToyPredictor", "LinGradient"]);
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[ensemble]\nseed = abc\n").unwrap();
        assert_eq!(adapter.get_string("ensemble", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_int("ensemble", "seed", 42), 42);
        assert_eq!(adapter.get_double("ensemble", "missing", 99.9), 99.9);
        assert!(adapter.get_list("ensemble", "predictors").is_empty());
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = true\nb = Yes\nc = 1\nd = off\ne = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(adapter.get_bool("x", "b", false));
        assert!(adapter.get_bool("x", "c", false));
        assert!(!adapter.get_bool("x", "d", true));
        assert!(adapter.get_bool("x", "e", true));
        assert!(!adapter.get_bool("x", "missing", false));
    }

    #[test]
    fn feeds_domain_config() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        let ensemble = EnsembleConfig::from_config(&adapter).unwrap();
        assert_eq!(ensemble.wrongness_hist, 20);
        assert_eq!(ensemble.seed, 7);
        assert_eq!(ensemble.predictors.len(), 2);

        let feed = FeedConfig::from_config(&adapter).unwrap();
        assert_eq!(feed.name, "bitstamp");
        assert_eq!(feed.start_ts, Some(1_425_168_000.0));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{FULL}").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("logging", "level"), Some("debug".to_string()));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        match result {
            Err(HorseError::ConfigParse { file, .. }) => assert!(file.contains("config.ini")),
            _ => panic!("expected ConfigParse"),
        }
    }
}
