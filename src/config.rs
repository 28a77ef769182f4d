//! Runtime settings read from the environment (and `.env`, via `dotenvy`).

use std::{fmt::Display, path::PathBuf, str::FromStr};
use tracing::info;

pub const DATA_DIR: &str = "ARCHLOG_DATA_DIR";
pub const BIND: &str = "ARCHLOG_BIND";
pub const PAGE_SIZE: &str = "ARCHLOG_PAGE_SIZE";
pub const MAX_UPLOAD_BYTES: &str = "ARCHLOG_MAX_UPLOAD_BYTES";

const DATABASE_FILE: &str = "journal.db";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the journal database.
    pub data_dir: PathBuf,
    /// Listen address of the web server.
    pub bind: String,
    /// Default number of posts per feed page.
    pub page_size: u32,
    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "loaded environment file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            data_dir: try_load(&lookup, DATA_DIR, "./data")?,
            bind: try_load(&lookup, BIND, "0.0.0.0:3000")?,
            page_size: try_load(&lookup, PAGE_SIZE, "20")?,
            max_upload_bytes: try_load(&lookup, MAX_UPLOAD_BYTES, "26214400")?,
        };

        if config.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: PAGE_SIZE,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError, PAGE_SIZE};
    use std::{collections::HashMap, path::PathBuf};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(PathBuf::from("./data"), config.data_dir);
        assert_eq!("0.0.0.0:3000", config.bind);
        assert_eq!(20, config.page_size);
        assert_eq!(25 * 1024 * 1024, config.max_upload_bytes);
        assert_eq!(PathBuf::from("./data/journal.db"), config.database_path());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ARCHLOG_DATA_DIR", "/var/lib/archlog"),
            ("ARCHLOG_BIND", "127.0.0.1:8080"),
            ("ARCHLOG_PAGE_SIZE", "50"),
        ]))
        .unwrap();

        assert_eq!(PathBuf::from("/var/lib/archlog"), config.data_dir);
        assert_eq!("127.0.0.1:8080", config.bind);
        assert_eq!(50, config.page_size);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("ARCHLOG_PAGE_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: PAGE_SIZE, ref value, .. } if value == "many"));

        let err = Config::from_lookup(lookup(&[("ARCHLOG_PAGE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: PAGE_SIZE, .. }));

        assert!(Config::from_lookup(lookup(&[("ARCHLOG_MAX_UPLOAD_BYTES", "-1")])).is_err());
    }
}
