//! Runtime configuration, read from the environment (and `.env` if present).

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORAGE_DIR: &str = "./data";
pub const DEFAULT_DATABASE_PATH: &str = "./rowpipe.sqlite";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Uploads and stage outputs.
    pub storage_dir: PathBuf,
    pub database_path: PathBuf,
    pub workers: usize,
    /// Jobs allowed to wait for a worker before submissions are refused.
    pub queue_capacity: usize,
    /// Rows per bulk insert.
    pub batch_size: usize,
    pub shutdown_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads `ROWPIPE_*` variables over the defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let config = AppConfig {
            host: lookup("ROWPIPE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "ROWPIPE_PORT")?.unwrap_or(defaults.port),
            storage_dir: lookup("ROWPIPE_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            database_path: lookup("ROWPIPE_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            workers: parse_var(&lookup, "ROWPIPE_WORKERS")?.unwrap_or(defaults.workers),
            queue_capacity: parse_var(&lookup, "ROWPIPE_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            batch_size: parse_var(&lookup, "ROWPIPE_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            shutdown_grace: parse_var(&lookup, "ROWPIPE_SHUTDOWN_GRACE")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            bail!("Server port must be greater than 0");
        }
        if self.host.trim().is_empty() {
            bail!("Server host cannot be empty");
        }
        if self.workers == 0 {
            bail!("Worker count must be greater than 0");
        }
        if self.batch_size == 0 {
            bail!("Batch size must be greater than 0");
        }
        if self.storage_dir.as_os_str().is_empty() {
            bail!("Storage directory cannot be empty");
        }
        if self.database_path.as_os_str().is_empty() {
            bail!("Database path cannot be empty");
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} has an invalid value '{}'", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.shutdown_grace, Duration::from_secs(60));
    }

    #[test]
    fn variables_override_defaults() {
        let config = from_pairs(&[
            ("ROWPIPE_PORT", "9090"),
            ("ROWPIPE_WORKERS", "8"),
            ("ROWPIPE_BATCH_SIZE", " 500 "),
            ("ROWPIPE_STORAGE_DIR", "/srv/rowpipe"),
            ("ROWPIPE_SHUTDOWN_GRACE", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.workers, 8);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.storage_dir, PathBuf::from("/srv/rowpipe"));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = from_pairs(&[("ROWPIPE_WORKERS", "many")]).unwrap_err();
        assert!(err.to_string().contains("ROWPIPE_WORKERS"));

        assert!(from_pairs(&[("ROWPIPE_PORT", "0")]).is_err());
        assert!(from_pairs(&[("ROWPIPE_WORKERS", "0")]).is_err());
        assert!(from_pairs(&[("ROWPIPE_BATCH_SIZE", "0")]).is_err());
        assert!(from_pairs(&[("ROWPIPE_DATABASE_PATH", "")]).is_err());
    }
}
