use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "NEM12_INGEST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "nem12-config.toml";

/// What to do with days that do not carry a full set of intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncompleteDayPolicy {
    /// Skip the day; nothing is written for it.
    #[default]
    Drop,
    /// Write the day with `complete = false` and log a warning.
    Flag,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root_dir: PathBuf,
    pub collection: String,
    pub site_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data"),
            collection: "sites".to_string(),
            site_name: "Home".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Upper bound on documents per write batch (one calendar year per batch).
    pub max_batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub incomplete_days: IncompleteDayPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub output_dir: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("merged"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text exposition is written here at the end of each run.
    pub textfile_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sink: SinkConfig,
    pub load: LoadConfig,
    pub merge: MergeConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `explicit`, else `$NEM12_INGEST_CONFIG`, else
    /// `nem12-config.toml` if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match env::var(CONFIG_ENV) {
                Ok(path) => PathBuf::from(path),
                Err(_) => {
                    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                    if !default.exists() {
                        tracing::debug!("no config file found, using defaults");
                        return Ok(Self::default());
                    }
                    default
                }
            },
        };

        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg = Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").expect("config");
        assert_eq!(cfg.store.root_dir, PathBuf::from("data"));
        assert_eq!(cfg.store.collection, "sites");
        assert_eq!(cfg.sink.max_batch_size, 500);
        assert_eq!(cfg.load.incomplete_days, IncompleteDayPolicy::Drop);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            root_dir = "/var/lib/nem12"
            site_name = "Shed"

            [sink]
            max_retries = 5

            [load]
            incomplete_days = "flag"

            [metrics]
            textfile_path = "/tmp/nem12.prom"
            "#,
        )
        .expect("config");

        assert_eq!(cfg.store.root_dir, PathBuf::from("/var/lib/nem12"));
        assert_eq!(cfg.store.collection, "sites");
        assert_eq!(cfg.store.site_name, "Shed");
        assert_eq!(cfg.sink.max_retries, 5);
        assert_eq!(cfg.sink.retry_backoff_ms, 200);
        assert_eq!(cfg.load.incomplete_days, IncompleteDayPolicy::Flag);
        assert_eq!(
            cfg.metrics.map(|m| m.textfile_path),
            Some(PathBuf::from("/tmp/nem12.prom"))
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = AppConfig::from_toml_str("[load]\nincomplete_days = \"keep\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::load(Some(missing.as_path())).is_err());

        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "[merge]\noutput_dir = \"out\"\n").unwrap();
        let cfg = AppConfig::load(Some(path.as_path())).expect("config");
        assert_eq!(cfg.merge.output_dir, PathBuf::from("out"));
    }
}
