//! Service configuration: a YAML file, with environment variables taking precedence
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::SledStore;

pub const DB_PATH_VAR: &str = "LOAN_SERVICE_DB_PATH";
pub const LOG_FILTER_VAR: &str = "LOAN_SERVICE_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("loan-service.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanServiceConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl LoanServiceConfig {
    /// Read the file at `path`, then apply environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("failed to parse config")
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_VAR).filter(|v| !v.is_empty()) {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(filter) = lookup(LOG_FILTER_VAR).filter(|v| !v.is_empty()) {
            self.logging.filter = filter;
        }
    }

    pub fn open_store(&self) -> anyhow::Result<Arc<SledStore>> {
        let db = sled::open(&self.storage.path).with_context(|| {
            format!("failed to open database at {}", self.storage.path.display())
        })?;
        let store = SledStore::open(Arc::new(db)).context("failed to open loan store trees")?;
        Ok(Arc::new(store))
    }
}
