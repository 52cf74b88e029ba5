//! Run configuration.
//!
//! A [`PipelineConfig`] is resolved once at startup from an optional JSON file,
//! command-line overrides and environment variables, then passed explicitly to
//! the executor and sink.
//!
//! ```json
//! {
//!   "source": "s3://tickets/snapshot.parquet",
//!   "table_name": "od_demand",
//!   "concurrency": 8,
//!   "sink": { "kind": "csv", "dir": "out" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TABLE_NAME: &str = "od_demand";
const DEFAULT_DB_HOST: &str = "postgres-postgresql.db.svc.cluster.local";
const DEFAULT_DB_PORT: &str = "5432";
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_NAME: &str = "postgres";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no source dataset given")]
    MissingSource,

    #[error("the variable DB_PASSWORD is not set")]
    MissingPassword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Postgres {
        url: String,
    },
    Csv {
        dir: String,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        gzip: bool,
    },
}

impl SinkConfig {
    /// Builds the PostgreSQL sink from `DATABASE_URL`, or from `DB_HOST`,
    /// `DB_PORT`, `DB_USER`, `DB_NAME` and the required `DB_PASSWORD`.
    pub fn postgres_from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("DATABASE_URL").filter(|u| !u.is_empty()) {
            return Ok(SinkConfig::Postgres { url });
        }

        let password = var("DB_PASSWORD")
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)?;
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let url = format!(
            "postgresql://{}:{}@{}:{}/{}",
            or("DB_USER", DEFAULT_DB_USER),
            password,
            or("DB_HOST", DEFAULT_DB_HOST),
            or("DB_PORT", DEFAULT_DB_PORT),
            or("DB_NAME", DEFAULT_DB_NAME),
        );
        Ok(SinkConfig::Postgres { url })
    }

    pub fn postgres_from_env() -> Result<Self, ConfigError> {
        Self::postgres_from_vars(|name| std::env::var(name).ok())
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: String,
    pub table_name: String,
    pub concurrency: usize,
    pub sink: SinkConfig,
}

/// Partial settings, as found in a config file or given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub source: Option<String>,
    pub table_name: Option<String>,
    pub concurrency: Option<usize>,
    pub sink: Option<SinkConfig>,
}

impl ConfigLayer {
    /// Loads a layer from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Values set in `overrides` win over values in `self`.
    pub fn merged(self, overrides: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            source: overrides.source.or(self.source),
            table_name: overrides.table_name.or(self.table_name),
            concurrency: overrides.concurrency.or(self.concurrency),
            sink: overrides.sink.or(self.sink),
        }
    }

    /// Fills defaults. Without a configured sink, PostgreSQL is built via
    /// `default_sink`.
    pub fn resolve<F>(self, default_sink: F) -> Result<PipelineConfig, ConfigError>
    where
        F: FnOnce() -> Result<SinkConfig, ConfigError>,
    {
        let source = self.source.ok_or(ConfigError::MissingSource)?;
        let sink = match self.sink {
            Some(sink) => sink,
            None => default_sink()?,
        };

        Ok(PipelineConfig {
            source,
            table_name: self
                .table_name
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency).max(1),
            sink,
        })
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
