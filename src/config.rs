use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// Backend priority, first available wins. Known names: "remote",
    /// "embedded", "disabled".
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    #[serde(default = "default_health_check_secs")]
    pub health_check_secs: u64,
    #[serde(default)]
    pub remote: Option<RemoteBackendConfig>,
    #[serde(default)]
    pub embedded: EmbeddedBackendConfig,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            health_check_secs: default_health_check_secs(),
            remote: None,
            embedded: EmbeddedBackendConfig::default(),
        }
    }
}

fn default_priority() -> Vec<String> {
    vec![
        "remote".to_string(),
        "embedded".to_string(),
        "disabled".to_string(),
    ]
}
fn default_health_check_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteBackendConfig {
    /// Base URL of the query server, e.g. "http://127.0.0.1:8000".
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub user: String,
    pub pass: String,
    /// Embedding dimensionality the server-side index is defined with.
    pub dims: usize,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
    /// Short timeout for the availability probe, separate from the full
    /// connect timeout so detection never blocks on a down server.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_remote_timeout_secs() -> u64 {
    30
}
fn default_probe_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmbeddedBackendConfig {
    /// Index file path. Defaults to a `.vectors` sibling of the main db.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    /// Full-text candidates fetched per result slot before filtering.
    #[serde(default = "default_candidate_factor")]
    pub candidate_factor: i64,
    #[serde(default = "default_snippet_window")]
    pub snippet_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            candidate_factor: default_candidate_factor(),
            snippet_window: default_snippet_window(),
        }
    }
}

fn default_final_limit() -> i64 {
    10
}
fn default_candidate_factor() -> i64 {
    2
}
fn default_snippet_window() -> usize {
    200
}

impl VectorConfig {
    /// Default path for the embedded index: `<db path>.vectors`.
    pub fn embedded_path(&self, db_path: &Path) -> PathBuf {
        self.embedded.path.clone().unwrap_or_else(|| {
            let mut p = db_path.as_os_str().to_owned();
            p.push(".vectors");
            PathBuf::from(p)
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config =
        toml::from_str(&content).map_err(|e| Error::Config(format!("parse error: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.final_limit < 1 {
        return Err(Error::Config("retrieval.final_limit must be >= 1".into()));
    }
    if config.retrieval.candidate_factor < 1 {
        return Err(Error::Config(
            "retrieval.candidate_factor must be >= 1".into(),
        ));
    }

    for name in &config.vector.priority {
        match name.as_str() {
            "remote" | "embedded" | "disabled" => {}
            other => {
                return Err(Error::Config(format!(
                    "unknown vector backend '{}'. Must be remote, embedded, or disabled.",
                    other
                )))
            }
        }
    }

    if config.vector.priority.iter().any(|n| n == "remote") {
        if let Some(remote) = &config.vector.remote {
            if remote.dims == 0 {
                return Err(Error::Config("vector.remote.dims must be > 0".into()));
            }
            if remote.endpoint.trim().is_empty() {
                return Err(Error::Config("vector.remote.endpoint must be set".into()));
            }
        }
    }

    Ok(())
}
