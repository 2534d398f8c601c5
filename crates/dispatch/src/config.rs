//! Dispatcher configuration loaded from TOML.

use crate::{
    registry::{AnyRegistry, FileRegistry, MemoryRegistry, RestRegistry},
    splitter::{AnySplitter, ChatSplitter, LineSplitter},
};
use anyhow::{Context, Result, bail};
use protocol::env::non_empty;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Top-level dispatcher configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Shared secret sent to nodes (supports `${ENV_VAR}` expansion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Retry and concurrency settings.
    pub dispatch: DispatchConfig,
    /// Where the worker directory lives.
    pub registry: RegistryConfig,
    /// How commands are split into subtasks.
    pub splitter: SplitterConfig,
}

/// Retry and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Attempts per subtask, first try included.
    pub max_attempts: u32,
    /// Timeout applied to subtasks that do not set one.
    pub default_timeout_secs: u64,
    /// Extra time the client waits past a subtask's timeout.
    pub request_grace_secs: u64,
    /// Calls in flight at once. Defaults to the run's worker count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_timeout_secs: protocol::DEFAULT_TIMEOUT_SECS,
            request_grace_secs: 5,
            max_in_flight: None,
        }
    }
}

impl DispatchConfig {
    /// [`Self::default_timeout_secs`] as a [`Duration`], at least one second.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs.max(1))
    }

    /// [`Self::request_grace_secs`] as a [`Duration`].
    pub fn request_grace(&self) -> Duration {
        Duration::from_secs(self.request_grace_secs)
    }
}

/// Registry backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Seeded from [`RegistryConfig::workers`], lost on exit.
    #[default]
    Memory,
    /// JSON file at [`RegistryConfig::path`].
    File,
    /// PostgREST table at [`RegistryConfig::url`].
    Rest,
}

/// Worker directory configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Backend kind.
    pub backend: RegistryBackend,
    /// File backend: path of the JSON file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Rest backend: project URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Rest backend: service key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Rest backend: table name.
    pub table: String,
    /// Memory backend: endpoints, numbered from 1.
    pub workers: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Memory,
            path: None,
            url: None,
            key: None,
            table: "worker_nodes".to_owned(),
            workers: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Build the configured backend.
    pub fn build(&self) -> Result<AnyRegistry> {
        Ok(match self.backend {
            RegistryBackend::Memory => {
                let registry = MemoryRegistry::new();
                for endpoint in &self.workers {
                    registry.insert(endpoint)?;
                }
                AnyRegistry::Memory(registry)
            }
            RegistryBackend::File => {
                let path = match &self.path {
                    Some(path) => path.clone(),
                    None => default_registry_path()
                        .context("no registry path configured and no data directory found")?,
                };
                AnyRegistry::File(FileRegistry::open(path)?)
            }
            RegistryBackend::Rest => {
                let Some(url) = non_empty(self.url.clone()) else {
                    bail!("registry.url is required for the rest backend");
                };
                let Some(key) = non_empty(self.key.clone()) else {
                    bail!("registry.key is required for the rest backend");
                };
                AnyRegistry::Rest(RestRegistry::new(
                    reqwest::Client::new(),
                    &url,
                    &key,
                    &self.table,
                )?)
            }
        })
    }
}

/// Splitter configuration. Without an API key commands are split locally.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: None,
            model: "gpt-4o-mini".to_owned(),
        }
    }
}

impl SplitterConfig {
    /// Build the configured splitter.
    pub fn build(&self) -> AnySplitter {
        match non_empty(self.api_key.clone()) {
            Some(key) => AnySplitter::Chat(ChatSplitter::new(
                reqwest::Client::new(),
                &self.base_url,
                &key,
                &self.model,
            )),
            None => AnySplitter::Line(LineSplitter),
        }
    }
}

impl GridConfig {
    /// Parse a TOML string into a `GridConfig`, expanding environment
    /// variables first.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let expanded = protocol::env::expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load `path`, or the default location if it exists, or defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/grid/grid.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("grid").join("grid.toml"))
    }

    /// Apply `GRID_SECRET` from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("GRID_SECRET") {
            self.secret = Some(secret);
        }
    }

    /// The secret to send, if any.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

fn default_registry_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("grid").join("workers.json"))
}
