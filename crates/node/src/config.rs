//! Node configuration loaded from TOML.

use anyhow::{Context, Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level node configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Server bind configuration.
    pub server: ServerConfig,
    /// Identity reported by `/health` and `/status`.
    pub worker_id: CompactString,
    /// Shared secret required on `/execute*` (supports `${ENV_VAR}`
    /// expansion). Unset or empty disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Capabilities advertised by `/status`.
    pub capabilities: Vec<CompactString>,
    /// How task bodies are run.
    pub executor: ExecutorConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            worker_id: "unknown".into(),
            secret: None,
            capabilities: vec!["python".into(), "subprocess".into()],
            executor: ExecutorConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: protocol::DEFAULT_PORT,
        }
    }
}

/// Executor configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program run by `/execute`; the task body is appended as the last argument.
    pub program: String,
    /// Arguments placed before the task body.
    pub args: Vec<String>,
    /// Interpreter run by `/execute-python` as `<python> -c <task>`.
    pub python: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "echo".to_owned(),
            args: Vec::new(),
            python: "python3".to_owned(),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML string into a `NodeConfig`, expanding environment
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

    /// Apply `WORKER_ID`, `PORT` and `GRID_SECRET` from the environment.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(id) = std::env::var("WORKER_ID") {
            self.worker_id = id.into();
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid PORT '{port}'"))?;
        }
        if let Ok(secret) = std::env::var("GRID_SECRET") {
            self.secret = Some(secret);
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
