use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use livechat::SourceConfig;
use livechat_gateway::GatewayConfig;

/// Everything the binary needs: provider settings, the log/relay/speech
/// pipeline, and URLs to register on startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Connections registered (idle) at startup.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub autostart: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:50930".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            sources: SourceConfig::default(),
            gateway: GatewayConfig::default(),
            urls: Vec::new(),
            autostart: false,
        }
    }
}

impl ServiceConfig {
    /// Layers the optional TOML file under `LIVECHAT__*` environment
    /// overrides (`LIVECHAT__GATEWAY__LOG__CAPACITY=1000`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("LIVECHAT").separator("__"))
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}
