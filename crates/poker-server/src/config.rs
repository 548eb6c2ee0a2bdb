//! Server configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Capacity of each connection's outbound frame queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default)]
    pub linear: LinearConfig,
}

/// Issue tracker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Cycle URL to pull issues from at startup.
    #[serde(default)]
    pub cycle: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9867
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./web/dist")
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_api_url() -> String {
    "https://api.linear.app/graphql".to_string()
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            cycle: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            outbound_buffer: default_outbound_buffer(),
            linear: LinearConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load config from `config/default.toml`, then the user config directory,
    /// falling back to defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("config/default.toml");
        if local.exists() {
            return Self::load_from(&local);
        }

        if let Some(user) = user_config_path() {
            if user.exists() {
                return Self::load_from(&user);
            }
        }

        Ok(Config::default())
    }
}

/// `<config dir>/poker/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("poker").join("config.toml"))
}
