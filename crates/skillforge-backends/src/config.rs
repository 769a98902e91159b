//! Backend configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use skillforge_core::config::EngineConfig;
use skillforge_core::traits::GradingBackend;

use crate::mock::MockGrader;
use crate::remote::RemoteGrader;

/// Configuration for a single grading backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in
/// logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Remote {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Mock,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Remote {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Remote")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            BackendConfig::Mock => f.debug_struct("Mock").finish(),
        }
    }
}

/// Top-level skillforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillforgeConfig {
    /// Backend configurations keyed by name.
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
    /// Default backend to use.
    #[serde(default = "default_backend")]
    pub default_backend: String,
    /// Engine thresholds, bands, and decay parameters.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_backend() -> String {
    "remote".to_string()
}

impl Default for SkillforgeConfig {
    fn default() -> Self {
        Self {
            backends: HashMap::new(),
            default_backend: default_backend(),
            engine: EngineConfig::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a backend config.
fn resolve_backend_config(config: &BackendConfig) -> BackendConfig {
    match config {
        BackendConfig::Remote { api_key, base_url } => BackendConfig::Remote {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        BackendConfig::Mock => BackendConfig::Mock,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `skillforge.toml` in the current directory
/// 2. `~/.config/skillforge/config.toml`
///
/// Environment variable override: `SKILLFORGE_GRADER_KEY`.
pub fn load_config() -> Result<SkillforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SkillforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("skillforge.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<SkillforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SkillforgeConfig::default(),
    };

    // Apply env var override for the remote grader key
    if let Ok(key) = std::env::var("SKILLFORGE_GRADER_KEY") {
        config
            .backends
            .entry("remote".into())
            .or_insert(BackendConfig::Remote {
                api_key: String::new(),
                base_url: None,
            });
        if let Some(BackendConfig::Remote { api_key, .. }) = config.backends.get_mut("remote") {
            *api_key = key;
        }
    }

    // Resolve env vars in all backend configs
    let resolved: HashMap<String, BackendConfig> = config
        .backends
        .iter()
        .map(|(k, v)| (k.clone(), resolve_backend_config(v)))
        .collect();
    config.backends = resolved;

    config
        .engine
        .validate()
        .context("invalid engine configuration")?;

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("skillforge"))
}

/// Create a backend instance from its configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn GradingBackend>> {
    match config {
        BackendConfig::Remote { api_key, base_url } => {
            Ok(Box::new(RemoteGrader::new(api_key, base_url.clone())))
        }
        BackendConfig::Mock => Ok(Box::new(MockGrader::with_fixed(8, 10, 0.9))),
    }
}
