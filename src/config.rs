use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::circleci::API_ENDPOINT;

/// Configuration file structure for ciwait.
///
/// Every value can also come from the command line or the plugin
/// environment, which take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub circleci: CircleCiConfig,

    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircleCiConfig {
    /// CircleCI personal API token
    pub token: Option<String>,

    /// API endpoint without the version segment
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Repository URL or slug (e.g., 'https://github.com/org/repo')
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaitConfig {
    /// Branch the pipeline was built on
    pub branch: Option<String>,

    /// Regular expression selecting the workflows to wait for
    #[serde(default = "default_workflow")]
    pub workflow: String,

    /// Seconds between two status checks
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Seconds to wait before the first request, for pipelines that are not
    /// visible in the API right after the push
    #[serde(default = "default_startup_delay")]
    pub startup_delay: u64,
}

impl Default for CircleCiConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
            repo: None,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            branch: None,
            workflow: default_workflow(),
            interval: default_interval(),
            startup_delay: default_startup_delay(),
        }
    }
}

fn default_base_url() -> String {
    API_ENDPOINT.to_string()
}

pub(crate) fn default_workflow() -> String {
    ".+".to_string()
}

pub(crate) fn default_interval() -> u64 {
    15
}

pub(crate) fn default_startup_delay() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ciwait.toml
    /// 3. ./ciwait.json
    /// 4. ./ciwait.yaml
    /// 5. ./ciwait.yml
    /// 6. `<config dir>/ciwait/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["ciwait.toml", "ciwait.json", "ciwait.yaml", "ciwait.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = user_config_path().filter(|p| p.exists()) {
            return Self::load_from_path(&path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ciwait").join("config.toml"))
}
