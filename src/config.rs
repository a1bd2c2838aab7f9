//! Configuration Management
//!
//! Loads cloud definitions from a `clouds.yaml` file.

use crate::error::{Error, Result};
use crate::wait::DEFAULT_WAIT_INTERVAL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One cloud entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudConfig {
    /// Pre-issued auth token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    /// Project used to fill `{project_id}` in resource paths
    #[serde(default)]
    pub project_id: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub api_timeout: Option<u64>,
    /// How many times a retriable status code is retried
    #[serde(default = "default_status_code_retries")]
    pub status_code_retries: u32,
    /// Seconds between transport retries
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Default poll interval for waits
    #[serde(default = "default_wait_interval")]
    pub wait_interval: u64,
    /// Service type -> endpoint URL
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

fn default_status_code_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_wait_interval() -> u64 {
    DEFAULT_WAIT_INTERVAL.as_secs()
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            token: None,
            region_name: None,
            project_id: None,
            api_timeout: None,
            status_code_retries: default_status_code_retries(),
            retry_delay: default_retry_delay(),
            wait_interval: default_wait_interval(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl CloudConfig {
    pub fn api_timeout(&self) -> Option<Duration> {
        self.api_timeout.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval)
    }
}

/// Root of `clouds.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub clouds: BTreeMap<String, CloudConfig>,
}

impl Config {
    /// Candidate config file locations, most specific first
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var("OS_CLIENT_CONFIG_FILE") {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("clouds.yaml"));
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("stacksdk").join("clouds.yaml"));
        }
        paths
    }

    /// Load the first config file found
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_paths().into_iter().find(|p| p.exists()) else {
            return Err(Error::Config("no clouds.yaml found".to_string()));
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolve a cloud entry (argument > `OS_CLOUD` > the only cloud defined).
    /// `OS_TOKEN` overrides the configured token.
    pub fn cloud(&self, name: Option<&str>) -> Result<CloudConfig> {
        let env_name = std::env::var("OS_CLOUD").ok();
        let name = name.map(str::to_string).or(env_name);

        let mut cloud = match name {
            Some(ref name) => self
                .clouds
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("cloud '{}' is not defined", name)))?,
            None if self.clouds.len() == 1 => self.clouds.values().next().cloned().unwrap_or_default(),
            None => {
                return Err(Error::Config(
                    "several clouds defined, pick one with --cloud or OS_CLOUD".to_string(),
                ))
            },
        };

        if let Ok(token) = std::env::var("OS_TOKEN") {
            cloud.token = Some(token);
        }

        Ok(cloud)
    }
}
