//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every key is
//! optional:
//!
//! ```toml
//! authentication_command = "aws sso login --profile {env}"
//! query_files_dir = "/home/me/queries"
//! extra_query_files_dirs = ["/home/me/team-queries"]
//! poll_interval_ms = 1000
//! log_group_cache_capacity = 256
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::app::data_plane::cloudwatch_logs::LogGroupCatalogCache;

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default saved-query directory name inside the data directory
pub const QUERY_FILES_DIR_NAME: &str = "queryFiles";

/// Platform directories of the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "", "cwquery")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shell command run before loading a profile; `{env}` is replaced by the environment
    pub authentication_command: Option<String>,
    pub query_files_dir: Option<PathBuf>,
    /// Additional folders saved queries can be created in
    pub extra_query_files_dirs: Vec<PathBuf>,
    pub poll_interval_ms: u64,
    pub log_group_cache_capacity: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            authentication_command: None,
            query_files_dir: None,
            extra_query_files_dirs: Vec::new(),
            poll_interval_ms: 1000,
            log_group_cache_capacity: LogGroupCatalogCache::DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("No config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        debug!("Loaded config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Saved-query directory: configured, else `<data dir>/queryFiles`, else `./queryFiles`
    pub fn query_files_dir(&self) -> PathBuf {
        if let Some(dir) = &self.query_files_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(QUERY_FILES_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(QUERY_FILES_DIR_NAME))
    }
}
