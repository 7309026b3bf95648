use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::app::aggregate::ParseErrorPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} is required in the configuration")]
    Missing(&'static str),
}

/// Where the normalized run is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Sqlite,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub transport: Transport,
    /// Endpoint that receives the JSON payload (`http` transport).
    pub server_api_url: Option<String>,
    /// SQLite database file (`sqlite` transport).
    pub database_path: Option<PathBuf>,
    pub user_id: Option<String>,
    pub project_name: Option<String>,
    pub project_id: Option<String>,
    pub project_description: Option<String>,
    /// Directory scanned for report files.
    pub reports_dir: Option<PathBuf>,
    /// Display name of the run. Defaults to "Test Run".
    pub name: Option<String>,
    pub environment: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Controls how the reports directory is read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Glob patterns, relative to the reports directory, of files to skip.
    /// Example: ["*.draft.xml", "coverage-*.html"]
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Maximum number of files parsed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            concurrency: default_concurrency(),
            on_parse_error: ParseErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load a config file. `.toml` files are read as TOML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Check that every field needed by the selected transport is present.
    /// Empty strings count as missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.transport {
            Transport::Http if !present(&self.server_api_url) => {
                return Err(ConfigError::Missing("serverApiUrl"));
            }
            Transport::Sqlite if self.database_path.is_none() => {
                return Err(ConfigError::Missing("databasePath"));
            }
            _ => {}
        }
        self.validate_run()
    }

    /// Check only the fields that describe the run itself. A dry run needs
    /// nothing more.
    pub fn validate_run(&self) -> Result<(), ConfigError> {
        if !present(&self.user_id) {
            return Err(ConfigError::Missing("userId"));
        }
        if !present(&self.project_name) && !present(&self.project_id) {
            return Err(ConfigError::Missing("projectName"));
        }
        self.reports_dir()?;
        Ok(())
    }

    pub fn reports_dir(&self) -> Result<&Path, ConfigError> {
        self.reports_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("reportsDir"))
    }

    pub fn run_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("Test Run")
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
