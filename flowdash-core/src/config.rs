use crate::error::DashboardError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const API_URL_ENV: &str = "FLOWDASH_API_URL";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub default_page_size: usize,
    pub page_size_options: Vec<usize>,
    pub request_timeout_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            default_page_size: 10,
            page_size_options: vec![10, 20, 50, 100],
            request_timeout_secs: 30,
        }
    }
}

impl DashboardConfig {
    /// Load from the platform config directory, falling back to defaults when no
    /// file exists. `FLOWDASH_API_URL` always wins over the file.
    pub fn load() -> Result<Self, DashboardError> {
        let path = Self::default_path()?;
        let mut config = Self::load_from(&path)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            log::debug!("Using API base URL from {}: {}", API_URL_ENV, url);
            config.api_base_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, DashboardError> {
        if !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("Failed to read config file: {}", e)))?;
        let config: DashboardConfig = serde_json::from_str(&content)
            .map_err(|e| DashboardError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), DashboardError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DashboardError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DashboardError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| DashboardError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, DashboardError> {
        ProjectDirs::from("", "", "flowdash")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or_else(|| {
                DashboardError::Config("Could not determine config directory".to_string())
            })
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(DashboardError::Config("api_base_url is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DashboardError::Config(format!(
                "api_base_url must start with http:// or https://, got '{}'",
                url
            )));
        }
        if self.default_page_size == 0 {
            return Err(DashboardError::Config(
                "default_page_size must be greater than zero".to_string(),
            ));
        }
        if self.page_size_options.is_empty() || self.page_size_options.contains(&0) {
            return Err(DashboardError::Config(
                "page_size_options must be non-empty and positive".to_string(),
            ));
        }
        Ok(())
    }
}
