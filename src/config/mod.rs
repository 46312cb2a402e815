//! Configuration management for fetchcache

pub mod schema;

pub use schema::Config;

use crate::checksums::ChecksumRegistry;
use crate::download::HttpDownloader;
use crate::error::{FetchError, FetchResult};
use crate::manager::{DownloadManager, ManagerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fetchcache")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> FetchResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> FetchResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| FetchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> FetchResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            FetchError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> FetchResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: Arc::new(e),
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Manager settings derived from the cache, download and extract sections
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            download_dir: self.cache.download_dir.clone(),
            extract_dir: self.cache.extract_dir.clone(),
            force_download: self.download.force,
            force_extraction: self.extract.force,
        }
    }

    /// Checksum registry from the configured file, or a recording registry
    pub async fn checksum_registry(&self) -> FetchResult<ChecksumRegistry> {
        let registry = match &self.checksums.file {
            Some(path) if path.is_dir() => ChecksumRegistry::load_dir(path).await?,
            Some(path) => ChecksumRegistry::load(path).await?,
            None => ChecksumRegistry::recording(),
        };
        Ok(registry.with_allow_unpinned(self.checksums.allow_unpinned))
    }

    /// HTTP downloader with the configured timeout and User-Agent
    pub fn http_downloader(&self) -> HttpDownloader {
        HttpDownloader::with_settings(
            Duration::from_secs(self.download.timeout_secs),
            self.download.user_agent.clone(),
        )
    }

    /// Manager wired with the configured registry and downloader
    pub async fn download_manager(&self) -> FetchResult<DownloadManager> {
        Ok(DownloadManager::builder(self.manager_config())
            .registry(self.checksum_registry().await?)
            .downloader(self.http_downloader())
            .build())
    }
}
