//! Configuration schema for fetchcache
//!
//! Configuration is stored at `~/.config/fetchcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache locations
    pub cache: CacheConfig,

    /// Download settings
    pub download: DownloadConfig,

    /// Extraction settings
    pub extract: ExtractConfig,

    /// Checksum verification settings
    pub checksums: ChecksumsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where published downloads live
    pub download_dir: PathBuf,

    /// Where extractions live
    pub extract_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fetchcache");
        Self {
            download_dir: root.join("downloads"),
            extract_dir: root.join("extracted"),
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-transfer timeout in seconds (default: 5 minutes)
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Always re-download, ignoring published files
    pub force: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: concat!("fetchcache/", env!("CARGO_PKG_VERSION")).to_string(),
            force: false,
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Always re-extract, ignoring existing extractions
    pub force: bool,
}

/// Checksum verification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumsConfig {
    /// TSV file of expected checksums (`url<TAB>size<TAB>sha256`);
    /// when unset, checksums are recorded instead of verified
    pub file: Option<PathBuf>,

    /// Accept URLs missing from the checksums file, with a warning
    pub allow_unpinned: bool,
}
