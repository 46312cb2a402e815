//! Metadata records stored next to downloaded files
//!
//! Each published download `<name>` has a `<name>.INFO` JSON record naming
//! the URL that produced it along with its checksum and size. The record is
//! written after the data file, so a data file without one is hashed again.

use crate::checksums::UrlInfo;
use crate::error::{FetchError, FetchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File name suffix of metadata records
pub const RECORD_SUFFIX: &str = ".INFO";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Metadata of one published download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Source URL; download paths are derived from it, so there is one
    pub urls: Vec<String>,
    /// File name suggested by the server or URL
    pub original_fname: Option<String>,
    /// Lowercase hex SHA-256 of the content
    pub checksum: String,
    /// Content length in bytes
    pub size_bytes: u64,
    /// When the file was first published
    pub created_at: DateTime<Utc>,
}

impl DownloadRecord {
    /// Create a record for a freshly downloaded URL
    pub fn new(url: &str, original_fname: Option<String>, info: &UrlInfo) -> Self {
        Self {
            urls: vec![url.to_string()],
            original_fname,
            checksum: info.checksum.clone(),
            size_bytes: info.size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Size and checksum as a registry entry
    pub fn url_info(&self) -> UrlInfo {
        UrlInfo::new(self.size_bytes, self.checksum.clone())
    }

    /// Record for a forced re-download of the same path
    ///
    /// Unchanged content keeps its original `created_at`.
    pub fn merge(self, newer: DownloadRecord) -> Self {
        if self.checksum == newer.checksum {
            DownloadRecord {
                created_at: self.created_at,
                ..newer
            }
        } else {
            newer
        }
    }

    /// Path of the record belonging to a download path
    pub fn path_for(download_path: &Path) -> PathBuf {
        let mut name = download_path.file_name().unwrap_or_default().to_os_string();
        name.push(RECORD_SUFFIX);
        download_path.with_file_name(name)
    }

    /// Load the record of a download path, if present and readable
    pub async fn load(download_path: &Path) -> FetchResult<Option<Self>> {
        let path = Self::path_for(download_path);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::io(format!("reading record {}", path.display()), e))?;
        let record: DownloadRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Whether the record plausibly describes the file currently on disk
    pub async fn matches_file(&self, download_path: &Path) -> bool {
        fs::metadata(download_path)
            .await
            .is_ok_and(|meta| meta.len() == self.size_bytes)
    }

    /// Delete the record of a download path, if any
    pub async fn remove(download_path: &Path) -> FetchResult<()> {
        let path = Self::path_for(download_path);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FetchError::io(format!("removing record {}", path.display()), e)),
        }
    }

    /// Write the record atomically through the staging directory
    pub async fn save(self, download_path: &Path, staging_dir: &Path) -> FetchResult<Self> {
        let path = Self::path_for(download_path);
        let staged = staging_dir.join(path.file_name().unwrap_or_default());
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(&staged, content)
            .await
            .map_err(|e| FetchError::io(format!("writing record {}", staged.display()), e))?;
        fs::rename(&staged, &path)
            .await
            .map_err(|e| FetchError::io(format!("publishing record {}", path.display()), e))?;

        Ok(self)
    }
}
