//! Cache path naming
//!
//! Downloads live in a URL-keyed namespace so their path is known before
//! any bytes are fetched. Extractions live in a content-keyed namespace so
//! byte-identical archives served from different URLs share one directory.
//! Staging locations carry a `.tmp.<uuid>` suffix and never collide with
//! either namespace.

use crate::cache::metadata::{DownloadRecord, RECORD_SUFFIX};
use crate::error::{FetchError, FetchResult};
use crate::resource::{url_path, ExtractMethod};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Marker separating a final path from its staging suffix
const STAGING_MARKER: &str = ".tmp.";

/// Maximum length of the human-readable part of a download file name
const MAX_SLUG_LEN: usize = 48;

/// A published cache artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// URL hash for downloads, content checksum for extractions
    pub key: String,
    /// Final location on disk
    pub path: PathBuf,
    /// Content length in bytes
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content
    pub checksum: String,
}

/// Deterministic layout of the download and extraction caches
#[derive(Debug, Clone)]
pub struct CacheIndex {
    download_dir: PathBuf,
    extract_dir: PathBuf,
}

impl CacheIndex {
    /// Create an index over the given cache roots
    pub fn new(download_dir: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            extract_dir: extract_dir.into(),
        }
    }

    /// Root of the URL-keyed download cache
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Root of the content-keyed extraction cache
    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Create both cache roots
    pub async fn ensure_dirs(&self) -> FetchResult<()> {
        for dir in [&self.download_dir, &self.extract_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| FetchError::io(format!("creating directory {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Cache key of a URL
    pub fn url_key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Final path of a downloaded URL
    pub fn download_path(&self, url: &str) -> PathBuf {
        let slug = slug(url);
        let key = Self::url_key(url);
        let name = if slug.is_empty() {
            key
        } else {
            format!("{}_{}", slug, key)
        };
        self.download_dir.join(name)
    }

    /// Final path of an extraction, keyed by method and content checksum
    pub fn extraction_path(&self, method: ExtractMethod, checksum: &str) -> PathBuf {
        self.extract_dir.join(format!("{}.{}", method, checksum))
    }

    /// Fresh private staging location for a final path
    pub fn staging_dir(final_path: &Path) -> PathBuf {
        let mut name = final_path.file_name().unwrap_or_default().to_os_string();
        name.push(format!("{}{}", STAGING_MARKER, Uuid::new_v4().simple()));
        final_path.with_file_name(name)
    }

    /// Whether a path is a staging location
    pub fn is_staging(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().contains(STAGING_MARKER))
            .unwrap_or(false)
    }

    /// Whether a published artifact exists at the path
    pub async fn exists_locally(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Published downloads that carry a metadata record
    pub async fn entries(&self) -> FetchResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in list_dir(&self.download_dir).await? {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if Self::is_staging(&path) || name.ends_with(RECORD_SUFFIX) {
                continue;
            }
            let Some(record) = DownloadRecord::load(&path).await? else {
                continue;
            };
            let key = name
                .rsplit('_')
                .next()
                .map(str::to_string)
                .unwrap_or_default();
            entries.push(CacheEntry {
                key,
                path: path.clone(),
                size_bytes: record.size_bytes,
                checksum: record.checksum,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Staging locations left behind by failed or interrupted operations
    pub async fn staging_dirs(&self) -> FetchResult<Vec<PathBuf>> {
        let mut staging = Vec::new();
        for dir in [&self.download_dir, &self.extract_dir] {
            staging.extend(
                list_dir(dir)
                    .await?
                    .into_iter()
                    .filter(|path| Self::is_staging(path)),
            );
        }
        staging.sort();
        Ok(staging)
    }

    /// Delete leftover staging locations, returning how many were removed
    pub async fn remove_staging(&self) -> FetchResult<usize> {
        let staging = self.staging_dirs().await?;
        for path in &staging {
            let result = if path.is_dir() {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_file(path).await
            };
            result.map_err(|e| FetchError::io(format!("removing {}", path.display()), e))?;
            debug!("Removed staging location {}", path.display());
        }
        Ok(staging.len())
    }
}

/// Readable prefix for a download file name: host plus last path segment
fn slug(url: &str) -> String {
    let path = url_path(url);
    let host = path.split('/').next().unwrap_or_default();
    let last = path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default();

    let raw = if last == host {
        host.to_string()
    } else {
        format!("{}_{}", host, last)
    };

    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect()
}

async fn list_dir(dir: &Path) -> FetchResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io(format!("reading directory {}", dir.display()), e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io("reading directory entry", e))?
    {
        paths.push(entry.path());
    }
    Ok(paths)
}
