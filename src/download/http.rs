//! HTTP downloader backed by `ureq`

use super::{Downloader, FetchedFile};
use crate::checksums::Sha256Writer;
use crate::error::{FetchError, FetchResult};
use crate::resource::Resource;
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use ureq::Agent;

/// Default timeout for a whole transfer in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Default User-Agent header
const DEFAULT_USER_AGENT: &str = concat!("fetchcache/", env!("CARGO_PKG_VERSION"));

/// Buffer size for writing downloaded bytes (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// File name used when neither the server nor the URL suggests one
const FALLBACK_FNAME: &str = "download";

/// Blocking HTTP client run on tokio's blocking pool
#[derive(Clone)]
pub struct HttpDownloader {
    agent: Agent,
    user_agent: String,
    timeout: Duration,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDownloader {
    /// Create a downloader with default settings
    pub fn new() -> Self {
        Self::with_settings(
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_USER_AGENT.to_string(),
        )
    }

    /// Create a downloader with a custom timeout and User-Agent
    pub fn with_settings(timeout: Duration, user_agent: String) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: Agent::new_with_config(config),
            user_agent,
            timeout,
        }
    }

    /// Transfer timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn fetch_blocking(
        &self,
        url: &str,
        fallback_fname: &str,
        staging_dir: &Path,
    ) -> FetchResult<FetchedFile> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => FetchError::transfer(
                    url,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ),
                other => FetchError::transfer(url, other),
            })?;

        let original_fname = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| fallback_fname.to_string());

        let dest = staging_dir.join(sanitize_fname(&original_fname));
        let file = File::create(&dest)
            .map_err(|e| FetchError::io(format!("creating {}", dest.display()), e))?;

        let mut reader = response.into_body().into_reader();
        let mut writer = Sha256Writer::new(BufWriter::with_capacity(BUFFER_SIZE, file));

        let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.flush());
        if let Err(e) = copied {
            fs::remove_file(&dest).ok();
            return Err(FetchError::transfer(url, e));
        }

        let (_, info) = writer.finish();
        debug!("Fetched {} ({} bytes) into {}", url, info.size_bytes, dest.display());

        Ok(FetchedFile {
            path: dest,
            original_fname: Some(original_fname),
            checksum: info.checksum,
            size_bytes: info.size_bytes,
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, resource: &Resource, staging_dir: &Path) -> FetchResult<FetchedFile> {
        info!("Downloading {}", resource.label());

        let this = self.clone();
        let url = resource.url.clone();
        let fallback = resource
            .file_name()
            .unwrap_or(FALLBACK_FNAME)
            .to_string();
        let staging_dir: PathBuf = staging_dir.to_path_buf();

        tokio::task::spawn_blocking(move || this.fetch_blocking(&url, &fallback, &staging_dir))
            .await
            .map_err(|e| FetchError::transfer(&resource.url, format!("download task failed: {}", e)))?
    }
}

/// Extract the file name from a Content-Disposition header value
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// Keep only the final component of a suggested file name
fn sanitize_fname(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        FALLBACK_FNAME.to_string()
    } else {
        base.to_string()
    }
}
