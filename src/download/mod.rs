//! Byte transfer collaborator
//!
//! The manager never talks to the network itself. It hands a [`Resource`]
//! and a private staging directory to a [`Downloader`], which writes exactly
//! one file there and reports its checksum and size.

mod http;

pub use http::HttpDownloader;

use crate::checksums::UrlInfo;
use crate::error::FetchResult;
use crate::resource::Resource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A file fetched into a staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Location of the fetched file inside the staging directory
    pub path: PathBuf,
    /// File name suggested by the server or URL
    pub original_fname: Option<String>,
    /// Lowercase hex SHA-256 of the fetched bytes
    pub checksum: String,
    /// Number of bytes fetched
    pub size_bytes: u64,
}

impl FetchedFile {
    /// Size and checksum as a registry entry
    pub fn url_info(&self) -> UrlInfo {
        UrlInfo::new(self.size_bytes, self.checksum.clone())
    }
}

/// Transfers one resource into a staging directory
///
/// Implementations must write exactly one file into `staging_dir` and
/// resolve with its checksum and size, or fail without leaving a file that
/// could be mistaken for a complete transfer.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the resource into the staging directory
    async fn fetch(&self, resource: &Resource, staging_dir: &Path) -> FetchResult<FetchedFile>;
}
