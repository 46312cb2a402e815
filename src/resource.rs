//! Resource descriptors
//!
//! A [`Resource`] names one remote artifact: where to fetch it, what checksum
//! it must have (if known up front) and how to unpack it once downloaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a downloaded file is unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMethod {
    /// The downloaded file is the final artifact
    None,
    /// ZIP archive
    Zip,
    /// Uncompressed tarball
    Tar,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
    /// Single gzip-compressed file
    Gzip,
    /// Single bzip2-compressed file
    Bzip2,
}

impl ExtractMethod {
    /// Guess the method from a file name or URL path
    pub fn guess(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if name.ends_with(".zip") {
            Self::Zip
        } else if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".bz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }

    /// Short name used in extraction directory names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar_gz",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }

    /// Whether fetching a resource with this method produces an extraction
    pub fn is_extracting(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ExtractMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fetchable, optionally extractable remote artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Fetch origin; also the download identity
    pub url: String,
    /// Trusted SHA-256 hex digest of the content, if pinned by the caller
    pub expected_checksum: Option<String>,
    /// How the fetched bytes are unpacked
    pub extract_method: ExtractMethod,
    /// Human-readable tag, for diagnostics only
    pub name: Option<String>,
}

impl Resource {
    /// Create a resource, guessing the extraction method from the URL path
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let extract_method = ExtractMethod::guess(url_path(&url));
        Self {
            url,
            expected_checksum: None,
            extract_method,
            name: None,
        }
    }

    /// Pin the expected content checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into().to_ascii_lowercase());
        self
    }

    /// Override the extraction method
    pub fn with_method(mut self, method: ExtractMethod) -> Self {
        self.extract_method = method;
        self
    }

    /// Attach a logical name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// File name suggested by the URL (last path segment), if any
    pub fn file_name(&self) -> Option<&str> {
        url_path(&self.url)
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
    }

    /// Label used in log lines: the logical name when set, otherwise the URL
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

impl From<&str> for Resource {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Resource {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// A local file to extract without downloading it first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Archive {
    /// Path of the archive on disk
    pub path: PathBuf,
    /// How to unpack it
    pub method: ExtractMethod,
}

impl Archive {
    /// Create an archive, guessing the method from the file name
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let method = path
            .file_name()
            .map(|name| ExtractMethod::guess(&name.to_string_lossy()))
            .unwrap_or(ExtractMethod::None);
        Self { path, method }
    }

    /// Override the extraction method
    pub fn with_method(mut self, method: ExtractMethod) -> Self {
        self.method = method;
        self
    }
}

impl From<PathBuf> for Archive {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for Archive {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// Strip scheme, query and fragment from a URL, leaving `host/path`
pub(crate) fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let end = without_scheme
        .find(|c| c == '?' || c == '#')
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}
