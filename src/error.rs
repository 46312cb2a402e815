//! Error types for fetchcache
//!
//! All modules use `FetchResult<T>` as their return type. Errors are `Clone`
//! because a single failed operation is reported to every caller waiting on
//! it; I/O sources are kept behind an `Arc` for that reason.

use crate::resource::ExtractMethod;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for fetchcache operations
pub type FetchResult<T> = Result<T, FetchError>;

/// All errors that can occur while fetching, verifying or extracting
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    // Integrity errors
    #[error("{}", checksum_mismatch_message(url, expected.as_deref(), actual, *size_bytes))]
    ChecksumMismatch {
        url: String,
        expected: Option<String>,
        actual: String,
        size_bytes: u64,
    },

    // Collaborator errors
    #[error("Download failed for {url}: {reason}")]
    TransferFailure { url: String, reason: String },

    #[error("Extraction of {path} failed: {reason}")]
    ExtractionFailure { path: PathBuf, reason: String },

    #[error("Unsupported extraction method: {0}")]
    UnsupportedExtractionMethod(ExtractMethod),

    #[error("Operation for {key} ended without a result")]
    Cancelled { key: String },

    // Checksum registry errors
    #[error("Invalid checksums file {path} (line {line}): {reason}")]
    ChecksumsFileInvalid {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn checksum_mismatch_message(
    url: &str,
    expected: Option<&str>,
    actual: &str,
    size_bytes: u64,
) -> String {
    match expected {
        Some(expected) => format!(
            "Checksum mismatch for {}: expected {}, got {} ({} bytes)",
            url, expected, actual, size_bytes
        ),
        None => format!(
            "No known checksum for {} (got {}, {} bytes)",
            url, actual, size_bytes
        ),
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

impl From<toml::ser::Error> for FetchError {
    fn from(err: toml::ser::Error) -> Self {
        Self::TomlSerialize(err.to_string())
    }
}

impl FetchError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a transfer failure for a URL
    pub fn transfer(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransferFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an extraction failure for an archive path
    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ExtractionFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if a fresh attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransferFailure { .. }
                | Self::ExtractionFailure { .. }
                | Self::Cancelled { .. }
                | Self::Io { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ChecksumMismatch { expected: None, .. } => Some(
                "Re-run with --record-checksums to trust this download, or set checksums.allow_unpinned",
            ),
            Self::ChecksumMismatch { .. } => {
                Some("The remote file changed or is corrupted; check the pinned checksum")
            }
            Self::UnsupportedExtractionMethod(_) => {
                Some("Download without --extract and unpack the file manually")
            }
            Self::ConfigInvalid { .. } => Some("Run: fetchcache config init --force"),
            _ => None,
        }
    }
}
