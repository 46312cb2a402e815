//! Checksum registry and SHA-256 helpers
//!
//! The registry holds the checksums a caller trusts (usually loaded from a
//! `checksums.tsv` file) and the checksums observed during this run. An
//! empty registry puts the manager in recording mode: every computed
//! checksum is accepted and recorded so it can be written back to disk and
//! pinned on the next run.
//!
//! File format, one entry per line:
//!
//! ```text
//! # url                                   size   sha256
//! https://example.com/data.zip            1024   9f86d081884c7d65...
//! ```

use crate::error::{FetchError, FetchResult};
use crate::resource::Resource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Buffer size for reading files during checksum calculation (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// Length of a SHA-256 digest in hex characters
const SHA256_HEX_LEN: usize = 64;

/// Size and checksum of one downloaded URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlInfo {
    /// Content length in bytes
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 digest
    pub checksum: String,
}

impl UrlInfo {
    pub fn new(size_bytes: u64, checksum: impl Into<String>) -> Self {
        Self {
            size_bytes,
            checksum: checksum.into(),
        }
    }
}

/// Expected checksums plus the checksums recorded during this run
#[derive(Debug, Default)]
pub struct ChecksumRegistry {
    expected: HashMap<String, UrlInfo>,
    recorded: RwLock<BTreeMap<String, UrlInfo>>,
    allow_unpinned: bool,
}

impl ChecksumRegistry {
    /// Create a verifying registry from known checksums
    ///
    /// An empty map yields a registry in recording mode.
    pub fn new(expected: HashMap<String, UrlInfo>) -> Self {
        Self {
            expected,
            recorded: RwLock::new(BTreeMap::new()),
            allow_unpinned: false,
        }
    }

    /// Create an empty registry (recording mode)
    pub fn recording() -> Self {
        Self::default()
    }

    /// Accept URLs missing from a verifying registry instead of failing
    pub fn with_allow_unpinned(mut self, allow: bool) -> Self {
        self.allow_unpinned = allow;
        self
    }

    /// Load a registry from a checksums file
    pub async fn load(path: &Path) -> FetchResult<Self> {
        let expected = read_checksums_file(path).await?;
        debug!(
            "Loaded {} checksums from {}",
            expected.len(),
            path.display()
        );
        Ok(Self::new(expected))
    }

    /// Load and merge every `*.tsv` file in a directory
    pub async fn load_dir(dir: &Path) -> FetchResult<Self> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| FetchError::io(format!("reading checksums dir {}", dir.display()), e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FetchError::io("reading checksums dir entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tsv") {
                files.push(path);
            }
        }
        files.sort();

        let mut expected = HashMap::new();
        for file in &files {
            expected.extend(read_checksums_file(file).await?);
        }
        debug!(
            "Loaded {} checksums from {} files in {}",
            expected.len(),
            files.len(),
            dir.display()
        );
        Ok(Self::new(expected))
    }

    /// Whether computed checksums are recorded rather than verified
    pub fn is_recording_mode(&self) -> bool {
        self.expected.is_empty()
    }

    /// Expected size and checksum for a URL
    pub fn lookup(&self, url: &str) -> Option<&UrlInfo> {
        self.expected.get(url)
    }

    /// Whether a download of this resource must be verified
    pub fn has_expectation(&self, resource: &Resource) -> bool {
        resource.expected_checksum.is_some() || !self.is_recording_mode()
    }

    /// Check a computed checksum against what is known for the resource
    ///
    /// A checksum pinned on the resource is always enforced. Otherwise the
    /// registry entry for the URL is enforced unless the registry is in
    /// recording mode.
    pub fn validate(&self, resource: &Resource, actual: &UrlInfo) -> FetchResult<()> {
        if resource.expected_checksum.is_some() {
            return verify_pinned(resource, actual);
        }

        let mismatch = |expected: Option<String>| FetchError::ChecksumMismatch {
            url: resource.url.clone(),
            expected,
            actual: actual.checksum.clone(),
            size_bytes: actual.size_bytes,
        };

        if self.is_recording_mode() {
            return Ok(());
        }

        match self.lookup(&resource.url) {
            Some(known) if known == actual => Ok(()),
            Some(known) => Err(mismatch(Some(known.checksum.clone()))),
            None if self.allow_unpinned => {
                warn!(
                    "No checksum registered for {}, accepting {}",
                    resource.url, actual.checksum
                );
                Ok(())
            }
            None => Err(mismatch(None)),
        }
    }

    /// Store an observed checksum and size, regardless of mode
    pub fn record(&self, url: &str, info: UrlInfo) {
        self.recorded.write().insert(url.to_string(), info);
    }

    /// Recorded checksum of a URL
    pub fn recorded(&self, url: &str) -> Option<UrlInfo> {
        self.recorded.read().get(url).cloned()
    }

    /// Checksums observed during this run, keyed by URL
    pub fn recorded_checksums(&self) -> BTreeMap<String, String> {
        self.recorded
            .read()
            .iter()
            .map(|(url, info)| (url.clone(), info.checksum.clone()))
            .collect()
    }

    /// Download sizes observed during this run, keyed by URL
    pub fn download_sizes(&self) -> BTreeMap<String, u64> {
        self.recorded
            .read()
            .iter()
            .map(|(url, info)| (url.clone(), info.size_bytes))
            .collect()
    }

    /// Write recorded checksums to a file, keeping entries already there
    pub async fn write_recorded(&self, path: &Path) -> FetchResult<usize> {
        let mut merged: BTreeMap<String, UrlInfo> = if path.exists() {
            read_checksums_file(path).await?.into_iter().collect()
        } else {
            BTreeMap::new()
        };
        merged.extend(
            self.recorded
                .read()
                .iter()
                .map(|(url, info)| (url.clone(), info.clone())),
        );

        let mut content = String::new();
        for (url, info) in &merged {
            content.push_str(&format!("{}\t{}\t{}\n", url, info.size_bytes, info.checksum));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                FetchError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
        let tmp = tmp_sibling(path);
        fs::write(&tmp, content)
            .await
            .map_err(|e| FetchError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| FetchError::io(format!("replacing {}", path.display()), e))?;

        debug!("Wrote {} checksums to {}", merged.len(), path.display());
        Ok(merged.len())
    }
}

/// Parse a checksums file into a URL map
async fn read_checksums_file(path: &Path) -> FetchResult<HashMap<String, UrlInfo>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| FetchError::io(format!("reading checksums file {}", path.display()), e))?;
    parse_checksums(path, &content)
}

fn parse_checksums(path: &Path, content: &str) -> FetchResult<HashMap<String, UrlInfo>> {
    let invalid = |line: usize, reason: String| FetchError::ChecksumsFileInvalid {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut map = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [url, size, checksum] = fields.as_slice() else {
            return Err(invalid(
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        };

        let size_bytes = size
            .parse::<u64>()
            .map_err(|e| invalid(line_no, format!("bad size {:?}: {}", size, e)))?;

        let checksum = checksum.to_ascii_lowercase();
        if checksum.len() != SHA256_HEX_LEN || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid(line_no, format!("bad sha256 {:?}", checksum)));
        }

        map.insert(url.to_string(), UrlInfo::new(size_bytes, checksum));
    }
    Ok(map)
}

/// Check a resource's pinned checksum, if any, against observed content
pub fn verify_pinned(resource: &Resource, actual: &UrlInfo) -> FetchResult<()> {
    match &resource.expected_checksum {
        Some(pinned) if *pinned != actual.checksum => Err(FetchError::ChecksumMismatch {
            url: resource.url.clone(),
            expected: Some(pinned.clone()),
            actual: actual.checksum.clone(),
            size_bytes: actual.size_bytes,
        }),
        _ => Ok(()),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Calculate the SHA-256 checksum and size of a file (blocking)
pub fn sha256_file(path: &Path) -> FetchResult<UrlInfo> {
    let mut file = File::open(path)
        .map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;

    let mut writer = Sha256Writer::new(io::sink());
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| FetchError::io(format!("reading {}", path.display()), e))?;
        if bytes_read == 0 {
            break;
        }
        // io::sink never fails
        let _ = writer.write_all(&buffer[..bytes_read]);
    }

    Ok(writer.finish().1)
}

/// Calculate the SHA-256 checksum and size of a file on the blocking pool
pub async fn sha256_file_async(path: &Path) -> FetchResult<UrlInfo> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| FetchError::Internal(format!("checksum task failed: {}", e)))?
}

/// Writer adapter that hashes and counts everything written through it
pub struct Sha256Writer<W> {
    inner: W,
    hasher: Sha256,
    size_bytes: u64,
}

impl<W: Write> Sha256Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size_bytes: 0,
        }
    }

    /// Consume the writer, returning the inner writer and the digest
    pub fn finish(self) -> (W, UrlInfo) {
        let checksum = hex::encode(self.hasher.finalize());
        (self.inner, UrlInfo::new(self.size_bytes, checksum))
    }
}

impl<W: Write> Write for Sha256Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.size_bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
