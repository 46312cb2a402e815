//! Call-counting collaborators for manager tests

use async_trait::async_trait;
use fetchcache::cache::CacheIndex;
use fetchcache::checksums::sha256_file;
use fetchcache::download::{Downloader, FetchedFile};
use fetchcache::extract::Extractor;
use fetchcache::{ExtractMethod, FetchError, FetchResult, ManagerConfig, Resource};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn config(temp: &TempDir) -> ManagerConfig {
    ManagerConfig::new(temp.path().join("dl"), temp.path().join("ex"))
}

/// Serves in-memory bodies and counts fetches per URL
#[derive(Clone, Default)]
pub struct FakeDownloader {
    state: Arc<DownloaderState>,
}

#[derive(Default)]
struct DownloaderState {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Mutex<Option<Gate>>,
}

/// Holds fetches until released
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, body: &[u8]) -> Self {
        self.state
            .bodies
            .lock()
            .insert(url.to_string(), body.to_vec());
        self
    }

    pub fn delay(self, url: &str, delay: Duration) -> Self {
        self.state.delays.lock().insert(url.to_string(), delay);
        self
    }

    /// Fail the next `times` fetches of a URL with a transfer failure
    pub fn fail(self, url: &str, times: usize) -> Self {
        self.state.failures.lock().insert(url.to_string(), times);
        self
    }

    pub fn gated(self, gate: Gate) -> Self {
        *self.state.gate.lock() = Some(gate);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.state.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.lock().values().sum()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, resource: &Resource, staging_dir: &Path) -> FetchResult<FetchedFile> {
        let url = resource.url.as_str();
        *self.state.calls.lock().entry(url.to_string()).or_default() += 1;

        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let delay = self.state.delays.lock().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.state.failures.lock();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::transfer(url, "connection reset"));
                }
            }
        }

        let body = self
            .state
            .bodies
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::transfer(url, "404 Not Found"))?;

        let path = staging_dir.join(resource.file_name().unwrap_or("download"));
        std::fs::write(&path, &body).map_err(|e| FetchError::io("writing fake body", e))?;
        let info = sha256_file(&path)?;

        Ok(FetchedFile {
            path,
            original_fname: resource.file_name().map(str::to_string),
            checksum: info.checksum,
            size_bytes: info.size_bytes,
        })
    }
}

/// Copies the archive into a directory and counts extractions
#[derive(Clone, Default)]
pub struct FakeExtractor {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Arc::default(),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn supports(&self, method: ExtractMethod) -> bool {
        !matches!(method, ExtractMethod::None | ExtractMethod::Bzip2)
    }

    async fn extract(
        &self,
        archive: &Path,
        _method: ExtractMethod,
        target: &Path,
    ) -> FetchResult<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let staging = CacheIndex::staging_dir(target);
        std::fs::create_dir_all(&staging).map_err(|e| FetchError::io("staging", e))?;
        std::fs::copy(archive, staging.join("payload")).map_err(|e| FetchError::io("copy", e))?;
        std::fs::rename(&staging, target).map_err(|e| FetchError::io("publish", e))?;
        Ok(target.to_path_buf())
    }
}
