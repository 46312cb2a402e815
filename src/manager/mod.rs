//! Download manager
//!
//! Turns resource requests into verified cache paths. Downloads are
//! deduplicated by URL and extractions by `(method, content checksum)`, so a
//! resource is fetched and unpacked at most once however many callers ask
//! for it at the same time.
//!
//! Every batch call returns its results in the shape it was given:
//!
//! ```no_run
//! # async fn demo() -> fetchcache::FetchResult<()> {
//! use fetchcache::manager::{DownloadManager, ManagerConfig};
//! use std::collections::BTreeMap;
//!
//! let manager = DownloadManager::new(ManagerConfig::new("/tmp/dl", "/tmp/ex"));
//! let splits = BTreeMap::from([
//!     ("train", "https://example.com/train.tar.gz"),
//!     ("test", "https://example.com/test.tar.gz"),
//! ]);
//! let paths = manager.download_and_extract_all(splits).await?;
//! println!("{}", paths["train"].display());
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod inflight;
mod pipeline;

pub use batch::Batch;
pub use inflight::InFlight;

use crate::cache::CacheIndex;
use crate::checksums::{sha256_file_async, verify_pinned, ChecksumRegistry};
use crate::download::{Downloader, HttpDownloader};
use crate::error::{FetchError, FetchResult};
use crate::extract::{ArchiveExtractor, Extractor};
use crate::resource::{Archive, ExtractMethod, Resource};
use futures_util::future::try_join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Cache locations and overwrite behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory holding published downloads
    pub download_dir: PathBuf,
    /// Directory holding extractions
    pub extract_dir: PathBuf,
    /// Re-download even when a published download exists
    pub force_download: bool,
    /// Re-extract even when an extraction exists
    pub force_extraction: bool,
}

impl ManagerConfig {
    pub fn new(download_dir: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            extract_dir: extract_dir.into(),
            force_download: false,
            force_extraction: false,
        }
    }
}

/// A verified, published download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Identity of an extraction: the same bytes unpacked the same way
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtractionKey {
    pub method: ExtractMethod,
    pub checksum: String,
}

struct Inner {
    index: CacheIndex,
    registry: Arc<ChecksumRegistry>,
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn Extractor>,
    force_download: bool,
    force_extraction: bool,
    downloads: InFlight<String, Downloaded>,
    extractions: InFlight<ExtractionKey, PathBuf>,
}

impl Inner {
    fn download(self: &Arc<Self>, resource: Resource) -> inflight::Pending<Downloaded> {
        let inner = Arc::clone(self);
        self.downloads
            .get_or_start(resource.url.clone(), move || async move {
                inner.run_download(&resource).await
            })
    }

    /// Shared download of a resource, checked against this caller's pin
    ///
    /// The download may have been started by another caller for the same
    /// URL, whose own pin (or lack of one) is all it verified.
    fn pinned_download(
        self: &Arc<Self>,
        resource: Resource,
    ) -> impl Future<Output = FetchResult<Downloaded>> {
        let pending = self.download(resource.clone());
        async move {
            let downloaded = pending.await?;
            verify_pinned(&resource, &downloaded.url_info())?;
            Ok(downloaded)
        }
    }

    fn extraction(
        self: &Arc<Self>,
        archive: PathBuf,
        key: ExtractionKey,
    ) -> inflight::Pending<PathBuf> {
        let inner = Arc::clone(self);
        self.extractions
            .get_or_start(key.clone(), move || async move {
                inner.run_extraction(&archive, &key).await
            })
    }

    /// Final path of a download once extracted with `method`
    async fn extract_downloaded(
        self: &Arc<Self>,
        downloaded: Downloaded,
        method: ExtractMethod,
    ) -> FetchResult<PathBuf> {
        if !method.is_extracting() {
            return Ok(downloaded.path);
        }
        let key = ExtractionKey {
            method,
            checksum: downloaded.checksum,
        };
        self.extraction(downloaded.path, key).await
    }

    async fn extract_local(self: &Arc<Self>, archive: Archive) -> FetchResult<PathBuf> {
        if !CacheIndex::exists_locally(&archive.path).await {
            return Err(FetchError::PathNotFound(archive.path));
        }
        if !archive.method.is_extracting() {
            return Ok(archive.path);
        }
        let info = sha256_file_async(&archive.path).await?;
        let key = ExtractionKey {
            method: archive.method,
            checksum: info.checksum,
        };
        self.extraction(archive.path, key).await
    }
}

/// Runs `work` on its own task so it finishes even if the caller stops waiting
fn detach<T, F>(key: String, work: F) -> impl Future<Output = FetchResult<T>>
where
    T: Send + 'static,
    F: Future<Output = FetchResult<T>> + Send + 'static,
{
    let handle = tokio::spawn(work);
    async move {
        handle
            .await
            .map_err(|_| FetchError::Cancelled { key })?
    }
}

/// Content-addressed download and extraction cache
///
/// Cheap to clone; clones share the cache, the registry and the in-flight
/// tables.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Manager with the HTTP downloader, the archive extractor and a recording registry
    pub fn new(config: ManagerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            registry: None,
            downloader: None,
            extractor: None,
        }
    }

    /// Download a resource, returning its published path
    pub async fn download(&self, resource: impl Into<Resource>) -> FetchResult<PathBuf> {
        self.start_download(resource.into()).await
    }

    /// Extract a local archive, returning the extraction path
    pub async fn extract(&self, archive: impl Into<Archive>) -> FetchResult<PathBuf> {
        self.start_extract(archive.into()).await
    }

    /// Download a resource and extract it with its method
    ///
    /// Resources with `ExtractMethod::None` resolve to the download path.
    pub async fn download_and_extract(
        &self,
        resource: impl Into<Resource>,
    ) -> FetchResult<PathBuf> {
        self.start_download_and_extract(resource.into()).await
    }

    /// Download every resource of a batch
    ///
    /// Fails with the first error; the other downloads keep running and
    /// still populate the cache.
    pub async fn download_all<B>(&self, batch: B) -> FetchResult<B::Output<PathBuf>>
    where
        B: Batch,
        B::Item: Into<Resource>,
    {
        let (keys, items) = batch.into_parts();
        let started: Vec<_> = items
            .into_iter()
            .map(|item| self.start_download(item.into()))
            .collect();
        let paths = try_join_all(started).await?;
        Ok(B::from_parts(keys, paths))
    }

    /// Extract every archive of a batch
    pub async fn extract_all<B>(&self, batch: B) -> FetchResult<B::Output<PathBuf>>
    where
        B: Batch,
        B::Item: Into<Archive>,
    {
        let (keys, items) = batch.into_parts();
        let started: Vec<_> = items
            .into_iter()
            .map(|item| self.start_extract(item.into()))
            .collect();
        let paths = try_join_all(started).await?;
        Ok(B::from_parts(keys, paths))
    }

    /// Download and extract every resource of a batch
    pub async fn download_and_extract_all<B>(&self, batch: B) -> FetchResult<B::Output<PathBuf>>
    where
        B: Batch,
        B::Item: Into<Resource>,
    {
        let (keys, items) = batch.into_parts();
        let started: Vec<_> = items
            .into_iter()
            .map(|item| self.start_download_and_extract(item.into()))
            .collect();
        let paths = try_join_all(started).await?;
        Ok(B::from_parts(keys, paths))
    }

    /// Checksums recorded during this run, keyed by URL
    pub fn recorded_checksums(&self) -> BTreeMap<String, String> {
        self.inner.registry.recorded_checksums()
    }

    /// Download sizes recorded during this run, keyed by URL
    pub fn download_sizes(&self) -> BTreeMap<String, u64> {
        self.inner.registry.download_sizes()
    }

    /// Number of downloads and extractions currently running
    pub fn in_flight(&self) -> usize {
        self.inner.downloads.len() + self.inner.extractions.len()
    }

    pub fn registry(&self) -> &ChecksumRegistry {
        &self.inner.registry
    }

    pub fn index(&self) -> &CacheIndex {
        &self.inner.index
    }

    // The start_* helpers begin the work before returning, so a batch whose
    // first item fails has already started every other item.

    fn start_download(&self, resource: Resource) -> impl Future<Output = FetchResult<PathBuf>> {
        let pending = self.inner.pinned_download(resource);
        async move { pending.await.map(|downloaded| downloaded.path) }
    }

    fn start_extract(&self, archive: Archive) -> impl Future<Output = FetchResult<PathBuf>> {
        let inner = Arc::clone(&self.inner);
        let key = archive.path.display().to_string();
        detach(key, async move { inner.extract_local(archive).await })
    }

    fn start_download_and_extract(
        &self,
        resource: Resource,
    ) -> impl Future<Output = FetchResult<PathBuf>> {
        let inner = Arc::clone(&self.inner);
        let key = resource.url.clone();
        debug!("Requested {} ({})", resource.label(), resource.extract_method);
        detach(key, async move {
            let method = resource.extract_method;
            let downloaded = inner.pinned_download(resource).await?;
            inner.extract_downloaded(downloaded, method).await
        })
    }
}

/// Builder for a [`DownloadManager`] with custom collaborators
pub struct ManagerBuilder {
    config: ManagerConfig,
    registry: Option<Arc<ChecksumRegistry>>,
    downloader: Option<Arc<dyn Downloader>>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl ManagerBuilder {
    /// Checksum registry to verify against (recording mode when unset)
    pub fn registry(mut self, registry: ChecksumRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn build(self) -> DownloadManager {
        let ManagerConfig {
            download_dir,
            extract_dir,
            force_download,
            force_extraction,
        } = self.config;

        DownloadManager {
            inner: Arc::new(Inner {
                index: CacheIndex::new(download_dir, extract_dir),
                registry: self
                    .registry
                    .unwrap_or_else(|| Arc::new(ChecksumRegistry::recording())),
                downloader: self
                    .downloader
                    .unwrap_or_else(|| Arc::new(HttpDownloader::new())),
                extractor: self
                    .extractor
                    .unwrap_or_else(|| Arc::new(ArchiveExtractor::new())),
                force_download,
                force_extraction,
                downloads: InFlight::new(),
                extractions: InFlight::new(),
            }),
        }
    }
}
