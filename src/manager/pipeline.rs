//! Download and extraction stages
//!
//! Each stage runs inside the in-flight task of its key, so it is the only
//! code touching that key's cache paths while it runs.

use super::{Downloaded, ExtractionKey, Inner};
use crate::cache::{format_bytes, CacheIndex, DownloadRecord};
use crate::checksums::{sha256_file_async, UrlInfo};
use crate::error::{FetchError, FetchResult};
use crate::resource::Resource;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

impl Inner {
    /// Produce the verified download of a resource, reusing the cache when possible
    pub(super) async fn run_download(&self, resource: &Resource) -> FetchResult<Downloaded> {
        let path = self.index.download_path(&resource.url);

        if !self.force_download && CacheIndex::exists_locally(&path).await {
            if let Some(cached) = self.reuse_download(resource, &path).await? {
                return Ok(cached);
            }
        }

        let staging = CacheIndex::staging_dir(&path);
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| FetchError::io(format!("creating {}", staging.display()), e))?;

        let fetched = match self.downloader.fetch(resource, &staging).await {
            Ok(fetched) => fetched,
            Err(e) => {
                fs::remove_dir_all(&staging).await.ok();
                return Err(e);
            }
        };

        let info = fetched.url_info();
        if let Err(e) = self.registry.validate(resource, &info) {
            warn!(
                "Rejected download of {}, staged copy kept at {}",
                resource.url,
                staging.display()
            );
            return Err(e);
        }

        // the data file goes first; an old record must not outlive it
        let previous = DownloadRecord::load(&path).await.ok().flatten();
        DownloadRecord::remove(&path).await?;
        fs::rename(&fetched.path, &path)
            .await
            .map_err(|e| FetchError::io(format!("publishing {}", path.display()), e))?;
        let record = DownloadRecord::new(&resource.url, fetched.original_fname.clone(), &info);
        let record = match previous {
            Some(previous) => previous.merge(record),
            None => record,
        };
        record.save(&path, &staging).await?;
        fs::remove_dir_all(&staging).await.ok();

        info!(
            "Downloaded {} ({})",
            resource.label(),
            format_bytes(info.size_bytes)
        );
        self.registry.record(&resource.url, info.clone());
        Ok(Downloaded::new(path, info))
    }

    /// Accept an already published download, or return `None` when it is stale
    async fn reuse_download(
        &self,
        resource: &Resource,
        path: &Path,
    ) -> FetchResult<Option<Downloaded>> {
        let info = if self.registry.has_expectation(resource) {
            let info = sha256_file_async(path).await?;
            if let Err(e) = self.registry.validate(resource, &info) {
                warn!("Cached {} no longer valid ({}), downloading again", path.display(), e);
                return Ok(None);
            }
            info
        } else {
            match DownloadRecord::load(path).await {
                Ok(Some(record)) if record.matches_file(path).await => record.url_info(),
                _ => sha256_file_async(path).await?,
            }
        };

        debug!("Cache hit for {} at {}", resource.url, path.display());
        self.registry.record(&resource.url, info.clone());
        Ok(Some(Downloaded::new(path.to_path_buf(), info)))
    }

    /// Produce the extraction of an archive at its content-addressed path
    pub(super) async fn run_extraction(
        &self,
        archive: &Path,
        key: &ExtractionKey,
    ) -> FetchResult<PathBuf> {
        let target = self.index.extraction_path(key.method, &key.checksum);

        if !self.force_extraction && CacheIndex::exists_locally(&target).await {
            debug!("Extraction cache hit at {}", target.display());
            return Ok(target);
        }

        if !self.extractor.supports(key.method) {
            return Err(FetchError::UnsupportedExtractionMethod(key.method));
        }

        fs::create_dir_all(self.index.extract_dir()).await.map_err(|e| {
            FetchError::io(format!("creating {}", self.index.extract_dir().display()), e)
        })?;

        let path = self.extractor.extract(archive, key.method, &target).await?;
        info!("Extracted {} into {}", archive.display(), path.display());
        Ok(path)
    }
}

impl Downloaded {
    pub(super) fn new(path: PathBuf, info: UrlInfo) -> Self {
        Self {
            path,
            checksum: info.checksum,
            size_bytes: info.size_bytes,
        }
    }

    pub(super) fn url_info(&self) -> UrlInfo {
        UrlInfo::new(self.size_bytes, self.checksum.clone())
    }
}
