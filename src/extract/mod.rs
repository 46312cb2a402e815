//! Archive extraction collaborator
//!
//! The manager decides when and where an archive is unpacked; an
//! [`Extractor`] decides how. Implementations own their temporary-directory
//! handling: the target path is either fully populated or left absent.

mod archive;

pub use archive::ArchiveExtractor;

use crate::error::FetchResult;
use crate::resource::ExtractMethod;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unpacks one local file into a target path
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether this extractor implements the method
    fn supports(&self, method: ExtractMethod) -> bool;

    /// Unpack `archive` into `target`, returning the populated path
    ///
    /// For archive formats `target` becomes a directory; for single-file
    /// compression formats it becomes the decompressed file. An existing
    /// target is replaced.
    async fn extract(
        &self,
        archive: &Path,
        method: ExtractMethod,
        target: &Path,
    ) -> FetchResult<PathBuf>;
}
