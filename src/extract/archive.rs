//! ZIP, TAR and GZIP extraction

use super::Extractor;
use crate::cache::CacheIndex;
use crate::error::{FetchError, FetchResult};
use crate::resource::ExtractMethod;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extractor for the formats the pure-Rust archive crates cover
///
/// Unpacks into a `<target>.tmp.<uuid>` staging location on the blocking
/// pool and renames it onto the target once complete.
#[derive(Debug, Default, Clone)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(
        archive: &Path,
        method: ExtractMethod,
        target: &Path,
    ) -> FetchResult<PathBuf> {
        let staging = CacheIndex::staging_dir(target);

        let unpacked = match method {
            ExtractMethod::Zip => unpack_zip(archive, &staging),
            ExtractMethod::Tar => {
                open(archive).and_then(|file| unpack_tar(archive, file, &staging))
            }
            ExtractMethod::TarGz => open(archive)
                .and_then(|file| unpack_tar(archive, GzDecoder::new(file), &staging)),
            ExtractMethod::Gzip => open(archive)
                .and_then(|file| decompress_to_file(archive, GzDecoder::new(file), &staging)),
            ExtractMethod::None | ExtractMethod::Bzip2 => {
                return Err(FetchError::UnsupportedExtractionMethod(method));
            }
        };

        if let Err(e) = unpacked {
            remove_path(&staging).ok();
            return Err(e);
        }

        if target.exists() {
            debug!("Replacing existing extraction {}", target.display());
            remove_path(target)
                .map_err(|e| FetchError::io(format!("removing {}", target.display()), e))?;
        }

        fs::rename(&staging, target).map_err(|e| {
            remove_path(&staging).ok();
            FetchError::io(format!("publishing {}", target.display()), e)
        })?;

        Ok(target.to_path_buf())
    }
}

#[async_trait]
impl Extractor for ArchiveExtractor {
    fn supports(&self, method: ExtractMethod) -> bool {
        matches!(
            method,
            ExtractMethod::Zip | ExtractMethod::Tar | ExtractMethod::TarGz | ExtractMethod::Gzip
        )
    }

    async fn extract(
        &self,
        archive: &Path,
        method: ExtractMethod,
        target: &Path,
    ) -> FetchResult<PathBuf> {
        info!("Extracting {} ({})", archive.display(), method);

        let archive_path = archive.to_path_buf();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&archive_path, method, &target))
            .await
            .map_err(|e| FetchError::extraction(archive, format!("extraction task failed: {}", e)))?
    }
}

fn open(archive: &Path) -> FetchResult<BufReader<File>> {
    File::open(archive)
        .map(BufReader::new)
        .map_err(|e| FetchError::io(format!("opening {}", archive.display()), e))
}

fn unpack_zip(archive: &Path, staging: &Path) -> FetchResult<()> {
    let file = open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::extraction(archive, e))?;
    fs::create_dir_all(staging)
        .map_err(|e| FetchError::io(format!("creating {}", staging.display()), e))?;
    // entries with paths escaping the staging directory are rejected by the zip crate
    zip.extract(staging)
        .map_err(|e| FetchError::extraction(archive, e))
}

fn unpack_tar<R: Read>(archive: &Path, reader: R, staging: &Path) -> FetchResult<()> {
    fs::create_dir_all(staging)
        .map_err(|e| FetchError::io(format!("creating {}", staging.display()), e))?;
    // unpack() skips entries that would land outside the staging directory
    tar::Archive::new(reader)
        .unpack(staging)
        .map_err(|e| FetchError::extraction(archive, e))
}

fn decompress_to_file<R: Read>(archive: &Path, mut reader: R, staging: &Path) -> FetchResult<()> {
    let mut out = File::create(staging)
        .map_err(|e| FetchError::io(format!("creating {}", staging.display()), e))?;
    io::copy(&mut reader, &mut out)
        .map(|_| ())
        .map_err(|e| FetchError::extraction(archive, e))
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}
