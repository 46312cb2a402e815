//! On-disk cache layout
//!
//! Two roots: a download cache keyed by URL hash and an extraction cache
//! keyed by extraction method and content checksum.
//!
//! # Layout
//!
//! | Path | Description |
//! |------|-------------|
//! | `downloads/<host>_<file>_<urlhash>` | published download |
//! | `downloads/<...>.INFO` | JSON record of source URLs, checksum, size |
//! | `extracted/<method>.<sha256>` | published extraction |
//! | `*.tmp.<uuid>` | staging, never a cache hit |
//!
//! Artifacts are assembled in staging and renamed into place, so a final
//! path is either absent or complete.

pub mod index;
pub mod metadata;

pub use index::{CacheEntry, CacheIndex};
pub use metadata::{format_bytes, DownloadRecord};
