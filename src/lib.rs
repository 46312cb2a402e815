//! fetchcache - content-addressed download and extraction cache
//!
//! Fetches each distinct URL at most once, verifies it against a checksum
//! registry, publishes it atomically into a durable cache and unpacks
//! archives into directories keyed by their content.

pub mod cache;
pub mod checksums;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod manager;
pub mod resource;
pub mod ui;

pub use checksums::ChecksumRegistry;
pub use error::{FetchError, FetchResult};
pub use manager::{DownloadManager, ManagerConfig};
pub use resource::{Archive, ExtractMethod, Resource};
