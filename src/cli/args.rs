//! CLI argument definitions using clap derive

use crate::resource::ExtractMethod;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fetchcache - content-addressed download and extraction cache
///
/// Downloads each URL at most once, verifies it against known checksums
/// and unpacks archives into a directory keyed by their content.
#[derive(Parser, Debug)]
#[command(name = "fetchcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FETCHCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download URLs into the cache, optionally extracting them
    Download(DownloadArgs),

    /// Extract local archives into the cache
    Extract(ExtractArgs),

    /// Inspect and clean the cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Expected SHA-256 of the content (single URL only)
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Extract each download after verifying it
    #[arg(short = 'x', long)]
    pub extract: bool,

    /// Extraction method (default: guessed from the URL)
    #[arg(short, long, value_parser = parse_method)]
    pub method: Option<ExtractMethod>,

    /// Logical name used in messages (single URL only)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Download again even if the file is cached
    #[arg(short, long)]
    pub force: bool,

    /// Write the checksums observed in this run to a TSV file
    #[arg(long, value_name = "FILE")]
    pub record_checksums: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the extract command
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Archives to extract
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Extraction method (default: guessed from the file name)
    #[arg(short, long, value_parser = parse_method)]
    pub method: Option<ExtractMethod>,

    /// Extract again even if an extraction exists
    #[arg(short, long)]
    pub force: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the download and extraction directories
    Path,

    /// List published downloads
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove staging leftovers of interrupted operations
    Clean,
}

/// Parse an extraction method name
fn parse_method(s: &str) -> Result<ExtractMethod, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(ExtractMethod::None),
        "zip" => Ok(ExtractMethod::Zip),
        "tar" => Ok(ExtractMethod::Tar),
        "tar_gz" | "tar.gz" | "tgz" => Ok(ExtractMethod::TarGz),
        "gzip" | "gz" => Ok(ExtractMethod::Gzip),
        "bzip2" | "bz2" => Ok(ExtractMethod::Bzip2),
        _ => Err(format!(
            "unknown extraction method '{s}' (expected none, zip, tar, tar_gz, gzip or bzip2)"
        )),
    }
}
