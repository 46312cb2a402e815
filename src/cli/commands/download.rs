//! Download command - fetch URLs into the cache

use crate::cache::format_bytes;
use crate::cli::args::{DownloadArgs, OutputFormat};
use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::manager::DownloadManager;
use crate::resource::Resource;
use crate::ui::{self, TaskSpinner, UiContext};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

/// One line of download output
#[derive(Debug, Serialize)]
struct Fetched {
    url: String,
    name: Option<String>,
    path: PathBuf,
    checksum: Option<String>,
    size_bytes: Option<u64>,
}

/// Execute the download command
pub async fn execute(args: DownloadArgs, config: &Config) -> FetchResult<()> {
    let resources = resources_from_args(&args)?;

    let mut config = config.clone();
    config.download.force |= args.force;
    let manager = config.download_manager().await?;

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    let show_progress = matches!(args.format, OutputFormat::Table);
    if show_progress {
        spinner.start(&format!("Fetching {} resource(s)...", resources.len()));
    }

    let result = if args.extract {
        manager.download_and_extract_all(resources.clone()).await
    } else {
        manager.download_all(resources.clone()).await
    };

    let paths = match result {
        Ok(paths) => {
            if show_progress {
                spinner.stop(&format!("Fetched {} resource(s)", paths.len()));
            }
            paths
        }
        Err(e) => {
            if show_progress {
                spinner.stop_error("Download failed");
            }
            return Err(e);
        }
    };

    let fetched = summarize(&manager, resources, paths);
    match args.format {
        OutputFormat::Table => print_table(&fetched),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&fetched)?),
        OutputFormat::Plain => {
            for item in &fetched {
                println!("{}", item.path.display());
            }
        }
    }

    if let Some(path) = &args.record_checksums {
        let written = manager.registry().write_recorded(path).await?;
        if show_progress {
            ui::step_ok_detail(
                &ctx,
                &format!("Recorded {} checksum(s)", written),
                &path.display().to_string(),
            );
        }
    }

    Ok(())
}

/// Build one resource per URL, applying the per-resource flags
fn resources_from_args(args: &DownloadArgs) -> FetchResult<Vec<Resource>> {
    if args.urls.len() > 1 && (args.sha256.is_some() || args.name.is_some()) {
        return Err(FetchError::User(
            "--sha256 and --name apply to a single URL".to_string(),
        ));
    }

    Ok(args
        .urls
        .iter()
        .map(|url| {
            let mut resource = Resource::new(url.as_str());
            if let Some(method) = args.method {
                resource = resource.with_method(method);
            }
            if let Some(sha256) = &args.sha256 {
                resource = resource.with_checksum(sha256.as_str());
            }
            if let Some(name) = &args.name {
                resource = resource.with_name(name.as_str());
            }
            resource
        })
        .collect())
}

fn summarize(
    manager: &DownloadManager,
    resources: Vec<Resource>,
    paths: Vec<PathBuf>,
) -> Vec<Fetched> {
    let checksums = manager.recorded_checksums();
    let sizes = manager.download_sizes();

    resources
        .into_iter()
        .zip(paths)
        .map(|(resource, path)| Fetched {
            checksum: checksums.get(&resource.url).cloned(),
            size_bytes: sizes.get(&resource.url).copied(),
            url: resource.url,
            name: resource.name,
            path,
        })
        .collect()
}

fn print_table(fetched: &[Fetched]) {
    for item in fetched {
        let size = item
            .size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {}",
            style(item.name.as_deref().unwrap_or(&item.url)).bold(),
            style(format!("({})", size)).dim(),
            style("->").dim()
        );
        println!("    {}", item.path.display());
    }
}
