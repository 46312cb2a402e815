//! Extract command - unpack local archives into the cache

use crate::cli::args::{ExtractArgs, OutputFormat};
use crate::config::Config;
use crate::error::FetchResult;
use crate::resource::Archive;
use crate::ui::{TaskSpinner, UiContext};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct Extracted {
    archive: PathBuf,
    method: String,
    path: PathBuf,
}

/// Execute the extract command
pub async fn execute(args: ExtractArgs, config: &Config) -> FetchResult<()> {
    let archives: Vec<Archive> = args
        .paths
        .iter()
        .map(|path| {
            let archive = Archive::new(path.as_path());
            match args.method {
                Some(method) => archive.with_method(method),
                None => archive,
            }
        })
        .collect();

    let mut config = config.clone();
    config.extract.force |= args.force;
    let manager = config.download_manager().await?;

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    let show_progress = matches!(args.format, OutputFormat::Table);
    if show_progress {
        spinner.start(&format!("Extracting {} archive(s)...", archives.len()));
    }

    let paths = match manager.extract_all(archives.clone()).await {
        Ok(paths) => {
            if show_progress {
                spinner.stop(&format!("Extracted {} archive(s)", paths.len()));
            }
            paths
        }
        Err(e) => {
            if show_progress {
                spinner.stop_error("Extraction failed");
            }
            return Err(e);
        }
    };

    let extracted: Vec<Extracted> = archives
        .into_iter()
        .zip(paths)
        .map(|(archive, path)| Extracted {
            method: archive.method.to_string(),
            archive: archive.path,
            path,
        })
        .collect();

    match args.format {
        OutputFormat::Table => {
            for item in &extracted {
                println!(
                    "{} {}",
                    style(item.archive.display()).bold(),
                    style(format!("({})", item.method)).dim()
                );
                println!("    {}", item.path.display());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extracted)?),
        OutputFormat::Plain => {
            for item in &extracted {
                println!("{}", item.path.display());
            }
        }
    }

    Ok(())
}
