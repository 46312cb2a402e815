//! Cache command - inspect and clean the cache

use crate::cache::{format_bytes, CacheEntry, CacheIndex};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::FetchResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> FetchResult<()> {
    let index = CacheIndex::new(&config.cache.download_dir, &config.cache.extract_dir);

    match args.action {
        CacheAction::Path => show_paths(&index),
        CacheAction::List { format } => list_entries(&index, format).await?,
        CacheAction::Clean => clean(&index).await?,
    }

    Ok(())
}

fn show_paths(index: &CacheIndex) {
    println!("downloads: {}", index.download_dir().display());
    println!("extracted: {}", index.extract_dir().display());
}

/// List published downloads
async fn list_entries(index: &CacheIndex, format: OutputFormat) -> FetchResult<()> {
    let entries = index.entries().await?;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No cached downloads");
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.path.display());
            }
        }
    }

    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!(
        "{:<56} {:>10} {:<16}",
        style("FILE").bold(),
        style("SIZE").bold(),
        style("SHA256").bold()
    );
    println!("{}", "-".repeat(84));

    let mut total = 0;
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let short_sum = entry.checksum.get(..16).unwrap_or(&entry.checksum);
        println!(
            "{:<56} {:>10} {:<16}",
            name,
            format_bytes(entry.size_bytes),
            short_sum
        );
        total += entry.size_bytes;
    }

    println!();
    println!("Total: {} download(s), {}", entries.len(), format_bytes(total));
}

/// Remove staging leftovers
async fn clean(index: &CacheIndex) -> FetchResult<()> {
    let ctx = UiContext::detect();
    let removed = index.remove_staging().await?;

    if removed == 0 {
        ui::step_info(&ctx, "No staging leftovers found");
    } else {
        ui::step_ok(&ctx, &format!("Removed {} staging location(s)", removed));
    }

    Ok(())
}
