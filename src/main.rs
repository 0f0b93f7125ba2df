//! Command-line entry point.
//!
//! Dispatches on the archive location (local path or HTTP URL), wires
//! the random-access reader into the extractor, and runs either the
//! listing or the concurrent extraction pipeline.

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use urlzip::{
    ChunkedReader, Cli, HttpRangeReader, LocalFileReader, Materializer, Pipeline, ReadAt,
    ZipExtractor,
};

/// Range-read cache geometry for remote archives: 1 MiB chunks, up to
/// 100 chunks resident.
const CHUNK_SIZE: u64 = 1024 * 1024;
const CHUNK_CAPACITY: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.archive.clone()).await?);
        let transferred_before = reader.transferred_bytes();

        // Neighbouring header reads coalesce through the chunk cache
        // into few range requests.
        let cached = Arc::new(ChunkedReader::new(reader.clone(), CHUNK_SIZE, CHUNK_CAPACITY)?);
        run(cached, &cli).await?;

        if !cli.quiet {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.archive))?);
        run(reader, &cli).await?;
    }

    Ok(())
}

async fn run<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let extractor = ZipExtractor::new(reader);

    if cli.list || cli.verbose {
        return list_entries(&extractor, cli.verbose).await;
    }

    extract_all(extractor, cli).await
}

/// Extract every entry through the bounded worker pool.
///
/// Per-entry failures are logged and counted but do not fail the run;
/// only setup and pipeline-misuse errors abort. The exit status stays
/// zero even when individual entries fail.
async fn extract_all<R: ReadAt + 'static>(extractor: ZipExtractor<R>, cli: &Cli) -> Result<()> {
    let entries = extractor.entries().await?;

    let materializer = Materializer::new(extractor, &cli.dest);
    let mut pipeline = Pipeline::new(cli.concurrency, cli.queue_depth, Arc::new(materializer));

    let failures = Arc::new(AtomicUsize::new(0));
    {
        let failures = failures.clone();
        pipeline.set_outcome_callback(move |entry, error| {
            if let Some(error) = error {
                failures.fetch_add(1, Ordering::Relaxed);
                match std::error::Error::source(error) {
                    Some(cause) => warn!("{}: {error}: {cause}", entry.name),
                    None => warn!("{}: {error}", entry.name),
                }
            }
        });
    }

    pipeline.start()?;
    for entry in entries {
        if !cli.quiet {
            info!("extracting {}", entry.name);
        }
        pipeline.send(entry).await?;
    }
    pipeline.wait().await.stop().await;

    let failed = failures.load(Ordering::Relaxed);
    if failed > 0 {
        warn!("{failed} entries failed to extract");
    }

    Ok(())
}

/// List archive contents, optionally with sizes and timestamps.
async fn list_entries<R: ReadAt + 'static>(
    extractor: &ZipExtractor<R>,
    verbose: bool,
) -> Result<()> {
    let entries = extractor.entries().await?;

    if !verbose {
        for entry in &entries {
            println!("{}", entry.name);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    Ok(())
}

/// Percentage of space saved by compression, unzip-style.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} bytes")
    }
}
