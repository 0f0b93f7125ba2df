//! # urlzip
//!
//! Extract ZIP archives hosted behind a byte-range-capable HTTP server
//! without downloading them in full.
//!
//! The trailing central directory is parsed through random-access
//! reads, then every entry is extracted to a local directory tree by a
//! bounded pool of concurrent workers. Local archives go through the
//! same machinery via positional file reads.
//!
//! ## Features
//!
//! - HTTP(S) sources via Range requests, with an LRU chunk cache that
//!   coalesces neighbouring header reads
//! - ZIP64 archives, STORED and DEFLATE members
//! - Bounded-concurrency extraction with backpressure, per-entry
//!   outcome reporting, and cooperative cancellation
//! - Path guard rejecting entry names that would escape the
//!   destination directory
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use urlzip::{HttpRangeReader, Materializer, Pipeline, ZipExtractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader =
//!         Arc::new(HttpRangeReader::new("https://example.com/archive.zip".to_string()).await?);
//!     let extractor = ZipExtractor::new(reader);
//!     let entries = extractor.entries().await?;
//!
//!     let materializer = Materializer::new(extractor, "out");
//!     let mut pipeline = Pipeline::new(4, 1, Arc::new(materializer));
//!     pipeline.set_outcome_callback(|entry, error| {
//!         if let Some(error) = error {
//!             eprintln!("{}: {error}", entry.name);
//!         }
//!     });
//!
//!     pipeline.start()?;
//!     for entry in entries {
//!         pipeline.send(entry).await?;
//!     }
//!     pipeline.wait().await.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod extract;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use extract::{
    CancelHandle, EntryHandler, ExtractError, Materializer, OutcomeCallback, Pipeline,
    PipelineError, resolve_entry_path,
};
pub use io::{ChunkedReader, HttpRangeReader, LocalFileReader, ReadAt};
pub use zip::{CompressionMethod, EntryStream, ZipEntry, ZipExtractor};
