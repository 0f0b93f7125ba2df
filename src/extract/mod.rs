//! Concurrent extraction of archive entries to a local directory tree.
//!
//! The [`Pipeline`] owns a fixed-size pool of workers fed from a bounded
//! intake queue. A single producer enumerates the archive and submits
//! entries; workers resolve each entry's target path, materialize it,
//! and report the outcome through a caller-supplied callback. Per-entry
//! failures never stop the run — the pipeline is built for partial
//! success.

mod materialize;
mod path;
mod pipeline;

pub use materialize::Materializer;
pub use path::resolve_entry_path;
pub use pipeline::{CancelHandle, EntryHandler, OutcomeCallback, Pipeline};

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause attached to per-entry I/O failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why one entry failed to extract.
///
/// Each value is reported through the pipeline's outcome callback for
/// the entry that caused it; other entries keep flowing.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The entry name resolves outside the destination directory.
    #[error("entry `{0}` resolves outside the destination directory")]
    PathEscape(String),

    /// Creating the target directory or a parent failed.
    #[error("creating directory `{}`", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the target file failed.
    #[error("creating file `{}`", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening the entry's decoded content stream failed.
    #[error("opening content stream for `{name}`")]
    OpenEntry {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Reading or writing entry content failed mid-copy. The partially
    /// written file is left in place and reported, not cleaned up.
    #[error("copying content of `{name}` to `{}`", path.display())]
    Copy {
        name: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// Caller misuse of the pipeline lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline was configured with zero workers.
    #[error("pipeline requires at least one worker")]
    NoWorkers,

    /// `start` was called twice.
    #[error("pipeline already started")]
    AlreadyStarted,

    /// `send` before `start`, after `stop`, or after cancellation.
    #[error("pipeline is closed")]
    Closed,
}
