//! ZIP archive parsing and content streams.
//!
//! The format is read back to front: the End of Central Directory
//! record at the tail locates the Central Directory, which holds the
//! metadata for every member. Listing an archive therefore needs only a
//! handful of small reads near the end of the file — the property that
//! makes extraction over HTTP Range requests practical.
//!
//! - [`structures`]: the on-disk record types (EOCD, ZIP64 records,
//!   central directory headers)
//! - [`parser`]: locating and decoding those records from a [`ReadAt`]
//!   source
//! - [`extractor`]: entry enumeration and per-entry decoded streams
//!
//! Supported: standard ZIP and ZIP64, STORED and DEFLATE members.
//! Not supported: encryption, multi-disk archives, other compression
//! methods.
//!
//! [`ReadAt`]: crate::io::ReadAt

mod extractor;
mod parser;
mod structures;

pub use extractor::{EntryStream, ZipExtractor};
pub use parser::ZipParser;
pub use structures::*;
