use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::ReadAt;
use crate::zip::{ZipExtractor, ZipEntry};

use super::path::resolve_entry_path;
use super::{EntryHandler, ExtractError};

/// Copy buffer for streaming entry content to disk.
const COPY_CHUNK: usize = 64 * 1024;

/// Turns one archive entry into its filesystem counterpart under a
/// destination root.
///
/// Directory entries become directories (with any missing ancestors);
/// file entries are created with the entry's permission bits,
/// truncating whatever was there, and filled from the entry's decoded
/// content stream. All side effects stay under the destination root —
/// every name passes the path guard first.
pub struct Materializer<R: ReadAt> {
    extractor: ZipExtractor<R>,
    dest: PathBuf,
}

impl<R: ReadAt + 'static> Materializer<R> {
    pub fn new(extractor: ZipExtractor<R>, dest: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            dest: dest.into(),
        }
    }

    async fn materialize(&self, entry: &ZipEntry, path: &Path) -> Result<(), ExtractError> {
        if entry.is_directory {
            return fs::create_dir_all(path)
                .await
                .map_err(|source| ExtractError::CreateDir {
                    path: path.to_path_buf(),
                    source,
                });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| ExtractError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let mut file = create_file(path, entry.unix_mode).await.map_err(|source| {
            ExtractError::CreateFile {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let mut stream =
            self.extractor
                .open(entry)
                .await
                .map_err(|source| ExtractError::OpenEntry {
                    name: entry.name.clone(),
                    source: source.into(),
                })?;

        // Stream and file are both released on every exit path below;
        // a mid-copy failure leaves the partial file in place for the
        // outcome report rather than silently cleaning it up.
        let copy_error = |source: super::BoxError| ExtractError::Copy {
            name: entry.name.clone(),
            path: path.to_path_buf(),
            source,
        };

        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| copy_error(e.into()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| copy_error(e.into()))?;
        }
        file.flush().await.map_err(|e| copy_error(e.into()))?;

        Ok(())
    }
}

#[async_trait]
impl<R: ReadAt + 'static> EntryHandler for Materializer<R> {
    async fn handle(&self, entry: &ZipEntry) -> Result<(), ExtractError> {
        let path = resolve_entry_path(&self.dest, &entry.name)?;
        self.materialize(entry, &path).await
    }
}

/// Create-truncate the target file, applying the entry's permission
/// bits on Unix.
async fn create_file(path: &Path, mode: Option<u32>) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if let Some(mode) = mode {
        // External attributes carry the full st_mode; only the
        // permission bits belong in open(2).
        options.mode(mode & 0o7777);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path).await
}
