use std::io::{Cursor, Read};
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipEntry};

/// High-level archive reader: entry enumeration plus per-entry content
/// streams.
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive
    pub async fn entries(&self) -> Result<Vec<ZipEntry>> {
        self.parser.entries().await
    }

    /// Open the decoded content stream for one entry.
    ///
    /// Decoding is lazy: nothing of the entry's data is fetched before
    /// this call, and STORED entries are streamed straight off the
    /// underlying source chunk by chunk. DEFLATE entries fetch their
    /// compressed data in a single range request and inflate from
    /// memory.
    pub async fn open(&self, entry: &ZipEntry) -> Result<EntryStream<R>> {
        let offset = self.parser.data_offset(entry).await?;

        let kind = match entry.method {
            CompressionMethod::Stored => StreamKind::Stored {
                reader: self.parser.reader().clone(),
                offset,
                remaining: entry.compressed_size,
            },
            CompressionMethod::Deflate => {
                let mut compressed = vec![0u8; entry.compressed_size as usize];
                self.parser
                    .reader()
                    .read_exact_at(offset, &mut compressed)
                    .await?;
                StreamKind::Deflate {
                    decoder: DeflateDecoder::new(Cursor::new(compressed)),
                }
            }
            CompressionMethod::Unknown(method) => {
                bail!(
                    "unsupported compression method {} for `{}`",
                    method,
                    entry.name
                );
            }
        };

        Ok(EntryStream { kind })
    }
}

/// Sequential decoded byte stream for one archive entry.
pub struct EntryStream<R: ReadAt> {
    kind: StreamKind<R>,
}

enum StreamKind<R: ReadAt> {
    Stored {
        reader: Arc<R>,
        offset: u64,
        remaining: u64,
    },
    Deflate {
        decoder: DeflateDecoder<Cursor<Vec<u8>>>,
    },
}

impl<R: ReadAt> EntryStream<R> {
    /// Read the next decoded chunk into `buf`; zero means end of entry.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match &mut self.kind {
            StreamKind::Stored {
                reader,
                offset,
                remaining,
            } => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let want = (*remaining).min(buf.len() as u64) as usize;
                let n = reader.read_at(*offset, &mut buf[..want]).await?;
                if n == 0 {
                    bail!("unexpected end of entry data at offset {offset}");
                }
                *offset += n as u64;
                *remaining -= n as u64;
                Ok(n)
            }
            StreamKind::Deflate { decoder } => Ok(decoder.read(buf)?),
        }
    }
}
