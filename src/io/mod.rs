mod chunked;
mod http;
mod local;

pub use chunked::ChunkedReader;
pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns the number of bytes read, which may be less than the
    /// buffer length. A return of zero means the offset is at or past
    /// the end of the source.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Read until the buffer is completely filled.
    ///
    /// Fails if the source ends before the buffer is full.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = self
                .read_at(offset + filled as u64, &mut buf[filled..])
                .await?;
            if n == 0 {
                bail!(
                    "unexpected end of data at offset {} (wanted {} more bytes)",
                    offset + filled as u64,
                    buf.len() - filled
                );
            }
            filled += n;
        }
        Ok(())
    }
}
