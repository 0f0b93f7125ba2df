use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use super::ReadAt;

/// Caching layer over a [`ReadAt`] source.
///
/// Splits the source into fixed-size chunks and keeps the most recently
/// used ones in memory, so that many small neighbouring reads (central
/// directory headers, local file headers) coalesce into few range
/// requests against the underlying source.
pub struct ChunkedReader<R: ReadAt> {
    inner: Arc<R>,
    chunk_size: u64,
    size: u64,
    cache: Mutex<LruCache<u64, Arc<Vec<u8>>>>,
}

impl<R: ReadAt> ChunkedReader<R> {
    /// Wrap `inner` with a cache of `capacity` chunks of `chunk_size` bytes.
    pub fn new(inner: Arc<R>, chunk_size: u64, capacity: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| anyhow::anyhow!("chunk cache capacity must be positive"))?;
        let size = inner.size();
        Ok(Self {
            inner,
            chunk_size,
            size,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Fetch one chunk, from cache if possible.
    ///
    /// Concurrent misses on the same chunk may fetch it twice; the
    /// second insert simply replaces the first.
    async fn chunk(&self, index: u64) -> Result<Arc<Vec<u8>>> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(chunk) = cache.get(&index) {
                return Ok(chunk.clone());
            }
        }

        let start = index * self.chunk_size;
        let len = self.chunk_size.min(self.size - start) as usize;
        let mut data = vec![0u8; len];
        self.inner.read_exact_at(start, &mut data).await?;

        let chunk = Arc::new(data);
        self.cache.lock().await.put(index, chunk.clone());
        Ok(chunk)
    }
}

#[async_trait]
impl<R: ReadAt> ReadAt for ChunkedReader<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let want = buf.len().min((self.size - offset) as usize);
        let mut filled = 0usize;

        while filled < want {
            let pos = offset + filled as u64;
            let index = pos / self.chunk_size;
            let within = (pos % self.chunk_size) as usize;

            let chunk = self.chunk(index).await?;
            let n = (chunk.len() - within).min(want - filled);
            buf[filled..filled + n].copy_from_slice(&chunk[within..within + n]);
            filled += n;
        }

        Ok(want)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts how often it is hit.
    struct CountingReader {
        data: Vec<u8>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ReadAt for CountingReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if offset >= self.data.len() as u64 {
                return Ok(0);
            }
            let start = offset as usize;
            let n = buf.len().min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    fn source(len: usize) -> Arc<CountingReader> {
        Arc::new(CountingReader {
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            reads: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn reads_span_chunk_boundaries() {
        let inner = source(100);
        let reader = ChunkedReader::new(inner.clone(), 16, 8).unwrap();

        let mut buf = vec![0u8; 40];
        let n = reader.read_at(10, &mut buf).await.unwrap();
        assert_eq!(n, 40);
        assert_eq!(buf.as_slice(), &inner.data[10..50]);
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let inner = source(64);
        let reader = ChunkedReader::new(inner.clone(), 32, 4).unwrap();

        let mut buf = vec![0u8; 8];
        reader.read_at(0, &mut buf).await.unwrap();
        let after_first = inner.reads.load(Ordering::SeqCst);

        reader.read_at(4, &mut buf).await.unwrap();
        reader.read_at(8, &mut buf).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn read_past_end_is_clamped() {
        let inner = source(20);
        let reader = ChunkedReader::new(inner, 16, 4).unwrap();

        let mut buf = vec![0u8; 16];
        assert_eq!(reader.read_at(12, &mut buf).await.unwrap(), 8);
        assert_eq!(reader.read_at(20, &mut buf).await.unwrap(), 0);
    }
}
