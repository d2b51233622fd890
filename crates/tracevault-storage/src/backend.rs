//! Random-Access Block Reads
//!
//! Blocks are immutable blobs in an object store. The lookup path never
//! downloads a whole block; it issues a handful of ranged reads (footer,
//! index, the probed key chunks, one data page). [`ReadAt`] is that
//! contract: a positioned read into a blob of known size.
//!
//! [`ObjectStoreReaderAt`] is the production implementation over
//! `Arc<dyn ObjectStore>` using `get_range`. It counts the bytes it
//! fetches so a lookup can report how much of the block it actually
//! inspected. [`BytesReaderAt`] serves already-buffered blocks (tests,
//! fuzzing, local files read whole).

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Positioned reads into an immutable blob of known total size.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Total size of the blob in bytes.
    fn size(&self) -> u64;
}

/// Ranged reads against one object in an object store.
pub struct ObjectStoreReaderAt {
    store: Arc<dyn ObjectStore>,
    path: Path,
    size: u64,
    bytes_read: AtomicU64,
}

impl ObjectStoreReaderAt {
    pub fn new(store: Arc<dyn ObjectStore>, path: Path, size: u64) -> Self {
        Self {
            store,
            path,
            size,
            bytes_read: AtomicU64::new(0),
        }
    }

    /// Total bytes fetched through this reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for ObjectStoreReaderAt {
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let out_of_range = match offset.checked_add(len as u64) {
            Some(end) => end > self.size,
            None => true,
        };
        if out_of_range {
            return Err(Error::InvalidBlock(format!(
                "read of {} bytes at {} past end of {}-byte block",
                len, offset, self.size
            )));
        }

        let range = offset as usize..offset as usize + len;
        let bytes = self.store.get_range(&self.path, range).await?;
        if bytes.len() != len {
            return Err(Error::InvalidBlock(format!(
                "short read: wanted {} bytes at {}, got {}",
                len,
                offset,
                bytes.len()
            )));
        }

        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
        Ok(bytes)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// [`ReadAt`] over a block that is already in memory.
#[derive(Debug)]
pub struct BytesReaderAt {
    data: Bytes,
}

impl BytesReaderAt {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for BytesReaderAt {
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        if offset > self.data.len() as u64 {
            return Err(Error::InvalidBlock(format!(
                "read at {} past end of {}-byte block",
                offset,
                self.data.len()
            )));
        }
        let offset = offset as usize;
        if offset + len > self.data.len() {
            return Err(Error::InvalidBlock(format!(
                "read of {} bytes at {} past end of {}-byte block",
                len,
                offset,
                self.data.len()
            )));
        }
        Ok(self.data.slice(offset..offset + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
