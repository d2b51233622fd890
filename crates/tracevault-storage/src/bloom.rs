//! Bloom Filters for Trace Id Pre-Screening
//!
//! Before any block bytes are fetched, the finder consults a bloom
//! filter keyed by trace id. A negative answer proves the trace is not
//! in the block and ends the lookup with zero block I/O; a positive
//! answer (1% false positives at the default rate) lets the binary
//! search proceed.
//!
//! Two kinds of filter exist, built from the same type:
//!
//! - **Shard filters**: per-block filters stored as sidecar objects
//!   (`blocks/{id}/bloom-{shard}`). Ids are distributed over shards by
//!   [`shard_key_for_trace_id`] so each filter stays small enough to
//!   fetch in one round trip.
//! - **Chunk filters**: one filter per row-group key chunk, embedded in
//!   the block, consulted during each probe.
//!
//! A filter that cannot be fetched or parsed is an **error**, never a
//! miss: answering "not found" because the filter was unreachable would
//! hide data that exists.

use crate::block::bloom_shard_path;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bloomfilter::Bloom;
use bytes::Bytes;
use object_store::ObjectStore;
use std::hash::Hasher;
use std::sync::Arc;
use tracevault_core::TraceId;

const BLOOM_FORMAT_VERSION: u8 = 1;

/// Fixed-size header preceding the bitmap:
/// version(1) + item_count(8) + num_bits(8) + num_hashes(4) + sip_keys(32).
const BLOOM_HEADER_LEN: usize = 1 + 8 + 8 + 4 + 32;

/// A bloom filter over raw 16-byte trace ids.
pub struct BlockBloomFilter {
    bloom: Bloom<[u8]>,
    item_count: u64,
}

impl BlockBloomFilter {
    /// Create an empty filter sized for `expected_items` at the given
    /// false positive rate.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let bloom = Bloom::new_for_fp_rate(expected_items.max(1), false_positive_rate);

        tracing::debug!(
            expected_items,
            false_positive_rate,
            bitmap_bits = bloom.number_of_bits(),
            num_hashes = bloom.number_of_hash_functions(),
            "created block bloom filter"
        );

        Self {
            bloom,
            item_count: 0,
        }
    }

    /// Add a trace id to the filter.
    pub fn add(&mut self, id: &TraceId) {
        self.bloom.set(id.as_bytes().as_slice());
        self.item_count += 1;
    }

    /// Check whether a trace id might be in the filtered set.
    ///
    /// `false` means the id is definitely absent; `true` means it might
    /// be present.
    pub fn might_contain(&self, id: &TraceId) -> bool {
        self.bloom.check(id.as_bytes().as_slice())
    }

    /// Number of ids added to the filter.
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    /// Serialize the filter for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let bitmap = self.bloom.bitmap();
        let sip_keys = self.bloom.sip_keys();

        let mut out = Vec::with_capacity(BLOOM_HEADER_LEN + bitmap.len());
        out.push(BLOOM_FORMAT_VERSION);
        out.extend_from_slice(&self.item_count.to_le_bytes());
        out.extend_from_slice(&self.bloom.number_of_bits().to_le_bytes());
        out.extend_from_slice(&self.bloom.number_of_hash_functions().to_le_bytes());
        out.extend_from_slice(&sip_keys[0].0.to_le_bytes());
        out.extend_from_slice(&sip_keys[0].1.to_le_bytes());
        out.extend_from_slice(&sip_keys[1].0.to_le_bytes());
        out.extend_from_slice(&sip_keys[1].1.to_le_bytes());
        out.extend_from_slice(&bitmap);
        out
    }

    /// Parse a filter serialized by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < BLOOM_HEADER_LEN {
            return Err(Error::BloomCorrupt(format!(
                "{} bytes is shorter than the {}-byte header",
                data.len(),
                BLOOM_HEADER_LEN
            )));
        }

        let version = data[0];
        if version != BLOOM_FORMAT_VERSION {
            return Err(Error::BloomCorrupt(format!(
                "unsupported bloom format version {}",
                version
            )));
        }

        let item_count = u64::from_le_bytes(field8(data, 1));
        let num_bits = u64::from_le_bytes(field8(data, 9));
        let num_hashes = u32::from_le_bytes(field4(data, 17));
        let sip_keys = [
            (
                u64::from_le_bytes(field8(data, 21)),
                u64::from_le_bytes(field8(data, 29)),
            ),
            (
                u64::from_le_bytes(field8(data, 37)),
                u64::from_le_bytes(field8(data, 45)),
            ),
        ];

        let bitmap = &data[BLOOM_HEADER_LEN..];
        let expected_bytes = (num_bits as usize + 7) / 8;
        if bitmap.len() != expected_bytes {
            return Err(Error::BloomCorrupt(format!(
                "bitmap is {} bytes, header declares {} bits",
                bitmap.len(),
                num_bits
            )));
        }

        Ok(Self {
            bloom: Bloom::from_existing(bitmap, num_bits, num_hashes, sip_keys),
            item_count,
        })
    }
}

fn field8(data: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&data[offset..offset + 8]);
    out
}

fn field4(data: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&data[offset..offset + 4]);
    out
}

/// Map a trace id onto one of `shard_count` bloom shards.
///
/// Writer and reader must agree on this mapping; it uses a fixed-key
/// hasher so the assignment is stable across processes.
pub fn shard_key_for_trace_id(id: &TraceId, shard_count: u32) -> u32 {
    if shard_count <= 1 {
        return 0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hasher.write(id.as_bytes());
    (hasher.finish() % shard_count as u64) as u32
}

/// Fetches serialized bloom shards for a block.
#[async_trait]
pub trait BloomStore: Send + Sync {
    async fn load(&self, block_id: &str, shard: u32) -> Result<Bytes>;
}

/// [`BloomStore`] over the block's sidecar objects in an object store.
pub struct ObjectStoreBloomStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBloomStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BloomStore for ObjectStoreBloomStore {
    async fn load(&self, block_id: &str, shard: u32) -> Result<Bytes> {
        let path = bloom_shard_path(block_id, shard);
        let unavailable = |source| Error::BloomUnavailable {
            block_id: block_id.to_string(),
            shard,
            source,
        };

        let result = self.store.get(&path).await.map_err(unavailable)?;
        result.bytes().await.map_err(unavailable)
    }
}
