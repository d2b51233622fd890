//! Block Writer - Building Columnar Blocks for Object Storage
//!
//! `BlockWriter` turns a stream of traces, already sorted by trace id,
//! into one immutable block file plus its sidecar bloom shards.
//!
//! ## What the Writer Does
//!
//! 1. **Enforces sort order**: rows must arrive in ascending hex trace
//!    id order (ties allowed) - the whole lookup path depends on it
//! 2. **Buffers rows into row groups** of `rows_per_row_group`
//! 3. **Builds a key chunk per row group**: a sorted dictionary of hex
//!    trace ids, RLE/bit-packed dictionary-index pages with per-page
//!    min/max, and a chunk bloom filter
//! 4. **Builds a data chunk per row group**: varint-framed trace rows
//!    split into pages with a directory, so one row costs one page read
//! 5. **Writes the index section and footer**: per-group positions and
//!    key bounds, CRC-protected
//! 6. **Builds sharded bloom filters** over every id in the block
//!
//! ## Usage
//!
//! ```ignore
//! let mut writer = BlockWriter::new("block-0001", BlockConfig::default())?;
//! for trace in traces_sorted_by_id {
//!     writer.append(&trace)?;
//! }
//! let finished = writer.finish()?;
//! finished.upload(&object_store).await?;
//! ```
//!
//! ## Thread Safety
//!
//! BlockWriter is not thread-safe; one writer owns one block under
//! construction.

use bytes::Bytes;
use tracevault_core::trace::HexTraceId;
use tracevault_core::{rle, varint, Trace, TraceId};

use super::{
    block_data_path, bloom_shard_path, encode_trace_row, BlockMeta, BLOCK_MAGIC, BLOCK_VERSION,
    HEADER_SIZE,
};
use crate::bloom::{shard_key_for_trace_id, BlockBloomFilter};
use crate::config::BlockConfig;
use crate::error::{Error, Result};
use crate::row_group::RowGroupMeta;

/// Builds one columnar block file.
pub struct BlockWriter {
    config: BlockConfig,
    block_id: String,

    /// Block bytes built so far (header + finished row groups)
    buf: Vec<u8>,

    /// Index entries for finished row groups
    groups: Vec<RowGroupMeta>,

    /// Rows of the row group currently being filled
    pending: Vec<PendingRow>,

    /// Trace ids per bloom shard, filtered at finish
    shard_ids: Vec<Vec<TraceId>>,

    /// Rows already flushed into row groups
    flushed_rows: u64,

    /// Last appended key, for sort-order enforcement
    last_key: Option<HexTraceId>,

    min_key: Option<HexTraceId>,
    max_key: Option<HexTraceId>,
}

struct PendingRow {
    id: TraceId,
    key: HexTraceId,
    encoded: Vec<u8>,
}

/// A completed block: the data file, its bloom shards, and the metadata
/// a reader needs to open it.
pub struct FinishedBlock {
    pub data: Bytes,
    pub blooms: Vec<Bytes>,
    pub meta: BlockMeta,
}

impl BlockWriter {
    pub fn new(block_id: impl Into<String>, config: BlockConfig) -> Result<Self> {
        if config.rows_per_row_group == 0 || config.rows_per_page == 0 {
            return Err(Error::InvalidBlock(
                "rows_per_row_group and rows_per_page must be positive".to_string(),
            ));
        }
        if config.bloom_shard_count == 0 {
            return Err(Error::InvalidBlock(
                "bloom_shard_count must be positive".to_string(),
            ));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&BLOCK_MAGIC);
        buf.extend_from_slice(&BLOCK_VERSION.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // flags
        buf.resize(HEADER_SIZE, 0); // reserved

        let shard_ids = (0..config.bloom_shard_count).map(|_| Vec::new()).collect();

        Ok(Self {
            config,
            block_id: block_id.into(),
            buf,
            groups: Vec::new(),
            pending: Vec::new(),
            shard_ids,
            flushed_rows: 0,
            last_key: None,
            min_key: None,
            max_key: None,
        })
    }

    /// Append one trace. Traces must arrive in ascending hex trace id
    /// order; ties are allowed.
    pub fn append(&mut self, trace: &Trace) -> Result<()> {
        let key = trace.trace_id.hex();
        if let Some(last) = &self.last_key {
            if key < *last {
                return Err(Error::InvalidBlock(format!(
                    "trace id {} is out of sort order",
                    trace.trace_id
                )));
            }
        }
        self.last_key = Some(key);
        self.min_key.get_or_insert(key);
        self.max_key = Some(key);

        let mut encoded = Vec::new();
        encode_trace_row(&mut encoded, trace);

        let shard = shard_key_for_trace_id(&trace.trace_id, self.config.bloom_shard_count);
        self.shard_ids[shard as usize].push(trace.trace_id);

        self.pending.push(PendingRow {
            id: trace.trace_id,
            key,
            encoded,
        });

        if self.pending.len() >= self.config.rows_per_row_group {
            self.flush_row_group()?;
        }
        Ok(())
    }

    /// Number of traces appended so far.
    pub fn row_count(&self) -> u64 {
        self.flushed_rows + self.pending.len() as u64
    }

    /// Finalize the block: flush the last row group, write the index
    /// section and footer, and build the bloom shards.
    pub fn finish(mut self) -> Result<FinishedBlock> {
        self.flush_row_group()?;

        if self.groups.is_empty() {
            return Err(Error::InvalidBlock(
                "cannot finish an empty block".to_string(),
            ));
        }

        let index_pos = self.buf.len() as u64;
        self.buf
            .extend_from_slice(&(self.groups.len() as u32).to_le_bytes());
        for group in &self.groups {
            self.buf.extend_from_slice(&group.start_row.to_le_bytes());
            self.buf.extend_from_slice(&group.num_rows.to_le_bytes());
            self.buf
                .extend_from_slice(&group.key_chunk_pos.to_le_bytes());
            self.buf
                .extend_from_slice(&group.key_chunk_len.to_le_bytes());
            self.buf
                .extend_from_slice(&group.data_chunk_pos.to_le_bytes());
            self.buf
                .extend_from_slice(&group.data_chunk_len.to_le_bytes());
            self.buf.extend_from_slice(&group.min_key);
            self.buf.extend_from_slice(&group.max_key);
        }

        let index_crc = crc32fast::hash(&self.buf[index_pos as usize..]);
        self.buf.extend_from_slice(&index_pos.to_le_bytes());
        self.buf.extend_from_slice(&index_crc.to_le_bytes());
        self.buf.extend_from_slice(&BLOCK_MAGIC);

        let blooms = self.build_shard_blooms();

        let min_key = self.min_key.unwrap_or([b'0'; 32]);
        let max_key = self.max_key.unwrap_or([b'0'; 32]);
        let meta = BlockMeta {
            block_id: self.block_id.clone(),
            total_rows: self.flushed_rows,
            size_bytes: self.buf.len() as u64,
            row_group_count: self.groups.len() as u32,
            bloom_shard_count: self.config.bloom_shard_count,
            min_trace_id: String::from_utf8_lossy(&min_key).to_string(),
            max_trace_id: String::from_utf8_lossy(&max_key).to_string(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        };

        tracing::info!(
            block_id = %meta.block_id,
            total_rows = meta.total_rows,
            row_groups = meta.row_group_count,
            size_bytes = meta.size_bytes,
            "finished block"
        );

        Ok(FinishedBlock {
            data: Bytes::from(self.buf),
            blooms,
            meta,
        })
    }

    fn flush_row_group(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        let start_row = self.flushed_rows;

        // Dictionary over the group's distinct keys; rows are sorted, so
        // consecutive deduplication is exact and the dictionary stays
        // sorted too.
        let mut dict: Vec<HexTraceId> = Vec::new();
        let mut indices: Vec<u32> = Vec::with_capacity(rows.len());
        let mut chunk_bloom =
            BlockBloomFilter::new(rows.len(), self.config.bloom_false_positive_rate);
        for row in &rows {
            if dict.last() != Some(&row.key) {
                dict.push(row.key);
                chunk_bloom.add(&row.id);
            }
            indices.push((dict.len() - 1) as u32);
        }
        let bit_width = bits_for_dictionary(dict.len());

        let key_chunk = self.build_key_chunk(&rows, &dict, &indices, &chunk_bloom, bit_width)?;
        let data_chunk = self.build_data_chunk(&rows);

        let key_chunk_pos = self.buf.len() as u64;
        self.buf.extend_from_slice(&key_chunk);
        let data_chunk_pos = self.buf.len() as u64;
        self.buf.extend_from_slice(&data_chunk);

        tracing::debug!(
            block_id = %self.block_id,
            start_row,
            rows = rows.len(),
            dictionary = dict.len(),
            bit_width,
            "flushed row group"
        );

        self.groups.push(RowGroupMeta {
            start_row,
            num_rows: rows.len() as u64,
            key_chunk_pos,
            key_chunk_len: key_chunk.len() as u64,
            data_chunk_pos,
            data_chunk_len: data_chunk.len() as u64,
            min_key: rows[0].key,
            max_key: rows[rows.len() - 1].key,
        });
        self.flushed_rows += rows.len() as u64;
        Ok(())
    }

    fn build_key_chunk(
        &self,
        rows: &[PendingRow],
        dict: &[HexTraceId],
        indices: &[u32],
        chunk_bloom: &BlockBloomFilter,
        bit_width: u32,
    ) -> Result<Vec<u8>> {
        let mut chunk = Vec::new();

        varint::encode_uvarint(&mut chunk, dict.len() as u64);
        for key in dict {
            chunk.extend_from_slice(key);
        }

        let bloom_bytes = chunk_bloom.to_bytes();
        varint::encode_uvarint(&mut chunk, bloom_bytes.len() as u64);
        chunk.extend_from_slice(&bloom_bytes);

        // Page directory, then the encoded index pages back-to-back.
        let mut pages: Vec<Vec<u8>> = Vec::new();
        let page_count = indices.len().div_ceil(self.config.rows_per_page);
        varint::encode_uvarint(&mut chunk, page_count as u64);

        for (page_indices, page_rows) in indices
            .chunks(self.config.rows_per_page)
            .zip(rows.chunks(self.config.rows_per_page))
        {
            let mut encoded = Vec::new();
            rle::encode_u32(&mut encoded, page_indices, bit_width)?;

            varint::encode_uvarint(&mut chunk, page_indices.len() as u64);
            chunk.extend_from_slice(&page_rows[0].key);
            chunk.extend_from_slice(&page_rows[page_rows.len() - 1].key);
            varint::encode_uvarint(&mut chunk, encoded.len() as u64);
            pages.push(encoded);
        }

        for page in pages {
            chunk.extend_from_slice(&page);
        }
        Ok(chunk)
    }

    fn build_data_chunk(&self, rows: &[PendingRow]) -> Vec<u8> {
        let mut payloads = Vec::new();
        let mut dir = Vec::new();

        let page_count = rows.len().div_ceil(self.config.rows_per_page);
        varint::encode_uvarint(&mut dir, page_count as u64);

        let mut first_row = 0u64;
        for page_rows in rows.chunks(self.config.rows_per_page) {
            let offset = payloads.len() as u64;
            for row in page_rows {
                payloads.extend_from_slice(&row.encoded);
            }

            varint::encode_uvarint(&mut dir, first_row);
            varint::encode_uvarint(&mut dir, page_rows.len() as u64);
            varint::encode_uvarint(&mut dir, offset);
            varint::encode_uvarint(&mut dir, payloads.len() as u64 - offset);
            first_row += page_rows.len() as u64;
        }

        let mut chunk = Vec::with_capacity(4 + dir.len() + payloads.len());
        chunk.extend_from_slice(&(dir.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&dir);
        chunk.extend_from_slice(&payloads);
        chunk
    }

    fn build_shard_blooms(&self) -> Vec<Bytes> {
        self.shard_ids
            .iter()
            .map(|ids| {
                let mut bloom = BlockBloomFilter::new(
                    ids.len().max(1),
                    self.config.bloom_false_positive_rate,
                );
                for id in ids {
                    bloom.add(id);
                }
                Bytes::from(bloom.to_bytes())
            })
            .collect()
    }
}

/// Minimal bit width able to hold every index of a dictionary with
/// `len` entries. A single-entry dictionary needs width 0: the index
/// stream is all zeros.
pub(crate) fn bits_for_dictionary(len: usize) -> u32 {
    if len <= 1 {
        0
    } else {
        32 - ((len - 1) as u32).leading_zeros()
    }
}

impl FinishedBlock {
    /// Upload the data file and every bloom shard to the object store.
    pub async fn upload(&self, store: &dyn object_store::ObjectStore) -> Result<()> {
        store
            .put(&block_data_path(&self.meta.block_id), self.data.clone())
            .await?;
        for (shard, bloom) in self.blooms.iter().enumerate() {
            store
                .put(
                    &bloom_shard_path(&self.meta.block_id, shard as u32),
                    bloom.clone(),
                )
                .await?;
        }
        tracing::debug!(
            block_id = %self.meta.block_id,
            shards = self.blooms.len(),
            "uploaded block"
        );
        Ok(())
    }
}
