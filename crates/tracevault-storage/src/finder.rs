//! Trace Lookup
//!
//! Answers "does this block contain trace X, and if so, return it" with
//! a handful of object-store reads:
//!
//! ```text
//! find_trace_by_id(id)
//!     ↓
//! Bloom pre-screen (sidecar shard filter)
//!     ↓ negative → None, zero block I/O
//! Open block (footer + index section)
//!     ↓
//! Binary search over row groups, one probe per step:
//!   chunk min/max → chunk bloom → page min/max → in-page scan
//!     ↓ no hit → None
//! Materialize the matched row (one data page read)
//! ```
//!
//! Rows are sorted by the hex rendering of the trace id, so each probe
//! classifies its row group as [`Probe::Before`] (target sorts earlier),
//! [`Probe::After`] (target sorts later), [`Probe::Missing`] (in range
//! but absent), or [`Probe::Hit`] with the global row number. The binary
//! search branches on that variant, which keeps the number of key-chunk
//! fetches logarithmic in the row group count.
//!
//! I/O within one lookup is sequential on purpose: the next probe
//! depends on the previous outcome, and the request count is already
//! logarithmic. Many lookups on distinct blocks may run concurrently;
//! nothing here is shared between them.
//!
//! A bloom fetch failure is an error, not a miss. A page decode or read
//! error mid-scan is an error, not a miss. The only ways to get `None`
//! are a negative filter, a key outside every row group, or a scan that
//! completes without the id.

use std::sync::Arc;

use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;
use tracevault_core::trace::HexTraceId;
use tracevault_core::{Trace, TraceId};

use crate::backend::{ObjectStoreReaderAt, ReadAt};
use crate::block::reader::ColumnarBlock;
use crate::block::{block_data_path, BlockMeta};
use crate::bloom::{shard_key_for_trace_id, BlockBloomFilter, BloomStore, ObjectStoreBloomStore};
use crate::config::FindConfig;
use crate::error::{check_cancelled, Error, Result};

/// Outcome of probing one row group for a trace id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The target sorts before this row group's key range.
    Before,
    /// The target sorts after this row group's key range.
    After,
    /// The target is within range but not present.
    Missing,
    /// The target was found at this global row number.
    Hit(u64),
}

/// Counters describing how much work one lookup did.
#[derive(Debug, Clone, Default)]
pub struct FindStats {
    /// Row groups probed by the binary search
    pub row_groups_probed: u32,

    /// Key pages actually decoded and scanned
    pub pages_scanned: u32,

    /// Key values compared during in-page scans
    pub values_compared: u64,
}

/// Walks row groups of an opened block looking for one trace id.
pub struct RowTracker<'a, R: ReadAt> {
    block: &'a ColumnarBlock<R>,
    scan_batch_size: usize,
    stats: FindStats,
}

impl<'a, R: ReadAt> RowTracker<'a, R> {
    pub fn new(block: &'a ColumnarBlock<R>, config: &FindConfig) -> Self {
        Self {
            block,
            scan_batch_size: config.scan_batch_size.max(1),
            stats: FindStats::default(),
        }
    }

    pub fn stats(&self) -> &FindStats {
        &self.stats
    }

    /// Probe one row group: chunk bounds, chunk bloom, then page-by-page
    /// pruning and scanning of the key column.
    pub async fn probe(
        &mut self,
        rg_idx: usize,
        id: &TraceId,
        target: &HexTraceId,
        cancel: &CancellationToken,
    ) -> Result<Probe> {
        self.stats.row_groups_probed += 1;
        let meta = self.block.row_groups().get(rg_idx);

        // Bounds first: they classify the probe directionally, and they
        // come from the already-loaded index, so Before/After probes
        // cost no chunk fetch. The chunk bloom only answers "is it in
        // this group" - a negative must never steer the search, only
        // end the in-range case early.
        if target < &meta.min_key {
            return Ok(Probe::Before);
        }
        if target > &meta.max_key {
            return Ok(Probe::After);
        }

        let chunk = self.block.key_chunk(rg_idx, cancel).await?;

        if let Some(bloom) = chunk.bloom() {
            if !bloom.might_contain(id) {
                return Ok(Probe::Missing);
            }
        }

        // Running global row number as pages are skipped.
        let mut row = meta.start_row;
        let mut buf = vec![[0u8; 32]; self.scan_batch_size];

        for page_idx in 0..chunk.num_pages() {
            let mut page = chunk.page(page_idx);
            if let Some((min, max)) = page.bounds() {
                if target < min {
                    return Ok(Probe::Before);
                }
                if target > max {
                    row += page.num_values() as u64;
                    continue;
                }
            }

            // Rows are sorted, so the first page whose bounds admit the
            // target is the only one that can hold its first occurrence.
            self.stats.pages_scanned += 1;
            loop {
                let n = page.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                self.stats.values_compared += n as u64;
                for (k, value) in buf[..n].iter().enumerate() {
                    if value == target {
                        return Ok(Probe::Hit(row + k as u64));
                    }
                }
                row += n as u64;
            }
            break;
        }

        Ok(Probe::Missing)
    }

    /// Binary search over the block's row groups. Returns the global row
    /// number of the first matching row in scan order, or `None`.
    pub async fn binary_search(
        &mut self,
        id: &TraceId,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>> {
        let target = id.hex();
        let mut lo: i64 = 0;
        let mut hi: i64 = self.block.row_groups().len() as i64 - 1;

        while lo <= hi {
            let mid = (lo + hi) / 2;
            match self.probe(mid as usize, id, &target, cancel).await? {
                Probe::Hit(row) => return Ok(Some(row)),
                Probe::Before => hi = mid - 1,
                Probe::After | Probe::Missing => lo = mid + 1,
            }
        }

        Ok(None)
    }
}

/// One immutable block in the object store, addressable by trace id.
pub struct BackendBlock {
    meta: BlockMeta,
    store: Arc<dyn ObjectStore>,
    bloom_store: Arc<dyn BloomStore>,
    config: FindConfig,
}

impl BackendBlock {
    pub fn new(store: Arc<dyn ObjectStore>, meta: BlockMeta) -> Self {
        Self::with_config(store, meta, FindConfig::default())
    }

    pub fn with_config(store: Arc<dyn ObjectStore>, meta: BlockMeta, config: FindConfig) -> Self {
        let bloom_store = Arc::new(ObjectStoreBloomStore::new(store.clone()));
        Self {
            meta,
            store,
            bloom_store,
            config,
        }
    }

    pub fn meta(&self) -> &BlockMeta {
        &self.meta
    }

    /// Pre-screen the lookup against the id's bloom shard.
    async fn check_bloom(&self, id: &TraceId, cancel: &CancellationToken) -> Result<bool> {
        let shard = shard_key_for_trace_id(id, self.meta.bloom_shard_count);

        check_cancelled(cancel)?;
        let bytes = self.bloom_store.load(&self.meta.block_id, shard).await?;
        let filter = BlockBloomFilter::from_bytes(&bytes)?;

        let found = filter.might_contain(id);
        tracing::debug!(
            block_id = %self.meta.block_id,
            trace_id = %id,
            shard,
            found,
            "bloom pre-screen"
        );
        Ok(found)
    }

    /// Find a trace in this block.
    ///
    /// Returns `Ok(None)` on a legitimate miss; any fetch, parse, or
    /// decode failure is an error - a partially corrupt block reports
    /// the failure rather than pretending the trace is absent.
    pub async fn find_trace_by_id(
        &self,
        id: TraceId,
        cancel: &CancellationToken,
    ) -> Result<Option<Trace>> {
        if !self.check_bloom(&id, cancel).await? {
            return Ok(None);
        }

        check_cancelled(cancel)?;
        let reader = ObjectStoreReaderAt::new(
            self.store.clone(),
            block_data_path(&self.meta.block_id),
            self.meta.size_bytes,
        );
        let block = ColumnarBlock::open(reader, cancel).await?;

        let mut tracker = RowTracker::new(&block, &self.config);
        let row = tracker.binary_search(&id, cancel).await?;
        let stats = tracker.stats().clone();

        let Some(row) = row else {
            tracing::debug!(
                block_id = %self.meta.block_id,
                trace_id = %id,
                row_groups_probed = stats.row_groups_probed,
                inspected_bytes = block.reader().bytes_read(),
                "trace not found in block"
            );
            return Ok(None);
        };

        let trace = block.read_row(row, cancel).await?;
        if trace.trace_id != id {
            return Err(Error::SchemaMismatch(format!(
                "row {} holds trace {}, expected {}",
                row, trace.trace_id, id
            )));
        }

        tracing::debug!(
            block_id = %self.meta.block_id,
            trace_id = %id,
            row,
            row_groups_probed = stats.row_groups_probed,
            pages_scanned = stats.pages_scanned,
            inspected_bytes = block.reader().bytes_read(),
            "found trace in block"
        );
        Ok(Some(trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BytesReaderAt;
    use crate::block::writer::BlockWriter;
    use crate::config::BlockConfig;
    use bytes::Bytes;

    fn trace_n(n: u64, tag: &str) -> Trace {
        let mut id = [0u8; 16];
        // Leave gaps between ids so absent lookups land inside ranges.
        id[8..].copy_from_slice(&(n * 3 + 1).to_be_bytes());
        Trace {
            trace_id: TraceId::new(id),
            start_time_unix_nano: 100 + n,
            end_time_unix_nano: 200 + n,
            duration_nanos: 100,
            root_service_name: "api".to_string(),
            root_span_name: format!("op-{}", tag),
            spans: Bytes::from(format!("{}-{}", tag, n)),
        }
    }

    fn absent_id(n: u64) -> TraceId {
        let mut id = [0u8; 16];
        id[8..].copy_from_slice(&(n * 3 + 2).to_be_bytes());
        TraceId::new(id)
    }

    async fn build_block(rows: u64) -> ColumnarBlock<BytesReaderAt> {
        let config = BlockConfig {
            rows_per_row_group: 16,
            rows_per_page: 4,
            bloom_shard_count: 2,
            bloom_false_positive_rate: 0.01,
        };
        let mut writer = BlockWriter::new("blk-finder-test", config).unwrap();
        for n in 0..rows {
            writer.append(&trace_n(n, "x")).unwrap();
        }
        let finished = writer.finish().unwrap();
        ColumnarBlock::open(BytesReaderAt::new(finished.data), &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_probe_outcomes() {
        let block = build_block(64).await; // 4 row groups of 16
        let cancel = CancellationToken::new();
        let config = FindConfig::default();
        let mut tracker = RowTracker::new(&block, &config);

        // Row group 1 holds rows 16..32.
        let inside = trace_n(20, "x").trace_id;
        let probe = tracker
            .probe(1, &inside, &inside.hex(), &cancel)
            .await
            .unwrap();
        assert_eq!(probe, Probe::Hit(20));

        let before = trace_n(3, "x").trace_id;
        let probe = tracker
            .probe(1, &before, &before.hex(), &cancel)
            .await
            .unwrap();
        assert_eq!(probe, Probe::Before);

        let after = trace_n(50, "x").trace_id;
        let probe = tracker
            .probe(1, &after, &after.hex(), &cancel)
            .await
            .unwrap();
        assert_eq!(probe, Probe::After);

        // In range but absent: either the chunk bloom rejects it or the
        // scan comes up empty.
        let missing = absent_id(20);
        let probe = tracker
            .probe(1, &missing, &missing.hex(), &cancel)
            .await
            .unwrap();
        assert_eq!(probe, Probe::Missing);
    }

    #[tokio::test]
    async fn test_binary_search_finds_every_row() {
        let block = build_block(100).await;
        let cancel = CancellationToken::new();
        let config = FindConfig::default();

        for n in 0..100 {
            let id = trace_n(n, "x").trace_id;
            let mut tracker = RowTracker::new(&block, &config);
            let row = tracker.binary_search(&id, &cancel).await.unwrap();
            assert_eq!(row, Some(n), "id {}", n);
        }
    }

    #[tokio::test]
    async fn test_binary_search_miss_is_logarithmic() {
        let block = build_block(100).await; // 7 row groups
        let cancel = CancellationToken::new();
        let config = FindConfig::default();
        let max_probes = (block.row_groups().len() as f64).log2().ceil() as u32 + 1;

        // Below the block's range.
        let mut tracker = RowTracker::new(&block, &config);
        let low = TraceId::new([0u8; 16]);
        assert_eq!(tracker.binary_search(&low, &cancel).await.unwrap(), None);
        assert!(
            tracker.stats().row_groups_probed <= max_probes,
            "{} probes for a low miss",
            tracker.stats().row_groups_probed
        );

        // Above the block's range.
        let mut tracker = RowTracker::new(&block, &config);
        let high = TraceId::new([0xFF; 16]);
        assert_eq!(tracker.binary_search(&high, &cancel).await.unwrap(), None);
        assert!(tracker.stats().row_groups_probed <= max_probes);

        // Inside the range but absent.
        let mut tracker = RowTracker::new(&block, &config);
        let absent = absent_id(50);
        assert_eq!(tracker.binary_search(&absent, &cancel).await.unwrap(), None);
        assert!(tracker.stats().row_groups_probed <= max_probes);
    }

    #[tokio::test]
    async fn test_duplicates_return_first_row_in_scan_order() {
        let config = BlockConfig {
            rows_per_row_group: 8,
            rows_per_page: 2,
            bloom_shard_count: 1,
            bloom_false_positive_rate: 0.01,
        };
        let mut writer = BlockWriter::new("blk-dup", config).unwrap();

        // Rows 0..2 unique, rows 2..6 share one id across page
        // boundaries, rows 6..8 unique.
        writer.append(&trace_n(0, "a")).unwrap();
        writer.append(&trace_n(1, "b")).unwrap();
        for tag in ["first", "second", "third", "fourth"] {
            writer.append(&trace_n(2, tag)).unwrap();
        }
        writer.append(&trace_n(3, "c")).unwrap();
        writer.append(&trace_n(4, "d")).unwrap();

        let finished = writer.finish().unwrap();
        let cancel = CancellationToken::new();
        let block = ColumnarBlock::open(BytesReaderAt::new(finished.data), &cancel)
            .await
            .unwrap();

        let dup_id = trace_n(2, "x").trace_id;
        let mut tracker = RowTracker::new(&block, &FindConfig::default());
        let row = tracker.binary_search(&dup_id, &cancel).await.unwrap();
        assert_eq!(row, Some(2));

        let trace = block.read_row(2, &cancel).await.unwrap();
        assert_eq!(trace.root_span_name, "op-first");
    }

    #[tokio::test]
    async fn test_probe_respects_cancellation() {
        let block = build_block(32).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let id = trace_n(0, "x").trace_id;
        let mut tracker = RowTracker::new(&block, &FindConfig::default());
        let err = tracker.binary_search(&id, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
