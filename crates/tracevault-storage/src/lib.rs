//! TraceVault Storage Layer
//!
//! This crate implements the block side of TraceVault: writing immutable
//! columnar blocks of traces to S3-compatible object storage, and
//! answering point lookups against them with minimal I/O.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │  Ingesters   │
//! └──────┬───────┘
//!        │ traces, sorted by trace id
//!        ▼
//! ┌───────────────────┐
//! │ BlockWriter       │
//! │ - Row groups      │
//! │ - Key dictionary  │
//! │ - RLE index pages │
//! │ - Bloom shards    │
//! └────────┬──────────┘
//!          │ block + bloom sidecars
//!          ▼
//! ┌───────────────────┐
//! │   Object store    │
//! │ (S3/GCS/Azure/FS) │
//! └────────┬──────────┘
//!          │ ranged reads
//!          ▼
//! ┌───────────────────┐
//! │ BackendBlock      │
//! │ - Bloom screen    │
//! │ - Binary search   │
//! │ - Page pruning    │
//! │ - Row materialize │
//! └────────┬──────────┘
//!          │ Option<Trace>
//!          ▼
//! ┌──────────────┐
//! │   Queriers   │
//! └──────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### BlockWriter
//! Builds one block from a sorted stream of traces: row groups with
//! dictionary-encoded key columns (RLE/bit-packed through
//! `tracevault-core`), per-page min/max statistics, chunk bloom filters,
//! and sharded block-level bloom sidecars.
//!
//! ### BackendBlock
//! The lookup entry point. `find_trace_by_id` runs the pipeline:
//! bloom shard screen → open block (footer + CRC-checked index) →
//! binary search over row groups → in-page scan of the key column →
//! materialize one row. A lookup on a miss costs zero block reads when
//! the bloom says no, and a logarithmic number of key-chunk reads
//! otherwise.
//!
//! ### ReadAt / BloomStore
//! Small traits over the object store so the lookup core stays testable
//! against in-memory blocks and buffers.
//!
//! ## Concurrency Model
//!
//! One lookup is sequential: each binary-search probe depends on the
//! previous outcome. Callers run many lookups on distinct blocks in
//! parallel; no state is shared between lookups. Every suspension point
//! checks a `CancellationToken` and unwinds with `Error::Cancelled`.

pub mod backend;
pub mod block;
pub mod bloom;
pub mod config;
pub mod error;
pub mod finder;
pub mod page;
pub mod row_group;

pub use backend::{BytesReaderAt, ObjectStoreReaderAt, ReadAt};
pub use block::reader::{ColumnarBlock, KeyChunk};
pub use block::writer::{BlockWriter, FinishedBlock};
pub use block::{block_data_path, bloom_shard_path, BlockMeta};
pub use bloom::{shard_key_for_trace_id, BlockBloomFilter, BloomStore, ObjectStoreBloomStore};
pub use config::{BlockConfig, FindConfig};
pub use error::{Error, Result};
pub use finder::{BackendBlock, FindStats, Probe, RowTracker};
pub use page::PageReader;
pub use row_group::{RowGroupIndex, RowGroupMeta};
