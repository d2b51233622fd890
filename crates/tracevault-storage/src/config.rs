//! Storage Configuration
//!
//! ## BlockConfig
//!
//! Controls how blocks are laid out at write time:
//!
//! - **rows_per_row_group**: traces per row group (default: 1000). Row
//!   groups are the unit of the lookup's binary search; smaller groups
//!   mean more index entries but finer pruning.
//! - **rows_per_page**: traces per key/data page (default: 100). Pages
//!   are the unit of min/max pruning and of data fetches during row
//!   materialization.
//! - **bloom_shard_count**: number of per-block bloom shards (default: 4).
//!   Shards keep each filter object small enough to fetch in one round
//!   trip.
//! - **bloom_false_positive_rate**: target false positive rate for every
//!   filter the writer builds (default: 0.01 = 1%).
//!
//! ## FindConfig
//!
//! Controls the read side:
//!
//! - **scan_batch_size**: key values compared per batch during the
//!   in-page scan (default: 1000).

use serde::{Deserialize, Serialize};

/// Write-side block layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Traces per row group (default: 1000)
    #[serde(default = "default_rows_per_row_group")]
    pub rows_per_row_group: usize,

    /// Traces per page (default: 100)
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: usize,

    /// Number of block-level bloom filter shards (default: 4)
    #[serde(default = "default_bloom_shard_count")]
    pub bloom_shard_count: u32,

    /// Target bloom false positive rate (default: 0.01 = 1%)
    #[serde(default = "default_bloom_fp_rate")]
    pub bloom_false_positive_rate: f64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            rows_per_row_group: default_rows_per_row_group(),
            rows_per_page: default_rows_per_page(),
            bloom_shard_count: default_bloom_shard_count(),
            bloom_false_positive_rate: default_bloom_fp_rate(),
        }
    }
}

/// Read-side lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindConfig {
    /// Key values compared per batch during the in-page scan
    /// (default: 1000)
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: default_scan_batch_size(),
        }
    }
}

fn default_rows_per_row_group() -> usize {
    1000
}

fn default_rows_per_page() -> usize {
    100
}

fn default_bloom_shard_count() -> u32 {
    4
}

fn default_bloom_fp_rate() -> f64 {
    0.01
}

fn default_scan_batch_size() -> usize {
    1000
}
