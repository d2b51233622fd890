//! In-Memory Row Group Index
//!
//! Built once per block open from the index section. Maps global row
//! numbers onto row groups and carries the per-group key bounds the
//! binary search prunes with.
//!
//! ## Invariants (checked on construction)
//!
//! - Row groups are contiguous: `start_row[i+1] = start_row[i] + num_rows[i]`,
//!   starting at row 0.
//! - Every group holds at least one row.
//! - Groups are ordered by the sort key ascending:
//!   `max_key[i] <= min_key[i+1]`. The comparison is inclusive - a trace
//!   id may straddle a group boundary.

use crate::error::{Error, Result};
use tracevault_core::trace::HexTraceId;

/// Location and key bounds of one row group inside a block.
#[derive(Debug, Clone)]
pub struct RowGroupMeta {
    /// Global row number of the group's first row
    pub start_row: u64,

    /// Number of rows in the group
    pub num_rows: u64,

    /// Byte position of the key chunk
    pub key_chunk_pos: u64,

    /// Byte length of the key chunk
    pub key_chunk_len: u64,

    /// Byte position of the data chunk
    pub data_chunk_pos: u64,

    /// Byte length of the data chunk
    pub data_chunk_len: u64,

    /// Smallest trace id in the group (first page min)
    pub min_key: HexTraceId,

    /// Largest trace id in the group (last page max)
    pub max_key: HexTraceId,
}

/// Ordered list of a block's row groups.
#[derive(Debug)]
pub struct RowGroupIndex {
    groups: Vec<RowGroupMeta>,
}

impl RowGroupIndex {
    /// Build the index, validating contiguity and key ordering.
    pub fn new(groups: Vec<RowGroupMeta>) -> Result<Self> {
        let mut expected_start = 0u64;
        for (i, group) in groups.iter().enumerate() {
            if group.num_rows == 0 {
                return Err(Error::InvalidBlock(format!("row group {} is empty", i)));
            }
            if group.start_row != expected_start {
                return Err(Error::InvalidBlock(format!(
                    "row group {} starts at row {}, expected {}",
                    i, group.start_row, expected_start
                )));
            }
            if group.min_key > group.max_key {
                return Err(Error::InvalidBlock(format!(
                    "row group {} has min key above max key",
                    i
                )));
            }
            if i > 0 && groups[i - 1].max_key > group.min_key {
                return Err(Error::InvalidBlock(format!(
                    "row group {} overlaps the key range of its predecessor",
                    i
                )));
            }
            expected_start += group.num_rows;
        }

        Ok(Self { groups })
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, idx: usize) -> &RowGroupMeta {
        &self.groups[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowGroupMeta> {
        self.groups.iter()
    }

    /// Total number of rows across all groups.
    pub fn total_rows(&self) -> u64 {
        self.groups
            .last()
            .map(|g| g.start_row + g.num_rows)
            .unwrap_or(0)
    }

    /// Find the row group containing the given global row number.
    pub fn find_row_group(&self, row: u64) -> Option<usize> {
        let idx = self
            .groups
            .partition_point(|g| g.start_row + g.num_rows <= row);
        (idx < self.groups.len()).then_some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(start_row: u64, num_rows: u64, min: u8, max: u8) -> RowGroupMeta {
        RowGroupMeta {
            start_row,
            num_rows,
            key_chunk_pos: 0,
            key_chunk_len: 0,
            data_chunk_pos: 0,
            data_chunk_len: 0,
            min_key: [min; 32],
            max_key: [max; 32],
        }
    }

    #[test]
    fn test_find_row_group_boundaries() {
        let index = RowGroupIndex::new(vec![
            meta(0, 100, b'a', b'b'),
            meta(100, 50, b'c', b'd'),
            meta(150, 200, b'e', b'f'),
        ])
        .unwrap();

        assert_eq!(index.find_row_group(0), Some(0));
        assert_eq!(index.find_row_group(99), Some(0));
        assert_eq!(index.find_row_group(100), Some(1));
        assert_eq!(index.find_row_group(149), Some(1));
        assert_eq!(index.find_row_group(150), Some(2));
        assert_eq!(index.find_row_group(349), Some(2));
        assert_eq!(index.find_row_group(350), None);
        assert_eq!(index.total_rows(), 350);
    }

    #[test]
    fn test_boundary_ties_are_permitted() {
        // The same key may end one group and start the next.
        let index = RowGroupIndex::new(vec![meta(0, 10, b'a', b'c'), meta(10, 10, b'c', b'e')]);
        assert!(index.is_ok());
    }

    #[test]
    fn test_gap_in_rows_rejected() {
        let err = RowGroupIndex::new(vec![meta(0, 10, b'a', b'b'), meta(11, 10, b'c', b'd')])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBlock(_)));
    }

    #[test]
    fn test_overlapping_keys_rejected() {
        let err = RowGroupIndex::new(vec![meta(0, 10, b'a', b'd'), meta(10, 10, b'c', b'e')])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBlock(_)));
    }

    #[test]
    fn test_empty_group_rejected() {
        let err = RowGroupIndex::new(vec![meta(0, 0, b'a', b'b')]).unwrap_err();
        assert!(matches!(err, Error::InvalidBlock(_)));
    }

    #[test]
    fn test_empty_index() {
        let index = RowGroupIndex::new(vec![]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.total_rows(), 0);
        assert_eq!(index.find_row_group(0), None);
    }
}
