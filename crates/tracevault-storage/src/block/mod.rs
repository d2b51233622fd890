//! Columnar Block Format
//!
//! A block is one immutable file holding many traces sorted by trace id.
//! This module defines the on-disk layout; [`writer`] builds blocks and
//! [`reader`] opens them with ranged reads.
//!
//! ## Block File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                           │
//! │ - Magic bytes: "TVLT" (4 bytes)                             │
//! │ - Version: 1 (2 bytes)                                      │
//! │ - Flags (2 bytes), reserved (8 bytes)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Row group 1                                                 │
//! │ - Key chunk: dictionary of sorted hex trace ids,            │
//! │   chunk bloom filter, page directory (num values +          │
//! │   min/max per page), RLE/bit-packed dictionary-index pages  │
//! │ - Data chunk: page directory, varint-framed trace rows      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Row group 2 ...                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Index section                                               │
//! │ - Entry count (4 bytes)                                     │
//! │ - Per row group: start row, row count, chunk positions,     │
//! │   min/max trace id (112 bytes)                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                           │
//! │ - Index position (8 bytes)                                  │
//! │ - CRC32 of the index section (4 bytes)                      │
//! │ - Magic bytes: "TVLT" again (4 bytes)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why This Design?
//!
//! The lookup path opens a block with two ranged reads (footer, then
//! index section) and from there on touches only the row groups the
//! binary search probes and the single data page that holds the matched
//! row. Per-page min/max statistics let the probe skip pages without
//! decoding them; the CRC protects the index section that every read
//! depends on.
//!
//! ## Object Store Layout
//!
//! - `blocks/{block_id}/data.tvlt` - the block file
//! - `blocks/{block_id}/bloom-{shard}` - serialized bloom shards

pub mod reader;
pub mod writer;

use crate::error::{Error, Result};
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use tracevault_core::trace::TRACE_ID_LEN;
use tracevault_core::varint::{self, Uvarint};
use tracevault_core::{Trace, TraceId};

pub const BLOCK_MAGIC: [u8; 4] = *b"TVLT";
pub const BLOCK_VERSION: u16 = 1;

pub const HEADER_SIZE: usize = 16;
pub const FOOTER_SIZE: usize = 16;

/// Fixed size of one row-group entry in the index section:
/// start_row + num_rows + key pos/len + data pos/len (6 * 8 bytes),
/// then min and max hex trace ids (2 * 32 bytes).
pub const INDEX_ENTRY_SIZE: usize = 6 * 8 + 2 * 32;

/// Object-store location of a block's data file.
pub fn block_data_path(block_id: &str) -> Path {
    Path::from(format!("blocks/{}/data.tvlt", block_id))
}

/// Object-store location of one of a block's bloom shards.
pub fn bloom_shard_path(block_id: &str, shard: u32) -> Path {
    Path::from(format!("blocks/{}/bloom-{}", block_id, shard))
}

/// Everything a reader needs to locate and open a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Unique block ID
    pub block_id: String,

    /// Number of traces in the block
    pub total_rows: u64,

    /// Size of the data file in bytes
    pub size_bytes: u64,

    /// Number of row groups
    pub row_group_count: u32,

    /// Number of bloom filter shards
    pub bloom_shard_count: u32,

    /// Smallest trace id in the block (hex)
    pub min_trace_id: String,

    /// Largest trace id in the block (hex)
    pub max_trace_id: String,

    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Trace row framing
//
// Data pages hold varint-framed rows:
//   trace_id (16 raw bytes), start/end/duration (uvarints),
//   root service name, root span name, span payload
//   (uvarint length + bytes each).
// ---------------------------------------------------------------------------

pub(crate) fn encode_trace_row(dst: &mut Vec<u8>, trace: &Trace) {
    dst.extend_from_slice(trace.trace_id.as_bytes());
    varint::encode_uvarint(dst, trace.start_time_unix_nano);
    varint::encode_uvarint(dst, trace.end_time_unix_nano);
    varint::encode_uvarint(dst, trace.duration_nanos);
    varint::encode_uvarint(dst, trace.root_service_name.len() as u64);
    dst.extend_from_slice(trace.root_service_name.as_bytes());
    varint::encode_uvarint(dst, trace.root_span_name.len() as u64);
    dst.extend_from_slice(trace.root_span_name.as_bytes());
    varint::encode_uvarint(dst, trace.spans.len() as u64);
    dst.extend_from_slice(&trace.spans);
}

/// Decode one trace row from the front of `src`; returns the trace and
/// the number of bytes consumed.
pub(crate) fn decode_trace_row(src: &[u8]) -> Result<(Trace, usize)> {
    let mut cursor = RowCursor { src, pos: 0 };

    let id_bytes = cursor.take(TRACE_ID_LEN, "trace id")?;
    let mut id = [0u8; TRACE_ID_LEN];
    id.copy_from_slice(id_bytes);

    let start_time_unix_nano = cursor.uvarint("start time")?;
    let end_time_unix_nano = cursor.uvarint("end time")?;
    let duration_nanos = cursor.uvarint("duration")?;

    let service_len = cursor.uvarint("root service name length")? as usize;
    let root_service_name = cursor.take_str(service_len, "root service name")?;
    let span_len = cursor.uvarint("root span name length")? as usize;
    let root_span_name = cursor.take_str(span_len, "root span name")?;

    let payload_len = cursor.uvarint("span payload length")? as usize;
    let spans = cursor.take(payload_len, "span payload")?.to_vec();

    Ok((
        Trace {
            trace_id: TraceId::new(id),
            start_time_unix_nano,
            end_time_unix_nano,
            duration_nanos,
            root_service_name,
            root_span_name,
            spans: spans.into(),
        },
        cursor.pos,
    ))
}

struct RowCursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> RowCursor<'a> {
    fn uvarint(&mut self, field: &str) -> Result<u64> {
        match varint::decode_uvarint(&self.src[self.pos..]) {
            Uvarint::Value { value, len } => {
                self.pos += len;
                Ok(value)
            }
            _ => Err(Error::SchemaMismatch(format!(
                "bad varint for {} at row byte {}",
                field, self.pos
            ))),
        }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.src.len() - self.pos {
            return Err(Error::SchemaMismatch(format!(
                "{} needs {} bytes at row byte {} but only {} remain",
                field,
                len,
                self.pos,
                self.src.len() - self.pos
            )));
        }
        let out = &self.src[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn take_str(&mut self, len: usize, field: &str) -> Result<String> {
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::SchemaMismatch(format!("{} is not valid UTF-8", field)))
    }
}
