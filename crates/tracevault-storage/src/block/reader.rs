//! Block Reader - Opening Columnar Blocks with Ranged Reads
//!
//! `ColumnarBlock` opens a block over any [`ReadAt`] source. Opening
//! costs three small reads (header, footer, index section); everything
//! else is fetched on demand:
//!
//! - `key_chunk(rg)` fetches one row group's key chunk - dictionary,
//!   chunk bloom filter, page directory and encoded index pages - in a
//!   single ranged read. Probes during the binary search touch only the
//!   row groups they visit.
//! - `read_row(n)` materializes one trace: it reads the owning row
//!   group's data-page directory, locates the single page holding row
//!   `n`, fetches it, and decodes up to the target row. Seeking is
//!   exact; no rows outside that page are ever fetched.
//!
//! All validation failures during open surface as `ColumnarOpenFailed`;
//! structural corruption found later surfaces as `InvalidBlock`,
//! `RowReadFailed`, or `SchemaMismatch` depending on where it bites.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracevault_core::trace::HexTraceId;
use tracevault_core::varint::{self, Uvarint};
use tracevault_core::Trace;

use super::writer::bits_for_dictionary;
use super::{decode_trace_row, BLOCK_MAGIC, BLOCK_VERSION, FOOTER_SIZE, HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::backend::ReadAt;
use crate::bloom::BlockBloomFilter;
use crate::error::{check_cancelled, Error, Result};
use crate::page::PageReader;
use crate::row_group::{RowGroupIndex, RowGroupMeta};

/// An opened columnar block.
#[derive(Debug)]
pub struct ColumnarBlock<R: ReadAt> {
    reader: R,
    row_groups: RowGroupIndex,
}

impl<R: ReadAt> ColumnarBlock<R> {
    /// Open a block: validate header and footer, fetch and CRC-check the
    /// index section, and build the row group index.
    pub async fn open(reader: R, cancel: &CancellationToken) -> Result<Self> {
        check_cancelled(cancel)?;

        let size = reader.size();
        if size < (HEADER_SIZE + FOOTER_SIZE + 4) as u64 {
            return Err(Error::ColumnarOpenFailed(format!(
                "{}-byte file is too small to be a block",
                size
            )));
        }

        let header = reader.read_at(0, HEADER_SIZE).await.map_err(open_failed)?;
        if header[..4] != BLOCK_MAGIC {
            return Err(Error::ColumnarOpenFailed("bad magic bytes".to_string()));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != BLOCK_VERSION {
            return Err(Error::ColumnarOpenFailed(format!(
                "unsupported block version {}",
                version
            )));
        }

        check_cancelled(cancel)?;
        let footer = reader
            .read_at(size - FOOTER_SIZE as u64, FOOTER_SIZE)
            .await
            .map_err(open_failed)?;
        if footer[12..] != BLOCK_MAGIC {
            return Err(Error::ColumnarOpenFailed(
                "bad footer magic bytes".to_string(),
            ));
        }
        let index_pos = u64::from_le_bytes(field8(&footer, 0));
        let stored_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        let index_end = size - FOOTER_SIZE as u64;
        if index_pos < HEADER_SIZE as u64 || index_pos >= index_end {
            return Err(Error::ColumnarOpenFailed(format!(
                "index position {} is outside the file",
                index_pos
            )));
        }

        check_cancelled(cancel)?;
        let index_bytes = reader
            .read_at(index_pos, (index_end - index_pos) as usize)
            .await
            .map_err(open_failed)?;
        if crc32fast::hash(&index_bytes) != stored_crc {
            return Err(Error::ColumnarOpenFailed(
                "index section checksum mismatch".to_string(),
            ));
        }

        let row_groups = parse_index(&index_bytes, index_pos)?;
        tracing::debug!(
            row_groups = row_groups.len(),
            total_rows = row_groups.total_rows(),
            size_bytes = size,
            "opened columnar block"
        );

        Ok(Self { reader, row_groups })
    }

    pub fn row_groups(&self) -> &RowGroupIndex {
        &self.row_groups
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Fetch and parse one row group's key chunk.
    pub async fn key_chunk(&self, rg_idx: usize, cancel: &CancellationToken) -> Result<KeyChunk> {
        check_cancelled(cancel)?;
        let meta = self.row_groups.get(rg_idx);
        let bytes = self
            .reader
            .read_at(meta.key_chunk_pos, meta.key_chunk_len as usize)
            .await?;
        KeyChunk::parse(bytes)
    }

    /// Materialize the trace at a global row number.
    pub async fn read_row(&self, row: u64, cancel: &CancellationToken) -> Result<Trace> {
        let row_err = |reason: String| Error::RowReadFailed { row, reason };

        let rg_idx = self
            .row_groups
            .find_row_group(row)
            .ok_or_else(|| row_err("row is past the end of the block".to_string()))?;
        let meta = self.row_groups.get(rg_idx);
        let local = row - meta.start_row;

        // Data chunk layout: u32 directory length, directory, page
        // payloads.
        check_cancelled(cancel)?;
        if meta.data_chunk_len < 4 {
            return Err(row_err("data chunk is shorter than its header".to_string()));
        }
        let len_prefix = self.reader.read_at(meta.data_chunk_pos, 4).await?;
        let dir_len = u32::from_le_bytes([len_prefix[0], len_prefix[1], len_prefix[2], len_prefix[3]]) as u64;
        if 4 + dir_len > meta.data_chunk_len {
            return Err(row_err(format!(
                "data page directory of {} bytes does not fit the chunk",
                dir_len
            )));
        }

        check_cancelled(cancel)?;
        let dir = self
            .reader
            .read_at(meta.data_chunk_pos + 4, dir_len as usize)
            .await?;
        let page = find_data_page(&dir, local).ok_or_else(|| {
            row_err("no data page covers the row".to_string())
        })?;

        let payload_base = meta.data_chunk_pos + 4 + dir_len;
        let payload_len = meta.data_chunk_len - 4 - dir_len;
        if page.byte_len > payload_len || page.offset > payload_len - page.byte_len {
            return Err(row_err("data page extends past its chunk".to_string()));
        }

        check_cancelled(cancel)?;
        let page_bytes = self
            .reader
            .read_at(payload_base + page.offset, page.byte_len as usize)
            .await?;

        // Skip the rows before the target inside the page, then decode it.
        let mut cursor = &page_bytes[..];
        for _ in 0..(local - page.first_row) {
            let (_, consumed) = decode_trace_row(cursor)?;
            cursor = &cursor[consumed..];
        }
        let (trace, _) = decode_trace_row(cursor)?;
        Ok(trace)
    }
}

fn open_failed(err: Error) -> Error {
    match err {
        Error::Cancelled => Error::Cancelled,
        other => Error::ColumnarOpenFailed(other.to_string()),
    }
}

fn field8(data: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&data[offset..offset + 8]);
    out
}

fn parse_index(index: &[u8], index_pos: u64) -> Result<RowGroupIndex> {
    if index.len() < 4 {
        return Err(Error::ColumnarOpenFailed(
            "index section is shorter than its entry count".to_string(),
        ));
    }
    let count = u32::from_le_bytes([index[0], index[1], index[2], index[3]]) as usize;
    if index.len() != 4 + count * INDEX_ENTRY_SIZE {
        return Err(Error::ColumnarOpenFailed(format!(
            "index section is {} bytes, expected {} for {} row groups",
            index.len(),
            4 + count * INDEX_ENTRY_SIZE,
            count
        )));
    }

    let mut groups = Vec::with_capacity(count);
    for i in 0..count {
        let entry = &index[4 + i * INDEX_ENTRY_SIZE..4 + (i + 1) * INDEX_ENTRY_SIZE];
        let mut min_key = [0u8; 32];
        let mut max_key = [0u8; 32];
        min_key.copy_from_slice(&entry[48..80]);
        max_key.copy_from_slice(&entry[80..112]);
        let group = RowGroupMeta {
            start_row: u64::from_le_bytes(field8(entry, 0)),
            num_rows: u64::from_le_bytes(field8(entry, 8)),
            key_chunk_pos: u64::from_le_bytes(field8(entry, 16)),
            key_chunk_len: u64::from_le_bytes(field8(entry, 24)),
            data_chunk_pos: u64::from_le_bytes(field8(entry, 32)),
            data_chunk_len: u64::from_le_bytes(field8(entry, 40)),
            min_key,
            max_key,
        };

        // Chunks must sit between the header and the index section.
        for (pos, len) in [
            (group.key_chunk_pos, group.key_chunk_len),
            (group.data_chunk_pos, group.data_chunk_len),
        ] {
            let in_range = pos >= HEADER_SIZE as u64
                && pos.checked_add(len).map(|end| end <= index_pos).unwrap_or(false);
            if !in_range {
                return Err(Error::ColumnarOpenFailed(format!(
                    "row group {} chunk at {}+{} is outside the data section",
                    i, pos, len
                )));
            }
        }
        groups.push(group);
    }

    RowGroupIndex::new(groups).map_err(|e| Error::ColumnarOpenFailed(e.to_string()))
}

struct DataPage {
    first_row: u64,
    num_rows: u64,
    offset: u64,
    byte_len: u64,
}

fn find_data_page(dir: &[u8], local_row: u64) -> Option<DataPage> {
    let mut pos = 0;
    let page_count = read_uvarint(dir, &mut pos)?;
    for _ in 0..page_count {
        let page = DataPage {
            first_row: read_uvarint(dir, &mut pos)?,
            num_rows: read_uvarint(dir, &mut pos)?,
            offset: read_uvarint(dir, &mut pos)?,
            byte_len: read_uvarint(dir, &mut pos)?,
        };
        let page_end = page.first_row.checked_add(page.num_rows)?;
        if local_row >= page.first_row && local_row < page_end {
            return Some(page);
        }
    }
    None
}

fn read_uvarint(src: &[u8], pos: &mut usize) -> Option<u64> {
    match varint::decode_uvarint(&src[*pos..]) {
        Uvarint::Value { value, len } => {
            *pos += len;
            Some(value)
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Key chunk
// ---------------------------------------------------------------------------

/// A row group's key column chunk: dictionary, optional chunk bloom
/// filter, and the page directory over the encoded index pages.
pub struct KeyChunk {
    dict: Vec<HexTraceId>,
    bloom: Option<BlockBloomFilter>,
    bit_width: u32,
    pages: Vec<KeyPageMeta>,
    payload: Bytes,
}

/// Directory entry for one key page.
pub struct KeyPageMeta {
    pub num_values: usize,
    pub min: HexTraceId,
    pub max: HexTraceId,
    payload: std::ops::Range<usize>,
}

impl KeyChunk {
    pub fn parse(bytes: Bytes) -> Result<Self> {
        let invalid = |what: &str, pos: usize| {
            Error::InvalidBlock(format!("key chunk: {} at byte {}", what, pos))
        };

        let mut pos = 0;
        let dict_count =
            read_uvarint(&bytes, &mut pos).ok_or_else(|| invalid("bad dictionary count", pos))? as usize;
        if dict_count > (bytes.len() - pos) / 32 {
            return Err(invalid("dictionary extends past the chunk", pos));
        }
        let mut dict = Vec::with_capacity(dict_count);
        for _ in 0..dict_count {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes[pos..pos + 32]);
            if let Some(prev) = dict.last() {
                if *prev > key {
                    return Err(invalid("dictionary is not sorted", pos));
                }
            }
            dict.push(key);
            pos += 32;
        }

        let bloom_len =
            read_uvarint(&bytes, &mut pos).ok_or_else(|| invalid("bad bloom length", pos))? as usize;
        if bloom_len > bytes.len() - pos {
            return Err(invalid("bloom filter extends past the chunk", pos));
        }
        let bloom = if bloom_len == 0 {
            None
        } else {
            Some(BlockBloomFilter::from_bytes(&bytes[pos..pos + bloom_len])?)
        };
        pos += bloom_len;

        let page_count =
            read_uvarint(&bytes, &mut pos).ok_or_else(|| invalid("bad page count", pos))? as usize;
        let mut lens = Vec::with_capacity(page_count);
        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            let num_values = read_uvarint(&bytes, &mut pos)
                .ok_or_else(|| invalid("bad page value count", pos))?
                as usize;
            if 64 > bytes.len() - pos {
                return Err(invalid("page bounds extend past the chunk", pos));
            }
            let mut min = [0u8; 32];
            let mut max = [0u8; 32];
            min.copy_from_slice(&bytes[pos..pos + 32]);
            max.copy_from_slice(&bytes[pos + 32..pos + 64]);
            pos += 64;
            let encoded_len = read_uvarint(&bytes, &mut pos)
                .ok_or_else(|| invalid("bad page length", pos))? as usize;
            lens.push(encoded_len);
            pages.push(KeyPageMeta {
                num_values,
                min,
                max,
                payload: 0..0,
            });
        }

        // Page payloads follow the directory back-to-back.
        let mut offset = pos;
        for (page, len) in pages.iter_mut().zip(&lens) {
            if *len > bytes.len() - offset {
                return Err(invalid("page payload extends past the chunk", offset));
            }
            page.payload = offset..offset + len;
            offset += len;
        }
        if offset != bytes.len() {
            return Err(invalid("trailing bytes after the last page", offset));
        }

        Ok(Self {
            bit_width: bits_for_dictionary(dict.len()),
            dict,
            bloom,
            pages,
            payload: bytes,
        })
    }

    pub fn dictionary(&self) -> &[HexTraceId] {
        &self.dict
    }

    pub fn bloom(&self) -> Option<&BlockBloomFilter> {
        self.bloom.as_ref()
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page_meta(&self, idx: usize) -> &KeyPageMeta {
        &self.pages[idx]
    }

    /// A fresh single-use reader over page `idx`.
    pub fn page(&self, idx: usize) -> PageReader<'_> {
        let meta = &self.pages[idx];
        PageReader::new(
            &self.dict,
            self.bit_width,
            meta.num_values,
            &meta.min,
            &meta.max,
            &self.payload[meta.payload.clone()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BytesReaderAt;
    use crate::block::writer::BlockWriter;
    use crate::config::BlockConfig;
    use bytes::{Bytes, BytesMut};
    use tracevault_core::TraceId;

    fn trace_with_id(n: u64) -> Trace {
        let mut id = [0u8; 16];
        id[8..].copy_from_slice(&n.to_be_bytes());
        Trace {
            trace_id: TraceId::new(id),
            start_time_unix_nano: 10_000 + n,
            end_time_unix_nano: 20_000 + n,
            duration_nanos: 10_000,
            root_service_name: format!("svc-{}", n % 3),
            root_span_name: format!("op-{}", n % 7),
            spans: Bytes::from(format!("spans-for-{}", n)),
        }
    }

    fn build_block(rows: u64) -> Bytes {
        let config = BlockConfig {
            rows_per_row_group: 10,
            rows_per_page: 4,
            bloom_shard_count: 2,
            bloom_false_positive_rate: 0.01,
        };
        let mut writer = BlockWriter::new("blk-reader-test", config).unwrap();
        for n in 0..rows {
            writer.append(&trace_with_id(n)).unwrap();
        }
        writer.finish().unwrap().data
    }

    #[tokio::test]
    async fn test_open_and_read_every_row() {
        let data = build_block(37);
        let cancel = CancellationToken::new();
        let block = ColumnarBlock::open(BytesReaderAt::new(data), &cancel)
            .await
            .unwrap();

        assert_eq!(block.row_groups().len(), 4); // 10+10+10+7
        assert_eq!(block.row_groups().total_rows(), 37);

        for n in 0..37 {
            let trace = block.read_row(n, &cancel).await.unwrap();
            assert_eq!(trace, trace_with_id(n), "row {}", n);
        }
    }

    #[tokio::test]
    async fn test_key_chunk_contents() {
        let data = build_block(25);
        let cancel = CancellationToken::new();
        let block = ColumnarBlock::open(BytesReaderAt::new(data), &cancel)
            .await
            .unwrap();

        let chunk = block.key_chunk(1, &cancel).await.unwrap();
        assert_eq!(chunk.dictionary().len(), 10); // distinct ids, rows 10..20
        assert_eq!(chunk.num_pages(), 3); // 4+4+2

        // Dictionary holds the hex keys of rows 10..20 in order, and the
        // chunk bloom recognizes each of them.
        let bloom = chunk.bloom().expect("chunk bloom present");
        for (i, n) in (10u64..20).enumerate() {
            assert_eq!(chunk.dictionary()[i], trace_with_id(n).trace_id.hex());
            assert!(bloom.might_contain(&trace_with_id(n).trace_id));
        }

        // Page bounds line up with the rows each page holds.
        let mut reader = chunk.page(0);
        assert_eq!(
            reader.bounds(),
            Some((
                &trace_with_id(10).trace_id.hex(),
                &trace_with_id(13).trace_id.hex()
            ))
        );
        let mut buf = [[0u8; 32]; 10];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(buf[0], trace_with_id(10).trace_id.hex());
        assert_eq!(buf[3], trace_with_id(13).trace_id.hex());
    }

    #[tokio::test]
    async fn test_read_row_past_end() {
        let data = build_block(12);
        let cancel = CancellationToken::new();
        let block = ColumnarBlock::open(BytesReaderAt::new(data), &cancel)
            .await
            .unwrap();

        let err = block.read_row(12, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::RowReadFailed { row: 12, .. }));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_magic() {
        let data = build_block(12);
        let mut corrupt = BytesMut::from(&data[..]);
        corrupt[0] = b'X';

        let cancel = CancellationToken::new();
        let err = ColumnarBlock::open(BytesReaderAt::new(corrupt.freeze()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ColumnarOpenFailed(_)));
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_index() {
        let data = build_block(12);
        let footer_start = data.len() - FOOTER_SIZE;
        let index_pos = u64::from_le_bytes(field8(&data, footer_start)) as usize;

        let mut corrupt = BytesMut::from(&data[..]);
        corrupt[index_pos + 5] ^= 0xFF;

        let cancel = CancellationToken::new();
        let err = ColumnarBlock::open(BytesReaderAt::new(corrupt.freeze()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ColumnarOpenFailed(_)));
    }

    #[tokio::test]
    async fn test_open_rejects_truncated_file() {
        let data = build_block(12);
        let truncated = data.slice(..data.len() / 2);

        let cancel = CancellationToken::new();
        let err = ColumnarBlock::open(BytesReaderAt::new(truncated), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ColumnarOpenFailed(_)));
    }

    #[tokio::test]
    async fn test_open_respects_cancellation() {
        let data = build_block(12);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ColumnarBlock::open(BytesReaderAt::new(data), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
