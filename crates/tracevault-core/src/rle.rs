//! Hybrid RLE / Bit-Packed Page Codec
//!
//! This module implements the encoding used for dictionary index pages,
//! repetition/definition level streams, and boolean pages in TraceVault
//! blocks. It is the innermost hot path: every block read and write
//! funnels through here.
//!
//! ## Wire Format
//!
//! An encoded page is a sequence of back-to-back runs:
//!
//! ```text
//! page   := run*
//! run    := header, body
//! header := unsigned LEB128 varint: (count << 1) | mode
//! body   := mode 0 (run-length):  ceil(bit_width / 8) little-endian
//!                                 bytes of the repeated value
//!                                 (no bytes when bit_width = 0)
//!           mode 1 (bit-packed):  count groups of 8 values,
//!                                 count * bit_width bytes, LSB-first
//! ```
//!
//! Groups of 8 are the atomic unit of bit-packed runs; a tail shorter
//! than 8 values is always emitted as run-length runs. Boolean pages add
//! a 4-byte little-endian length prefix in front of the stream (an empty
//! boolean page is exactly the 4 zero bytes).
//!
//! ## Encoding Strategy
//!
//! The encoder scans the input in groups of 8. A constant group extends
//! the current run-length run; a mixed group starts a bit-packed run
//! that keeps extending until the next constant group. The encoder never
//! buries a constant group inside a bit-packed run: two or three bytes
//! of run-length header always beat packing 8 more values.
//!
//! ## Decoding Safety
//!
//! Decoders never panic on malformed input. Run counts are capped at
//! [`MAX_RUN_VALUES`] so a corrupt header cannot trigger an unbounded
//! allocation, and every error carries the byte offset where it was
//! detected. One padded scratch buffer is allocated per decode call and
//! reused across runs; when the source slice already has [`bitpack::PADDING`]
//! readable bytes after a run body, decoding borrows from it directly.

use crate::bitpack;
use crate::error::{Error, Result};
use crate::varint::{self, Uvarint};

/// Cap on the declared value count of a single run. Generous enough for
/// a whole page of levels in one run, small enough to bound decoder
/// allocations on corrupt input.
pub const MAX_RUN_VALUES: u64 = 16 * 1024 * 1024;

const GROUP: usize = 8;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `src` as a hybrid RLE/bit-packed stream at `bit_width` bits per
/// value (0..=32). Values must fit in `bit_width` bits. The output buffer
/// is cleared first.
pub fn encode_u32(dst: &mut Vec<u8>, src: &[u32], bit_width: u32) -> Result<()> {
    dst.clear();

    if bit_width > 32 {
        return Err(Error::InvalidBitWidth {
            op: "encode",
            typ: "INT32",
            bit_width,
        });
    }
    if bit_width == 0 {
        // Width 0 is the all-zeros stream: one run-length header, no body.
        if !src.iter().all(|&v| v == 0) {
            return Err(Error::InvalidBitWidth {
                op: "encode",
                typ: "INT32",
                bit_width,
            });
        }
        varint::encode_uvarint(dst, (src.len() as u64) << 1);
        return Ok(());
    }

    let groups = src.len() / GROUP;
    let mut i = 0;
    while i < groups {
        let first = src[i * GROUP];
        let mut j = i;
        while j < groups && is_broadcast_of(src, j, first) {
            j += 1;
        }

        if j > i {
            append_run_length_u32(dst, (GROUP * (j - i)) as u64, first, bit_width);
        } else {
            // Mixed group: extend the bit-packed run until the next
            // constant group.
            j = i + 1;
            while j < groups && !is_constant_group(src, j) {
                j += 1;
            }
            append_bit_packed_u32(dst, &src[i * GROUP..j * GROUP], bit_width);
        }

        i = j;
    }

    // Tail shorter than one group: one run-length run per maximal equal run.
    let mut i = groups * GROUP;
    while i < src.len() {
        let mut j = i + 1;
        while j < src.len() && src[j] == src[i] {
            j += 1;
        }
        append_run_length_u32(dst, (j - i) as u64, src[i], bit_width);
        i = j;
    }

    Ok(())
}

/// Encode a level stream (one byte per value, widths 0..=8).
pub fn encode_levels(dst: &mut Vec<u8>, src: &[u8], bit_width: u32) -> Result<()> {
    dst.clear();

    if bit_width > 8 {
        return Err(Error::InvalidBitWidth {
            op: "encode",
            typ: "LEVELS",
            bit_width,
        });
    }
    if bit_width == 0 {
        if !src.iter().all(|&v| v == 0) {
            return Err(Error::InvalidBitWidth {
                op: "encode",
                typ: "LEVELS",
                bit_width,
            });
        }
        varint::encode_uvarint(dst, (src.len() as u64) << 1);
        return Ok(());
    }

    let groups = src.len() / GROUP;
    let mut i = 0;
    while i < groups {
        let first = src[i * GROUP];
        let mut j = i;
        while j < groups && src[j * GROUP..(j + 1) * GROUP].iter().all(|&v| v == first) {
            j += 1;
        }

        if j > i {
            append_run_length_byte(dst, (GROUP * (j - i)) as u64, first);
        } else {
            j = i + 1;
            while j < groups && !is_constant_byte_group(src, j) {
                j += 1;
            }
            append_bit_packed_levels(dst, &src[i * GROUP..j * GROUP], bit_width);
        }

        i = j;
    }

    let mut i = groups * GROUP;
    while i < src.len() {
        let mut j = i + 1;
        while j < src.len() && src[j] == src[i] {
            j += 1;
        }
        append_run_length_byte(dst, (j - i) as u64, src[i]);
        i = j;
    }

    Ok(())
}

/// Encode a boolean bitmap (8 booleans per byte, already packed). Each
/// input byte is one group of 8 values; bit-packed runs copy the bytes
/// through unchanged.
pub fn encode_bits(dst: &mut Vec<u8>, src: &[u8]) {
    dst.clear();
    encode_bits_into(dst, src);
}

/// Encode a boolean bitmap with the 4-byte little-endian length frame.
/// An empty input encodes to exactly the 4 zero bytes.
pub fn encode_boolean(dst: &mut Vec<u8>, src: &[u8]) {
    dst.clear();
    dst.extend_from_slice(&[0, 0, 0, 0]);
    if src.is_empty() {
        return;
    }
    encode_bits_into(dst, src);
    let body_len = (dst.len() - 4) as u32;
    dst[..4].copy_from_slice(&body_len.to_le_bytes());
}

fn encode_bits_into(dst: &mut Vec<u8>, src: &[u8]) {
    // Whole-bitmap fast path: empty, all zeros, or all ones collapse to a
    // single run-length run.
    if src.is_empty() || src.iter().all(|&b| b == 0x00) || src.iter().all(|&b| b == 0xFF) {
        varint::encode_uvarint(dst, (8 * src.len() as u64) << 1);
        if !src.is_empty() {
            dst.push(src[0]);
        }
        return;
    }

    let mut i = 0;
    while i < src.len() {
        let b = src[i];
        if b == 0x00 || b == 0xFF {
            let mut j = i + 1;
            while j < src.len() && src[j] == b {
                j += 1;
            }
            varint::encode_uvarint(dst, (8 * (j - i) as u64) << 1);
            dst.push(b);
            i = j;
        } else {
            let mut j = i + 1;
            while j < src.len() && src[j] != 0x00 && src[j] != 0xFF {
                j += 1;
            }
            varint::encode_uvarint(dst, (((j - i) as u64) << 1) | 1);
            dst.extend_from_slice(&src[i..j]);
            i = j;
        }
    }
}

fn is_constant_group(src: &[u32], g: usize) -> bool {
    let group = &src[g * GROUP..(g + 1) * GROUP];
    group[1..].iter().all(|&v| v == group[0])
}

fn is_broadcast_of(src: &[u32], g: usize, value: u32) -> bool {
    src[g * GROUP..(g + 1) * GROUP].iter().all(|&v| v == value)
}

fn is_constant_byte_group(src: &[u8], g: usize) -> bool {
    let group = &src[g * GROUP..(g + 1) * GROUP];
    group[1..].iter().all(|&v| v == group[0])
}

fn append_run_length_u32(dst: &mut Vec<u8>, count: u64, value: u32, bit_width: u32) {
    varint::encode_uvarint(dst, count << 1);
    let masked = if bit_width >= 32 {
        value
    } else {
        value & ((1u32 << bit_width) - 1)
    };
    let bytes = masked.to_le_bytes();
    dst.extend_from_slice(&bytes[..bitpack::byte_count(bit_width as u64)]);
}

fn append_run_length_byte(dst: &mut Vec<u8>, count: u64, value: u8) {
    varint::encode_uvarint(dst, count << 1);
    dst.push(value);
}

fn append_bit_packed_u32(dst: &mut Vec<u8>, values: &[u32], bit_width: u32) {
    let groups = values.len() / GROUP;
    varint::encode_uvarint(dst, ((groups as u64) << 1) | 1);
    let offset = dst.len();
    dst.resize(offset + groups * bit_width as usize, 0);
    bitpack::pack_u32(&mut dst[offset..], values, bit_width);
}

fn append_bit_packed_levels(dst: &mut Vec<u8>, values: &[u8], bit_width: u32) {
    let groups = values.len() / GROUP;
    varint::encode_uvarint(dst, ((groups as u64) << 1) | 1);
    let offset = dst.len();
    dst.resize(offset + groups * bit_width as usize, 0);
    bitpack::pack_u8(&mut dst[offset..], values, bit_width);
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct RunHeader {
    count: u64,
    bit_packed: bool,
    body_offset: usize,
}

fn read_run_header(src: &[u8], offset: usize, base: usize) -> Result<RunHeader> {
    match varint::decode_uvarint(&src[offset..]) {
        Uvarint::Value { value, len } => {
            let count = value >> 1;
            if count > MAX_RUN_VALUES {
                return Err(Error::CountTooLarge {
                    offset: base + offset,
                    count,
                    max: MAX_RUN_VALUES,
                });
            }
            Ok(RunHeader {
                count,
                bit_packed: value & 1 != 0,
                body_offset: offset + len,
            })
        }
        Uvarint::Truncated => Err(Error::TruncatedHeader {
            offset: base + offset,
        }),
        Uvarint::Overflow => Err(Error::HeaderOverflow {
            offset: base + offset,
        }),
    }
}

fn truncated_body(base: usize, offset: usize, needed: usize, remaining: usize) -> Error {
    Error::TruncatedBody {
        offset: base + offset,
        needed,
        remaining,
    }
}

/// Decode a hybrid RLE/bit-packed stream of values at `bit_width` bits
/// (0..=32). The output buffer is cleared first; on error it holds every
/// value that was validly decoded before the failure.
pub fn decode_u32(dst: &mut Vec<u32>, src: &[u8], bit_width: u32) -> Result<()> {
    dst.clear();

    if bit_width > 32 {
        return Err(Error::InvalidBitWidth {
            op: "decode",
            typ: "INT32",
            bit_width,
        });
    }

    let mut scratch: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < src.len() {
        let run = read_run_header(src, i, 0)?;
        i = run.body_offset;

        if run.bit_packed {
            // count is the number of groups of 8 values.
            let groups = run.count as usize;
            let length = groups * bit_width as usize;
            if length > src.len() - i {
                return Err(truncated_body(0, i, length, src.len() - i));
            }

            let offset = dst.len();
            dst.resize(offset + groups * GROUP, 0);
            let out = &mut dst[offset..];

            if src.len() - (i + length) >= bitpack::PADDING {
                bitpack::unpack_u32(out, &src[i..i + length + bitpack::PADDING], bit_width);
            } else {
                scratch.clear();
                scratch.extend_from_slice(&src[i..i + length]);
                scratch.resize(length + bitpack::PADDING, 0);
                bitpack::unpack_u32(out, &scratch, bit_width);
            }
            i += length;
        } else {
            let width_bytes = bitpack::byte_count(bit_width as u64);
            if width_bytes > src.len() - i {
                return Err(truncated_body(0, i, width_bytes, src.len() - i));
            }

            let mut le = [0u8; 4];
            le[..width_bytes].copy_from_slice(&src[i..i + width_bytes]);
            let value = u32::from_le_bytes(le);
            dst.resize(dst.len() + run.count as usize, value);
            i += width_bytes;
        }
    }

    Ok(())
}

/// Decode a level stream (one byte per value, widths 0..=8).
pub fn decode_levels(dst: &mut Vec<u8>, src: &[u8], bit_width: u32) -> Result<()> {
    dst.clear();

    if bit_width > 8 {
        return Err(Error::InvalidBitWidth {
            op: "decode",
            typ: "LEVELS",
            bit_width,
        });
    }

    let mut scratch: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < src.len() {
        let run = read_run_header(src, i, 0)?;
        i = run.body_offset;

        if run.bit_packed {
            let groups = run.count as usize;
            let length = groups * bit_width as usize;
            if length > src.len() - i {
                return Err(truncated_body(0, i, length, src.len() - i));
            }

            let offset = dst.len();
            dst.resize(offset + groups * GROUP, 0);
            let out = &mut dst[offset..];

            if src.len() - (i + length) >= bitpack::PADDING {
                bitpack::unpack_u8(out, &src[i..i + length + bitpack::PADDING], bit_width);
            } else {
                scratch.clear();
                scratch.extend_from_slice(&src[i..i + length]);
                scratch.resize(length + bitpack::PADDING, 0);
                bitpack::unpack_u8(out, &scratch, bit_width);
            }
            i += length;
        } else {
            let width_bytes = bitpack::byte_count(bit_width as u64);
            if width_bytes > src.len() - i {
                return Err(truncated_body(0, i, width_bytes, src.len() - i));
            }

            let value = if width_bytes > 0 { src[i] } else { 0 };
            dst.resize(dst.len() + run.count as usize, value);
            i += width_bytes;
        }
    }

    Ok(())
}

/// Decode a boolean bitmap stream into packed bytes (8 booleans per
/// output byte).
pub fn decode_bits(dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
    dst.clear();
    decode_bits_at(dst, src, 0)
}

/// Decode a length-framed boolean page. A 4-byte input is the empty page.
pub fn decode_boolean(dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
    dst.clear();

    if src.len() < 4 {
        return Err(Error::TruncatedBody {
            offset: 0,
            needed: 4,
            remaining: src.len(),
        });
    }
    if src.len() == 4 {
        return Ok(());
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&src[..4]);
    let body_len = u32::from_le_bytes(len_bytes) as usize;
    let body = &src[4..];
    if body_len > body.len() {
        return Err(Error::TruncatedBody {
            offset: 4,
            needed: body_len,
            remaining: body.len(),
        });
    }

    decode_bits_at(dst, &body[..body_len], 4)
}

fn decode_bits_at(dst: &mut Vec<u8>, src: &[u8], base: usize) -> Result<()> {
    let mut i = 0;
    while i < src.len() {
        let run = read_run_header(src, i, base)?;
        i = run.body_offset;

        if run.bit_packed {
            // count groups of 8 booleans = count bytes, copied verbatim.
            let length = run.count as usize;
            if length > src.len() - i {
                return Err(truncated_body(base, i, length, src.len() - i));
            }
            dst.extend_from_slice(&src[i..i + length]);
            i += length;
        } else {
            // count booleans broadcast from one value byte.
            if run.count == 0 {
                continue;
            }
            if i >= src.len() {
                return Err(truncated_body(base, i, 1, 0));
            }
            let value = src[i];
            i += 1;
            dst.resize(dst.len() + bitpack::byte_count(run.count), value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random values without pulling in `rand`.
    fn lcg(seed: u64) -> impl FnMut() -> u64 {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            state >> 11
        }
    }

    // -----------------------------------------------------------------
    // Wire-format scenarios
    // -----------------------------------------------------------------

    #[test]
    fn test_constant_group_encodes_as_single_rle_run() {
        let mut dst = Vec::new();
        encode_u32(&mut dst, &[0u32; 8], 1).unwrap();
        // header: count 8 << 1 = 0x10, then one value byte.
        assert_eq!(dst, vec![0x10, 0x00]);

        let mut decoded = Vec::new();
        decode_u32(&mut decoded, &dst, 1).unwrap();
        assert_eq!(decoded, vec![0u32; 8]);
    }

    #[test]
    fn test_alternating_bits_encode_as_one_bit_packed_run() {
        let values: Vec<u32> = (0..16).map(|i| (i + 1) % 2).collect();
        let mut dst = Vec::new();
        encode_u32(&mut dst, &values, 1).unwrap();
        // header: (2 groups << 1) | 1 = 0x05, payload 0x55 0x55.
        assert_eq!(dst, vec![0x05, 0x55, 0x55]);

        let mut decoded = Vec::new();
        decode_u32(&mut decoded, &dst, 1).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_boolean_page_all_true() {
        let bitmap = vec![0xFFu8; 128]; // 1024 booleans
        let mut dst = Vec::new();
        encode_boolean(&mut dst, &bitmap);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&dst[..4]);
        assert_eq!(u32::from_le_bytes(len_bytes) as usize, dst.len() - 4);

        // Body: one run-length run with count 1024 and value byte 0xFF.
        let body = &dst[4..];
        match varint::decode_uvarint(body) {
            Uvarint::Value { value, len } => {
                assert_eq!(value, 1024 << 1);
                assert_eq!(&body[len..], &[0xFF]);
            }
            other => panic!("bad header: {:?}", other),
        }

        let mut decoded = Vec::new();
        decode_boolean(&mut decoded, &dst).unwrap();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn test_count_above_cap_is_rejected_before_any_output() {
        let mut page = Vec::new();
        varint::encode_uvarint(&mut page, (17 * 1024 * 1024u64) << 1);
        page.extend_from_slice(&[0xFF; 64]);

        let mut dst = Vec::new();
        let err = decode_levels(&mut dst, &page, 8).unwrap_err();
        assert!(matches!(err, Error::CountTooLarge { count, .. } if count == 17 * 1024 * 1024));
        assert!(dst.is_empty());
    }

    // -----------------------------------------------------------------
    // Round-trips
    // -----------------------------------------------------------------

    #[test]
    fn test_roundtrip_all_widths() {
        let mut next = lcg(7);
        for bit_width in 0..=32u32 {
            let mask = if bit_width == 0 {
                0
            } else if bit_width == 32 {
                u32::MAX
            } else {
                (1u32 << bit_width) - 1
            };

            for len in [0usize, 1, 7, 8, 9, 64, 100, 1000] {
                let values: Vec<u32> = (0..len).map(|_| next() as u32 & mask).collect();

                let mut encoded = Vec::new();
                encode_u32(&mut encoded, &values, bit_width).unwrap();
                let mut decoded = Vec::new();
                decode_u32(&mut decoded, &encoded, bit_width).unwrap();
                assert_eq!(decoded, values, "width {} len {}", bit_width, len);
            }
        }
    }

    #[test]
    fn test_roundtrip_levels_all_widths() {
        let mut next = lcg(13);
        for bit_width in 0..=8u32 {
            let mask = if bit_width == 0 {
                0
            } else {
                ((1u32 << bit_width) - 1) as u8
            };

            for len in [0usize, 3, 8, 17, 256, 999] {
                let values: Vec<u8> = (0..len).map(|_| next() as u8 & mask).collect();

                let mut encoded = Vec::new();
                encode_levels(&mut encoded, &values, bit_width).unwrap();
                let mut decoded = Vec::new();
                decode_levels(&mut decoded, &encoded, bit_width).unwrap();
                assert_eq!(decoded, values, "width {} len {}", bit_width, len);
            }
        }
    }

    #[test]
    fn test_roundtrip_boolean_bitmaps() {
        let mut next = lcg(29);
        for len in [0usize, 1, 2, 16, 127, 128, 500] {
            let bitmap: Vec<u8> = (0..len).map(|_| next() as u8).collect();

            let mut encoded = Vec::new();
            encode_boolean(&mut encoded, &bitmap);
            let mut decoded = Vec::new();
            decode_boolean(&mut decoded, &encoded).unwrap();
            assert_eq!(decoded, bitmap, "len {}", len);
        }
    }

    #[test]
    fn test_roundtrip_runs_and_tails() {
        // Constant prefix, mixed middle, constant suffix, ragged tail.
        let mut values = vec![5u32; 40];
        values.extend([1, 9, 2, 8, 3, 7, 4, 6]);
        values.extend(vec![0u32; 24]);
        values.extend([11, 11, 11, 12, 13]); // 5-value tail

        let mut encoded = Vec::new();
        encode_u32(&mut encoded, &values, 4).unwrap();
        let mut decoded = Vec::new();
        decode_u32(&mut decoded, &encoded, 4).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_empty_input_roundtrips() {
        let mut encoded = Vec::new();
        encode_u32(&mut encoded, &[], 5).unwrap();
        assert!(encoded.is_empty());

        let mut decoded = vec![1u32];
        decode_u32(&mut decoded, &encoded, 5).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_idempotent_encoding() {
        let values: Vec<u32> = (0..100).map(|i| i % 17).collect();
        let mut first = Vec::new();
        encode_u32(&mut first, &values, 5).unwrap();
        let mut second = Vec::new();
        encode_u32(&mut second, &values, 5).unwrap();
        assert_eq!(first, second);
    }

    // -----------------------------------------------------------------
    // Width 0 and invalid widths
    // -----------------------------------------------------------------

    #[test]
    fn test_width_zero_all_zeros() {
        let values = vec![0u32; 100];
        let mut encoded = Vec::new();
        encode_u32(&mut encoded, &values, 0).unwrap();
        // Single run-length header, no value bytes.
        match varint::decode_uvarint(&encoded) {
            Uvarint::Value { value, len } => {
                assert_eq!(value, 100 << 1);
                assert_eq!(len, encoded.len());
            }
            other => panic!("bad header: {:?}", other),
        }

        let mut decoded = Vec::new();
        decode_u32(&mut decoded, &encoded, 0).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_width_zero_rejects_nonzero_values() {
        let mut encoded = Vec::new();
        let err = encode_u32(&mut encoded, &[0, 0, 1], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidBitWidth { bit_width: 0, .. }));
    }

    #[test]
    fn test_invalid_widths_rejected() {
        let mut buf = Vec::new();
        assert!(matches!(
            encode_u32(&mut buf, &[1], 33),
            Err(Error::InvalidBitWidth { bit_width: 33, .. })
        ));
        assert!(matches!(
            encode_levels(&mut buf, &[1], 9),
            Err(Error::InvalidBitWidth { bit_width: 9, .. })
        ));

        let mut out = Vec::new();
        assert!(matches!(
            decode_u32(&mut out, &[0x10, 0x00], 40),
            Err(Error::InvalidBitWidth { bit_width: 40, .. })
        ));
    }

    // -----------------------------------------------------------------
    // RLE preference and run structure
    // -----------------------------------------------------------------

    #[test]
    fn test_constant_input_is_one_tiny_rle_run() {
        for bit_width in [1u32, 7, 8, 20, 32] {
            let values = vec![1u32; 1024];
            let mut encoded = Vec::new();
            encode_u32(&mut encoded, &values, bit_width).unwrap();

            // One header + the value bytes, nothing else.
            let max_len = bitpack::byte_count(bit_width as u64) + 10;
            assert!(
                encoded.len() <= max_len,
                "width {}: {} bytes",
                bit_width,
                encoded.len()
            );
            match varint::decode_uvarint(&encoded) {
                Uvarint::Value { value, len } => {
                    assert_eq!(value, 1024 << 1);
                    assert_eq!(encoded.len() - len, bitpack::byte_count(bit_width as u64));
                }
                other => panic!("bad header: {:?}", other),
            }
        }
    }

    #[test]
    fn test_constant_group_ends_bit_packed_run() {
        // Two mixed groups, then a constant group: the bit-packed run
        // covers exactly the two mixed groups.
        let mut values: Vec<u32> = (0..16).map(|i| i % 5).collect();
        values.extend(vec![3u32; 8]);

        let mut encoded = Vec::new();
        encode_u32(&mut encoded, &values, 3).unwrap();

        match varint::decode_uvarint(&encoded) {
            Uvarint::Value { value, len } => {
                assert_eq!(value, (2 << 1) | 1, "first run is 2 bit-packed groups");
                let after_packed = len + 2 * 3; // 2 groups * 3 bytes
                match varint::decode_uvarint(&encoded[after_packed..]) {
                    Uvarint::Value { value, .. } => assert_eq!(value, 8 << 1),
                    other => panic!("bad second header: {:?}", other),
                }
            }
            other => panic!("bad first header: {:?}", other),
        }
    }

    // -----------------------------------------------------------------
    // Malformed input
    // -----------------------------------------------------------------

    #[test]
    fn test_truncated_header() {
        let mut dst = Vec::new();
        let err = decode_u32(&mut dst, &[0x80], 8).unwrap_err();
        assert_eq!(err, Error::TruncatedHeader { offset: 0 });
    }

    #[test]
    fn test_header_overflow() {
        let page = [0xFFu8; 11];
        let mut dst = Vec::new();
        let err = decode_u32(&mut dst, &page, 8).unwrap_err();
        assert_eq!(err, Error::HeaderOverflow { offset: 0 });
    }

    #[test]
    fn test_truncated_rle_body_keeps_earlier_runs() {
        // A valid 8-value run followed by a header whose value byte is
        // missing.
        let mut page = Vec::new();
        varint::encode_uvarint(&mut page, 8 << 1);
        page.push(0x2A);
        varint::encode_uvarint(&mut page, 4 << 1);
        // missing value byte

        let mut dst = Vec::new();
        let err = decode_u32(&mut dst, &page, 8).unwrap_err();
        assert!(matches!(err, Error::TruncatedBody { needed: 1, .. }));
        assert_eq!(dst, vec![0x2A; 8]);
    }

    #[test]
    fn test_truncated_bit_packed_body() {
        let mut page = Vec::new();
        varint::encode_uvarint(&mut page, (2 << 1) | 1);
        page.push(0xAB); // needs 2 * 8 = 16 bytes at width 8

        let mut dst = Vec::new();
        let err = decode_u32(&mut dst, &page, 8).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedBody {
                needed: 16,
                remaining: 1,
                ..
            }
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_boolean_frame_truncated_suffix() {
        let bitmap = vec![0xA5u8; 32];
        let mut encoded = Vec::new();
        encode_boolean(&mut encoded, &bitmap);

        let truncated = &encoded[..encoded.len() - 1];
        let mut dst = Vec::new();
        let err = decode_boolean(&mut dst, truncated).unwrap_err();
        assert!(matches!(err, Error::TruncatedBody { .. }));
    }

    #[test]
    fn test_boolean_empty_page_is_four_zero_bytes() {
        let mut encoded = Vec::new();
        encode_boolean(&mut encoded, &[]);
        assert_eq!(encoded, vec![0, 0, 0, 0]);

        let mut decoded = vec![1u8];
        decode_boolean(&mut decoded, &encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_boolean_shorter_than_frame() {
        let mut dst = Vec::new();
        let err = decode_boolean(&mut dst, &[0, 0]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedBody {
                needed: 4,
                remaining: 2,
                ..
            }
        ));
    }
}
