//! TraceVault Core
//!
//! This crate holds the pieces of TraceVault that are pure computation:
//! the page codec used by the columnar block format, and the core data
//! types that flow through the lookup path.
//!
//! ## What Lives Here
//!
//! 1. **Page codec** ([`rle`], [`bitpack`], [`varint`]): the hybrid
//!    RLE/bit-packed encoding used for dictionary index pages, level
//!    streams and boolean pages. Every read and write of a block goes
//!    through this code, so it is deliberately free of I/O, async, and
//!    shared state.
//! 2. **Core types** ([`trace`]): [`TraceId`] (the 16-byte identifier
//!    that blocks are sorted by, compared through its 32-character
//!    lowercase hex rendering) and [`Trace`] (the materialized row).
//!
//! ## Design Decisions
//!
//! - Codec functions are stateless: callers own the output buffers and
//!   the codec grows them as needed. There is no codec object to cache.
//! - Decoders never panic on malformed input. Every parse error carries
//!   the byte offset where it was detected so corruption reports point
//!   at the exact run.
//! - Encoders are deterministic: identical input yields byte-identical
//!   output.

pub mod bitpack;
pub mod error;
pub mod rle;
pub mod trace;
pub mod varint;

pub use error::{Error, Result};
pub use trace::{Trace, TraceId};
