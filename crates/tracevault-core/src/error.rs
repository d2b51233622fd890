//! Error Types for the Page Codec
//!
//! All codec entry points return `Result<T>` which is aliased to
//! `Result<T, Error>`, so errors propagate with `?`.
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - `InvalidBitWidth`: bit width outside the supported range for the
//!   declared stream type (e.g. width 9 for a level stream)
//! - `InvalidInputSize`: input length is not a multiple of the element
//!   size
//!
//! ### Parse Errors (malformed encoded pages)
//! - `TruncatedHeader`: input ended in the middle of a run header
//! - `HeaderOverflow`: a run header varint does not fit in 64 bits
//! - `CountTooLarge`: a run declares more values than the decoder is
//!   willing to allocate for
//! - `TruncatedBody`: input ended in the middle of a run body
//!
//! Parse errors carry the byte offset where they were detected. The
//! output buffer is left holding everything that was validly decoded
//! before the error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot {op} {typ} with invalid bit width {bit_width}")]
    InvalidBitWidth {
        op: &'static str,
        typ: &'static str,
        bit_width: u32,
    },

    #[error("cannot {op} {typ} from input of {len} bytes")]
    InvalidInputSize {
        op: &'static str,
        typ: &'static str,
        len: usize,
    },

    #[error("truncated run header at byte {offset}")]
    TruncatedHeader { offset: usize },

    #[error("run header overflows 64 bits at byte {offset}")]
    HeaderOverflow { offset: usize },

    #[error("run at byte {offset} declares {count} values, more than the {max} supported per run")]
    CountTooLarge { offset: usize, count: u64, max: u64 },

    #[error("run body at byte {offset} needs {needed} bytes but only {remaining} remain")]
    TruncatedBody {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}
