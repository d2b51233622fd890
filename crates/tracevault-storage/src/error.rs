//! Error Types for the Storage Layer
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`, so errors propagate with `?`.
//!
//! ## Error Categories
//!
//! ### Bloom Pre-Screen
//! - `BloomUnavailable`: the shard filter could not be fetched. This is
//!   surfaced, never treated as a miss - a false "not found" would hide
//!   data that exists.
//! - `BloomCorrupt`: the filter bytes did not parse.
//!
//! ### Columnar Block
//! - `ColumnarOpenFailed`: header/footer/index validation failed on open
//! - `InvalidBlock`: structural corruption found after open
//! - `RowReadFailed`: a row could not be located or fetched
//! - `SchemaMismatch`: row bytes do not frame as a trace row
//!
//! ### Control Flow
//! - `Cancelled`: the caller's cancellation token fired at a suspension
//!   point; the lookup unwinds without partial results

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(#[from] tracevault_core::Error),

    #[error("bloom filter unavailable for block {block_id} shard {shard}: {source}")]
    BloomUnavailable {
        block_id: String,
        shard: u32,
        #[source]
        source: object_store::Error,
    },

    #[error("corrupt bloom filter: {0}")]
    BloomCorrupt(String),

    #[error("cannot open columnar block: {0}")]
    ColumnarOpenFailed(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("failed to read row {row}: {reason}")]
    RowReadFailed { row: u64, reason: String },

    #[error("row does not frame as a trace: {0}")]
    SchemaMismatch(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("lookup cancelled")]
    Cancelled,
}

/// Turn a fired cancellation token into `Error::Cancelled`. Called
/// before every suspension point so a cancelled lookup unwinds instead
/// of issuing further object-store requests.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
