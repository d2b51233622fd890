//! Page Reader for the Key Column
//!
//! A key page stores dictionary indices, RLE/bit-packed. `PageReader`
//! exposes the page the way the finder consumes it:
//!
//! - `bounds()` answers from the page directory without touching the
//!   payload, so a page whose min/max excludes the target id is pruned
//!   at zero decode cost. That pruning is where the lookup's sub-linear
//!   I/O comes from.
//! - `read()` decodes lazily on the first call and then streams the
//!   page's key values in order, in caller-sized batches. The reader is
//!   single-use and forward-only; there is no rewind.

use crate::error::{Error, Result};
use tracevault_core::rle;
use tracevault_core::trace::HexTraceId;

/// Forward-only reader over one key page's values.
pub struct PageReader<'a> {
    dict: &'a [HexTraceId],
    bit_width: u32,
    num_values: usize,
    min: &'a HexTraceId,
    max: &'a HexTraceId,
    payload: &'a [u8],

    /// Dictionary indices, decoded on first read
    decoded: Option<Vec<u32>>,
    pos: usize,
}

impl<'a> PageReader<'a> {
    pub(crate) fn new(
        dict: &'a [HexTraceId],
        bit_width: u32,
        num_values: usize,
        min: &'a HexTraceId,
        max: &'a HexTraceId,
        payload: &'a [u8],
    ) -> Self {
        Self {
            dict,
            bit_width,
            num_values,
            min,
            max,
            payload,
            decoded: None,
            pos: 0,
        }
    }

    /// Min and max key of the page, from statistics. Never decodes.
    pub fn bounds(&self) -> Option<(&HexTraceId, &HexTraceId)> {
        Some((self.min, self.max))
    }

    /// Total number of values in the page.
    pub fn num_values(&self) -> usize {
        self.num_values
    }

    /// Fill `out` with up to `out.len()` key values in page order.
    /// Returns the number of values written; 0 means the page is
    /// exhausted.
    pub fn read(&mut self, out: &mut [HexTraceId]) -> Result<usize> {
        if self.decoded.is_none() {
            self.decode()?;
        }
        let indices = self.decoded.as_ref().expect("decoded above");

        let n = out.len().min(self.num_values - self.pos);
        for (slot, &index) in out[..n].iter_mut().zip(&indices[self.pos..self.pos + n]) {
            *slot = self.dict[index as usize];
        }
        self.pos += n;
        Ok(n)
    }

    fn decode(&mut self) -> Result<()> {
        let mut indices = Vec::with_capacity(self.num_values);
        rle::decode_u32(&mut indices, self.payload, self.bit_width)?;

        if indices.len() != self.num_values {
            return Err(Error::InvalidBlock(format!(
                "key page decoded to {} values, directory declares {}",
                indices.len(),
                self.num_values
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= self.dict.len()) {
            return Err(Error::InvalidBlock(format!(
                "key page index {} is outside the {}-entry dictionary",
                bad,
                self.dict.len()
            )));
        }

        self.decoded = Some(indices);
        Ok(())
    }
}
