#![no_main]

use libfuzzer_sys::fuzz_target;
use tracevault_core::rle;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to every decoder entry point. Decoders must
    // never panic on malformed input:
    // - truncated or overlong run headers
    // - run counts above the allocation cap
    // - bit-packed bodies shorter than the header declares
    // - boolean frames whose length prefix lies
    if data.is_empty() {
        return;
    }
    let bit_width = (data[0] % 40) as u32; // widths past 32 must error, not panic
    let page = &data[1..];

    let mut ints = Vec::new();
    let _ = rle::decode_u32(&mut ints, page, bit_width);

    let mut levels = Vec::new();
    let _ = rle::decode_levels(&mut levels, page, bit_width % 9);

    let mut bits = Vec::new();
    let _ = rle::decode_bits(&mut bits, page);

    let mut booleans = Vec::new();
    let _ = rle::decode_boolean(&mut booleans, page);
});
