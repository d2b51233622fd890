#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tokio_util::sync::CancellationToken;
use tracevault_storage::{BytesReaderAt, ColumnarBlock};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a block file. Open must reject every malformed
    // input with an error, and a block that somehow opens must survive
    // row reads and key-chunk parses without panicking.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("build runtime");

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let reader = BytesReaderAt::new(Bytes::copy_from_slice(data));

        let Ok(block) = ColumnarBlock::open(reader, &cancel).await else {
            return;
        };

        for rg in 0..block.row_groups().len().min(4) {
            let _ = block.key_chunk(rg, &cancel).await;
        }
        let _ = block.read_row(0, &cancel).await;
        let _ = block.read_row(block.row_groups().total_rows().saturating_sub(1), &cancel).await;
    });
});
