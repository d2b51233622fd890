//! Build a block in an in-memory object store and look a trace up.
//!
//! ```bash
//! cargo run -p tracevault-storage --example lookup_demo
//! ```

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracevault_core::{Trace, TraceId};
use tracevault_storage::{BackendBlock, BlockConfig, BlockWriter};

fn trace_n(n: u64) -> Trace {
    let mut id = [0u8; 16];
    id[8..].copy_from_slice(&n.to_be_bytes());
    Trace {
        trace_id: TraceId::new(id),
        start_time_unix_nano: 1_700_000_000_000_000_000 + n * 1_000,
        end_time_unix_nano: 1_700_000_000_000_000_000 + n * 1_000 + 250,
        duration_nanos: 250,
        root_service_name: format!("svc-{}", n % 8),
        root_span_name: "GET /api/v1/items".to_string(),
        spans: Bytes::from(format!("span-payload-{}", n)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracevault_storage=debug".into()),
        )
        .init();

    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    // Write a block of 10k traces sorted by id.
    let mut writer = BlockWriter::new("demo-block", BlockConfig::default())?;
    for n in 0..10_000 {
        writer.append(&trace_n(n))?;
    }
    let finished = writer.finish()?;
    finished.upload(store.as_ref()).await?;
    println!(
        "wrote block {} ({} rows, {} row groups, {} bytes)",
        finished.meta.block_id,
        finished.meta.total_rows,
        finished.meta.row_group_count,
        finished.meta.size_bytes
    );

    let block = BackendBlock::new(store, finished.meta);
    let cancel = CancellationToken::new();

    let wanted = trace_n(8_642).trace_id;
    match block.find_trace_by_id(wanted, &cancel).await? {
        Some(trace) => println!(
            "found {}: {} / {} ({} ns)",
            trace.trace_id, trace.root_service_name, trace.root_span_name, trace.duration_nanos
        ),
        None => println!("{} not in block", wanted),
    }

    let absent = TraceId::new([0xAB; 16]);
    match block.find_trace_by_id(absent, &cancel).await? {
        Some(_) => println!("unexpected hit for {}", absent),
        None => println!("{} not in block (as expected)", absent),
    }

    Ok(())
}
