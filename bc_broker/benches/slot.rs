// ABOUTME: Benchmark for the Latest-Frame Slot publish/snapshot path
// ABOUTME: Measures throughput of the producer-copy and viewer-copy operations
use bc_broker::LatestFrameSlot;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn slot_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let frame = vec![0xAAu8; 180 * 1024];

    c.bench_function("slot_publish_and_snapshot", |b| {
        b.iter(|| {
            rt.block_on(async {
                let slot = LatestFrameSlot::new(200 * 1024);
                slot.publish(&frame).await.unwrap();
                let _ = slot.snapshot().await;
            })
        })
    });
}

criterion_group!(benches, slot_benchmark);
criterion_main!(benches);
