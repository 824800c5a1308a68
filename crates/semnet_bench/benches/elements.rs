//! Element creation and commit benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semnet_bench::random_data;
use semnet_core::{Config, ContentStream, ElementType, Memory};

fn memory() -> Memory {
    Memory::open_in_memory_with_config(Config::new().segment_size(4096).event_threads(1)).unwrap()
}

/// One node per transaction.
fn bench_single_node(c: &mut Criterion) {
    let memory = memory();
    c.bench_function("node_new", |b| {
        b.iter(|| memory.node_new(black_box(ElementType::CONST_NODE)).unwrap());
    });
}

/// One arc per transaction between two fixed nodes. The arc lists of both
/// endpoints keep growing.
fn bench_single_arc(c: &mut Criterion) {
    let memory = memory();
    let a = memory.node_new(ElementType::CONST_NODE).unwrap();
    let b = memory.node_new(ElementType::CONST_NODE).unwrap();
    c.bench_function("arc_new", |bench| {
        bench.iter(|| {
            memory
                .arc_new(ElementType::CONST_PERM_POS_ARC, black_box(a), black_box(b))
                .unwrap()
        });
    });
}

/// Node-and-arc pairs staged in one transaction.
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");
    for batch in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let memory = memory();
            let hub = memory.node_new(ElementType::CONST_NODE_CLASS).unwrap();
            b.iter(|| {
                memory
                    .transaction(|txn| {
                        for _ in 0..batch {
                            let node = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                            memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, hub, node)?;
                        }
                        Ok(())
                    })
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Link content writes of growing size.
fn bench_link_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_link_content");
    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let memory = memory();
            let link = memory.link_new(ElementType::CONST_LINK).unwrap();
            let data = random_data(size);
            b.iter(|| {
                memory
                    .set_link_content(link, ContentStream::from_bytes(black_box(data.clone())))
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Create then erase, so slots cycle through the free list.
fn bench_erase_cycle(c: &mut Criterion) {
    let memory = memory();
    let hub = memory.node_new(ElementType::CONST_NODE_CLASS).unwrap();
    c.bench_function("create_erase_cycle", |b| {
        b.iter(|| {
            let node = memory.node_new(ElementType::CONST_NODE).unwrap();
            memory
                .arc_new(ElementType::CONST_PERM_POS_ARC, hub, node)
                .unwrap();
            black_box(memory.erase_element(node).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_single_node,
    bench_single_arc,
    bench_batch_commit,
    bench_link_content,
    bench_erase_cycle,
);
criterion_main!(benches);
