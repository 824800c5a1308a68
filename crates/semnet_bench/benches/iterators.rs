//! Pattern iterator benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semnet_bench::{build_fan, build_random_graph};
use semnet_core::{Config, ElementType, Memory};

fn memory() -> Memory {
    Memory::open_in_memory_with_config(Config::new().segment_size(8192).event_threads(1)).unwrap()
}

/// Walk every outgoing arc of a hub (`f_a_a`).
fn bench_outgoing_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter3_outgoing");
    for fan_out in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(fan_out as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fan_out), &fan_out, |b, &fan_out| {
            let memory = memory();
            let (hub, _) = build_fan(&memory, fan_out);
            b.iter(|| {
                let count = memory
                    .iter3(hub, ElementType::PERM_POS_ARC, ElementType::NODE)
                    .unwrap()
                    .into_triples()
                    .count();
                black_box(count)
            });
        });
    }
    group.finish();
}

/// Check one edge between two fixed ends (`f_a_f`).
fn bench_fixed_ends(c: &mut Criterion) {
    let memory = memory();
    let (hub, members) = build_fan(&memory, 1000);
    let target = members[members.len() / 2];
    c.bench_function("iter3_fixed_ends", |b| {
        b.iter(|| {
            let mut iter = memory
                .iter3(hub, ElementType::PERM_POS_ARC, black_box(target))
                .unwrap();
            black_box(iter.next())
        });
    });
}

/// Attributed arcs out of random nodes (`f_a_a_a_a`).
fn bench_quintuple(c: &mut Criterion) {
    let memory = memory();
    let nodes = build_random_graph(&memory, 1000, 4000);
    c.bench_function("iter5_attributed", |b| {
        let mut i = 0;
        b.iter(|| {
            let source = nodes[i % nodes.len()];
            i += 1;
            let count = memory
                .iter5(
                    source,
                    ElementType::PERM_POS_ARC,
                    ElementType::NODE,
                    ElementType::PERM_POS_ARC,
                    ElementType::NODE,
                )
                .unwrap()
                .into_quintuples()
                .count();
            black_box(count)
        });
    });
}

/// Full scan (`a_a_a`), the slow path.
fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter3_scan");
    for nodes in [100usize, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, &nodes| {
            let memory = memory();
            build_random_graph(&memory, nodes, nodes * 4);
            b.iter(|| {
                let count = memory
                    .iter3(ElementType::EMPTY, ElementType::PERM_POS_ARC, ElementType::EMPTY)
                    .unwrap()
                    .into_triples()
                    .count();
                black_box(count)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_outgoing_walk,
    bench_fixed_ends,
    bench_quintuple,
    bench_full_scan,
);
criterion_main!(benches);
