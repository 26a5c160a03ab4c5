//! Benchmarks for ring buffers.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use crossio_ring::{PortableRing, RingBuffer};
use std::{hint::black_box, time::Duration};

#[cfg(unix)]
use crossio_ring::MirrorRing;

const CAPACITY: usize = 1024 * 1024;
const BATCH_SIZE: usize = 10240;

criterion_main!(benches);
criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(15));
    targets = portable_bench, mirror_bench,
);

fn portable_bench(c: &mut Criterion) {
    run_bench(c, PortableRing::with_capacity(CAPACITY), "Portable");
}

#[cfg(unix)]
fn mirror_bench(c: &mut Criterion) {
    run_bench(c, MirrorRing::with_capacity(CAPACITY), "Mirror");
}

#[cfg(not(unix))]
fn mirror_bench(_: &mut Criterion) {}

fn run_bench<R: RingBuffer>(c: &mut Criterion, mut ring: R, name: &str) {
    let batch = vec![42u8; BATCH_SIZE];
    let mut dst = vec![0u8; BATCH_SIZE];

    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::BytesDecimal(BATCH_SIZE as _));

    group.bench_function("copy", |bencher| {
        bencher.iter(|| {
            ring.write(black_box(&batch));
            ring.read(black_box(&mut dst));
        })
    });

    group.bench_function("direct", |bencher| {
        bencher.iter(|| {
            ring.direct_write(BATCH_SIZE, |mut window| window.copy_from(&batch));
            ring.direct_read(BATCH_SIZE, |window| {
                black_box(window.iter().map(|fragment| fragment.len()).sum::<usize>())
            });
        })
    });

    group.finish();
}
