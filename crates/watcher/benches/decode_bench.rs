//! Decoder throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use watcher::{decode, Action, BatchBuilder, RawChangeBatch};

fn build_batch(records: usize, renames: bool) -> RawChangeBatch {
    let mut builder = BatchBuilder::new();
    for i in 0..records {
        if renames && i % 2 == 0 {
            builder.push(Action::RenamedOld, &format!("src/module_{i}/old_name.rs"));
            builder.push(Action::RenamedNew, &format!("src/module_{i}/new_name.rs"));
        } else {
            builder.push(Action::Modified, &format!("src/module_{i}/file.rs"));
        }
    }
    builder.finish()
}

fn bench_decode(c: &mut Criterion) {
    let small = build_batch(16, false);
    let large = build_batch(2048, false);
    let mixed = build_batch(2048, true);

    c.bench_function("decode_small_batch", |b| {
        b.iter(|| decode(black_box(&small)).count());
    });

    c.bench_function("decode_large_batch", |b| {
        b.iter(|| decode(black_box(&large)).count());
    });

    c.bench_function("decode_rename_heavy_batch", |b| {
        b.iter(|| decode(black_box(&mixed)).count());
    });
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("encode_large_batch", |b| {
        b.iter(|| black_box(build_batch(2048, false)));
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
