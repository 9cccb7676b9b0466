//! Benchmarks for the proof codec and merkle aggregation

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use ots_core::make_merkle_tree;
use ots_types::{Attestation, DetachedTimestampFile, Op, Timestamp};

fn deep_stamp(depth: usize) -> DetachedTimestampFile {
    let mut detached = DetachedTimestampFile::from_digest(Op::Sha256, vec![7; 32]).unwrap();
    let mut node = &mut detached.timestamp;
    for i in 0..depth {
        node = node
            .add_op(Op::Append(vec![i as u8 + 1]))
            .unwrap()
            .add_op(Op::Sha256)
            .unwrap();
    }
    node.add_attestation(Attestation::Bitcoin { height: 358391 });
    detached
}

fn bench_codec(c: &mut Criterion) {
    let detached = deep_stamp(32);
    let bytes = detached.to_bytes().unwrap();

    c.bench_function("encode_deep_proof", |b| {
        b.iter(|| detached.to_bytes().unwrap())
    });

    c.bench_function("decode_deep_proof", |b| {
        b.iter(|| DetachedTimestampFile::from_bytes(&bytes).unwrap())
    });
}

fn bench_merkle(c: &mut Criterion) {
    c.bench_function("merkle_tree_100_stamps", |b| {
        b.iter_batched(
            || {
                (0..100u8)
                    .map(|i| Timestamp::new(vec![i; 32]).unwrap())
                    .collect::<Vec<_>>()
            },
            |mut stamps| make_merkle_tree(&mut stamps).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_codec, bench_merkle);
criterion_main!(benches);
