//! Range decompression benchmarks.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rxlog_bench::{bit_packed_block, observations, range_block, satellite_signal_block};
use rxlog_codec::{BatchSize, RangeCompressor, RangeDecompressor, ReferenceStore};
use rxlog_schema::CompressionScheme;
use std::hint::black_box;

const RECORDS: usize = 96;

fn decompress(block: &[u8], scheme: CompressionScheme, batch: BatchSize, out: &mut Vec<rxlog_codec::RangeObservation>) {
    out.clear();
    let mut decompressor = RangeDecompressor::new(block, scheme, 1.0);
    while decompressor.decompress_batch(batch, out).unwrap() > 0 {}
}

fn benchmark_range_record(c: &mut Criterion) {
    let block = range_block(RECORDS);
    let mut out = Vec::with_capacity(RECORDS);
    let mut group = c.benchmark_group("RangeRecord");
    group.throughput(Throughput::Elements(RECORDS as u64));

    for (name, batch) in [
        ("DecompressRangeCmp", BatchSize::One),
        ("DecompressRangeCmp2", BatchSize::Two),
        ("DecompressRangeCmp4", BatchSize::Four),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| decompress(black_box(&block), CompressionScheme::RangeRecord, batch, &mut out))
        });
    }

    group.finish();
}

fn benchmark_satellite_signal(c: &mut Criterion) {
    let block = satellite_signal_block(24, 4);
    let mut out = Vec::with_capacity(96);
    let mut group = c.benchmark_group("SatelliteSignal");
    group.throughput(Throughput::Elements(96));

    for (name, batch) in [
        ("DecompressRangeCmp", BatchSize::One),
        ("DecompressRangeCmp2", BatchSize::Two),
        ("DecompressRangeCmp4", BatchSize::Four),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| decompress(black_box(&block), CompressionScheme::SatelliteSignal, batch, &mut out))
        });
    }

    group.finish();
}

fn benchmark_bit_packed(c: &mut Criterion) {
    let block = bit_packed_block(24, 4);
    let mut out = Vec::with_capacity(96);
    let mut group = c.benchmark_group("BitPacked");
    group.throughput(Throughput::Elements(96));

    group.bench_function("DecompressRangeCmp4", |b| {
        b.iter(|| decompress(black_box(&block), CompressionScheme::BitPacked, BatchSize::Four, &mut out))
    });
    group.bench_function("DecompressRangeCmp4WithReferences", |b| {
        let mut store = ReferenceStore::new();
        b.iter(|| {
            out.clear();
            let mut decompressor = RangeDecompressor::new(black_box(&block), CompressionScheme::BitPacked, 1.0)
                .with_references(&mut store, 329_760_000);
            while decompressor.decompress_batch(BatchSize::Four, &mut out).unwrap() > 0 {}
        })
    });

    group.finish();
}

fn benchmark_compress(c: &mut Criterion) {
    let obs = observations(RECORDS);

    c.bench_function("CompressRangeRecord", |b| {
        b.iter(|| {
            let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
            for o in black_box(&obs) {
                compressor.push_record(o).unwrap();
            }
            compressor.finish()
        })
    });
}

criterion_group!(
    benches,
    benchmark_range_record,
    benchmark_satellite_signal,
    benchmark_bit_packed,
    benchmark_compress,
);
criterion_main!(benches);
