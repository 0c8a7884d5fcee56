//! Decode, encode and schema loading benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rxlog_bench::{SCHEMA, bestpos, codec, encoded, satvis};
use rxlog_codec::Format;
use rxlog_core::crc32;
use rxlog_schema::MessageDatabase;
use std::hint::black_box;

fn bench_name(format: Format) -> &'static str {
    match format {
        Format::Binary => "Binary",
        Format::FlattenedBinary => "FlattenedBinary",
        Format::Ascii => "Ascii",
        Format::AbbreviatedAscii => "AbbrevAscii",
        Format::Json => "Json",
    }
}

fn benchmark_decode(c: &mut Criterion) {
    let codec = codec();
    let msg = bestpos();
    let mut group = c.benchmark_group("Decode");

    for format in Format::ALL {
        let input = encoded(&codec, &msg, format);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_function(bench_name(format), |b| {
            b.iter(|| codec.decode(black_box(&input), format).unwrap())
        });
    }

    group.finish();
}

fn benchmark_encode(c: &mut Criterion) {
    let codec = codec();
    let msg = bestpos();
    let mut group = c.benchmark_group("Encode");

    for format in Format::ALL {
        let mut out = bytes::BytesMut::with_capacity(1024);
        group.bench_function(bench_name(format), |b| {
            b.iter(|| {
                out.clear();
                codec.encode_into(black_box(&msg), format, &mut out).unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_field_arrays(c: &mut Criterion) {
    let codec = codec();
    let mut group = c.benchmark_group("DecodeFieldArray");

    for count in [4usize, 16, 64] {
        let msg = satvis(count);
        for format in [Format::Binary, Format::Ascii, Format::Json] {
            let input = encoded(&codec, &msg, format);
            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(BenchmarkId::new(bench_name(format), count), &input, |b, input| {
                b.iter(|| codec.decode(black_box(input), format).unwrap())
            });
        }
    }

    group.finish();
}

fn benchmark_load_json(c: &mut Criterion) {
    c.bench_function("LoadJson", |b| {
        b.iter(|| MessageDatabase::from_json(black_box(SCHEMA)).unwrap())
    });
}

fn benchmark_crc32(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");

    for size in [64usize, 1024, 65_536] {
        let data: Vec<u8> = (0..size).map(|i| (i * 31) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| crc32(black_box(data)))
        });
    }

    group.finish();
}

fn benchmark_sniff(c: &mut Criterion) {
    let codec = codec();
    let msg = bestpos();
    let inputs: Vec<Vec<u8>> = [Format::Binary, Format::Ascii, Format::AbbreviatedAscii, Format::Json]
        .into_iter()
        .map(|format| encoded(&codec, &msg, format))
        .collect();

    c.bench_function("Sniff", |b| {
        b.iter(|| {
            for input in &inputs {
                black_box(Format::sniff(black_box(input)).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_decode,
    benchmark_encode,
    benchmark_field_arrays,
    benchmark_load_json,
    benchmark_crc32,
    benchmark_sniff,
);
criterion_main!(benches);
