//! Benchmarks for archive packing throughput.
//!
//! Measures end-to-end `ArchiveWriter` sessions across worker counts,
//! compression levels and entry mixes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_truncation)]

use apkpack_core::ArchiveWriter;
use apkpack_core::PackConfig;
use apkpack_core::PathMatcher;
use apkpack_core::test_utils::ZipBuilder;
use apkpack_core::test_utils::elf64_with_load_alignments;
use apkpack_core::writer::worker_pool;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use std::hint::black_box;
use tempfile::TempDir;

/// Mildly compressible pseudo-random content.
fn content(seed: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(2_654_435_761).wrapping_add(seed * 97) >> 7) as u8 % 64)
        .collect()
}

fn entries(count: usize, len: usize) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("res/raw/file_{i:05}.bin"), content(i, len)))
        .collect()
}

fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_scaling");
    let data = entries(200, 16 * 1024);
    let total: usize = data.iter().map(|(_, d)| d.len()).sum();
    group.throughput(Throughput::Bytes(total as u64));

    for threads in [1, 2, 4, 8] {
        let pool = worker_pool(threads).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| {
                let temp = TempDir::new().unwrap();
                let dest = temp.path().join("bench.apk");
                let mut writer =
                    ArchiveWriter::open(&dest, PackConfig::default(), pool.clone()).unwrap();
                for (name, bytes) in &data {
                    writer.write_file(bytes.clone(), name).unwrap();
                }
                black_box(writer.close().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_compression_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_level");
    let data = entries(50, 64 * 1024);
    let pool = worker_pool(0).unwrap();

    for level in [0u8, 1, 6, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| {
                let temp = TempDir::new().unwrap();
                let dest = temp.path().join("bench.apk");
                let config = PackConfig::default().with_compression_level(level);
                let mut writer = ArchiveWriter::open(&dest, config, pool.clone()).unwrap();
                for (name, bytes) in &data {
                    writer.write_file(bytes.clone(), name).unwrap();
                }
                black_box(writer.close().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_page_aligned_libraries(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_aligned_libraries");
    let mut library = elf64_with_load_alignments(&[16384, 16384]);
    library.extend(content(7, 256 * 1024));
    let pool = worker_pool(0).unwrap();
    let config = PackConfig::default()
        .with_no_compress(PathMatcher::native_libraries())
        .with_page_align(PathMatcher::native_libraries());

    group.bench_function("abi_split", |b| {
        b.iter(|| {
            let temp = TempDir::new().unwrap();
            let dest = temp.path().join("bench.apk");
            let mut writer = ArchiveWriter::open(&dest, config.clone(), pool.clone()).unwrap();
            for abi in ["arm64-v8a", "armeabi-v7a", "x86", "x86_64"] {
                for lib in 0..8 {
                    let name = format!("lib/{abi}/libmod{lib}.so");
                    writer.write_file(library.clone(), &name).unwrap();
                }
            }
            black_box(writer.close().unwrap())
        });
    });
    group.finish();
}

fn bench_merge_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_archive");
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("resources.ap_");
    entries(500, 4 * 1024)
        .iter()
        .fold(ZipBuilder::new(), |b, (name, data)| b.deflated_file(name, data))
        .write_to(&source);
    let pool = worker_pool(0).unwrap();

    group.bench_function("copy_500_entries", |b| {
        b.iter(|| {
            let out = TempDir::new().unwrap();
            let dest = out.path().join("bench.apk");
            let mut writer = ArchiveWriter::open(&dest, PackConfig::default(), pool.clone()).unwrap();
            writer.copy_entries_from_archive(&source, None, None).unwrap();
            black_box(writer.close().unwrap())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_worker_scaling,
    bench_compression_levels,
    bench_page_aligned_libraries,
    bench_merge_archive
);
criterion_main!(benches);
