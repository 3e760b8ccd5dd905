use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::SystemTime;

use servhttp::{CacheEntry, CacheTable, CachedHandler, MemFs, Request};

fn memfs(size: usize, time: SystemTime) -> MemFs {
    let mut fsys = MemFs::new();
    for i in 0..size {
        let path = format!("dir{}/file{}.txt", i % 10, i);
        fsys = fsys.file(&path, "test content ".repeat(50).as_bytes(), time);
    }
    fsys
}

fn entry_encode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_encode");
    let time = SystemTime::now();

    for size in [100, 10_000, 1_000_000].iter() {
        let content = "Hello World ".repeat(size / 12 + 1).into_bytes();
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| CacheEntry::encode(black_box(content.clone()), "file.txt", false, time));
        });
    }

    group.finish();
}

fn table_rebuild_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_rebuild");
    let time = SystemTime::now();

    for size in [10, 100, 1000].iter() {
        let fsys = memfs(*size, time);
        group.bench_with_input(BenchmarkId::new("cold", size), &fsys, |b, fsys| {
            b.iter(|| CacheTable::rebuild(fsys, &CacheTable::default(), time).unwrap());
        });

        // 文件未变化时复用上一次的缓存项
        let previous = CacheTable::rebuild(&fsys, &CacheTable::default(), time).unwrap();
        group.bench_with_input(BenchmarkId::new("warm", size), &fsys, |b, fsys| {
            b.iter(|| CacheTable::rebuild(fsys, black_box(&previous), time).unwrap());
        });
    }

    group.finish();
}

fn cached_respond_benchmark(c: &mut Criterion) {
    let time = SystemTime::now();
    let table = CacheTable::rebuild(&memfs(1000, time), &CacheTable::default(), time).unwrap();
    let handler = CachedHandler::with_table("max-age=60", table);

    let hit = Request::try_from(
        b"GET /dir3/file503.txt HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, deflate\r\n\r\n",
        0,
    )
    .unwrap();
    let miss = Request::try_from(b"GET /nonexistent.txt HTTP/1.1\r\nHost: localhost\r\n\r\n", 0).unwrap();

    c.bench_function("cached_respond_hit", |b| {
        b.iter(|| handler.respond(black_box(&hit)));
    });
    c.bench_function("cached_respond_miss", |b| {
        b.iter(|| handler.respond(black_box(&miss)));
    });
}

criterion_group!(
    benches,
    entry_encode_benchmark,
    table_rebuild_benchmark,
    cached_respond_benchmark
);
criterion_main!(benches);
