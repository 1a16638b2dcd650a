//! Benchmark comparison: zincir vs dashmap vs a mutexed std HashMap.

use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SMALL_OPS: usize = 1_000;
const MEDIUM_OPS: usize = 10_000;

const THREAD_COUNTS: &[usize] = &[2, 4, 8];

fn bench_single_thread_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_insert");

    for &size in &[SMALL_OPS, MEDIUM_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("zincir", size), &size, |b, &size| {
            b.iter(|| {
                let map = zincir::HashMap::with_buckets(1024);
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", size), &size, |b, &size| {
            b.iter(|| {
                let map = dashmap::DashMap::new();
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });

        group.bench_with_input(BenchmarkId::new("std_mutex", size), &size, |b, &size| {
            b.iter(|| {
                let map = Mutex::new(StdHashMap::new());
                for i in 0..size {
                    map.lock().unwrap().insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_get");

    for &size in &[SMALL_OPS, MEDIUM_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("zincir", size), &size, |b, &size| {
            let map = zincir::HashMap::with_buckets(1024);
            for i in 0..size {
                map.insert(i, i * 2);
            }
            b.iter(|| {
                let mut sum = 0;
                for i in 0..size {
                    if let Some(v) = map.get(&black_box(i)) {
                        sum += v;
                    }
                }
                sum
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", size), &size, |b, &size| {
            let map = dashmap::DashMap::new();
            for i in 0..size {
                map.insert(i, i * 2);
            }
            b.iter(|| {
                let mut sum = 0;
                for i in 0..size {
                    if let Some(v) = map.get(&black_box(i)) {
                        sum += *v;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

fn bench_multi_thread_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_thread_mixed");
    group.sample_size(10);

    for &threads in THREAD_COUNTS {
        let ops = MEDIUM_OPS / threads;
        group.throughput(Throughput::Elements((ops * threads) as u64));

        group.bench_with_input(
            BenchmarkId::new("zincir", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let map = Arc::new(zincir::HashMap::with_buckets(1024));
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = t * ops + i;
                                    map.insert(key, key);
                                    black_box(map.get(&key));
                                    if i % 4 == 0 {
                                        map.remove(&key);
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("dashmap", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let map = Arc::new(dashmap::DashMap::new());
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = t * ops + i;
                                    map.insert(key, key);
                                    black_box(map.get(&key).map(|v| *v));
                                    if i % 4 == 0 {
                                        map.remove(&key);
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_insert,
    bench_single_thread_get,
    bench_multi_thread_mixed
);
criterion_main!(benches);
