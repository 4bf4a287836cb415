//! Throughput benchmarks for the storage engine, request parser and
//! command dispatch.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tidekv::commands::CommandHandler;
use tidekv::protocol::{Command, RequestParser};
use tidekv::replication::ReplicationState;
use tidekv::storage::StorageEngine;

fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(Bytes::from(format!("key:{}", i)), Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(
                Bytes::from(format!("ttl:{}", i)),
                Bytes::from("value"),
                Some(Duration::from_secs(3600)),
            );
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
            None,
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent_same_key(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_one_key", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        let value = Bytes::from(format!("writer:{}", t));
                        for _ in 0..10_000 {
                            engine.set(Bytes::from("hot"), value.clone(), None);
                            black_box(engine.get(b"hot"));
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let frame = b"*5\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n$2\r\nPX\r\n$4\r\n5000\r\n";

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("set_px_frame", |b| {
        let mut parser = RequestParser::new();
        b.iter(|| black_box(parser.parse(black_box(frame)).unwrap()));
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let handler = CommandHandler::new(
        Arc::new(StorageEngine::new()),
        Arc::new(ReplicationState::new()),
    );
    let set = Command::from_parts(vec![
        Bytes::from("SET"),
        Bytes::from("key"),
        Bytes::from("value"),
    ])
    .unwrap();
    let get = Command::from_parts(vec![Bytes::from("GET"), Bytes::from("key")]).unwrap();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(2));

    group.bench_function("set_then_get", |b| {
        b.iter(|| {
            black_box(handler.execute(&set));
            black_box(handler.execute(&get).serialize());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_concurrent_same_key,
    bench_parse,
    bench_dispatch,
);

criterion_main!(benches);
