use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use siltdb::{Db, Options};
use tempfile::tempdir;

const N: u64 = 1_000;
const VAL_SIZE: usize = 100;

fn engine_put_no_flush(c: &mut Criterion) {
    c.bench_function("engine_put_1k_no_flush", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let db = Db::open_with(
                    dir.path(),
                    // threshold far above the workload, so nothing flushes
                    Options::default().mem_table_threshold(100_000_000),
                )
                .unwrap();
                (dir, db)
            },
            |(_dir, mut db)| {
                for i in 0..N {
                    let key = format!("k{}", i).into_bytes();
                    db.put(&key, &vec![b'x'; VAL_SIZE]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_put_with_flush(c: &mut Criterion) {
    c.bench_function("engine_put_1k_with_flush", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let db = Db::open_with(
                    dir.path(),
                    Options::default()
                        .mem_table_threshold(4096)
                        .sparse_key_distance(16),
                )
                .unwrap();
                (dir, db)
            },
            |(_dir, mut db)| {
                for i in 0..N {
                    let key = format!("k{}", i).into_bytes();
                    db.put(&key, &vec![b'x'; VAL_SIZE]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_get_from_memtable(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut db = Db::open_with(
        dir.path(),
        Options::default().mem_table_threshold(100_000_000),
    )
    .unwrap();
    for i in 0..N {
        let key = format!("k{}", i).into_bytes();
        db.put(&key, &vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_1k_memtable", |b| {
        b.iter(|| {
            for i in 0..N {
                let key = format!("k{}", i).into_bytes();
                assert!(db.get(&key).unwrap().is_some());
            }
        });
    });
}

fn engine_get_from_disk(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut db = Db::open_with(
        dir.path(),
        Options::default()
            .mem_table_threshold(4096)
            .sparse_key_distance(16),
    )
    .unwrap();
    for i in 0..N {
        let key = format!("k{}", i).into_bytes();
        db.put(&key, &vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_1k_disk", |b| {
        b.iter(|| {
            // early keys have long since been flushed out of the memtable
            for i in 0..100u64 {
                let key = format!("k{}", i).into_bytes();
                assert!(db.get(&key).unwrap().is_some());
            }
        });
    });
}

criterion_group!(
    benches,
    engine_put_no_flush,
    engine_put_with_flush,
    engine_get_from_memtable,
    engine_get_from_disk
);
criterion_main!(benches);
