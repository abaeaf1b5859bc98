use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use rekv::{record, Listener, Record, Store, StoreContext, Value};

fn make_store(keys: usize, listeners_per_key: usize) -> Store {
    let initial: Record = (0..keys).map(|i| (format!("k{i}"), Value::Int(0))).collect();
    let store = Store::builder(initial)
        .context(StoreContext::new())
        .build()
        .unwrap();
    for i in 0..keys {
        for _ in 0..listeners_per_key {
            store.subscribe(&format!("k{i}"), &Listener::new(|v| {
                black_box(v);
            }));
        }
    }
    store
}

fn bench_single_key_update(c: &mut Criterion) {
    let store = make_store(64, 8);
    let mut n = 0i64;
    c.bench_function("set_state/single_key_8_listeners", |b| {
        b.iter(|| {
            n += 1;
            store.set_state(record! { "k0" => n }).unwrap();
        });
    });
}

fn bench_unchanged_update(c: &mut Criterion) {
    let store = make_store(64, 8);
    c.bench_function("set_state/unchanged", |b| {
        b.iter(|| store.set_state(record! { "k0" => 0, "k1" => 0 }).unwrap());
    });
}

fn bench_wide_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_state/wide");
    for keys in [16usize, 256] {
        group.throughput(Throughput::Elements(keys as u64));
        group.bench_function(format!("{keys}_keys"), |b| {
            let store = make_store(keys, 2);
            let mut n = 0i64;
            b.iter_batched(
                || {
                    n += 1;
                    (0..keys).map(|i| (format!("k{i}"), Value::Int(n))).collect::<Record>()
                },
                |patch| store.set_state(patch).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_shared_listener_dedup(c: &mut Criterion) {
    let store = make_store(0, 0);
    let shared = Listener::new(|v| {
        black_box(v);
    });
    for i in 0..128 {
        store.subscribe(&format!("k{i}"), &shared);
    }
    let mut n = 0i64;
    c.bench_function("set_state/shared_listener_128_keys", |b| {
        b.iter(|| {
            n += 1;
            let patch: Record = (0..128).map(|i| (format!("k{i}"), Value::Int(n))).collect();
            store.set_state(patch).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_single_key_update,
    bench_unchanged_update,
    bench_wide_update,
    bench_shared_listener_dedup
);
criterion_main!(benches);
