//! Benchmark: write propagation through effects and computed values

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_core::{computed, effect, reactive, Object, Ref, Value};

fn bench_property_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_write");
    for subscribers in [1usize, 10, 100] {
        let state = reactive(Object::record_from([("n", 0)]))
            .into_reactive()
            .expect("record wraps");
        let runners: Vec<_> = (0..subscribers)
            .map(|_| {
                let s = state.clone();
                effect(move || s.get("n"))
            })
            .collect();

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            b.iter(|| {
                n += 1;
                black_box(state.set("n", n))
            });
        });
        drop(runners);
    }
    group.finish();
}

fn bench_computed_chain(c: &mut Criterion) {
    let source = Ref::new(0);
    let s = source.clone();
    let mut tail = computed(move || s.get());
    for _ in 0..50 {
        let prev = tail.clone();
        tail = computed(move || prev.get().as_f64().unwrap_or(0.0) + 1.0);
    }

    let mut n = 0u64;
    c.bench_function("computed_chain_50", |b| {
        b.iter(|| {
            n += 1;
            source.set(n);
            black_box(tail.get())
        });
    });
}

fn bench_array_push(c: &mut Criterion) {
    c.bench_function("array_push_1000", |b| {
        b.iter(|| {
            let list = reactive(Object::array(Vec::<Value>::new()))
                .into_reactive()
                .expect("array wraps");
            for i in 0..1000 {
                list.push([i]).expect("array target");
            }
            black_box(list.len())
        });
    });
}

criterion_group!(benches, bench_property_write, bench_computed_chain, bench_array_push);
criterion_main!(benches);
