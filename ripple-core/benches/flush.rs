//! Flush throughput benchmarks
//!
//! Measures how long it takes to invalidate a set of watchers and run them
//! through one batched flush.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{observe, ReactiveCell, Runtime, Value};

/// Many render watchers reading one shared cell.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_flush");

    for watchers in [10usize, 100, 1000] {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(0i64));
        let handles: Vec<_> = (0..watchers)
            .map(|_| {
                let source = cell.clone();
                runtime.effect(move || Ok(Value::from(source.get() as f64)))
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(watchers), &watchers, |b, _| {
            b.iter(|| {
                cell.update(|n| n + 1);
                black_box(runtime.run_ticks());
            })
        });

        drop(handles);
    }

    group.finish();
}

/// Repeated writes to an observed object coalesced into one flush.
fn bench_batched_writes(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = Value::from_json(serde_json::json!({ "a": 0, "b": 0 }));
    observe(&state, false);
    let object = state.as_object().cloned().unwrap_or_default();

    let reader = object.clone();
    let _render = runtime.effect(move || {
        let a = reader.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let b = reader.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(Value::from(a + b))
    });

    c.bench_function("batched_writes", |b| {
        let mut n = 0.0;
        b.iter(|| {
            for _ in 0..100 {
                n += 1.0;
                object.insert("a", Value::from(n));
                object.insert("b", Value::from(-n));
            }
            black_box(runtime.run_ticks());
        })
    });
}

criterion_group!(benches, bench_fan_out, bench_batched_writes);
criterion_main!(benches);
