//! Benchmarks for cached evaluation and scoped recomputation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use calcweaver_core::{Args, Runtime, TypeDef, Value};

/// A chain `c0 <- c1 <- ... <- c{n-1}` where each cell adds one to its
/// predecessor.
fn chain(n: usize) -> TypeDef {
    let mut builder = TypeDef::builder(format!("Chain{n}")).constant("c0", 0);
    for i in 1..n {
        let previous = format!("c{}", i - 1);
        let dependency = previous.clone();
        builder = builder.computed(format!("c{i}"), [dependency], move |ctx, _| {
            Ok(Value::from(ctx.get(&previous)?.as_int()? + 1))
        });
    }
    builder.build().expect("chain declares unique cells")
}

/// Repeated reads of a fully cached tail cell.
fn bench_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached");

    for n in [10, 100] {
        let runtime = Runtime::new();
        let object = runtime.instantiate(&chain(n)).unwrap();
        let tail = format!("c{}", n - 1);
        object.get(&tail).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(object.get(&tail).unwrap()));
        });
    }

    group.finish();
}

/// Tweak the head of the chain in a fresh scope and read the tail.
fn bench_scoped_tweak(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped_tweak");

    for n in [10, 100] {
        let runtime = Runtime::new();
        let object = runtime.instantiate(&chain(n)).unwrap();
        let tail = format!("c{}", n - 1);
        object.get(&tail).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _scope = runtime.enter_scope("bench");
                object.cell("c0").unwrap().tweak(1, &Args::none()).unwrap();
                black_box(object.get(&tail).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cached, bench_scoped_tweak);
criterion_main!(benches);
