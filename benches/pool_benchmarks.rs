use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use workerpool::{
    add_panic_recovery, add_post_run, add_retry, add_timeout,
    retry::Limit,
    Config, Context, Job, Logger, Pool,
};
use std::{hint::black_box, time::Duration};

fn noop() -> Job {
    Job::new(|_ctx| async { Ok(()) })
}

// Benchmark 1: стоимость синхронной передачи задачи воркерам
fn bench_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff");

    for workers in [1, 4, num_cpus::get()] {
        let size = 1_000u64;
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            let pool = Pool::new(
                Config::default()
                    .with_workers(workers)
                    .with_logger(Logger::disabled()),
            );
            let _ = pool.start();
            let job = noop();

            b.iter(|| {
                for _ in 0..size {
                    let _ = black_box(pool.run(job.clone()));
                }
            });

            let _ = pool.stop();
        });
    }

    group.finish();
}

// Benchmark 2: накладные расходы middleware на один вызов
fn bench_middleware_overhead(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("middleware_overhead");

    let bare = noop();
    group.bench_function("bare", |b| {
        b.to_async(&rt).iter(|| bare.run(Context::background()))
    });

    let recovered = add_panic_recovery(noop());
    group.bench_function("panic_recovery", |b| {
        b.to_async(&rt).iter(|| recovered.run(Context::background()))
    });

    let stacked = add_post_run(
        add_retry(add_timeout(add_panic_recovery(noop()), Duration::from_secs(1)), Limit(3)),
        |result| {
            black_box(result.is_ok());
        },
    );
    group.bench_function("full_stack", |b| {
        b.to_async(&rt).iter(|| stacked.run(Context::background()))
    });

    group.finish();
}

criterion_group!(benches, bench_handoff, bench_middleware_overhead);
criterion_main!(benches);
