use workerpool::{
    add_post_run, add_retry, add_timeout,
    retry::{Backoff, Limit, RetryStrategy},
    telemetry, Config, Job, JobError, Logger, Pool,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

fn main() -> anyhow::Result<()> {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => telemetry::init_json(),
        _ => telemetry::init(),
    }

    let now = Instant::now();
    let pool = Pool::new(Config::cpu_bound().with_logger(Logger::current()));
    pool.start()?;

    pool.run(Job::new(|_ctx| async {
        tracing::info!("hello");
        Ok(())
    }))?;

    pool.run(Job::blocking(|_ctx| panic!("oops")))?;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let flaky = Job::new(move |_ctx| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n < 3 {
                return Err(JobError::msg(format!("attempt {n} failed")));
            }
            Ok(())
        }
    });
    let strategy = Limit(5).and(Backoff::exponential(Duration::from_millis(10), 2.0));
    pool.run(add_retry(flaky, strategy))?;

    let slow = Job::new(|ctx| async move {
        tokio::select! {
            _ = ctx.done() => Err(ctx.err().unwrap_or(JobError::Canceled)),
            _ = tokio::time::sleep(Duration::from_millis(200)) => Ok(()),
        }
    });
    let slow = add_post_run(add_timeout(slow, Duration::from_millis(100)), |result| {
        if let Err(err) = result {
            println!("slow job: {err}");
        }
    });
    pool.run(slow)?;

    pool.stop()?;
    println!("attempts: {}", attempts.load(Ordering::SeqCst));
    println!("elapsed: {:?}", now.elapsed());
    Ok(())
}
