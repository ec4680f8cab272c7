use super::{
    context::Context,
    errors::JobError,
    middleware::panic_message,
};
use std::{
    fmt,
    future::Future,
    sync::Arc,
};
use futures::{future::BoxFuture, FutureExt};

pub type JobResult = Result<(), JobError>;

type JobFn = dyn Fn(Context) -> BoxFuture<'static, JobResult> + Send + Sync;

/// Единица работы: функция из контекста в результат.
///
/// Задача может быть вызвана повторно (retry) и с любого потока пула,
/// поэтому внутри лежит `Fn`, а не `FnOnce`. Клонирование дешёвое.
#[derive(Clone)]
pub struct Job(Arc<JobFn>);

impl Job {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Job(Arc::new(move |ctx| f(ctx).boxed()))
    }

    /// Синхронная задача. Тело выполняется в блокирующем пуле tokio
    /// (`spawn_blocking`), потоки рантайма остаются свободными, и таймеры
    /// (`add_timeout`, `Context::done`) срабатывают, пока тело ещё работает.
    ///
    /// Паника в теле возвращается как `JobError::Panic`. Требует рантайм
    /// tokio в момент опроса future: воркеры пула его предоставляют.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(Context) -> JobResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Job::new(move |ctx: Context| {
            let f = f.clone();
            async move {
                let logger = ctx.logger().clone();
                let handle = tokio::task::spawn_blocking(move || logger.in_scope(|| (*f)(ctx)));
                match handle.await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(JobError::Panic(panic_message(&*e.into_panic()))),
                    Err(_) => Err(JobError::Canceled),
                }
            }
        })
    }

    #[inline]
    pub fn run(&self, ctx: Context) -> BoxFuture<'static, JobResult> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}
