//! Middleware: функции `Job -> Job`, добавляющие поведение вокруг задачи.
//!
//! Исходная задача не изменяется. Порядок композиции важен: например,
//! `add_retry(add_timeout(job, d), s)` даёт каждой попытке свой дедлайн, а
//! `add_timeout(add_retry(job, s), d)` ограничивает все попытки сразу.

use super::{
    context::Context,
    errors::JobError,
    job::{Job, JobResult},
    logger::Logger,
    retry::{Attempt, RetryStrategy},
};
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
};
use futures::FutureExt;
use tokio::time::Duration;
use tracing::{debug, error, info_span};

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Паника внутри задачи превращается в [`JobError::Panic`].
/// Обёрнутая задача сама никогда не паникует.
pub fn add_panic_recovery(job: Job) -> Job {
    Job::new(move |ctx| {
        let job = job.clone();
        // вызов job.run тоже внутри catch_unwind: паника может случиться до первого poll
        AssertUnwindSafe(async move { job.run(ctx).await })
            .catch_unwind()
            .map(|res| match res {
                Ok(result) => result,
                Err(payload) => Err(JobError::Panic(panic_message(&*payload))),
            })
    })
}

/// Подменяет логгер в контексте задачи и направляет в него все события,
/// выпущенные внутри задачи.
pub fn add_logger(job: Job, logger: Logger) -> Job {
    Job::new(move |ctx: Context| {
        let ctx = ctx.with_logger(logger.clone());
        logger.instrument(job.run(ctx))
    })
}

/// Повторяет задачу, пока она не завершится успешно или пока `strategy`
/// не откажет в очередной попытке. Итог — ошибка последней попытки.
///
/// Каждая попытка получает свой логгер с полем `attempt` и значение
/// [`Attempt`] в контексте.
pub fn add_retry<S>(job: Job, strategy: S) -> Job
where
    S: RetryStrategy + 'static,
{
    let strategy = Arc::new(strategy);
    Job::new(move |ctx: Context| {
        let job = job.clone();
        let strategy = strategy.clone();
        async move {
            let mut attempt: u32 = 1;
            loop {
                let logger = ctx.logger().scoped(|| info_span!("attempt", attempt));
                let attempt_ctx = ctx.with_value(Attempt(attempt));
                let err = match add_logger(job.clone(), logger.clone()).run(attempt_ctx).await {
                    Ok(()) => return Ok(()),
                    Err(err) => err,
                };

                let Some(delay) = strategy.next_delay(attempt, &err) else {
                    return Err(err);
                };
                logger.in_scope(|| debug!(error = %err, retry_in = ?delay, "Attempt failed"));

                if delay.is_zero() {
                    if ctx.is_done() {
                        return Err(err);
                    }
                } else {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = ctx.done() => return Err(err),
                    }
                }
                attempt = attempt.saturating_add(1);
            }
        }
    })
}

/// Ограничивает задачу дедлайном.
///
/// Задача запускается отдельной tokio-задачей с производным контекстом.
/// Если дедлайн наступает раньше, возвращается [`JobError::DeadlineExceeded`],
/// но сама задача не прерывается: она продолжает работать, пока не заметит
/// отмену контекста. Производный контекст отменяется при любом исходе.
pub fn add_timeout(job: Job, timeout: Duration) -> Job {
    Job::new(move |ctx: Context| {
        let job = job.clone();
        async move {
            let (ctx, _cancel) = ctx.with_timeout(timeout);
            let handle = tokio::spawn(ctx.logger().instrument(job.run(ctx.clone())));
            tokio::select! {
                biased;
                joined = handle => match joined {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        Err(JobError::Panic(panic_message(&*err.into_panic())))
                    }
                    Err(_) => Err(JobError::Canceled),
                },
                _ = ctx.done() => Err(ctx.err().unwrap_or(JobError::DeadlineExceeded)),
            }
        }
    })
}

/// Вызывает `hook` после каждого выполнения задачи с её итогом.
/// Паника в hook логируется и на итог задачи не влияет.
pub fn add_post_run<F>(job: Job, hook: F) -> Job
where
    F: Fn(&JobResult) + Send + Sync + 'static,
{
    let hook = Arc::new(hook);
    Job::new(move |ctx: Context| {
        let job = job.clone();
        let hook = hook.clone();
        let logger = ctx.logger().clone();
        async move {
            let result = job.run(ctx).await;
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| (*hook)(&result))) {
                let msg = panic_message(&*payload);
                logger.in_scope(|| error!(panic = %msg, "Post-run hook panicked"));
            }
            result
        }
    })
}

/// Задача всегда получает `ctx`, что бы ни передал пул или вызывающий.
pub fn add_context(job: Job, ctx: Context) -> Job {
    Job::new(move |_: Context| job.run(ctx.clone()))
}
