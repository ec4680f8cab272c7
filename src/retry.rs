use super::errors::JobError;
use tokio::time::Duration;

/// Номер попытки (с единицы). Кладётся в контекст каждой попытки retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempt(pub u32);

/// Политика повторов.
///
/// `attempt` — сколько попыток уже сделано (начиная с 1), `err` — ошибка
/// последней из них. `None` означает, что повторов больше не будет,
/// `Some(delay)` — подождать `delay` и попробовать снова.
pub trait RetryStrategy: Send + Sync {
    fn next_delay(&self, attempt: u32, err: &JobError) -> Option<Duration>;

    /// Обе политики должны разрешить повтор; ждём дольшую из задержек.
    fn and<S>(self, other: S) -> And<Self, S>
    where
        Self: Sized,
        S: RetryStrategy,
    {
        And(self, other)
    }
}

impl<F> RetryStrategy for F
where
    F: Fn(u32, &JobError) -> Option<Duration> + Send + Sync,
{
    #[inline]
    fn next_delay(&self, attempt: u32, err: &JobError) -> Option<Duration> {
        self(attempt, err)
    }
}

/// Ровно `n` попыток, без пауз.
#[derive(Debug, Clone, Copy)]
pub struct Limit(pub u32);

impl RetryStrategy for Limit {
    fn next_delay(&self, attempt: u32, _: &JobError) -> Option<Duration> {
        (attempt < self.0).then_some(Duration::ZERO)
    }
}

/// Фиксированная пауза между попытками. Число попыток не ограничивает.
#[derive(Debug, Clone, Copy)]
pub struct Delay(pub Duration);

impl RetryStrategy for Delay {
    fn next_delay(&self, _: u32, _: &JobError) -> Option<Duration> {
        Some(self.0)
    }
}

/// Явное расписание пауз; последняя повторяется.
#[derive(Debug, Clone)]
pub struct Wait(pub Vec<Duration>);

impl RetryStrategy for Wait {
    fn next_delay(&self, attempt: u32, _: &JobError) -> Option<Duration> {
        let idx = attempt.saturating_sub(1) as usize;
        let delay = self.0
            .get(idx)
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        Some(delay)
    }
}

#[derive(Debug, Clone, Copy)]
enum Algorithm {
    Linear(Duration),
    Exponential { base: Duration, factor: f64 },
}

/// Нарастающая пауза: линейная или экспоненциальная, с необязательным потолком.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    algorithm: Algorithm,
    max: Option<Duration>,
}

impl Backoff {
    /// `step * attempt`
    pub fn linear(step: Duration) -> Self {
        Self {
            algorithm: Algorithm::Linear(step),
            max: None,
        }
    }

    /// `base * factor^(attempt - 1)`
    pub fn exponential(base: Duration, factor: f64) -> Self {
        Self {
            algorithm: Algorithm::Exponential { base, factor },
            max: None,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl RetryStrategy for Backoff {
    fn next_delay(&self, attempt: u32, _: &JobError) -> Option<Duration> {
        let delay = match self.algorithm {
            Algorithm::Linear(step) => step.saturating_mul(attempt),
            Algorithm::Exponential { base, factor } => {
                let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                Duration::try_from_secs_f64(base.as_secs_f64() * factor.powi(exp))
                    .unwrap_or(Duration::MAX)
            }
        };
        Some(match self.max {
            Some(max) => delay.min(max),
            None => delay,
        })
    }
}

/// Повторять только те ошибки, которые принимает предикат.
pub struct IfErr<P>(pub P);

impl<P> RetryStrategy for IfErr<P>
where
    P: Fn(&JobError) -> bool + Send + Sync,
{
    fn next_delay(&self, _: u32, err: &JobError) -> Option<Duration> {
        (self.0)(err).then_some(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(A, B);

impl<A, B> RetryStrategy for And<A, B>
where
    A: RetryStrategy,
    B: RetryStrategy,
{
    fn next_delay(&self, attempt: u32, err: &JobError) -> Option<Duration> {
        let a = self.0.next_delay(attempt, err)?;
        let b = self.1.next_delay(attempt, err)?;
        Some(a.max(b))
    }
}
