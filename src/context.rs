use super::{
    errors::JobError,
    logger::Logger,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};
use tokio::time::{Duration, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

type Values = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Контекст выполнения задачи: сигнал отмены, дедлайн, типизированные
/// значения и логгер.
///
/// Контекст неизменяем, любые производные создаются как новые значения.
/// Отмена распространяется только вниз по дереву: дочерний контекст
/// никогда не отменяет родителя.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<Values>,
    logger: Logger,
}

impl Context {
    /// Корневой контекст: не отменяется, без дедлайна, логгер выключен.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: Arc::new(HashMap::new()),
            logger: Logger::disabled(),
        }
    }

    /// Дочерний контекст с собственной отменой. Сброс guard'а отменяет
    /// дочерний контекст и всех его потомков.
    pub fn with_cancel(&self) -> (Context, DropGuard) {
        let token = self.token.child_token();
        let guard = token.clone().drop_guard();
        let ctx = Context {
            token,
            ..self.clone()
        };
        (ctx, guard)
    }

    /// Таймаут, не представимый как момент времени (например,
    /// `Duration::MAX`), означает отсутствие собственного дедлайна.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, DropGuard) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Итоговый дедлайн равен более раннему из собственного и родительского.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, DropGuard) {
        let (mut ctx, guard) = self.with_cancel();
        ctx.deadline = Some(match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        (ctx, guard)
    }

    pub fn with_value<T>(&self, value: T) -> Context
    where
        T: Send + Sync + 'static,
    {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn with_logger(&self, logger: Logger) -> Context {
        Context {
            logger,
            ..self.clone()
        }
    }

    #[inline]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Сколько осталось до дедлайна; `None`, если дедлайна нет.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Причина завершения контекста, если он уже завершён.
    pub fn err(&self) -> Option<JobError> {
        if matches!(self.deadline, Some(d) if d <= Instant::now()) {
            return Some(JobError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(JobError::Canceled);
        }
        None
    }

    /// Дождаться отмены или дедлайна.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &self.values.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct RequestId(&'static str);

    #[test]
    fn values_are_scoped_to_derived_context() {
        let root = Context::background();
        let child = root.with_value(RequestId("abc"));

        assert_eq!(child.value::<RequestId>(), Some(&RequestId("abc")));
        assert!(root.value::<RequestId>().is_none());
    }

    #[test]
    fn dropping_guard_cancels_child_only() {
        let root = Context::background();
        let (child, guard) = root.with_cancel();
        assert!(child.err().is_none());

        drop(guard);
        assert!(child.err().is_some_and(|e| e.is_canceled()));
        assert!(root.err().is_none());
    }

    #[test]
    fn child_deadline_never_outlives_parent() {
        let root = Context::background();
        let (parent, _g1) = root.with_timeout(Duration::from_millis(50));
        let (child, _g2) = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn unrepresentable_timeout_keeps_parent_deadline() {
        let root = Context::background();
        let (ctx, _g) = root.with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        let (parent, _g1) = root.with_timeout(Duration::from_secs(5));
        let (child, g2) = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());

        drop(g2);
        assert!(child.err().is_some_and(|e| e.is_canceled()));
        assert!(parent.err().is_none());
    }

    #[tokio::test]
    async fn done_resolves_on_deadline() {
        let (ctx, _guard) = Context::background().with_timeout(Duration::from_millis(20));
        ctx.done().await;
        assert!(ctx.err().is_some_and(|e| e.is_deadline_exceeded()));
    }
}
