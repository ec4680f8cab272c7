use std::{
    fmt,
    future::Future,
};
use tracing::{
    dispatcher::{self, Dispatch},
    instrument::{Instrument, Instrumented, WithDispatch, WithSubscriber},
    Span,
    Subscriber,
};

/// Явный хэндл структурного логгера.
///
/// Бэкенд (`Dispatch`) и накопленные поля (`Span`) путешествуют вместе,
/// поэтому ни пул, ни middleware не обращаются к глобальному подписчику:
/// каждое событие уходит туда, куда указывает переданный хэндл.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    span: Span,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            span: Span::none(),
        }
    }

    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Снимок текущего диспетчера вызывающего потока.
    pub fn current() -> Self {
        Self::new(dispatcher::get_default(|d| d.clone()))
    }

    /// Логгер, который всё отбрасывает.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Дочерний логгер: `make_span` вызывается внутри текущего span,
    /// так что новые поля добавляются к уже накопленным.
    ///
    /// ```ignore
    /// let l = logger.scoped(|| tracing::info_span!("worker", worker_id = 3));
    /// ```
    pub fn scoped<F>(&self, make_span: F) -> Self
    where
        F: FnOnce() -> Span,
    {
        let span = self.in_scope(make_span);
        Self {
            dispatch: self.dispatch.clone(),
            span,
        }
    }

    #[inline]
    pub fn in_scope<T, F>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    /// Выполнить future под этим логгером: все события внутри получат
    /// поля span и попадут в бэкенд хэндла.
    #[inline]
    pub fn instrument<F: Future>(&self, fut: F) -> WithDispatch<Instrumented<F>> {
        fut.instrument(self.span.clone())
            .with_subscriber(self.dispatch.clone())
    }

    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }

    #[inline]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}
