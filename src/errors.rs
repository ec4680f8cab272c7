use std::io;
use thiserror::Error;

/// Итог выполнения задачи в случае неудачи.
///
/// Паника, дедлайн и отмена выделены в отдельные варианты, всё остальное
/// приходит из самой задачи через [`JobError::Failed`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error("panic recovered: {0}")]
    Panic(String),

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("context canceled")]
    Canceled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl JobError {
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        JobError::Failed(anyhow::Error::msg(message))
    }

    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, JobError::Panic(_))
    }

    #[inline]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, JobError::DeadlineExceeded)
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, JobError::Canceled)
    }
}

/// Ошибки использования пула (нарушение контракта вызывающей стороной).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is already started")]
    AlreadyStarted,

    #[error("pool is not running")]
    NotRunning,

    #[error("no worker is left to accept the job")]
    Closed,

    #[error("failed to build job runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
