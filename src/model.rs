use std::time::{Duration, Instant};
use uuid::Uuid;

/// Запись об одном выполнении задачи. Живёт только пока воркер её
/// выполняет и нужна для корреляции логов.
#[derive(Debug, Clone, Copy)]
pub struct Execution {
    pub id: Uuid,
    pub worker_id: usize,
    pub started_at: Instant,
}

impl Execution {
    pub fn begin(worker_id: usize) -> Self {
        Self {
            id: Uuid::now_v7(),
            worker_id,
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Состояние жизненного цикла пула.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    Stopped,
}
