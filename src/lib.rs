//! Пул воркеров для фоновых задач с компонуемыми middleware
//!
//! # Features
//! - Фиксированное число потоков-воркеров и синхронная передача задач (без буфера)
//! - Graceful shutdown: `stop` ждёт задачи, которые уже выполняются
//! - Изоляция паник, таймауты, retry-политики, post-run хуки
//! - Структурные логи через явный хэндл логгера (`tracing`)
//!
//! ```no_run
//! use workerpool::{Job, Pool, add_retry, retry::Limit};
//!
//! let pool = Pool::with_workers(4);
//! pool.start().unwrap();
//!
//! let job = Job::new(|_ctx| async {
//!     println!("hello");
//!     Ok(())
//! });
//! pool.run(add_retry(job, Limit(3))).unwrap();
//! pool.stop().unwrap();
//! ```

pub mod context;
pub mod errors;
pub mod job;
pub mod logger;
pub mod middleware;
pub mod model;
pub mod pool;
pub mod retry;
pub mod telemetry;

pub use context::Context;
pub use errors::{JobError, PoolError};
pub use job::{Job, JobResult};
pub use logger::Logger;
pub use middleware::{
    add_context,
    add_logger,
    add_panic_recovery,
    add_post_run,
    add_retry,
    add_timeout,
};
pub use model::PoolState;
pub use pool::{Config, Pool};
