//! Установка процессного подписчика `tracing`.
//!
//! Библиотечный код сам ничего не устанавливает: это делает бинарь или тест.

use tracing_subscriber::{
    fmt::{
        format::{DefaultFields, Format},
        SubscriberBuilder,
    },
    EnvFilter,
};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Общая основа для обоих форматов: fmt-подписчик с фильтром из окружения.
fn builder() -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
    tracing_subscriber::fmt().with_env_filter(env_filter())
}

/// Человекочитаемые логи, фильтр из `RUST_LOG` (по умолчанию `info`).
/// Повторный вызов ничего не делает.
pub fn init() {
    let _ = builder().with_thread_names(true).try_init();
}

/// JSON-логи с временными метками.
pub fn init_json() {
    let _ = builder().json().with_target(false).try_init();
}
