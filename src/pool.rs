use super::{
    context::Context,
    errors::PoolError,
    job::Job,
    logger::Logger,
    middleware::{add_logger, add_panic_recovery},
    model::{Execution, PoolState},
};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};
use crossbeam::{
    channel::{self, select, Receiver, Sender},
    sync::WaitGroup,
};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info, info_span, warn};

pub type ContextFactory = Arc<dyn Fn() -> Context + Send + Sync>;

/// Конфигурация пула воркеров
#[derive(Clone)]
pub struct Config {
    pub num_workers: usize,
    pub thread_name: String,
    pub logger: Logger,
    /// Базовый контекст для каждой задачи, если она не подменила его сама.
    pub default_context: ContextFactory,
}

impl Default for Config {
    fn default() -> Self {
        Self::io_bound()
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self::preset(num_cpus::get())
    }

    pub fn io_bound() -> Self {
        Self::preset(num_cpus::get() * 2) // Для I/O-bound задач
    }

    fn preset(num_workers: usize) -> Self {
        Self {
            num_workers,
            thread_name: "workerpool".to_owned(),
            logger: Logger::current(),
            default_context: Arc::new(Context::background),
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_default_context<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Context + Send + Sync + 'static,
    {
        self.default_context = Arc::new(factory);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("num_workers", &self.num_workers)
            .field("thread_name", &self.thread_name)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

struct Running {
    jobs: Sender<Job>,
    stop: Sender<()>,
    barrier: WaitGroup,
    workers: Vec<thread::JoinHandle<()>>,
    runtime: Runtime,
}

enum State {
    Created,
    Running(Running),
    Stopped,
}

/// Пул воркеров с синхронной передачей задач.
///
/// Жизненный цикл: `Created -> Running -> Stopped`, обратно пул не
/// возвращается.
///
/// Контракт вызывающей стороны:
/// - [`Pool::run`] до [`Pool::start`] или после [`Pool::stop`] сразу
///   возвращает [`PoolError::NotRunning`];
/// - после начала `stop` новые задачи не отправляются. Если `run` всё же
///   гонится со `stop`, он вернёт [`PoolError::Closed`], когда последний
///   воркер выйдет, но задача выполнена не будет;
/// - пул с нулём воркеров стартует, но не принимает задач: каждый `run`
///   возвращает [`PoolError::Closed`];
/// - `stop` нельзя вызывать из задачи этого же пула: воркер будет ждать сам себя.
pub struct Pool {
    config: Config,
    state: Mutex<State>,
}

impl Pool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(State::Created),
        }
    }

    pub fn with_workers(num_workers: usize) -> Self {
        Self::new(Config::default().with_workers(num_workers))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        match *self.lock_state() {
            State::Created => PoolState::Created,
            State::Running(_) => PoolState::Running,
            State::Stopped => PoolState::Stopped,
        }
    }

    #[inline]
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Запускает `config.num_workers` воркеров.
    ///
    /// Повторный вызов (в том числе после `stop`) возвращает
    /// [`PoolError::AlreadyStarted`] и ничего не меняет.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut state = self.lock_state();
        if !matches!(*state, State::Created) {
            return Err(PoolError::AlreadyStarted);
        }

        let num_workers = self.config.num_workers;
        let logger = &self.config.logger;
        logger.in_scope(|| info!(worker_num = num_workers, "Starting workers"));
        if num_workers == 0 {
            logger.in_scope(|| warn!("Pool started without workers, every submission will be rejected"));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(num_workers.max(1))
            .thread_name(format!("{}-rt", self.config.thread_name))
            .enable_all()
            .build()
            .map_err(PoolError::Runtime)?;

        let (jobs_tx, jobs_rx) = channel::bounded::<Job>(0);
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let barrier = WaitGroup::new();
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let worker = Worker {
                id: worker_id,
                jobs: jobs_rx.clone(),
                stop: stop_rx.clone(),
                runtime: runtime.handle().clone(),
                logger: logger.scoped(|| info_span!("worker", worker_id)),
                default_context: self.config.default_context.clone(),
                _barrier: barrier.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name, worker_id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // откатываем уже запущенных воркеров
                    drop(stop_tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    runtime.shutdown_background();
                    logger.in_scope(|| error!(error = %err, worker_id, "Failed to spawn worker"));
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        *state = State::Running(Running {
            jobs: jobs_tx,
            stop: stop_tx,
            barrier,
            workers,
            runtime,
        });

        logger.in_scope(|| info!("Done starting workers"));
        Ok(())
    }

    /// Передаёт задачу свободному воркеру. Блокирует вызывающий поток,
    /// пока какой-нибудь воркер не заберёт задачу; буфера нет.
    ///
    /// Результат задачи сюда не возвращается: используйте
    /// [`add_post_run`](crate::middleware::add_post_run) или замыкание.
    pub fn run(&self, job: Job) -> Result<(), PoolError> {
        let jobs = match &*self.lock_state() {
            State::Running(running) => running.jobs.clone(),
            _ => return Err(PoolError::NotRunning),
        };
        jobs.send(job).map_err(|_| PoolError::Closed)
    }

    /// Останавливает воркеров и ждёт завершения задач, которые уже
    /// выполняются. Задачи не прерываются принудительно.
    pub fn stop(&self) -> Result<(), PoolError> {
        let running = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Running(running) => running,
                other => {
                    *state = other;
                    return Err(PoolError::NotRunning);
                }
            }
        };
        self.shutdown(running);
        Ok(())
    }

    fn shutdown(&self, running: Running) {
        let logger = &self.config.logger;
        logger.in_scope(|| info!("Shutting down workers"));

        let Running { jobs, stop, barrier, workers, runtime } = running;
        drop(stop);
        barrier.wait();
        for handle in workers {
            if handle.join().is_err() {
                logger.in_scope(|| error!("Worker thread panicked"));
            }
        }
        drop(jobs);
        // задачи, брошенные по таймауту, не ждём
        runtime.shutdown_background();

        logger.in_scope(|| info!("Done shutting down workers"));
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Running(running) = std::mem::replace(state, State::Stopped) {
            self.shutdown(running);
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<Job>,
    stop: Receiver<()>,
    runtime: Handle,
    logger: Logger,
    default_context: ContextFactory,
    // сбрасывается при выходе потока
    _barrier: WaitGroup,
}

impl Worker {
    fn run(self) {
        loop {
            select! {
                recv(self.stop) -> _ => return,
                recv(self.jobs) -> msg => match msg {
                    Ok(job) => self.execute(job),
                    Err(_) => return,
                },
            }
        }
    }

    fn execute(&self, job: Job) {
        let execution = Execution::begin(self.id);
        let logger = self.logger.scoped(|| info_span!("job", job_id = %execution.id));
        logger.in_scope(|| debug!("Running job"));

        let job = add_logger(add_panic_recovery(job), logger.clone());
        let result = self.runtime.block_on(job.run((self.default_context)()));

        let elapsed = execution.elapsed();
        logger.in_scope(|| {
            if let Err(err) = &result {
                error!(error = %err, "Error running job");
            }
            info!(job_duration = ?elapsed, "Done running job");
        });
    }
}
