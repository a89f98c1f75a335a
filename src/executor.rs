//! Bounded-concurrency dispatcher.
//!
//! Submission order is preserved in the result vector regardless of
//! completion order. A progress callback fires after each completion. A
//! cancellation signal stops new dispatches while in-flight tasks are
//! awaited; with `bail` set, the first failure does the same.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on in-flight tasks.
    pub max_concurrency: usize,
    /// Stop dispatching after the first failed task.
    pub bail: bool,
    /// When false, tasks run strictly one after another.
    pub parallel: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: crate::constants::DEFAULT_MAX_CONCURRENCY,
            bail: false,
            parallel: false,
        }
    }
}

/// Cooperative cancellation handle shared between the run loop and tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation: no new dispatches, in-flight tasks are asked
    /// to abort.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Outcome wrapper letting the executor see failures for `bail`.
pub trait TaskOutcome {
    fn is_failure(&self) -> bool;
}

/// One slot of the result vector.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion<T> {
    Finished(T),
    /// Never dispatched: cancellation or a prior bail-failure.
    Skipped,
}

impl<T> Completion<T> {
    pub const fn as_finished(&self) -> Option<&T> {
        match self {
            Self::Finished(value) => Some(value),
            Self::Skipped => None,
        }
    }
}

/// Bounded-concurrency task dispatcher.
pub struct ParallelExecutor {
    config: ExecutorConfig,
}

impl ParallelExecutor {
    #[must_use]
    pub const fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Runs `tasks`, returning one completion per task in submission order.
    ///
    /// The progress callback receives `(completed, total)` after every
    /// completion. When parallel mode is off this degenerates to sequential
    /// execution with the same result shape.
    pub async fn execute_all<T, F, Fut>(
        &self,
        tasks: Vec<F>,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Vec<Completion<T>>
    where
        T: TaskOutcome + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send,
    {
        if self.config.parallel && self.config.max_concurrency > 1 {
            self.execute_parallel(tasks, cancel, &mut on_progress).await
        } else {
            self.execute_sequential(tasks, cancel, &mut on_progress)
                .await
        }
    }

    async fn execute_sequential<T, F, Fut>(
        &self,
        tasks: Vec<F>,
        cancel: &CancelToken,
        on_progress: &mut impl FnMut(usize, usize),
    ) -> Vec<Completion<T>>
    where
        T: TaskOutcome,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let total = tasks.len();
        let mut results = Vec::with_capacity(total);
        let mut stopped = false;
        let mut completed = 0;

        for task in tasks {
            if stopped || cancel.is_cancelled() {
                results.push(Completion::Skipped);
                continue;
            }
            let outcome = task().await;
            completed += 1;
            on_progress(completed, total);
            if self.config.bail && outcome.is_failure() {
                debug!("bail: stopping dispatch after failure");
                stopped = true;
            }
            results.push(Completion::Finished(outcome));
        }
        results
    }

    async fn execute_parallel<T, F, Fut>(
        &self,
        tasks: Vec<F>,
        cancel: &CancelToken,
        on_progress: &mut impl FnMut(usize, usize),
    ) -> Vec<Completion<T>>
    where
        T: TaskOutcome + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send,
    {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let stop = Arc::new(AtomicBool::new(false));
        let bail = self.config.bail;

        let mut join_set = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let stop = Arc::clone(&stop);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore should not be closed");
                // Checked after the permit: a bail-failure or cancellation
                // that lands while this task queues must keep it undispatched.
                if stop.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    return (index, None);
                }
                let outcome = task().await;
                if bail && outcome.is_failure() {
                    stop.store(true, Ordering::SeqCst);
                }
                (index, Some(outcome))
            });
        }

        let mut slots: Vec<Completion<T>> = std::iter::repeat_with(|| Completion::Skipped)
            .take(total)
            .collect();
        let completed = AtomicUsize::new(0);
        while let Some(joined) = join_set.join_next().await {
            let Ok((index, outcome)) = joined else {
                continue;
            };
            if let Some(outcome) = outcome {
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_progress(done, total);
                slots[index] = Completion::Finished(outcome);
            }
        }
        slots
    }
}
