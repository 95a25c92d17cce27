//! Bounded-concurrency task queue.
//!
//! A `TaskQueue` holds pending tasks and a count of tasks in flight, both
//! behind one lock so that "nothing pending and nothing running" is observed
//! atomically. [`TaskQueue::run`] drives up to N workers over the queue;
//! handlers may enqueue more work onto the same queue while they run.
//!
//! Failures are isolated per task: they are logged, sent on the failure
//! channel, and re-enqueued while the process-wide retry budget lasts. A
//! failure seen with the budget spent aborts the run.

use crate::error::QueueError;
use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Pool behavior shared by every task.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard bound on one handler invocation
    pub task_timeout: Duration,
    /// Re-enqueues allowed across the whole run
    pub retry_limit: u32,
    /// Re-enqueue failed tasks; when off, failures are only reported
    pub retry_failed: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(120),
            retry_limit: 100,
            retry_failed: true,
        }
    }
}

/// How a task invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler exceeded the task timeout
    Timeout,
    /// The handler returned an error
    Error,
}

/// A failed task invocation, as delivered on the failure channel.
#[derive(Debug, Clone)]
pub struct TaskFailure<T> {
    pub task: T,
    pub kind: FailureKind,
    pub message: String,
    /// Whether the task was put back on the queue
    pub requeued: bool,
}

/// Counters for one [`TaskQueue::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
}

struct QueueState<T> {
    pending: VecDeque<T>,
    in_flight: usize,
    retries_left: u32,
    closed: bool,
    aborted: bool,
    stats: RunStats,
}

enum Claim<T> {
    Run(T),
    Wait,
    Done,
}

pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    changed: Notify,
    config: QueueConfig,
    failures: Option<mpsc::UnboundedSender<TaskFailure<T>>>,
}

impl<T> TaskQueue<T>
where
    T: Clone + Display,
{
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: 0,
                retries_left: config.retry_limit,
                closed: false,
                aborted: false,
                stats: RunStats::default(),
            }),
            changed: Notify::new(),
            config,
            failures: None,
        }
    }

    /// Deliver every task failure on `sender`.
    #[must_use]
    pub fn with_failure_channel(mut self, sender: mpsc::UnboundedSender<TaskFailure<T>>) -> Self {
        self.failures = Some(sender);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task. Legal from inside a running handler.
    ///
    /// # Errors
    /// Returns `QueueError::Closed` once [`close`](Self::close) has run or the
    /// run was aborted.
    pub fn enqueue(&self, task: T) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed || state.aborted {
                debug!("Rejected {} on closed queue", task);
                return Err(QueueError::Closed);
            }
            state.pending.push_back(task);
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Tasks waiting to be claimed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Tasks currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Execute queued tasks on up to `max_concurrency` workers until the
    /// queue is quiescent.
    ///
    /// # Errors
    /// Returns `QueueError::RetryBudgetExhausted` if a task failed after the
    /// retry budget was spent. Tasks still pending at that point are dropped.
    pub async fn run<F, Fut, E>(&self, handler: F, max_concurrency: usize) -> Result<RunStats, QueueError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let workers = max_concurrency.max(1);
        info!(
            "Starting {} workers over {} queued tasks",
            workers,
            self.pending()
        );

        let handler = &handler;
        join_all((0..workers).map(|id| self.worker(id, handler))).await;

        let state = self.lock();
        if state.aborted {
            return Err(QueueError::RetryBudgetExhausted {
                limit: self.config.retry_limit,
            });
        }
        Ok(state.stats)
    }

    async fn worker<F, Fut, E>(&self, id: usize, handler: &F)
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        loop {
            // Register interest before inspecting state so a wake-up between
            // the check and the await is not lost.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.claim() {
                Claim::Run(task) => {
                    let outcome =
                        tokio::time::timeout(self.config.task_timeout, handler(task.clone())).await;
                    self.settle(task, outcome);
                }
                Claim::Wait => notified.await,
                Claim::Done => break,
            }
        }
        debug!("Worker {} finished", id);
    }

    fn claim(&self) -> Claim<T> {
        let mut state = self.lock();
        if state.aborted {
            return Claim::Done;
        }
        if let Some(task) = state.pending.pop_front() {
            state.in_flight += 1;
            return Claim::Run(task);
        }
        if state.in_flight == 0 {
            Claim::Done
        } else {
            Claim::Wait
        }
    }

    fn settle<E: Display>(
        &self,
        task: T,
        outcome: Result<Result<(), E>, tokio::time::error::Elapsed>,
    ) {
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some((FailureKind::Error, e.to_string())),
            Err(_) => Some((
                FailureKind::Timeout,
                format!("task exceeded {:?}", self.config.task_timeout),
            )),
        };

        let report = {
            let mut state = self.lock();
            state.in_flight -= 1;

            match failure {
                None => {
                    state.stats.completed += 1;
                    None
                }
                Some((kind, message)) => {
                    state.stats.failed += 1;
                    warn!("Error crawling {}: {}", task, message);

                    let mut requeued = false;
                    if self.config.retry_failed && !state.aborted {
                        if state.retries_left > 0 {
                            state.retries_left -= 1;
                            state.stats.retried += 1;
                            state.pending.push_back(task.clone());
                            requeued = true;
                            warn!(
                                "Re-queued {} ({} retries left)",
                                task, state.retries_left
                            );
                        } else {
                            error!(
                                "Retry budget of {} exhausted, aborting crawl",
                                self.config.retry_limit
                            );
                            state.aborted = true;
                            state.pending.clear();
                        }
                    }

                    Some(TaskFailure {
                        task,
                        kind,
                        message,
                        requeued,
                    })
                }
            }
        };

        if let (Some(report), Some(sender)) = (report, &self.failures) {
            if sender.send(report).is_err() {
                debug!("Failure channel receiver dropped");
            }
        }
        self.changed.notify_waiters();
    }

    /// Resolve once nothing is pending and nothing is executing.
    pub async fn idle(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.pending.is_empty() && state.in_flight == 0 {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Wait for quiescence, then refuse further tasks.
    pub async fn close(&self) {
        self.idle().await;
        self.lock().closed = true;
        self.changed.notify_waiters();
        debug!("Task queue closed");
    }
}
