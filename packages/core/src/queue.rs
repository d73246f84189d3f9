//! Priority request queue with rate-limit retries.
//!
//! Every outbound call to the calendar API goes through a [`RequestQueue`].
//! The queue bounds how many calls are in flight, spaces dispatches out,
//! and retries an operation with exponential backoff when the upstream
//! signals a rate limit.
//!
//! ```text
//! enqueue ──► pending (sorted by priority, FIFO within a priority)
//!                │
//!          dispatch loop ── waits on Notify while full or idle
//!                │
//!        spawned task: InFlight ⇄ Backoff(n) ──► Settled ──► Ticket
//! ```
//!
//! A task keeps its concurrency slot while backing off, so a burst of
//! rate-limited calls cannot be replaced by fresh ones that would hit the
//! same limit.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use tokio::sync::{oneshot, Notify};

use crate::metrics::CoreMetrics;
use crate::services::error::ApiError;

/// Default maximum number of in-flight operations.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
/// Default pause between two dispatches.
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(150);
/// Default number of retries after a rate-limit response.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
/// Default delay before the first retry; doubles on every further retry.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub delay_between_dispatches: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    /// Upper bound of a uniformly random extra wait added to each backoff.
    /// Zero disables jitter.
    pub retry_jitter: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            delay_between_dispatches: DEFAULT_DISPATCH_DELAY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_jitter: Duration::ZERO,
        }
    }
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight,
    /// Waiting before retry number `attempt`.
    Backoff { attempt: u32 },
    Settled,
}

/// Bookkeeping for one live task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub priority: i32,
    pub attempts_made: u32,
    pub state: TaskState,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: usize,
    pub active: usize,
    pub backing_off: usize,
    pub processing: bool,
}

type Job = Box<dyn FnOnce(TaskHandle) -> BoxFuture<'static, ()> + Send>;

struct PendingTask {
    id: u64,
    priority: i32,
    job: Job,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<PendingTask>,
    tasks: HashMap<u64, TaskRecord>,
    active: usize,
    processing: bool,
    next_id: u64,
}

struct QueueShared {
    config: QueueConfig,
    state: Mutex<QueueState>,
    slot_freed: Notify,
    metrics: Option<Arc<CoreMetrics>>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_depth(&self, depth: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.queue_depth.set(depth as f64);
        }
    }
}

/// Shared handle to the queue. Clones feed the same pending list and the
/// same dispatch loop.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<QueueShared>,
}

impl RequestQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_metrics(config, None)
    }

    pub fn with_metrics(mut config: QueueConfig, metrics: Option<Arc<CoreMetrics>>) -> Self {
        if config.max_concurrent == 0 {
            tracing::warn!("Queue max_concurrent of 0 would never dispatch, using 1");
            config.max_concurrent = 1;
        }

        Self {
            shared: Arc::new(QueueShared {
                config,
                state: Mutex::new(QueueState::default()),
                slot_freed: Notify::new(),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Queue `operation` and return a ticket that resolves to its result.
    ///
    /// `operation` is invoked once per attempt, so it must build a fresh
    /// future every time. Higher `priority` runs first; equal priorities run
    /// in enqueue order. Must be called from within a tokio runtime.
    pub fn enqueue<T, F, Fut>(&self, operation: F, priority: i32) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let job: Job = Box::new(move |handle: TaskHandle| {
            async move {
                let result = handle.run(operation).await;
                // Free the slot before the caller sees the result.
                drop(handle);
                let _ = sender.send(result);
            }
            .boxed()
        });

        let (id, start_loop) = {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id += 1;

            state.tasks.insert(
                id,
                TaskRecord {
                    priority,
                    attempts_made: 0,
                    state: TaskState::Pending,
                },
            );
            state.pending.push(PendingTask { id, priority, job });
            // Stable sort keeps enqueue order within a priority.
            state.pending.sort_by(|a, b| b.priority.cmp(&a.priority));
            self.shared.report_depth(state.pending.len());

            let start_loop = !state.processing;
            state.processing = true;
            (id, start_loop)
        };

        tracing::debug!("Enqueued request {} with priority {}", id, priority);

        if start_loop {
            tokio::spawn(dispatch_loop(self.shared.clone()));
        } else {
            self.shared.slot_freed.notify_one();
        }

        Ticket { id, receiver }
    }

    /// Drop every task that has not been dispatched yet. Their tickets
    /// resolve with [`ApiError::Discarded`]. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let discarded: Vec<PendingTask> = {
            let mut state = self.shared.lock();
            let discarded: Vec<PendingTask> = state.pending.drain(..).collect();
            for task in &discarded {
                state.tasks.remove(&task.id);
            }
            self.shared.report_depth(0);
            discarded
        };

        if !discarded.is_empty() {
            tracing::info!("Cleared {} pending requests", discarded.len());
        }
        discarded.len()
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock();
        QueueStatus {
            queued: state.pending.len(),
            active: state.active,
            backing_off: state
                .tasks
                .values()
                .filter(|record| matches!(record.state, TaskState::Backoff { .. }))
                .count(),
            processing: state.processing,
        }
    }

    /// Current state of task `id`. Ids that were issued but are no longer
    /// tracked have settled (or were discarded).
    pub fn task_state(&self, id: u64) -> Option<TaskState> {
        let state = self.shared.lock();
        match state.tasks.get(&id) {
            Some(record) => Some(record.state),
            None if id < state.next_id => Some(TaskState::Settled),
            None => None,
        }
    }

    /// Full bookkeeping for a live task.
    pub fn task(&self, id: u64) -> Option<TaskRecord> {
        self.shared.lock().tasks.get(&id).copied()
    }
}

async fn dispatch_loop(shared: Arc<QueueShared>) {
    tracing::debug!("Queue dispatch loop started");

    loop {
        let next = {
            let mut state = shared.lock();

            if state.pending.is_empty() && state.active == 0 {
                state.processing = false;
                break;
            }

            if state.active < shared.config.max_concurrent && !state.pending.is_empty() {
                let task = state.pending.remove(0);
                state.active += 1;
                if let Some(record) = state.tasks.get_mut(&task.id) {
                    record.state = TaskState::InFlight;
                }
                shared.report_depth(state.pending.len());
                Some((task, !state.pending.is_empty()))
            } else {
                None
            }
        };

        match next {
            Some((task, more_pending)) => {
                if let Some(metrics) = &shared.metrics {
                    metrics.requests_dispatched_total.inc();
                }

                let handle = TaskHandle {
                    shared: shared.clone(),
                    id: task.id,
                };
                tokio::spawn((task.job)(handle));

                let delay = shared.config.delay_between_dispatches;
                if more_pending && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            // A settling task or a new enqueue wakes us. `notify_one` stores
            // a permit, so a wake-up between unlock and here is not lost.
            None => shared.slot_freed.notified().await,
        }
    }

    tracing::debug!("Queue dispatch loop idle");
}

/// Owned by a dispatched task. Dropping it releases the concurrency slot,
/// even if the task panicked.
struct TaskHandle {
    shared: Arc<QueueShared>,
    id: u64,
}

impl TaskHandle {
    fn update(&self, state: TaskState, attempts_made: u32) {
        if let Some(record) = self.shared.lock().tasks.get_mut(&self.id) {
            record.state = state;
            record.attempts_made = attempts_made;
        }
    }

    async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let config = &self.shared.config;
        let mut attempts_made = 0;

        loop {
            self.update(TaskState::InFlight, attempts_made);

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() && attempts_made < config.retry_attempts => {
                    attempts_made += 1;
                    let delay = backoff_delay(config, attempts_made);

                    tracing::warn!(
                        "Rate limited. Retrying in {}ms (attempt {}/{})",
                        delay.as_millis(),
                        attempts_made,
                        config.retry_attempts
                    );

                    self.update(
                        TaskState::Backoff {
                            attempt: attempts_made,
                        },
                        attempts_made,
                    );
                    if let Some(metrics) = &self.shared.metrics {
                        metrics.rate_limit_retries_total.inc();
                    }

                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.active = state.active.saturating_sub(1);
            // Untracked ids report as Settled.
            state.tasks.remove(&self.id);
        }
        self.shared.slot_freed.notify_one();
    }
}

/// Wait before retry number `attempt` (1-based): `base * 2^(attempt - 1)`
/// plus up to `retry_jitter` of random extra time.
pub fn backoff_delay(config: &QueueConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let delay = config.retry_base_delay.saturating_mul(factor);

    let jitter_ms = config.retry_jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return delay;
    }

    let extra = rand::thread_rng().gen_range(0..=jitter_ms);
    delay.saturating_add(Duration::from_millis(extra))
}

/// Future resolving to the result of a queued operation.
pub struct Ticket<T> {
    id: u64,
    receiver: oneshot::Receiver<Result<T, ApiError>>,
}

impl<T> Ticket<T> {
    /// Id for [`RequestQueue::task_state`].
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ApiError::Discarded)))
    }
}
