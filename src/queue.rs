//! Rate-limited request queue for outbound AI calls.
//!
//! DESIGN
//! ======
//! Serializes units of work against a strict external rate limit:
//! - At most one unit of work in flight per queue.
//! - Dispatches are spaced at least `min_interval` apart.
//! - At most `max_pending` entries wait at once; beyond that `enqueue`
//!   fails fast with [`QueueError::Full`] and the work is never invoked.
//! - Entries that waited longer than `max_wait` before dispatch are
//!   rejected with [`QueueError::Expired`]. The check runs after the pacing
//!   sleep, immediately before `work()` would start.
//!
//! Dispatch order is strict FIFO. A single drain task is spawned when the
//! first entry arrives at an idle queue. Each pass dispatches one entry, and
//! passes are separated by `retry_delay` while work remains. The task goes
//! idle only after it sees an empty pending list under the same lock that
//! `enqueue` checks, so a burst never starts a second drain task.
//!
//! TRADE-OFFS
//! ==========
//! The queue is per-process. Horizontally scaled deployments each get an
//! independent limit; a shared limit would need external coordination.
//! No retries happen here: upstream errors reach the caller untouched.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::parse_or;

pub const DEFAULT_MIN_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_MAX_PENDING: usize = 10;
pub const DEFAULT_MAX_WAIT_MS: u64 = 30_000;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Minimum spacing between the starts of two dispatches.
    pub min_interval: Duration,
    /// Maximum entries waiting for dispatch. Always at least 1.
    pub max_pending: usize,
    /// Maximum time an entry may wait before dispatch.
    pub max_wait: Duration,
    /// Delay between drain passes while entries remain.
    pub retry_delay: Duration,
    /// Optional bound on a single dispatch. `None` lets work run unbounded.
    pub exec_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            max_pending: DEFAULT_MAX_PENDING,
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            exec_timeout: None,
        }
    }
}

impl QueueConfig {
    /// Build queue config from environment-style variables.
    ///
    /// - `QUEUE_MIN_INTERVAL_MS`: default 2000
    /// - `QUEUE_MAX_PENDING`: default 10
    /// - `QUEUE_MAX_WAIT_MS`: default 30000
    /// - `QUEUE_RETRY_DELAY_MS`: default 100
    /// - `QUEUE_EXEC_TIMEOUT_MS`: default 0 (disabled)
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ms = |key: &str, default: u64| Duration::from_millis(parse_or(lookup(key).as_deref(), default));
        let exec_timeout = ms("QUEUE_EXEC_TIMEOUT_MS", 0);

        Self {
            min_interval: ms("QUEUE_MIN_INTERVAL_MS", DEFAULT_MIN_INTERVAL_MS),
            max_pending: parse_or(lookup("QUEUE_MAX_PENDING").as_deref(), DEFAULT_MAX_PENDING).max(1),
            max_wait: ms("QUEUE_MAX_WAIT_MS", DEFAULT_MAX_WAIT_MS),
            retry_delay: ms("QUEUE_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
            exec_timeout: (!exec_timeout.is_zero()).then_some(exec_timeout),
        }
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Queue-side failures. Errors from the work itself never pass through here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("request queue is full (max {capacity} pending)")]
    Full { capacity: usize },
    #[error("request expired after waiting {waited_ms}ms for dispatch")]
    Expired { waited_ms: u64 },
    #[error("request exceeded execution timeout of {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },
    #[error("request was dropped before it settled")]
    Dropped,
}

impl crate::error::ErrorCode for QueueError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Full { .. } => "E_QUEUE_FULL",
            Self::Expired { .. } => "E_QUEUE_EXPIRED",
            Self::ExecutionTimeout { .. } => "E_QUEUE_EXEC_TIMEOUT",
            Self::Dropped => "E_QUEUE_DROPPED",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub capacity: usize,
    pub in_flight: bool,
    pub draining: bool,
    pub dispatched: u64,
    pub expired: u64,
    pub rejected: u64,
}

// =============================================================================
// JOBS
// =============================================================================

type WorkFn<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Type-erased unit of work. Settles its caller exactly once.
trait Job: Send {
    fn run(self: Box<Self>, shared: Arc<Shared>) -> BoxFuture<'static, ()>;
    fn reject(self: Box<Self>, err: QueueError);
}

struct Task<T, E> {
    work: WorkFn<T, E>,
    reply: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Job for Task<T, E>
where
    T: Send + 'static,
    E: From<QueueError> + Send + 'static,
{
    fn run(self: Box<Self>, shared: Arc<Shared>) -> BoxFuture<'static, ()> {
        let Task { work, reply } = *self;
        let exec_timeout = shared.config.exec_timeout;
        let settle = Settle { shared, reply: Some(reply) };
        async move {
            let outcome = match exec_timeout {
                Some(limit) => match tokio::time::timeout(limit, work()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(E::from(QueueError::ExecutionTimeout { timeout_ms: millis(limit) })),
                },
                None => work().await,
            };
            settle.send(outcome);
        }
        .boxed()
    }

    fn reject(self: Box<Self>, err: QueueError) {
        let _ = self.reply.send(Err(E::from(err)));
    }
}

/// Reply slot of a dispatched job. `in_flight` is cleared before the caller
/// can observe the outcome, and also when the job unwinds.
struct Settle<T, E> {
    shared: Arc<Shared>,
    reply: Option<oneshot::Sender<Result<T, E>>>,
}

impl<T, E> Settle<T, E> {
    fn send(mut self, outcome: Result<T, E>) {
        self.shared.lock().in_flight = false;
        if let Some(reply) = self.reply.take() {
            // Caller stopped waiting; nobody to settle.
            let _ = reply.send(outcome);
        }
    }
}

impl<T, E> Drop for Settle<T, E> {
    fn drop(&mut self) {
        self.shared.lock().in_flight = false;
    }
}

struct Entry {
    id: Uuid,
    enqueued_at: Instant,
    job: Box<dyn Job>,
}

// =============================================================================
// QUEUE
// =============================================================================

/// Handle to a rate-limited request queue. Clones share the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

struct Shared {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Entry>,
    /// True while a drain task exists, including between passes.
    draining: bool,
    in_flight: bool,
    last_dispatch: Option<Instant>,
    dispatched: u64,
    expired: u64,
    rejected: u64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig { max_pending: config.max_pending.max(1), ..config };
        Self { shared: Arc::new(Shared { config, state: Mutex::new(QueueState::default()) }) }
    }

    /// Submit a unit of work.
    ///
    /// Capacity is checked now, not when the returned future is first
    /// polled. On a full queue `work` is dropped uninvoked and the future
    /// resolves to [`QueueError::Full`]. Otherwise it resolves with exactly
    /// what `work()` produced, or with a queue error converted into `E`.
    ///
    /// `work` must not wait on another entry of the same queue; that
    /// deadlocks the serialization and is not detected.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn enqueue<F, Fut, T, E>(&self, work: F) -> BoxFuture<'static, Result<T, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<QueueError> + Send + 'static,
    {
        match self.admit(work) {
            Ok(reply) => async move {
                reply
                    .await
                    .unwrap_or_else(|_| Err(E::from(QueueError::Dropped)))
            }
            .boxed(),
            Err(err) => futures::future::ready(Err(E::from(err))).boxed(),
        }
    }

    fn admit<F, Fut, T, E>(&self, work: F) -> Result<oneshot::Receiver<Result<T, E>>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<QueueError> + Send + 'static,
    {
        let capacity = self.shared.config.max_pending;
        let id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();

        let start_drain = {
            let mut state = self.shared.lock();
            if state.pending.len() >= capacity {
                state.rejected += 1;
                warn!(%id, capacity, "queue: full, rejecting request");
                return Err(QueueError::Full { capacity });
            }

            let work: WorkFn<T, E> = Box::new(move || work().boxed());
            state
                .pending
                .push_back(Entry { id, enqueued_at: Instant::now(), job: Box::new(Task { work, reply }) });
            debug!(%id, pending = state.pending.len(), "queue: request enqueued");

            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }
        Ok(rx)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            pending: state.pending.len(),
            capacity: self.shared.config.max_pending,
            in_flight: state.in_flight,
            draining: state.draining,
            dispatched: state.dispatched,
            expired: state.expired,
            rejected: state.rejected,
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

// =============================================================================
// DRAIN LOOP
// =============================================================================

async fn drain(shared: Arc<Shared>) {
    loop {
        run_pass(&shared).await;
        {
            let mut state = shared.lock();
            if state.pending.is_empty() {
                state.draining = false;
                return;
            }
        }
        tokio::time::sleep(shared.config.retry_delay).await;
    }
}

/// Expire stale entries from the front, then dispatch at most one.
///
/// Expiry is judged after the pacing sleep, at the moment the entry would
/// start, so nothing runs once it has waited longer than `max_wait`.
async fn run_pass(shared: &Arc<Shared>) {
    let cfg = shared.config;
    loop {
        let next = shared.lock().pending.pop_front();
        let Some(entry) = next else {
            return;
        };

        let pause = {
            let state = shared.lock();
            state
                .last_dispatch
                .map_or(Duration::ZERO, |last| cfg.min_interval.saturating_sub(last.elapsed()))
        };
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let waited = entry.enqueued_at.elapsed();
        if waited > cfg.max_wait {
            shared.lock().expired += 1;
            let waited_ms = millis(waited);
            warn!(id = %entry.id, waited_ms, "queue: request expired before dispatch");
            entry.job.reject(QueueError::Expired { waited_ms });
            continue;
        }

        {
            let mut state = shared.lock();
            state.last_dispatch = Some(Instant::now());
            state.in_flight = true;
            state.dispatched += 1;
        }
        debug!(id = %entry.id, waited_ms = millis(waited), "queue: dispatching request");

        // Own task so a panicking unit of work cannot take the drain loop down.
        if let Err(e) = tokio::spawn(entry.job.run(Arc::clone(shared))).await {
            warn!(id = %entry.id, error = %e, "queue: dispatch task aborted");
        }
        return;
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
