//! Bounded-concurrency task scheduler
//!
//! Every network fetch in the crate is funneled through a [`TaskScheduler`]:
//! a FIFO admission queue in front of a bounded set of running tasks, plus a
//! [`join`](TaskScheduler::join) barrier that resolves once no submitted work
//! remains — including work submitted while the barrier is already pending
//! (dependency fan-out submits tasks from within tasks).
//!
//! The scheduler is a pure admission/bookkeeping layer: it never errors, and
//! one task's failure is delivered only through that task's own
//! [`TaskHandle`], never to siblings.
//!
//! # Example
//!
//! ```
//! use modpack_dl::scheduler::TaskScheduler;
//!
//! # tokio_test::block_on(async {
//! let scheduler = TaskScheduler::new(2);
//! let handle = scheduler.submit(async { 21 * 2 });
//! assert_eq!(handle.await.ok(), Some(42));
//! scheduler.join().await;
//! # });
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{Notify, oneshot};

/// Error yielded by a [`TaskHandle`] whose task died (panicked or was
/// dropped unstarted) before delivering a result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskFailed;

impl std::fmt::Display for TaskFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task failed to deliver a result")
    }
}

impl std::error::Error for TaskFailed {}

/// Future resolving to the outcome of one submitted task.
///
/// Dropping the handle does not cancel the task; it keeps running and its
/// result is discarded.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskFailed>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| TaskFailed))
    }
}

struct State {
    /// Tasks admitted but not yet started, in submission order
    queued: VecDeque<BoxFuture<'static, ()>>,
    /// Number of currently-running tasks, never above `max_concurrency`
    running: usize,
    /// Queued + running; `join` waits for this to reach zero
    pending: usize,
}

struct Inner {
    max_concurrency: usize,
    state: Mutex<State>,
    drained: Notify,
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // Task bodies run behind catch_unwind, so the lock is only ever held by
    // non-panicking bookkeeping; recover the guard if it was poisoned anyway.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generic bounded-concurrency executor for asynchronous units of work
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    /// Create a scheduler running at most `max_concurrency` tasks at once.
    ///
    /// A limit of 0 is treated as 1; nothing could ever run otherwise.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrency: max_concurrency.max(1),
                state: Mutex::new(State {
                    queued: VecDeque::new(),
                    running: 0,
                    pending: 0,
                }),
                drained: Notify::new(),
            }),
        }
    }

    /// The configured concurrency limit
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Submit a task. It starts immediately if a slot is free, otherwise it
    /// queues behind earlier submissions (FIFO start order).
    ///
    /// The returned handle resolves with the task's output, or with
    /// [`TaskFailed`] if the task panicked. Must be called from within a
    /// tokio runtime.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: BoxFuture<'static, ()> = Box::pin(async move {
            let value = task.await;
            // The caller may have dropped its handle; the result is then discarded.
            let _ = tx.send(value);
        });

        let to_spawn = {
            let mut state = lock_state(&self.inner.state);
            state.pending += 1;
            if state.running < self.inner.max_concurrency {
                state.running += 1;
                Some(wrapped)
            } else {
                state.queued.push_back(wrapped);
                None
            }
        };

        if let Some(task) = to_spawn {
            tokio::spawn(drive(Arc::clone(&self.inner), task));
        }

        TaskHandle { rx }
    }

    /// Wait until no submitted work remains.
    ///
    /// Resolves immediately when nothing was submitted. Work submitted while
    /// a `join` is pending — including from within a running task — is
    /// waited for too: the barrier observes the live pending count, not a
    /// snapshot taken when `join` was called.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a completion between the
            // check and the await cannot be missed.
            notified.as_mut().enable();
            if lock_state(&self.inner.state).pending == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Run one task to completion, then hand its slot to the next queued task.
///
/// Returns a boxed future so the completion handler can spawn the next task
/// without creating a recursive future type.
fn drive(inner: Arc<Inner>, task: BoxFuture<'static, ()>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        // A panicking task must not skip the completion bookkeeping below.
        let _ = AssertUnwindSafe(task).catch_unwind().await;

        let (next, drained) = {
            let mut state = lock_state(&inner.state);
            state.pending -= 1;
            let next = state.queued.pop_front();
            if next.is_none() {
                state.running -= 1;
            }
            (next, state.pending == 0)
        };

        if drained {
            inner.drained.notify_waiters();
        }
        if let Some(next) = next {
            tokio::spawn(drive(inner, next));
        }
    })
}
