//! Task futures and the bounded pool they run on.
//!
//! Every unit of work of a request is spawned on the tokio runtime through a
//! [`FutureManager`], which returns a cloneable [`TaskFuture`] handle. Tasks
//! start immediately; the bound applies to external calls only: a task takes
//! a slot from the manager's [`PrioritySlots`] right before calling a
//! collaborator and gives it back as soon as the call returns. Waiting on
//! another task never holds a slot, so any pool size of at least one is
//! deadlock free.
//!
//! Leaving a request scope must [`drain`](FutureManager::drain) the manager so
//! that no task outlives the request unobserved.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tokio::sync::oneshot;
use tracing::debug;

use super::error::ScenarioError;

/// Slot priority for work every other task depends on.
pub const PRIORITY_URGENT: u32 = 0;

/// Slot priority for work nothing else waits on.
pub const PRIORITY_BACKGROUND: u32 = u32::MAX;

/// A handle on a spawned task's result.
///
/// Cloning the handle does not clone the work: all clones observe the same
/// result, computed once.
pub struct TaskFuture<T> {
    inner: Shared<BoxFuture<'static, Result<Arc<T>, ScenarioError>>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> TaskFuture<T> {
    /// A future that is already resolved.
    pub fn ready(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            inner: async move { Ok(value) }.boxed().shared(),
        }
    }

    /// Wait until the task is done and return its result.
    pub async fn wait_and_get(&self) -> Result<Arc<T>, ScenarioError> {
        self.inner.clone().await
    }

    /// The result, if the task is already done.
    pub fn peek(&self) -> Option<Result<Arc<T>, ScenarioError>> {
        self.inner.peek().cloned()
    }
}

struct Waiter {
    priority: u32,
    seq: u64,
    grant: oneshot::Sender<SlotGuard>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap pops the greatest: lowest priority value first, then FIFO.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct SlotState {
    available: usize,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
}

/// A counting semaphore handing free slots to the lowest priority value first.
pub struct PrioritySlots {
    state: Mutex<SlotState>,
    size: usize,
}

impl PrioritySlots {
    pub fn new(size: usize) -> Arc<Self> {
        let size = size.max(1);
        Arc::new(Self {
            state: Mutex::new(SlotState {
                available: size,
                ..SlotState::default()
            }),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.lock().available
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // The state is always left consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for a slot. Lower `priority` values are served first.
    pub async fn acquire(self: &Arc<Self>, priority: u32) -> SlotGuard {
        let receiver = {
            let mut state = self.lock();
            if state.available > 0 && state.waiters.is_empty() {
                state.available -= 1;
                return SlotGuard {
                    slots: Arc::clone(self),
                    armed: true,
                };
            }
            let (grant, receiver) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiters.push(Waiter {
                priority,
                seq,
                grant,
            });
            receiver
        };

        match receiver.await {
            Ok(guard) => guard,
            // Senders are only dropped after a successful send, so this is
            // unreachable; fall back to an unaccounted slot rather than hang.
            Err(_) => SlotGuard {
                slots: Arc::clone(self),
                armed: false,
            },
        }
    }

    fn release(self: &Arc<Self>) {
        loop {
            let waiter = {
                let mut state = self.lock();
                match state.waiters.pop() {
                    Some(waiter) => waiter,
                    None => {
                        state.available += 1;
                        return;
                    }
                }
            };
            let guard = SlotGuard {
                slots: Arc::clone(self),
                armed: true,
            };
            match waiter.grant.send(guard) {
                Ok(()) => return,
                // The waiter gave up; hand the slot to the next one.
                Err(mut guard) => guard.armed = false,
            }
        }
    }
}

/// A held slot, released on drop.
pub struct SlotGuard {
    slots: Arc<PrioritySlots>,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.slots.release();
        }
    }
}

/// Spawns and tracks the tasks of one request.
#[derive(Clone)]
pub struct FutureManager {
    slots: Arc<PrioritySlots>,
    pending: Arc<Mutex<Vec<BoxFuture<'static, ()>>>>,
}

impl FutureManager {
    pub fn new(pool_size: usize) -> Self {
        Self {
            slots: PrioritySlots::new(pool_size),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run `body` with a fresh manager and drain it before returning.
    pub async fn scope<F, Fut, R>(pool_size: usize, body: F) -> R
    where
        F: FnOnce(FutureManager) -> Fut,
        Fut: Future<Output = R>,
    {
        let manager = FutureManager::new(pool_size);
        let result = body(manager.clone()).await;
        manager.drain().await;
        result
    }

    /// Spawn `work` and return a handle on its result.
    pub fn create_future<T, F>(&self, work: F) -> TaskFuture<T>
    where
        T: Send + Sync + 'static,
        F: Future<Output = Result<T, ScenarioError>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let inner = async move {
            match handle.await {
                Ok(result) => result.map(Arc::new),
                Err(e) => Err(ScenarioError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared();

        self.lock_pending().push(inner.clone().map(|_| ()).boxed());
        TaskFuture { inner }
    }

    /// Wait for a slot before calling a collaborator.
    pub async fn acquire(&self, priority: u32) -> SlotGuard {
        self.slots.acquire(priority).await
    }

    pub fn pool_size(&self) -> usize {
        self.slots.size()
    }

    /// Tasks created and not yet drained.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Wait for every task created so far, including those created while draining.
    pub async fn drain(&self) {
        loop {
            let batch = std::mem::take(&mut *self.lock_pending());
            if batch.is_empty() {
                return;
            }
            debug!(tasks = batch.len(), "draining pending tasks");
            join_all(batch).await;
        }
    }

    /// Whether some task has not been drained yet.
    pub fn has_pending(&self) -> bool {
        !self.lock_pending().is_empty()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<BoxFuture<'static, ()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FutureManager {
    fn default() -> Self {
        Self::new(8)
    }
}
