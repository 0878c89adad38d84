use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use std::sync::Arc;
use tracing::{debug, error};

use threadmill_api::Runnable;

use super::manager::{ManagerState, PoolShared, PoolState};
use super::task::TaskState;
use crate::sync::Lock;
use crate::thread::panic_message;

/// States a worker moves through over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet handed to a thread.
    Uninitialized,
    /// Its thread is being started.
    Starting,
    /// Inside the run loop.
    Started,
    /// Leaving the run loop.
    Stopping,
    /// Run loop finished; the worker is in the pool's dead set.
    Stopped,
}

pub(crate) type WorkerId = u64;

/// A pool worker: repeatedly dequeues and executes tasks.
///
/// A worker is a [`Runnable`] bound to exactly one platform thread. It holds
/// a non-owning handle to the pool internals; the pool owns the worker's
/// thread and reaps it after the run loop exits.
pub(crate) struct Worker {
    id: WorkerId,
    state: Lock<WorkerState>,
    shared: Arc<PoolShared>,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, shared: Arc<PoolShared>) -> Self {
        Self {
            id,
            state: Lock::new(WorkerState::Uninitialized),
            shared,
        }
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// A worker stays active while the pool wants at least this many workers,
    /// or while a `Joining` pool still has queued work to drain.
    fn is_active(pool: &PoolState) -> bool {
        pool.worker_count <= pool.worker_max_count
            || (pool.state == ManagerState::Joining && !pool.tasks.is_empty())
    }
}

impl Runnable for Worker {
    fn run(&self) {
        self.set_state(WorkerState::Started);
        let shared = &self.shared;
        let mut pool = shared.lock.lock();

        // Admission: only enter the loop if the pool still wants this worker.
        let admitted = pool.worker_count < pool.worker_max_count;
        let mut active = admitted;
        if admitted {
            pool.worker_count += 1;
            if pool.worker_count == pool.worker_max_count {
                shared.worker_monitor.notify_all();
            }
        }

        while active {
            active = Self::is_active(&pool);

            while active && pool.tasks.is_empty() {
                pool.idle_count += 1;
                shared.task_monitor.wait(&mut pool);
                active = Self::is_active(&pool);
                pool.idle_count -= 1;
            }

            let mut task = None;
            if active {
                if let Some(mut front) = pool.tasks.pop_front() {
                    if front.state() == TaskState::Waiting {
                        // Resolved here, once, at dequeue time. Anything other
                        // than Executing or TimedOut would break the execution
                        // branch below.
                        let resolved = if front.expired(Instant::now()) {
                            TaskState::TimedOut
                        } else {
                            TaskState::Executing
                        };
                        front.set_state(resolved);
                    }
                    task = Some(front);
                }

                // If the queue just dropped below its cap, wake a producer
                // blocked in add().
                if pool.pending_task_count_max != 0
                    && pool.tasks.len() <= pool.pending_task_count_max - 1
                {
                    shared.space_monitor.notify_one();
                }
            }

            if let Some(mut task) = task {
                match task.state() {
                    TaskState::Executing => {
                        // Release the pool lock so the task cannot block pool
                        // bookkeeping, then reacquire for the next iteration.
                        drop(pool);
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
                        if let Err(payload) = outcome {
                            error!(
                                "worker {} caught a panicking task: {}",
                                self.id,
                                panic_message(payload.as_ref())
                            );
                        }
                        pool = shared.lock.lock();
                    }
                    TaskState::TimedOut => {
                        // The only other state a dequeued task can hold.
                        if let Some(callback) = pool.expire_callback.clone() {
                            callback(task.into_runnable());
                        }
                        pool.expired_count += 1;
                    }
                    _ => {}
                }
            }
        }

        // Final accounting for a worker that is done working. A worker that
        // was never admitted still lands in the dead set so its thread gets
        // reaped, but it has no count to give back.
        self.set_state(WorkerState::Stopping);
        debug!("worker {} leaving the pool", self.id);
        pool.dead_workers.push(self.id);
        if admitted {
            pool.worker_count -= 1;
        }
        if pool.worker_count == pool.worker_max_count {
            shared.worker_monitor.notify_all();
        }
        drop(pool);
        self.set_state(WorkerState::Stopped);
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish()
    }
}
