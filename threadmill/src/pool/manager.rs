use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tracing::{error, info};

use threadmill_api::{ManagedThread, Runnable, ThreadFactory};

use super::error::PoolError;
use super::task::{ExpireCallback, Task};
use super::worker::{Worker, WorkerId, WorkerState};
use crate::sync::{AcquireMode, Lock, LockGuard, Monitor};
use crate::thread::OsThreadFactory;

/// Pool lifecycle states.
///
/// `start()` moves `Uninitialized → Started`; `stop()` moves
/// `Started → Joining → Stopped`. `Stopped` is terminal. `Stopping` is part
/// of the shutdown vocabulary recognized by re-entrant `stop()` calls but is
/// never the resting state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Started,
    /// Shutdown requested; workers may still be draining queued tasks.
    Joining,
    Stopping,
    Stopped,
}

/// Everything the pool lock protects.
pub(crate) struct PoolState {
    pub(crate) state: ManagerState,
    pub(crate) worker_count: usize,
    pub(crate) worker_max_count: usize,
    pub(crate) idle_count: usize,
    /// 0 means the queue is unbounded.
    pub(crate) pending_task_count_max: usize,
    pub(crate) expired_count: usize,
    pub(crate) tasks: VecDeque<Task>,
    pub(crate) workers: HashMap<WorkerId, Box<dyn ManagedThread>>,
    pub(crate) dead_workers: Vec<WorkerId>,
    /// Platform thread id → worker id, for the worker-self-add guard and
    /// for reaping.
    pub(crate) id_map: HashMap<ThreadId, WorkerId>,
    pub(crate) factory: Option<Arc<dyn ThreadFactory>>,
    pub(crate) expire_callback: Option<ExpireCallback>,
}

/// The lock and its three monitors, shared between the manager and every
/// worker. All three monitors are bound to the one pool lock so that their
/// wakeups never race with state mutation visible to the others.
pub(crate) struct PoolShared {
    pub(crate) lock: Arc<Lock<PoolState>>,
    /// Signaled when a task lands in the queue and a worker is idle.
    pub(crate) task_monitor: Monitor<PoolState>,
    /// Signaled when the queue drops back below its cap.
    pub(crate) space_monitor: Monitor<PoolState>,
    /// Signaled when the live worker count converges on the target.
    pub(crate) worker_monitor: Monitor<PoolState>,
}

/// The pool: orchestrates the task queue, the worker set, capacity limits,
/// expiration sweeping, and the lifecycle state machine.
///
/// # Construction
///
/// Two preconfigured modes:
/// - [`ThreadManager::new`] — unbounded queue, no workers, no factory; the
///   caller wires a [`ThreadFactory`] and adds workers explicitly.
/// - [`ThreadManager::with_workers`] — the "simple" manager: a default
///   [`OsThreadFactory`], a pending-task cap, and a worker count that is
///   spawned automatically during `start()`.
///
/// # Concurrency
///
/// Every method takes `&self`; share the manager across threads with `Arc`.
/// Tasks execute with the pool lock released, so a slow or blocking unit of
/// work starves only the worker running it, never pool bookkeeping.
pub struct ThreadManager {
    shared: Arc<PoolShared>,
    next_worker_id: AtomicU64,
    initial_workers: usize,
}

impl ThreadManager {
    /// An unbounded manager with no default workers and no thread factory.
    pub fn new() -> Self {
        Self::build(0, 0, None)
    }

    /// A "simple" manager: `worker_count` workers added automatically on
    /// `start()`, queue capped at `pending_task_count_max` (0 = unbounded),
    /// threads from a default [`OsThreadFactory`].
    pub fn with_workers(worker_count: usize, pending_task_count_max: usize) -> Self {
        Self::build(
            worker_count,
            pending_task_count_max,
            Some(Arc::new(OsThreadFactory::default())),
        )
    }

    fn build(
        initial_workers: usize,
        pending_task_count_max: usize,
        factory: Option<Arc<dyn ThreadFactory>>,
    ) -> Self {
        let lock = Arc::new(Lock::new(PoolState {
            state: ManagerState::Uninitialized,
            worker_count: 0,
            worker_max_count: 0,
            idle_count: 0,
            pending_task_count_max,
            expired_count: 0,
            tasks: VecDeque::new(),
            workers: HashMap::new(),
            dead_workers: Vec::new(),
            id_map: HashMap::new(),
            factory,
            expire_callback: None,
        }));
        let shared = Arc::new(PoolShared {
            task_monitor: Monitor::with_lock(lock.clone()),
            space_monitor: Monitor::with_lock(lock.clone()),
            worker_monitor: Monitor::with_lock(lock.clone()),
            lock,
        });
        Self {
            shared,
            next_worker_id: AtomicU64::new(0),
            initial_workers,
        }
    }

    /// Starts the manager.
    ///
    /// Requires a configured thread factory; a missing factory is a reported
    /// misconfiguration and leaves the state unchanged. Starting an already
    /// started manager is a no-op; starting a stopped one is an illegal
    /// state. The "simple" construction mode spawns its preconfigured
    /// workers on the first successful start.
    pub fn start(&self) -> Result<(), PoolError> {
        let newly_started = {
            let mut pool = self.shared.lock.lock();
            match pool.state {
                ManagerState::Stopped => {
                    error!("start: thread manager is already stopped");
                    return Err(PoolError::IllegalState {
                        operation: "start",
                        state: ManagerState::Stopped,
                    });
                }
                ManagerState::Uninitialized => {
                    if pool.factory.is_none() {
                        error!("start: no thread factory configured");
                        return Err(PoolError::NoThreadFactory);
                    }
                    pool.state = ManagerState::Started;
                    self.shared.task_monitor.notify_all();
                    true
                }
                _ => false,
            }
        };

        if newly_started && self.initial_workers > 0 {
            self.add_worker(self.initial_workers)?;
        }
        Ok(())
    }

    /// Stops the manager: lowers the worker target to zero, lets workers
    /// drain the queue (the `Joining` phase), reaps every worker thread, and
    /// lands in `Stopped`. Idempotent — re-entering while shutdown is in
    /// progress or complete returns immediately.
    pub fn stop(&self) {
        let mut pool = self.shared.lock.lock();
        if matches!(
            pool.state,
            ManagerState::Stopping | ManagerState::Joining | ManagerState::Stopped
        ) {
            return;
        }

        pool.state = ManagerState::Joining;
        let target = pool.worker_max_count;
        if let Err(err) = self.remove_workers_locked(&mut pool, target) {
            error!("stop: failed to drain workers: {err}");
        }
        pool.state = ManagerState::Stopped;
        info!("thread manager stopped");
    }

    pub fn state(&self) -> ManagerState {
        self.shared.lock.lock().state
    }

    pub fn thread_factory(&self) -> Option<Arc<dyn ThreadFactory>> {
        self.shared.lock.lock().factory.clone()
    }

    /// Installs a thread factory. A replacement factory must preserve the
    /// detach disposition of the current one: live workers were created
    /// under the old disposition and the reaping logic must stay coherent.
    pub fn set_thread_factory(&self, factory: Arc<dyn ThreadFactory>) -> Result<(), PoolError> {
        let mut pool = self.shared.lock.lock();
        if let Some(current) = &pool.factory {
            if current.is_detached() != factory.is_detached() {
                error!("set_thread_factory: detached disposition mismatch");
                return Err(PoolError::InvalidArgument(
                    "replacement thread factory must preserve the detached disposition".into(),
                ));
            }
        }
        pool.factory = Some(factory);
        Ok(())
    }

    /// Spawns `count` workers and raises the worker target by `count`.
    /// Synchronous: does not return until every new worker has entered its
    /// run loop.
    pub fn add_worker(&self, count: usize) -> Result<(), PoolError> {
        if count == 0 {
            return Ok(());
        }

        let factory = self.shared.lock.lock().factory.clone().ok_or_else(|| {
            error!("add_worker: no thread factory configured");
            PoolError::NoThreadFactory
        })?;

        // Create the workers and their threads before touching pool counts.
        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let worker = Arc::new(Worker::new(id, self.shared.clone()));
            worker.set_state(WorkerState::Starting);
            let thread = factory.new_thread(worker);
            spawned.push((id, thread));
        }

        let mut pool = self.shared.lock.lock();
        if matches!(
            pool.state,
            ManagerState::Joining | ManagerState::Stopping | ManagerState::Stopped
        ) {
            error!("add_worker: thread manager is shutting down");
            return Err(PoolError::IllegalState {
                operation: "add_worker",
                state: pool.state,
            });
        }
        pool.worker_max_count += count;

        let mut first_error = None;
        for (id, mut thread) in spawned {
            match thread.start() {
                Ok(()) => {
                    if let Some(thread_id) = thread.id() {
                        pool.id_map.insert(thread_id, id);
                    }
                    pool.workers.insert(id, thread);
                }
                Err(err) => {
                    // This thread will never arrive; don't wait for it.
                    error!("add_worker: failed to start worker thread: {err}");
                    pool.worker_max_count -= 1;
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        while pool.worker_count != pool.worker_max_count {
            self.shared.worker_monitor.wait(&mut pool);
        }

        match first_error {
            None => Ok(()),
            Some(err) => Err(err.into()),
        }
    }

    /// Lowers the worker target by `count` and blocks until that many
    /// workers have exited. Idle workers are preferred; workers mid-task
    /// finish their task first. Exited threads are joined (joinable
    /// factories) and reaped.
    pub fn remove_worker(&self, count: usize) -> Result<(), PoolError> {
        let mut pool = self.shared.lock.lock();
        self.remove_workers_locked(&mut pool, count)
    }

    fn remove_workers_locked(
        &self,
        pool: &mut LockGuard<'_, PoolState>,
        count: usize,
    ) -> Result<(), PoolError> {
        if count > pool.worker_max_count {
            error!(
                "remove_worker: cannot remove {count} workers (current max: {})",
                pool.worker_max_count
            );
            return Err(PoolError::InvalidArgument(format!(
                "cannot remove {count} workers: only {} exist",
                pool.worker_max_count
            )));
        }

        pool.worker_max_count -= count;

        if pool.idle_count > count {
            // More idle workers than we need to remove: wake exactly enough
            // of them to terminate.
            for _ in 0..count {
                self.shared.task_monitor.notify_one();
            }
        } else {
            // Wake everyone; surplus workers recheck and resume waiting.
            self.shared.task_monitor.notify_all();
        }

        while pool.worker_count != pool.worker_max_count {
            self.shared.worker_monitor.wait(pool);
        }

        let detached = pool
            .factory
            .as_ref()
            .map(|factory| factory.is_detached())
            .unwrap_or(true);
        for id in std::mem::take(&mut pool.dead_workers) {
            if let Some(mut thread) = pool.workers.remove(&id) {
                if let Some(thread_id) = thread.id() {
                    pool.id_map.remove(&thread_id);
                }
                // Joinable factories join threads as they are reaped.
                if !detached {
                    if let Err(err) = thread.join() {
                        error!("remove_worker: failed to join worker thread: {err}");
                    }
                }
            }
        }
        Ok(())
    }

    /// Submits a unit of work.
    ///
    /// `timeout_ms` bounds how long this call may wait — first for the pool
    /// lock, then for queue space: `0` waits forever, a negative value tries
    /// once, a positive value waits up to that many milliseconds per wait.
    /// `expiration_ms` (0 = never) is the task's time-to-live while queued;
    /// a task not dequeued within it is expired instead of run.
    ///
    /// When the queue is at its cap the call first sweeps one expired task
    /// to free a slot. If the queue is still full, callers that are pool
    /// workers themselves — or that asked for try-once — get
    /// [`PoolError::TooManyPendingTasks`] instead of blocking, which is what
    /// keeps a worker from deadlocking against its own pool.
    pub fn add(
        &self,
        runnable: Arc<dyn Runnable>,
        timeout_ms: i64,
        expiration_ms: i64,
    ) -> Result<(), PoolError> {
        let Some(mut pool) = self.shared.lock.acquire(AcquireMode::from_millis(timeout_ms)) else {
            error!("add: timed out acquiring the pool lock ({timeout_ms}ms)");
            return Err(PoolError::LockTimeout { timeout_ms });
        };

        if pool.state != ManagerState::Started {
            error!("add: thread manager not started");
            return Err(PoolError::IllegalState {
                operation: "add",
                state: pool.state,
            });
        }

        // At the limit: see whether discarding one expired task clears it.
        if pool.pending_task_count_max > 0 && pool.tasks.len() >= pool.pending_task_count_max {
            Self::remove_expired_locked(&mut pool, true);
        }

        if pool.pending_task_count_max > 0 && pool.tasks.len() >= pool.pending_task_count_max {
            if Self::can_sleep(&pool) && timeout_ms >= 0 {
                while pool.pending_task_count_max > 0
                    && pool.tasks.len() >= pool.pending_task_count_max
                {
                    self.shared.space_monitor.wait_ms(&mut pool, timeout_ms as u64);
                }
            } else {
                let limit = pool.pending_task_count_max;
                error!("add: too many pending tasks (limit: {limit})");
                return Err(PoolError::TooManyPendingTasks { limit });
            }
        }

        let expire_at = match expiration_ms {
            0 => None,
            ms if ms < 0 => Some(Instant::now()),
            ms => Some(Instant::now() + Duration::from_millis(ms as u64)),
        };
        pool.tasks.push_back(Task::new(runnable, expire_at));

        // One new task: at most one idle worker needs waking. Busy workers
        // will get to it in time.
        if pool.idle_count > 0 {
            self.shared.task_monitor.notify_one();
        }
        Ok(())
    }

    /// Removes the first still-pending task wrapping exactly this unit of
    /// work (pointer identity). A task already dequeued by a worker is left
    /// alone — removal never interrupts execution.
    pub fn remove(&self, runnable: &Arc<dyn Runnable>) -> Result<(), PoolError> {
        let mut pool = self.shared.lock.lock();
        if pool.state != ManagerState::Started {
            error!("remove: thread manager not started");
            return Err(PoolError::IllegalState {
                operation: "remove",
                state: pool.state,
            });
        }
        if let Some(position) = pool
            .tasks
            .iter()
            .position(|task| Arc::ptr_eq(task.runnable(), runnable))
        {
            pool.tasks.remove(position);
        }
        Ok(())
    }

    /// Pops and returns the unit of work that would run next, without
    /// executing it. `None` when nothing is pending.
    pub fn remove_next_pending(&self) -> Result<Option<Arc<dyn Runnable>>, PoolError> {
        let mut pool = self.shared.lock.lock();
        if pool.state != ManagerState::Started {
            error!("remove_next_pending: thread manager not started");
            return Err(PoolError::IllegalState {
                operation: "remove_next_pending",
                state: pool.state,
            });
        }
        Ok(pool.tasks.pop_front().map(Task::into_runnable))
    }

    /// Sweeps the whole queue, discarding every task whose deadline has
    /// passed. Each one is routed to the expire callback and counted.
    pub fn remove_expired_tasks(&self) {
        let mut pool = self.shared.lock.lock();
        Self::remove_expired_locked(&mut pool, false);
    }

    fn remove_expired_locked(pool: &mut PoolState, just_one: bool) {
        let now = Instant::now();
        let mut index = 0;
        while index < pool.tasks.len() {
            if pool.tasks[index].expired(now) {
                if let Some(task) = pool.tasks.remove(index) {
                    if let Some(callback) = pool.expire_callback.clone() {
                        callback(task.into_runnable());
                    }
                    pool.expired_count += 1;
                    if just_one {
                        return;
                    }
                }
            } else {
                index += 1;
            }
        }
    }

    /// Installs the callback invoked for each task that expires without
    /// running. The callback runs with the pool lock held and must not call
    /// back into the pool.
    pub fn set_expire_callback<F>(&self, callback: F)
    where
        F: Fn(Arc<dyn Runnable>) + Send + Sync + 'static,
    {
        self.shared.lock.lock().expire_callback = Some(Arc::new(callback));
    }

    /// True when the calling thread may block inside `add` — i.e. it is not
    /// one of this pool's own workers.
    fn can_sleep(pool: &PoolState) -> bool {
        !pool.id_map.contains_key(&std::thread::current().id())
    }

    pub fn worker_count(&self) -> usize {
        self.shared.lock.lock().worker_count
    }

    pub fn idle_worker_count(&self) -> usize {
        self.shared.lock.lock().idle_count
    }

    pub fn pending_task_count(&self) -> usize {
        self.shared.lock.lock().tasks.len()
    }

    /// Pending plus currently executing tasks.
    pub fn total_task_count(&self) -> usize {
        let pool = self.shared.lock.lock();
        pool.tasks.len() + pool.worker_count - pool.idle_count
    }

    pub fn pending_task_count_max(&self) -> usize {
        self.shared.lock.lock().pending_task_count_max
    }

    /// Caps the queue at `value` pending tasks; 0 removes the cap.
    pub fn set_pending_task_count_max(&self, value: usize) {
        self.shared.lock.lock().pending_task_count_max = value;
    }

    /// Number of tasks expired without running since construction.
    pub fn expired_task_count(&self) -> usize {
        self.shared.lock.lock().expired_count
    }
}

impl Default for ThreadManager {
    /// A "simple" manager sized to the machine: one worker per logical CPU,
    /// unbounded queue.
    fn default() -> Self {
        Self::with_workers(num_cpus::get(), 0)
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.shared.lock.lock();
        f.debug_struct("ThreadManager")
            .field("state", &pool.state)
            .field("worker_count", &pool.worker_count)
            .field("worker_max_count", &pool.worker_max_count)
            .field("idle_count", &pool.idle_count)
            .field("pending_tasks", &pool.tasks.len())
            .field("pending_task_count_max", &pool.pending_task_count_max)
            .field("expired_count", &pool.expired_count)
            .finish()
    }
}
