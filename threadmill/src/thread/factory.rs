use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle, ThreadId};

use tracing::warn;

use threadmill_api::{ManagedThread, Runnable, SchedPolicy, ThreadError, ThreadFactory, ThreadPriority};

use super::panic_message;
use crate::sync::Monitor;

const MB: usize = 1024 * 1024;

/// An OS thread created by [`OsThreadFactory`], not yet running until
/// [`ManagedThread::start`] is called.
pub struct OsThread {
    name: String,
    stack_size: usize,
    detached: bool,
    runnable: Option<Arc<dyn Runnable>>,
    handle: Option<JoinHandle<()>>,
    id: Option<ThreadId>,
}

impl ManagedThread for OsThread {
    fn start(&mut self) -> Result<(), ThreadError> {
        let runnable = self.runnable.take().ok_or(ThreadError::AlreadyStarted)?;

        // Start gate: the spawned thread flips the flag as its very first
        // act, and start() does not return until that has happened.
        let gate = Arc::new(Monitor::new(false));
        let thread_gate = gate.clone();

        let handle = Builder::new()
            .name(self.name.clone())
            .stack_size(self.stack_size)
            .spawn(move || {
                {
                    let mut begun = thread_gate.lock();
                    *begun = true;
                }
                thread_gate.notify_one();
                runnable.run();
            })?;

        self.id = Some(handle.thread().id());

        {
            let mut begun = gate.lock();
            while !*begun {
                gate.wait(&mut begun);
            }
        }

        if self.detached {
            // A detached thread is free-running; dropping the handle is the
            // platform's detach.
            drop(handle);
        } else {
            self.handle = Some(handle);
        }
        Ok(())
    }

    fn join(&mut self) -> Result<(), ThreadError> {
        if self.id.is_none() {
            return Err(ThreadError::NotStarted);
        }
        match self.handle.take() {
            // Detached or already joined: immediate success, per contract.
            None => Ok(()),
            Some(handle) => handle
                .join()
                .map_err(|payload| ThreadError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn id(&self) -> Option<ThreadId> {
        self.id
    }
}

impl Drop for OsThread {
    fn drop(&mut self) {
        // Joinable threads are reaped here if the owner never joined.
        if let Err(err) = self.join() {
            if !matches!(err, ThreadError::NotStarted) {
                warn!("joining thread on drop failed: {err}");
            }
        }
    }
}

impl std::fmt::Debug for OsThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsThread")
            .field("name", &self.name)
            .field("detached", &self.detached)
            .field("id", &self.id)
            .finish()
    }
}

/// Factory for named OS threads with a fixed policy, priority, stack size,
/// and detach disposition.
///
/// Policy and priority are recorded configuration, applied on a best-effort
/// basis — the scheduler knobs they describe are not portably exposed, so on
/// the std backend they inform naming and diagnostics only.
pub struct OsThreadFactory {
    policy: SchedPolicy,
    priority: ThreadPriority,
    stack_size_mb: usize,
    detached: bool,
    next_thread: AtomicUsize,
}

impl OsThreadFactory {
    pub fn new(
        policy: SchedPolicy,
        priority: ThreadPriority,
        stack_size_mb: usize,
        detached: bool,
    ) -> Self {
        Self {
            policy,
            priority,
            stack_size_mb,
            detached,
            next_thread: AtomicUsize::new(0),
        }
    }

    /// Convenience constructor fixing only the detach disposition.
    pub fn detached(detached: bool) -> Self {
        Self::new(SchedPolicy::RoundRobin, ThreadPriority::Normal, 1, detached)
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn priority(&self) -> ThreadPriority {
        self.priority
    }

    pub fn set_priority(&mut self, priority: ThreadPriority) {
        self.priority = priority;
    }

    /// Stack size for newly created threads, in megabytes.
    pub fn stack_size_mb(&self) -> usize {
        self.stack_size_mb
    }

    pub fn set_stack_size_mb(&mut self, value: usize) {
        self.stack_size_mb = value;
    }
}

impl Default for OsThreadFactory {
    fn default() -> Self {
        Self::detached(false)
    }
}

impl ThreadFactory for OsThreadFactory {
    fn new_thread(&self, runnable: Arc<dyn Runnable>) -> Box<dyn ManagedThread> {
        let ordinal = self.next_thread.fetch_add(1, Ordering::Relaxed);
        Box::new(OsThread {
            name: format!("threadmill-{ordinal}"),
            stack_size: self.stack_size_mb * MB,
            detached: self.detached,
            runnable: Some(runnable),
            handle: None,
            id: None,
        })
    }

    fn is_detached(&self) -> bool {
        self.detached
    }
}

impl std::fmt::Debug for OsThreadFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsThreadFactory")
            .field("policy", &self.policy)
            .field("priority", &self.priority)
            .field("stack_size_mb", &self.stack_size_mb)
            .field("detached", &self.detached)
            .finish()
    }
}
