//! The schedulable-thread capability and the factory seam in front of it.

use std::sync::Arc;
use std::thread::ThreadId;

use crate::errors::ThreadError;
use crate::runnable::Runnable;

/// Scheduler policies for newly created threads.
///
/// How (and whether) a policy is honored is up to the factory implementation;
/// platforms that expose no scheduler knobs treat every policy as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// The platform's default time-sharing policy.
    Other,
    /// First-in first-out real-time scheduling.
    Fifo,
    /// Round-robin real-time scheduling.
    RoundRobin,
}

/// Relative thread priorities.
///
/// Absolute priority values depend on the scheduler policy and the OS. A
/// relative priority lets callers express intent without knowing the
/// platform's absolute range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadPriority {
    Lowest,
    Lower,
    Low,
    Normal,
    High,
    Higher,
    Highest,
}

/// A schedulable unit: something that can be started, joined, and identified.
///
/// # Lifecycle
///
/// A managed thread is created idle, started exactly once, and joined at most
/// once. `start` does not return until the underlying OS thread has genuinely
/// begun executing — callers may immediately rely on `id()` and on the thread
/// being live, even for detached threads.
pub trait ManagedThread: Send {
    /// Starts the thread, blocking until it has begun executing.
    fn start(&mut self) -> Result<(), ThreadError>;

    /// Joins the thread.
    ///
    /// Joining a detached thread (or one that was already joined) returns
    /// immediately with no error. Joining a thread whose body panicked
    /// reports the panic payload.
    fn join(&mut self) -> Result<(), ThreadError>;

    /// The thread's platform identifier, available once started.
    fn id(&self) -> Option<ThreadId>;
}

/// Creates and configures the threads that execute runnables.
///
/// A factory fixes the scheduling policy, relative priority, stack size, and
/// detach disposition for every thread it produces, so consumers can treat
/// "give me a thread for this work" as a single operation.
pub trait ThreadFactory: Send + Sync {
    /// Creates a new, not-yet-started thread hosting `runnable`.
    fn new_thread(&self, runnable: Arc<dyn Runnable>) -> Box<dyn ManagedThread>;

    /// Whether threads from this factory are detached (free-running, not
    /// joinable) rather than joinable.
    fn is_detached(&self) -> bool;

    /// The identifier of the calling thread.
    fn current_thread_id(&self) -> ThreadId {
        std::thread::current().id()
    }
}
