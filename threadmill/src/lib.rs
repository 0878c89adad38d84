// Threadmill Worker Pool Implementation
//
// This crate provides a bounded worker-thread pool with backpressure and
// task-expiration semantics, built on a small set of synchronization
// primitives (an exclusive lock, RAII guards, and lock-bound monitors).

pub mod logging;
pub mod pool;
pub mod sync;
pub mod thread;

// Re-export commonly used types
pub use pool::{ManagerState, PoolError, TaskState, ThreadManager, WorkerState};
pub use sync::{AcquireMode, Lock, LockGuard, Monitor, WaitResult};
pub use thread::{OsThread, OsThreadFactory};
pub use threadmill_api::{
    ManagedThread, Runnable, SchedPolicy, ThreadError, ThreadFactory, ThreadPriority,
};
