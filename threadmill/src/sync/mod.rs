//! Synchronization primitives the pool is built from.
//!
//! Two pieces: an exclusive [`Lock`] with blocking, try, and timed
//! acquisition, and a [`Monitor`] — a condition variable permanently bound to
//! one lock. Several monitors may share a single lock so that independent
//! conditions ("a task is ready", "the queue has room") can be signaled
//! separately while every state mutation serializes through the one lock.

pub mod lock;
pub mod monitor;

pub use lock::{AcquireMode, Lock, LockGuard};
pub use monitor::{Monitor, WaitResult};
