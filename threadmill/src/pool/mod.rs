//! # Worker Pool Module
//!
//! A bounded worker-thread pool with backpressure and task expiration.
//!
//! ## Key Concepts
//! - One shared FIFO task queue, protected by a single pool lock
//! - Three monitors on that lock: task-available, queue-has-space, and
//!   worker-count-changed — independent wakeups, one serialization point
//! - Synchronous resizing: `add_worker`/`remove_worker` return only after the
//!   live worker count has converged on the new target
//! - Expiry at dequeue time: a task whose deadline passed before a worker
//!   picked it up is routed to the expire callback instead of executing
//!
//! ## Design Principles
//! - Error isolation: a panicking unit of work never takes down its worker
//! - Backpressure over loss: a full queue blocks or rejects producers, it
//!   never drops admitted work
//! - No forced cancellation: work that has started always runs to completion

pub mod error;
pub mod manager;
pub mod task;
pub mod worker;

pub use error::PoolError;
pub use manager::{ManagerState, ThreadManager};
pub use task::{ExpireCallback, TaskState};
pub use worker::WorkerState;
