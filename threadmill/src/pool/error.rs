use thiserror::Error;

use super::manager::ManagerState;
use threadmill_api::ThreadError;

/// Errors surfaced by [`ThreadManager`](super::ThreadManager) operations.
///
/// Every abnormal path degrades to "the operation did not happen": the
/// caller's unit of work is not admitted, pool state is unchanged.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("timed out acquiring the pool lock (timeout: {timeout_ms}ms)")]
    LockTimeout { timeout_ms: i64 },
    #[error("operation `{operation}` requires a started pool (state: {state:?})")]
    IllegalState {
        operation: &'static str,
        state: ManagerState,
    },
    #[error("too many pending tasks (limit: {limit})")]
    TooManyPendingTasks { limit: usize },
    #[error("no thread factory configured")]
    NoThreadFactory,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Thread(#[from] ThreadError),
}
