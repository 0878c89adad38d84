use thiserror::Error;

/// Errors related to managed-thread lifecycle operations.
#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("thread has already been started")]
    AlreadyStarted,
    #[error("thread was never started")]
    NotStarted,
    #[error("thread panicked: {0}")]
    Panicked(String),
}
