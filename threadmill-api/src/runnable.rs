//! The unit-of-work capability.

/// A single executable operation.
///
/// Implementors are shared across threads (`Send + Sync`) because the thread
/// that submits a unit of work is never the thread that runs it. `run` takes
/// `&self`: a runnable owns no execution state of its own, and the same
/// instance may be resubmitted after it has run.
pub trait Runnable: Send + Sync {
    /// Executes the unit of work.
    fn run(&self);
}

/// Closures are runnables.
///
/// This keeps call sites short: `pool.add(Arc::new(|| do_work()), 0, 0)`.
impl<F> Runnable for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) {
        self()
    }
}
