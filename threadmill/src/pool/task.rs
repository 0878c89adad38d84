use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use threadmill_api::Runnable;

/// Invoked for each task that expires without running. Receives the expired
/// unit of work. Runs with the pool lock held — it must not call back into
/// the pool.
pub type ExpireCallback = Arc<dyn Fn(Arc<dyn Runnable>) + Send + Sync>;

/// Lifecycle of a queued task.
///
/// Transitions are one-way: `Waiting → Executing → Complete`, or
/// `Waiting → TimedOut` for a task whose deadline passed before a worker
/// dequeued it. A `TimedOut` task never runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Executing,
    TimedOut,
    Complete,
}

/// A submitted unit of work, owned by the queue until a worker dequeues it.
pub(crate) struct Task {
    runnable: Arc<dyn Runnable>,
    state: TaskState,
    expire_at: Option<Instant>,
}

impl Task {
    pub(crate) fn new(runnable: Arc<dyn Runnable>, expire_at: Option<Instant>) -> Self {
        Self {
            runnable,
            state: TaskState::Waiting,
            expire_at,
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Whether the task's deadline, if any, has passed.
    pub(crate) fn expired(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(deadline) if deadline < now)
    }

    /// Runs the wrapped unit of work. Only an `Executing` task runs; the
    /// dequeuing worker is responsible for resolving `Waiting` first.
    pub(crate) fn run(&mut self) {
        if self.state == TaskState::Executing {
            self.runnable.run();
            self.state = TaskState::Complete;
        }
    }

    pub(crate) fn runnable(&self) -> &Arc<dyn Runnable> {
        &self.runnable
    }

    pub(crate) fn into_runnable(self) -> Arc<dyn Runnable> {
        self.runnable
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state)
            .field("expire_at", &self.expire_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_runnable() -> (Arc<dyn Runnable>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let cloned = counter.clone();
        let runnable: Arc<dyn Runnable> = Arc::new(move || {
            cloned.fetch_add(1, Ordering::SeqCst);
        });
        (runnable, counter)
    }

    #[test]
    fn waiting_task_does_not_run() {
        let (runnable, counter) = counting_runnable();
        let mut task = Task::new(runnable, None);

        task.run();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Waiting);
    }

    #[test]
    fn executing_task_runs_once_and_completes() {
        let (runnable, counter) = counting_runnable();
        let mut task = Task::new(runnable, None);

        task.set_state(TaskState::Executing);
        task.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Complete);

        // Complete is terminal; running again is a no-op.
        task.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expiry_is_relative_to_the_deadline() {
        let (runnable, _) = counting_runnable();
        let now = Instant::now();
        let task = Task::new(runnable, Some(now + Duration::from_millis(50)));

        assert!(!task.expired(now));
        assert!(task.expired(now + Duration::from_millis(51)));
    }

    #[test]
    fn task_without_deadline_never_expires() {
        let (runnable, _) = counting_runnable();
        let task = Task::new(runnable, None);
        assert!(!task.expired(Instant::now() + Duration::from_secs(3600)));
    }
}
