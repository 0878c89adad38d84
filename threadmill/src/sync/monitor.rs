use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Condvar;

use super::lock::{Lock, LockGuard};

/// Outcome of a bounded wait on a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// A notification arrived before the deadline.
    Notified,
    /// The deadline passed without a notification.
    TimedOut,
}

impl WaitResult {
    pub fn timed_out(self) -> bool {
        self == WaitResult::TimedOut
    }
}

/// A condition variable permanently bound to one [`Lock`].
///
/// The pairing is fixed at construction: either the monitor allocates and
/// owns a fresh lock ([`Monitor::new`]), or it is handed a shared one
/// ([`Monitor::with_lock`]) so that sibling monitors can signal independent
/// conditions while serializing every state mutation through the same lock.
///
/// # Contract
///
/// `wait`/`wait_for` must be called with a guard taken from the paired lock;
/// passing a guard from any other lock is a programming error and panics.
/// The wait atomically releases the lock and reacquires it before returning.
pub struct Monitor<T> {
    lock: Arc<Lock<T>>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    /// Creates a monitor that allocates and owns its lock.
    pub fn new(value: T) -> Self {
        Self::with_lock(Arc::new(Lock::new(value)))
    }

    /// Creates a monitor bound to an externally supplied lock.
    pub fn with_lock(lock: Arc<Lock<T>>) -> Self {
        Self {
            lock,
            cond: Condvar::new(),
        }
    }

    /// A handle to the paired lock, for sharing with sibling monitors.
    pub fn lock_handle(&self) -> Arc<Lock<T>> {
        self.lock.clone()
    }

    /// Acquires the paired lock.
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.lock.lock()
    }

    /// Waits until notified.
    pub fn wait(&self, guard: &mut LockGuard<'_, T>) {
        self.assert_paired(guard);
        self.cond.wait(guard.inner_mut());
    }

    /// Waits until notified or until `timeout` elapses.
    pub fn wait_for(&self, guard: &mut LockGuard<'_, T>, timeout: Duration) -> WaitResult {
        self.assert_paired(guard);
        if self.cond.wait_for(guard.inner_mut(), timeout).timed_out() {
            WaitResult::TimedOut
        } else {
            WaitResult::Notified
        }
    }

    /// Sentinel form of the bounded wait: `0` means wait forever.
    pub fn wait_ms(&self, guard: &mut LockGuard<'_, T>, timeout_ms: u64) -> WaitResult {
        if timeout_ms == 0 {
            self.wait(guard);
            WaitResult::Notified
        } else {
            self.wait_for(guard, Duration::from_millis(timeout_ms))
        }
    }

    /// Wakes one thread waiting on this monitor.
    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    /// Wakes all threads waiting on this monitor.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    fn assert_paired(&self, guard: &LockGuard<'_, T>) {
        assert!(
            std::ptr::eq(guard.owner_ptr(), Arc::as_ptr(&self.lock)),
            "monitor waited on with a guard from an unrelated lock"
        );
    }
}

impl<T> fmt::Debug for Monitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bounded_wait_times_out() {
        let monitor = Monitor::new(());
        let mut guard = monitor.lock();
        let outcome = monitor.wait_for(&mut guard, Duration::from_millis(20));
        assert!(outcome.timed_out());
    }

    #[test]
    fn notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::new(false));
        let signaler = monitor.clone();

        let waiter = thread::spawn(move || {
            let mut ready = monitor.lock();
            while !*ready {
                monitor.wait(&mut ready);
            }
        });

        {
            let mut ready = signaler.lock();
            *ready = true;
        }
        signaler.notify_one();
        waiter.join().expect("waiter thread");
    }

    #[test]
    fn sibling_monitors_share_one_lock() {
        let first: Monitor<u32> = Monitor::new(0);
        let second = Monitor::with_lock(first.lock_handle());

        {
            let mut value = first.lock();
            *value = 7;
        }
        // Both monitors observe the same protected state.
        assert_eq!(*second.lock(), 7);
    }

    #[test]
    #[should_panic(expected = "unrelated lock")]
    fn foreign_guard_is_a_contract_violation() {
        let monitor = Monitor::new(());
        let other = Lock::new(());
        let mut guard = other.lock();
        monitor.wait_for(&mut guard, Duration::from_millis(1));
    }
}
