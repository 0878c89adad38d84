use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

/// How long an acquisition attempt may wait for the lock.
///
/// Encodes the millisecond sentinel used throughout the pool's public
/// surface: `0` waits forever, a negative value tries once, a positive value
/// bounds the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Block until the lock is acquired.
    Blocking,
    /// Try once; give up immediately if the lock is contended.
    Try,
    /// Block for at most this long.
    Timed(Duration),
}

impl AcquireMode {
    /// Translates the timeout sentinel: `0` = wait forever, negative = try
    /// once, positive = bounded wait of that many milliseconds.
    pub fn from_millis(timeout_ms: i64) -> Self {
        if timeout_ms == 0 {
            AcquireMode::Blocking
        } else if timeout_ms < 0 {
            AcquireMode::Try
        } else {
            AcquireMode::Timed(Duration::from_millis(timeout_ms as u64))
        }
    }
}

/// An exclusive lock owning the data it protects.
///
/// At most one guard exists at any instant. Acquisition failures (timeout,
/// contended try) are silent, checkable conditions — `acquire` returns
/// `None` rather than panicking or blocking past its bound, so callers write
/// `let Some(mut state) = lock.acquire(mode) else { /* report */ }`.
pub struct Lock<T> {
    inner: Mutex<T>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) -> LockGuard<'_, T> {
        LockGuard {
            inner: self.inner.lock(),
            owner: self,
        }
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock().map(|guard| LockGuard {
            inner: guard,
            owner: self,
        })
    }

    /// Blocks for at most `timeout`; `None` means the wait expired.
    pub fn timed_lock(&self, timeout: Duration) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock_for(timeout).map(|guard| LockGuard {
            inner: guard,
            owner: self,
        })
    }

    /// Acquires under the given mode.
    pub fn acquire(&self, mode: AcquireMode) -> Option<LockGuard<'_, T>> {
        match mode {
            AcquireMode::Blocking => Some(self.lock()),
            AcquireMode::Try => self.try_lock(),
            AcquireMode::Timed(timeout) => self.timed_lock(timeout),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// RAII guard for a [`Lock`]; releases the lock when dropped.
pub struct LockGuard<'a, T> {
    inner: MutexGuard<'a, T>,
    owner: &'a Lock<T>,
}

impl<'a, T> LockGuard<'a, T> {
    /// Identity of the lock this guard belongs to. Monitors use this to
    /// verify a guard was taken from their paired lock.
    pub(crate) fn owner_ptr(&self) -> *const Lock<T> {
        self.owner as *const Lock<T>
    }

    pub(crate) fn inner_mut(&mut self) -> &mut MutexGuard<'a, T> {
        &mut self.inner
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn sentinel_translation() {
        assert_eq!(AcquireMode::from_millis(0), AcquireMode::Blocking);
        assert_eq!(AcquireMode::from_millis(-1), AcquireMode::Try);
        assert_eq!(
            AcquireMode::from_millis(250),
            AcquireMode::Timed(Duration::from_millis(250))
        );
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = Lock::new(0usize);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        let guard = lock.try_lock().expect("lock should be free after drop");
        assert_eq!(*guard, 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Lock::new(());
        let _held = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn timed_lock_times_out_and_then_succeeds() {
        let lock = Arc::new(Lock::new(()));
        let contender = lock.clone();

        let holder = std::thread::spawn(move || {
            let _guard = contender.lock();
            std::thread::sleep(Duration::from_millis(200));
        });

        // Give the holder a moment to take the lock.
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert!(lock.timed_lock(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() < Duration::from_millis(200));

        assert!(lock.timed_lock(Duration::from_secs(5)).is_some());
        holder.join().expect("holder thread");
    }
}
