//! TEAM_430: Condition variable over the spin lock API.
//!
//! Waiters record a notification generation while still holding the mutex,
//! release it, and back off until the generation moves. Notifiers must bump the
//! generation while holding the same mutex; that ordering is what rules out a
//! lost wakeup between the waiter's predicate check and its release.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{Mutex, MutexGuard, relax};

/// Condition variable paired with a [`Mutex`].
pub struct CondVar {
    generation: AtomicUsize,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
        }
    }

    /// [CV1] Release `guard`, wait for a notification, re-acquire `mutex`.
    ///
    /// `guard` must have been obtained from `mutex`. Spurious returns are
    /// possible; callers re-check their predicate in a loop.
    pub fn wait<'a, T>(&self, mutex: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let seen = self.generation.load(Ordering::Acquire);
        drop(guard);
        while self.generation.load(Ordering::Acquire) == seen {
            relax();
        }
        mutex.lock()
    }

    /// [CV2] Wake every waiter.
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of notifications issued so far.
    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    /// Tests: [CV1] waiter blocks until predicate holds, [CV2] notify wakes it
    #[test]
    fn test_wait_until_predicate() {
        let pair = Arc::new((Mutex::new(0u32), CondVar::new()));
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let pair = pair.clone();
            let done = done.clone();
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let mut guard = lock.lock();
                while *guard < 3 {
                    guard = cv.wait(lock, guard);
                }
                done.store(true, Ordering::SeqCst);
                *guard
            })
        };

        for _ in 0..2 {
            let (lock, cv) = &*pair;
            let mut guard = lock.lock();
            *guard += 1;
            cv.notify_all();
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!done.load(Ordering::SeqCst));

        {
            let (lock, cv) = &*pair;
            let mut guard = lock.lock();
            *guard += 1;
            cv.notify_all();
        }
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn test_generation_counts_notifications() {
        let cv = CondVar::new();
        assert_eq!(cv.generation(), 0);
        cv.notify_all();
        cv.notify_all();
        assert_eq!(cv.generation(), 2);
    }
}
