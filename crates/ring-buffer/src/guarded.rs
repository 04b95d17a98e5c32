//! Mutex-guarded scalar with wait-for-change

use std::ops::Add;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A single value shared between threads.
///
/// Every access takes the mutex, so `get`, `set` and `increment` are
/// linearizable with respect to each other. Waiters are parked on a
/// condition variable and woken by any write.
#[derive(Debug, Default)]
pub struct GuardedScalar<T> {
    value: Mutex<T>,
    changed: Condvar,
}

impl<T: Copy + PartialEq> GuardedScalar<T> {
    /// Create a guarded scalar holding `value`
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            changed: Condvar::new(),
        }
    }

    /// Read the current value
    pub fn get(&self) -> T {
        *self.lock()
    }

    /// Replace the current value and wake all waiters
    pub fn set(&self, value: T) {
        let mut guard = self.lock();
        *guard = value;
        drop(guard);
        self.changed.notify_all();
    }

    /// Block until another thread changes the value or `timeout` elapses.
    ///
    /// Always returns the value current at wake-up.
    pub fn wait_for_change_or_timeout(&self, timeout: Duration) -> T {
        let guard = self.lock();
        let observed = *guard;
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |v| *v == observed)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    // A poisoned scalar still holds a valid value.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> GuardedScalar<T>
where
    T: Copy + PartialEq + Add<Output = T> + From<u8>,
{
    /// Add one and return the new value
    pub fn increment(&self) -> T {
        let mut guard = self.lock();
        *guard = *guard + T::from(1u8);
        let value = *guard;
        drop(guard);
        self.changed.notify_all();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_get_set_increment() {
        let scalar = GuardedScalar::new(-1i64);
        assert_eq!(scalar.get(), -1);

        assert_eq!(scalar.increment(), 0);
        assert_eq!(scalar.increment(), 1);

        scalar.set(41);
        assert_eq!(scalar.get(), 41);
    }

    #[test]
    fn test_wait_times_out_without_change() {
        let flag = GuardedScalar::new(true);
        let start = Instant::now();

        let value = flag.wait_for_change_or_timeout(Duration::from_millis(20));

        assert!(value);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_wakes_on_change() {
        let flag = Arc::new(GuardedScalar::new(true));
        let setter = Arc::clone(&flag);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set(false);
        });

        let start = Instant::now();
        let value = flag.wait_for_change_or_timeout(Duration::from_secs(5));
        handle.join().unwrap();

        assert!(!value);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = Arc::new(GuardedScalar::new(0i64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 4000);
    }
}
