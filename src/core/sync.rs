use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock a mutex, recovering the data if a panicking event poisoned it.
///
/// Worker panics are caught and reported as fatal errors, so the guarded data
/// is still consistent enough to build a diagnostic snapshot.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Counting semaphore
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is available and take it
    pub fn acquire(&self) {
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    pub fn release(&self) {
        let mut permits = lock(&self.permits);
        *permits += 1;
        self.available.notify_one();
    }

    pub fn available_permits(&self) -> usize {
        *lock(&self.permits)
    }
}

/// Counter of dispatched events that have not finished yet.
///
/// The logical process waits on it before every clock advance.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn enter(&self) {
        *lock(&self.count) += 1;
    }

    pub(crate) fn leave(&self) {
        let mut count = lock(&self.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub(crate) fn wait_idle(&self) {
        let mut count = lock(&self.count);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn current(&self) -> usize {
        *lock(&self.count)
    }
}

/// Leaves the in-flight counter when dropped, including during unwinding
pub(crate) struct InFlightGuard<'a>(&'a InFlight);

impl<'a> InFlightGuard<'a> {
    /// Wrap a slot that was already entered by the dispatcher
    pub(crate) fn adopt(in_flight: &'a InFlight) -> Self {
        Self(in_flight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_semaphore_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire();
        assert_eq!(sem.available_permits(), 0);

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                sem.acquire();
                sem.release();
            })
        };
        thread::sleep(Duration::from_millis(20));
        sem.release();
        waiter.join().unwrap();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_in_flight_guard_leaves_on_panic() {
        let in_flight = Arc::new(InFlight::default());
        in_flight.enter();
        let worker = {
            let in_flight = Arc::clone(&in_flight);
            thread::spawn(move || {
                let _guard = InFlightGuard::adopt(&in_flight);
                panic!("event blew up");
            })
        };
        assert!(worker.join().is_err());
        in_flight.wait_idle();
        assert_eq!(in_flight.current(), 0);
    }
}
