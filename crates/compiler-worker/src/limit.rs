//! Optional cap on concurrently running compiler subprocesses.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Counting semaphore guarding subprocess admission.
#[derive(Debug)]
pub struct ConcurrencyLimit {
    available: Mutex<usize>,
    released: Condvar,
}

impl ConcurrencyLimit {
    /// Creates a shared limit admitting `permits` holders at once (at least
    /// one).
    #[must_use]
    pub fn shared(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            available: Mutex::new(permits.max(1)),
            released: Condvar::new(),
        })
    }

    /// Blocks until a permit is free and returns it.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        Permit {
            limit: Arc::clone(self),
        }
    }

    /// Returns the number of permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.released.notify_one();
    }
}

/// A held admission slot, returned to the limit on drop.
#[derive(Debug)]
pub struct Permit {
    limit: Arc<ConcurrencyLimit>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limit.release();
    }
}
