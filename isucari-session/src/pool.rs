//! FIFO pools of logged-in sessions.
//!
//! A session is owned by exactly one scenario iteration at a time. Callers
//! check one out with [`Pool::checkout`]; the returned [`PoolGuard`] puts it
//! back when dropped, on the success path and the error path alike.

use crate::session::Session;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Non-blocking FIFO queue.
#[derive(Debug)]
pub struct Pool<T> {
    name: &'static str,
    queue: Mutex<VecDeque<T>>,
}

/// Pool of logged-in sessions.
pub type SessionPool = Pool<Session>;

impl<T> Pool<T> {
    /// Create an empty pool; `name` shows up in logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, queue: Mutex::new(VecDeque::new()) }
    }

    /// Pool name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Append at the back.
    pub fn enqueue(&self, value: T) {
        self.queue.lock().push_back(value);
    }

    /// Take from the front; `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    /// Number of idle entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no entry is idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Dequeue into a guard that returns the entry on drop.
    pub fn checkout(self: &Arc<Self>) -> Option<PoolGuard<T>> {
        self.dequeue().map(|value| PoolGuard::new(Arc::clone(self), value))
    }

    /// Wrap an entry that did not come from this pool so it lands here on drop.
    #[must_use]
    pub fn adopt(self: &Arc<Self>, value: T) -> PoolGuard<T> {
        PoolGuard::new(Arc::clone(self), value)
    }
}

/// Scoped ownership of a pooled entry.
#[derive(Debug)]
pub struct PoolGuard<T> {
    pool: Arc<Pool<T>>,
    value: Option<T>,
}

impl<T> PoolGuard<T> {
    fn new(pool: Arc<Pool<T>>, value: T) -> Self {
        Self { pool, value: Some(value) }
    }

    /// Drop the entry instead of returning it, e.g. after its login failed.
    pub fn discard(mut self) -> T {
        // Present until the guard is consumed.
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pool guard emptied before discard"),
        }
    }
}

impl<T> Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pool guard used after discard"),
        }
    }
}

impl<T> DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pool guard used after discard"),
        }
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.enqueue(value);
        }
    }
}
