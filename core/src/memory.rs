//! Object recycling pools.
//!
//! Periods, table entries and range buffers are reused rather than freed per
//! use. Each pipeline stage owns its own pools; released storage drains back
//! toward the aggregator through the shared area, so steady-state operation
//! allocates only while the working set is still growing.

/// Resets an object so it can be handed out again by [`Pool::take`] callers.
pub trait Recycle {
    fn recycle(&mut self);
}

/// A freelist of reusable objects.
#[derive(Debug)]
pub struct Pool<T> {
    items: Vec<T>,
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Pool { items: Vec::new() }
    }

    /// Takes an object out of the pool, if one is available. Callers are
    /// responsible for resetting it before use.
    #[inline]
    pub fn take(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Returns an object to the pool.
    #[inline]
    pub fn put(&mut self, item: T) {
        self.items.push(item);
    }

    /// Moves every pooled object out of `other` into `self`.
    pub fn absorb(&mut self, other: &mut Pool<T>) {
        self.items.append(&mut other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}
