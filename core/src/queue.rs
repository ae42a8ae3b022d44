//! Batched multi-producer handoff queues.
//!
//! Threads exchange items through named endpoint pairs. All handles opened
//! with the same `(src, dst)` names share one mutex-protected FIFO; each
//! handle additionally owns a lock-free local FIFO. Producers append locally
//! and splice the whole local list into the shared FIFO at a flush threshold,
//! so the mutex is touched once per batch rather than once per item. Consumers
//! likewise drain the entire shared FIFO into their local list in one splice.
//!
//! Splices are O(1) list appends. The condition variable wait is against a
//! monotonic deadline.

use std::collections::{HashMap, LinkedList};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use thiserror::Error;

/// Local list size at which a default-policy enqueue splices to the shared
/// FIFO.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 5;

/// When an enqueued item becomes visible to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Splice the local list once it reaches the handle's flush threshold.
    Threshold,
    /// Splice this one item straight to the shared FIFO, bypassing the local
    /// list.
    Immediate,
    /// Keep the item local even if the threshold is reached; a later
    /// non-`Hold` enqueue or an explicit flush sends it.
    Hold,
}

/// Outcome of a bounded dequeue.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    /// The deadline passed with nothing available.
    Timeout,
    /// The queue was shut down and is fully drained.
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("endpoint queue is closed")]
    Closed,
}

#[derive(Debug)]
struct FifoInner<T> {
    items: LinkedList<T>,
    refs: usize,
    closed: bool,
}

#[derive(Debug)]
struct SharedFifo<T> {
    inner: Mutex<FifoInner<T>>,
    ready: Condvar,
}

impl<T> SharedFifo<T> {
    fn new() -> Self {
        SharedFifo {
            inner: Mutex::new(FifoInner {
                items: LinkedList::new(),
                refs: 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }
}

/// Registry of named endpoint FIFOs.
///
/// Each `(src, dst)` pair maps to one shared FIFO with a reference count.
/// Dropping the last handle removes the FIFO. The registry lock is always
/// taken before any per-FIFO lock.
#[derive(Debug)]
pub struct QueueRegistry<T> {
    fifos: Mutex<HashMap<(String, String), Arc<SharedFifo<T>>>>,
}

impl<T> QueueRegistry<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(QueueRegistry {
            fifos: Mutex::new(HashMap::new()),
        })
    }

    /// Opens a handle on the `(src, dst)` FIFO, creating it if this is the
    /// first reference.
    pub fn handle(self: &Arc<Self>, src: &str, dst: &str) -> QueueHandle<T> {
        let fifo = {
            let mut fifos = self.fifos.lock().unwrap();
            let fifo = fifos
                .entry((src.to_owned(), dst.to_owned()))
                .or_insert_with(|| Arc::new(SharedFifo::new()));
            fifo.inner.lock().unwrap().refs += 1;
            Arc::clone(fifo)
        };
        QueueHandle {
            registry: Arc::clone(self),
            src: src.to_owned(),
            dst: dst.to_owned(),
            fifo,
            local: LinkedList::new(),
            threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    /// Marks the `(src, dst)` FIFO closed and wakes every waiting consumer.
    /// Pending items remain dequeueable; enqueues fail from here on.
    pub fn close(&self, src: &str, dst: &str) {
        let fifos = self.fifos.lock().unwrap();
        if let Some(fifo) = fifos.get(&(src.to_owned(), dst.to_owned())) {
            fifo.inner.lock().unwrap().closed = true;
            fifo.ready.notify_all();
        }
    }

    fn release(&self, src: &str, dst: &str) {
        let mut fifos = self.fifos.lock().unwrap();
        let key = (src.to_owned(), dst.to_owned());
        let drop_entry = match fifos.get(&key) {
            Some(fifo) => {
                let mut inner = fifo.inner.lock().unwrap();
                inner.refs -= 1;
                inner.refs == 0
            }
            None => false,
        };
        if drop_entry {
            fifos.remove(&key);
        }
    }
}

/// A producer/consumer endpoint with a private local FIFO.
#[derive(Debug)]
pub struct QueueHandle<T> {
    registry: Arc<QueueRegistry<T>>,
    src: String,
    dst: String,
    fifo: Arc<SharedFifo<T>>,
    local: LinkedList<T>,
    threshold: usize,
}

impl<T> QueueHandle<T> {
    /// Appends `item` according to `policy`.
    pub fn enqueue(&mut self, item: T, policy: FlushPolicy) -> Result<(), QueueError> {
        match policy {
            FlushPolicy::Immediate => {
                let mut inner = self.fifo.inner.lock().unwrap();
                if inner.closed {
                    return Err(QueueError::Closed);
                }
                inner.items.push_back(item);
                self.fifo.ready.notify_one();
                Ok(())
            }
            FlushPolicy::Threshold => {
                self.local.push_back(item);
                if self.local.len() >= self.threshold {
                    return self.flush();
                }
                Ok(())
            }
            FlushPolicy::Hold => {
                self.local.push_back(item);
                Ok(())
            }
        }
    }

    /// Splices the local list into the shared FIFO and signals consumers.
    /// A flush with nothing buffered is a no-op.
    pub fn flush(&mut self) -> Result<(), QueueError> {
        if self.local.is_empty() {
            return Ok(());
        }
        let mut inner = self.fifo.inner.lock().unwrap();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.append(&mut self.local);
        self.fifo.ready.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking until one is available. Returns
    /// `None` once the queue is closed and drained.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.local.is_empty() {
            let mut inner = self.fifo.inner.lock().unwrap();
            while inner.items.is_empty() {
                if inner.closed {
                    return None;
                }
                inner = self.fifo.ready.wait(inner).unwrap();
            }
            self.local.append(&mut inner.items);
        }
        self.local.pop_front()
    }

    /// Like [`dequeue`](Self::dequeue) but gives up at `deadline`,
    /// distinguishing a timeout from shutdown.
    pub fn timed_dequeue(&mut self, deadline: Instant) -> Dequeue<T> {
        if self.local.is_empty() {
            let mut inner = self.fifo.inner.lock().unwrap();
            while inner.items.is_empty() {
                if inner.closed {
                    return Dequeue::Closed;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Dequeue::Timeout;
                }
                let (guard, _) = self.fifo.ready.wait_timeout(inner, deadline - now).unwrap();
                inner = guard;
            }
            self.local.append(&mut inner.items);
        }
        match self.local.pop_front() {
            Some(item) => Dequeue::Item(item),
            None => Dequeue::Timeout,
        }
    }

    /// Overrides the local flush threshold.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold.max(1);
    }

    /// Number of items buffered locally on this handle.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Number of items currently in the shared FIFO.
    pub fn shared_len(&self) -> usize {
        self.fifo.inner.lock().unwrap().items.len()
    }
}

impl<T> Drop for QueueHandle<T> {
    fn drop(&mut self) {
        // unflushed local items are discarded with the handle
        self.registry.release(&self.src, &self.dst);
    }
}
