// crates/orchestrator/src/queue.rs
//! Deduplicating work queue shared by a poller and a reconciler.
//!
//! An item key lives in at most one of three sets at any time:
//! - `inqueue`: waiting in the FIFO to be dequeued
//! - `processing`: dequeued and not yet marked done
//! - `waiting`: scheduled to be enqueued after a delay
//!
//! Any enqueue for a key already present in one of them is dropped, so a
//! resource is never reconciled twice concurrently nor queued twice.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::QueueError;
use crate::event::ReconcileEvent;

/// Producer half of a queue.
pub trait Enqueuer<E: ReconcileEvent>: Send + Sync {
    fn enqueue(&self, item: E);
    fn enqueue_after(&self, item: E, delay: Duration);
}

struct State<E> {
    items: VecDeque<E>,
    inqueue: HashSet<String>,
    processing: HashSet<String>,
    waiting: HashSet<String>,
}

impl<E> State<E> {
    fn tracks(&self, key: &str) -> bool {
        self.inqueue.contains(key) || self.processing.contains(key) || self.waiting.contains(key)
    }
}

struct Inner<E> {
    state: Mutex<State<E>>,
    item_added: Notify,
}

impl<E: ReconcileEvent> Inner<E> {
    /// Caller holds the lock. Returns true when the item was added.
    fn push(state: &mut State<E>, item: E) -> bool {
        let key = item.key();
        if state.tracks(&key) {
            return false;
        }
        state.items.push_back(item);
        state.inqueue.insert(key);
        true
    }

    /// Caller holds the lock.
    fn schedule(self: &Arc<Self>, state: &mut State<E>, item: E, delay: Duration) {
        let key = item.key();
        if state.tracks(&key) {
            return;
        }
        state.waiting.insert(key.clone());

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let added = {
                let mut state = inner.state.lock();
                state.waiting.remove(&key);
                Self::push(&mut state, item)
            };
            if added {
                trace!("Delayed item {} enqueued", key);
                inner.item_added.notify_waiters();
            }
        });
    }
}

/// Cheap to clone; clones share the same queue.
pub struct Queue<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Queue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ReconcileEvent> Default for Queue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ReconcileEvent> Queue<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    inqueue: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashSet::new(),
                }),
                item_added: Notify::new(),
            }),
        }
    }

    /// Append `item` unless its key is already queued, processing or waiting.
    pub fn enqueue(&self, item: E) {
        let added = Inner::push(&mut self.inner.state.lock(), item);
        if added {
            self.inner.item_added.notify_waiters();
        }
    }

    /// Enqueue `item` once `delay` has elapsed. Until then the key counts as
    /// tracked, so plain enqueues of the same item are dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue_after(&self, item: E, delay: Duration) {
        let mut state = self.inner.state.lock();
        self.inner.schedule(&mut state, item, delay);
    }

    /// Wait for the next item and mark it as processing.
    pub async fn dequeue(&self, token: &CancellationToken) -> Result<E, QueueError> {
        loop {
            let notified = self.inner.item_added.notified();
            tokio::pin!(notified);
            // register before checking so an enqueue in between is not missed
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return Ok(item);
            }

            tokio::select! {
                _ = token.cancelled() => return Err(QueueError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    fn try_dequeue(&self) -> Option<E> {
        let mut state = self.inner.state.lock();
        let item = state.items.pop_front()?;
        let key = item.key();
        state.inqueue.remove(&key);
        state.processing.insert(key);
        Some(item)
    }

    /// Stop tracking a dequeued item. Call exactly once per dequeue.
    pub fn done(&self, item: &E) {
        self.inner.state.lock().processing.remove(&item.key());
    }

    /// `done` followed by `enqueue_after` under one lock, so nobody can
    /// enqueue the item in between.
    pub fn requeue_after(&self, item: E, delay: Duration) {
        let mut state = self.inner.state.lock();
        state.processing.remove(&item.key());
        self.inner.schedule(&mut state, item, delay);
    }

    /// Informational only: the answer may be stale by the time it is used.
    pub fn has(&self, item: &E) -> bool {
        self.inner.state.lock().tracks(&item.key())
    }

    /// Number of items waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn processing_count(&self) -> usize {
        self.inner.state.lock().processing.len()
    }
}

impl<E: ReconcileEvent> Enqueuer<E> for Queue<E> {
    fn enqueue(&self, item: E) {
        Queue::enqueue(self, item);
    }

    fn enqueue_after(&self, item: E, delay: Duration) {
        Queue::enqueue_after(self, item, delay);
    }
}
