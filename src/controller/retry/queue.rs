//! # Work Queues
//!
//! Deduplicating multi-consumer queues drained by worker groups. Delivery is
//! at-least-once: an item re-added while it is being processed is delivered
//! again. No FIFO guarantee is promised to callers.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct QueueState<T> {
    items: VecDeque<T>,
    queued: HashSet<T>,
    shut_down: bool,
}

pub struct WorkQueue<T> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("len", &state.items.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                queued: HashSet::new(),
                shut_down: false,
            }),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue `item`. Returns false if it is already waiting or the queue is shut down.
    pub fn add(&self, item: T) -> bool {
        let added = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.shut_down || state.queued.contains(&item) {
                false
            } else {
                state.queued.insert(item.clone());
                state.items.push_back(item);
                true
            }
        };
        if added {
            self.notify.notify_one();
        }
        added
    }

    /// Enqueue `item` once `delay` has elapsed. Needs a tokio runtime.
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Pop without waiting
    pub fn try_next(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let item = state.items.pop_front()?;
        state.queued.remove(&item);
        Some(item)
    }

    /// Wait for the next item. Returns `None` once the queue is shut down and
    /// empty, or when `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_next() {
                return Some(item);
            }
            if self.is_shut_down() {
                return None;
            }

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = &mut notified => {}
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shut_down
    }

    /// Stop accepting items and wake every waiter
    pub fn shut_down(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shut_down = true;
        self.notify.notify_waiters();
    }
}

/// Slow-retry queue: failed items are parked and only released on the poll cycle
pub struct SlowRetryQueue<T> {
    parked: Mutex<Vec<T>>,
    queue: Arc<WorkQueue<T>>,
}

impl<T> fmt::Debug for SlowRetryQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SlowRetryQueue")
            .field("parked", &parked.len())
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T> SlowRetryQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            parked: Mutex::new(Vec::new()),
            queue: Arc::new(WorkQueue::new(name)),
        }
    }

    pub fn park(&self, item: T) {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if !parked.contains(&item) {
            parked.push(item);
        }
    }

    /// Move every parked item onto the queue; returns how many were released
    pub fn release(&self) -> usize {
        let items = std::mem::take(&mut *self.parked.lock().unwrap_or_else(PoisonError::into_inner));
        items.into_iter().filter(|item| self.queue.add(item.clone())).count()
    }

    #[must_use]
    pub fn parked_len(&self) -> usize {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue<T>> {
        &self.queue
    }
}
