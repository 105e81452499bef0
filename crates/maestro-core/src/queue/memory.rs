//! In-memory queue implementation.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::Task;
use crate::error::QueueError;

/// In-memory queue state.
struct QueueState {
    /// Ready tasks, oldest first.
    items: VecDeque<Task>,

    /// Enqueued but not yet marked done (queued + in flight).
    unfinished: usize,

    /// Slots handed out by `reserve` and not yet pushed or released.
    reserved: usize,

    /// Set on shutdown; enqueue is rejected from then on.
    closed: bool,
}

/// FIFO hand-off between submitters and the run loop.
///
/// Design:
/// - Many producers, one consumer.
/// - The lock is a plain `std::sync::Mutex` that is never held across an
///   `.await`, so accounting (`task_done`) also works from `Drop`.
/// - Wake-ups go through `Notify`. Every waiter enables its `Notified`
///   before re-checking the state, so a notification sent in between is
///   not lost.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    item_ready: Notify,
    space_ready: Notify,
    drained: Notify,
}

impl TaskQueue {
    /// `capacity = None` means unbounded.
    fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
                reserved: 0,
                closed: false,
            }),
            capacity,
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task.
    ///
    /// Returns immediately on an unbounded queue. On a bounded queue this
    /// waits while the queue is full. Fails once the queue is closed.
    pub async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        self.reserve().await?.push(task)
    }

    /// Wait for room for one task and hold it.
    ///
    /// Cancel-safe: nothing is reserved unless the future completes. The
    /// slot goes back to the queue if the `Reservation` is dropped unused.
    pub async fn reserve(&self) -> Result<Reservation<'_>, QueueError> {
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                let taken = state.items.len() + state.reserved;
                if self.capacity.is_none_or(|cap| taken < cap) {
                    state.reserved += 1;
                    return Ok(Reservation {
                        queue: self,
                        used: false,
                    });
                }
            }

            space.await;
        }
    }

    /// Take the oldest task, waiting until one is available.
    ///
    /// Cancel-safe: a task is only removed in the same poll that returns it.
    pub async fn dequeue(&self) -> Task {
        loop {
            let ready = self.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if let Some(task) = self.try_dequeue() {
                return task;
            }

            ready.await;
        }
    }

    /// Take the oldest task if there is one.
    pub fn try_dequeue(&self) -> Option<Task> {
        let task = self.lock().items.pop_front();
        if task.is_some() && self.capacity.is_some() {
            self.space_ready.notify_one();
        }
        task
    }

    /// Mark one dequeued task as finished.
    pub fn task_done(&self) -> Result<(), QueueError> {
        let mut state = self.lock();
        state.unfinished = state
            .unfinished
            .checked_sub(1)
            .ok_or(QueueError::TaskDoneUnderflow)?;

        if state.unfinished == 0 {
            drop(state);
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Wait until every enqueued task has been marked done.
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            let outstanding = self.outstanding();
            if outstanding == 0 {
                return;
            }

            drained.await;
        }
    }

    /// Reject further enqueues. Producers blocked on a full queue are woken
    /// and get `QueueError::Closed`. Already queued tasks stay.
    pub fn close(&self) {
        self.lock().closed = true;
        self.space_ready.notify_waiters();
    }

    /// Tasks waiting in the queue (not including the one in flight).
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Queued plus in-flight tasks.
    pub fn outstanding(&self) -> usize {
        self.lock().unfinished
    }

}

/// A slot held in a `TaskQueue`.
pub struct Reservation<'a> {
    queue: &'a TaskQueue,
    used: bool,
}

impl Reservation<'_> {
    /// Push into the held slot without waiting.
    ///
    /// Fails if the queue was closed after the slot was reserved; the slot
    /// is released either way.
    pub fn push(mut self, task: Task) -> Result<(), QueueError> {
        let queue = self.queue;
        let mut state = queue.lock();
        state.reserved -= 1;
        self.used = true;
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.items.push_back(task);
        state.unfinished += 1;
        drop(state);
        queue.item_ready.notify_one();
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.used {
            self.queue.lock().reserved -= 1;
            self.queue.space_ready.notify_one();
        }
    }
}
