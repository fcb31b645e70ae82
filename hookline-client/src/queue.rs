//! Thread-safe FIFO queues shared between the socket, the worker and the
//! dispatcher.

use hookline_protocol::{Command, Reply};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Inbound queue: commands decoded from the socket, waiting for dispatch.
pub type CommandQueue = SyncQueue<Command>;

/// Outbound queue: replies waiting to be sent.
pub type ReplyQueue = SyncQueue<Reply>;

/// Unbounded multi-producer/multi-consumer FIFO.
#[derive(Debug)]
pub struct SyncQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an item at the back.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Removes the item at the front.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Takes every item currently queued, oldest first.
    ///
    /// Items pushed after the call are left for the next drain.
    pub fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.items.lock())
    }

    /// Discards every queued item, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
