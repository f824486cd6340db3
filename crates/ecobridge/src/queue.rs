//! Command queue
//!
//! Bounded FIFO shared by the command listener (producer) and the dispatcher (single
//! consumer). A retried command goes back to the head so nothing behind it runs first.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::command::QueuedCommand;
use crate::error::{BridgeError, BridgeResult};

pub struct CommandQueue {
    entries: Mutex<VecDeque<QueuedCommand>>,
    ready: Notify,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a new command; fails when the queue is at capacity
    pub fn push_back(&self, entry: QueuedCommand) -> BridgeResult<()> {
        {
            let mut entries = self.entries.lock();
            if entries.len() >= self.capacity {
                return Err(BridgeError::QueueFull {
                    capacity: self.capacity,
                });
            }
            entries.push_back(entry);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Put a popped command back at the head
    ///
    /// Not subject to the capacity check: the slot was freed when it was popped.
    pub fn push_front(&self, entry: QueuedCommand) {
        self.entries.lock().push_front(entry);
        self.ready.notify_one();
    }

    /// Wait for the next command
    ///
    /// Cancel safe: an entry is only removed once the future resolves.
    pub async fn pop(&self) -> QueuedCommand {
        loop {
            if let Some(entry) = self.entries.lock().pop_front() {
                return entry;
            }
            self.ready.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
