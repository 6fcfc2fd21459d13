use std::collections::VecDeque;
use std::sync::Mutex;

use crate::message::WireMessage;

/// FIFO buffer of built messages awaiting dispatch.
///
/// Every mutation happens under one short lock, so two drains can never
/// observe overlapping slices. The queue is unbounded.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: Mutex<VecDeque<WireMessage>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns the resulting queue length.
    pub fn push(&self, message: WireMessage) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_back(message);
        pending.len()
    }

    /// Appends `message`; if the queue then holds at least `threshold`
    /// messages, removes and returns the oldest `threshold` of them.
    pub fn push_and_take_full(&self, message: WireMessage, threshold: usize) -> Option<Vec<WireMessage>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_back(message);
        if pending.len() >= threshold {
            Some(pending.drain(..threshold).collect())
        } else {
            None
        }
    }

    /// Removes up to `max` of the oldest messages.
    pub fn take_slice(&self, max: usize) -> Vec<WireMessage> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let count = max.min(pending.len());
        pending.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::*;

    fn message(key: &str, tm: i64) -> WireMessage {
        WireMessage::new(key, None, json!("u1"), Map::new(), Some(tm))
    }

    #[test]
    fn slices_come_out_in_insertion_order() {
        let queue = MessageQueue::new();
        for tm in 0..5 {
            queue.push(message("login", tm));
        }

        let first = queue.take_slice(3);
        let rest = queue.take_slice(3);

        assert_eq!(first.iter().map(|m| m.tm).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(rest.iter().map(|m| m.tm).collect::<Vec<_>>(), vec![3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn push_and_take_full_drains_exactly_threshold() {
        let queue = MessageQueue::new();
        assert!(queue.push_and_take_full(message("a", 1), 2).is_none());

        let slice = queue
            .push_and_take_full(message("a", 2), 2)
            .expect("threshold reached");

        assert_eq!(slice.len(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn take_slice_on_empty_queue_is_empty() {
        assert!(MessageQueue::new().take_slice(10).is_empty());
    }
}
