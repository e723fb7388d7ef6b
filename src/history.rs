//! Bounded in-memory history of recently consumed messages

use crate::message::Message;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Fixed-capacity ordered buffer of recently consumed messages.
///
/// Append-at-tail, evict-from-head: once the buffer is full, each append
/// drops the oldest entry. Written by the consumption loop, read concurrently
/// by any number of snapshot callers.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: RwLock<VecDeque<Message>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entries while over capacity
    pub fn append(&self, message: Message) {
        let mut entries = self.entries.write();
        entries.push_back(message);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Point-in-time copy of the buffer contents, oldest first.
    ///
    /// Safe to iterate without holding any lock on the live buffer; later
    /// appends do not change a snapshot already taken.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.read().iter().cloned().collect()
    }

    /// Current number of retained messages
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the buffer holds no messages
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of retained messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(key: &str) -> Message {
        Message::new(key, format!("value-{}", key))
    }

    #[test]
    fn test_append_within_capacity() {
        let buffer = HistoryBuffer::new(3);
        assert!(buffer.is_empty());

        buffer.append(msg("a"));
        buffer.append(msg("b"));

        assert_eq!(buffer.len(), 2);
        let keys: Vec<_> = buffer.snapshot().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_eviction_drops_oldest_first() {
        let buffer = HistoryBuffer::new(3);
        for key in ["a", "b", "c", "d"] {
            buffer.append(msg(key));
        }

        assert_eq!(buffer.len(), 3);
        let keys: Vec<_> = buffer.snapshot().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let buffer = HistoryBuffer::new(5);
        for i in 0..100 {
            buffer.append(msg(&format!("k{}", i)));
            assert!(buffer.len() <= 5);
        }

        let keys: Vec<_> = buffer.snapshot().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["k95", "k96", "k97", "k98", "k99"]);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let buffer = HistoryBuffer::new(3);
        buffer.append(msg("a"));
        buffer.append(msg("b"));

        let snapshot = buffer.snapshot();
        buffer.append(msg("c"));
        buffer.append(msg("d"));

        let keys: Vec<_> = snapshot.into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let buffer = HistoryBuffer::new(0);
        buffer.append(msg("a"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 0);
    }
}
