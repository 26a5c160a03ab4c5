//! Reference implementation of a byte ring using standard library primitives.

use std::{cmp::min, collections::VecDeque};

/// A fixed capacity byte ring backed by [`VecDeque`].
///
/// Mirrors the observable behavior of [`crate::RingBuffer`] one byte at a
/// time. It is slow, but obviously correct, which makes it useful to check
/// other rings against.
#[derive(Debug, Clone)]
pub struct Oracle {
    capacity: usize,
    deque: VecDeque<u8>,
}

impl Oracle {
    /// Create a new instance of this ring.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of bytes this ring can hold.
    #[track_caller]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be > 0");

        Self {
            capacity,
            deque: VecDeque::with_capacity(capacity),
        }
    }

    /// Number of bytes written but not yet read.
    pub fn in_use(&self) -> usize {
        self.deque.len()
    }

    /// Append as many bytes as fit.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let len = min(bytes.len(), self.capacity - self.deque.len());
        self.deque.extend(&bytes[..len]);
        len
    }

    /// Prepend as many trailing bytes as fit.
    pub fn write_tail(&mut self, bytes: &[u8]) -> usize {
        let len = min(bytes.len(), self.capacity - self.deque.len());
        for byte in bytes[bytes.len() - len..].iter().rev() {
            self.deque.push_front(*byte);
        }

        len
    }

    /// Consume as many bytes as requested and available.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let len = min(len, self.deque.len());
        self.deque.drain(..len).collect()
    }

    /// Last `len` bytes written.
    pub fn peek(&self, len: usize) -> Vec<u8> {
        let len = min(len, self.deque.len());
        self.deque.range(self.deque.len() - len..).copied().collect()
    }

    /// Remove all bytes.
    pub fn clear(&mut self) {
        self.deque.clear();
    }
}
