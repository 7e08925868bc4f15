use std::collections::VecDeque;

/// Fixed-capacity byte buffer that drops the oldest bytes when full.
#[derive(Debug, Clone)]
pub struct ByteRing {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl ByteRing {
    /// # Panics
    /// Panics if capacity is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ByteRing capacity must be greater than 0");
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, byte: u8) {
        if self.bytes.len() >= self.capacity {
            self.bytes.pop_front();
        }
        self.bytes.push_back(byte);
    }

    pub fn extend(&mut self, data: &[u8]) {
        for &b in data {
            self.push(b);
        }
    }

    /// Finds the first byte accepted by `pred`, discards everything up to and
    /// including it, and returns it. Leaves the buffer untouched on no match.
    pub fn take_first_match(&mut self, mut pred: impl FnMut(u8) -> bool) -> Option<u8> {
        let idx = self.bytes.iter().position(|&b| pred(b))?;
        let matched = self.bytes[idx];
        self.bytes.drain(..=idx);
        Some(matched)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }
}
