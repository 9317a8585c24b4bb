//! Carry-over buffer for the receive path
//!
//! Bytes read from the port are appended at the head; responses are carved
//! off the tail. Consuming is O(1) instead of shifting a Vec.

/// Largest slice `get_slice` can return across the wrap point
///
/// Covers the biggest response (Pixels: 2 + 15 * 15 * 2 bytes).
pub const MAX_SLICE: usize = 512;

/// Fixed-capacity ring buffer with O(1) advance
pub struct RingBuffer<const N: usize = 8192> {
    data: [u8; N],
    head: usize, // next empty slot
    tail: usize, // first valid byte
    len: usize,
    staging: [u8; MAX_SLICE],
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            len: 0,
            staging: [0u8; MAX_SLICE],
        }
    }

    /// Append bytes, returning how many did not fit and were dropped
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let room = N - self.len;
        let taken = bytes.len().min(room);
        for &b in &bytes[..taken] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % N;
        }
        self.len += taken;
        bytes.len() - taken
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % N])
        } else {
            None
        }
    }

    /// Contiguous view of `len` bytes at `start`
    ///
    /// Borrows the main buffer when possible, otherwise copies into the
    /// staging area.
    pub fn get_slice(&mut self, start: usize, len: usize) -> Option<&[u8]> {
        if start + len > self.len || len > MAX_SLICE {
            return None;
        }

        let real_start = (self.tail + start) % N;
        if real_start + len <= N {
            Some(&self.data[real_start..real_start + len])
        } else {
            for i in 0..len {
                self.staging[i] = self.data[(real_start + i) % N];
            }
            Some(&self.staging[..len])
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
