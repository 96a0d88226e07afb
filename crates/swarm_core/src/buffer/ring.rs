//! # Ring Buffer
//!
//! Fixed-capacity byte container with wrap-around reads and writes.
//!
//! ## Design
//!
//! - Storage is allocated once at construction and never grows
//! - Writes accept only what fits (partial writes, never blocking)
//! - Reads return what is present, oldest first
//!
//! ```text
//!   read_pos          write_pos
//!      │                  │
//!      ▼                  ▼
//! ┌────┬────┬────┬────┬────┬────┬────┬────┐
//! │    │ AA │ BB │ CC │    │    │    │    │   used = 3
//! └────┴────┴────┴────┴────┴────┴────┴────┘
//! ```

/// Fixed-capacity wrap-around byte buffer.
///
/// Invariant: `0 <= used_space() <= capacity()`.
///
/// # Thread Safety
///
/// NOT thread-safe. Sessions wrap their buffers in a mutex.
///
/// # Example
///
/// ```rust
/// use swarm_core::RingBuffer;
///
/// let mut buffer = RingBuffer::new(16);
/// assert_eq!(buffer.write(&[1u8; 10]), 10);
/// assert_eq!(buffer.write(&[2u8; 10]), 6); // only 6 bytes fit
/// assert_eq!(buffer.read(16).len(), 16);
/// ```
pub struct RingBuffer {
    /// Backing store.
    storage: Box<[u8]>,
    /// Offset of the oldest held byte.
    read_pos: usize,
    /// Offset where the next byte is written.
    write_pos: usize,
    /// Number of bytes currently held.
    used: usize,
}

impl RingBuffer {
    /// Creates a buffer holding at most `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            used: 0,
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the number of bytes currently held.
    #[inline]
    #[must_use]
    pub const fn used_space(&self) -> usize {
        self.used
    }

    /// Returns the number of bytes that can still be written.
    #[inline]
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.used
    }

    /// Returns true if no bytes are held.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns true if no more bytes can be written.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    /// Appends up to `free_space()` bytes from `data`.
    ///
    /// Returns the number of bytes actually copied, which is less than
    /// `data.len()` when the buffer runs out of room.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.free_space());
        if count == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = count.min(capacity - self.write_pos);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);

        let second = count - first;
        if second > 0 {
            self.storage[..second].copy_from_slice(&data[first..count]);
        }

        self.write_pos = (self.write_pos + count) % capacity;
        self.used += count;
        count
    }

    /// Removes and returns up to `max_len` bytes, oldest first.
    #[must_use]
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.used)];
        let count = self.read_into(&mut out);
        out.truncate(count);
        out
    }

    /// Removes up to `out.len()` bytes into `out`, returning the count.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let count = self.peek_into(out);
        self.consume(count)
    }

    /// Copies up to `out.len()` held bytes into `out` without removing them.
    pub fn peek_into(&self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.used);
        if count == 0 {
            return 0;
        }

        let first = count.min(self.capacity() - self.read_pos);
        out[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);

        let second = count - first;
        if second > 0 {
            out[first..count].copy_from_slice(&self.storage[..second]);
        }

        count
    }

    /// Returns a copy of up to `max_len` held bytes without removing them.
    #[must_use]
    pub fn peek(&self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.used)];
        let count = self.peek_into(&mut out);
        out.truncate(count);
        out
    }

    /// Discards up to `len` of the oldest bytes, returning the count discarded.
    pub fn consume(&mut self, len: usize) -> usize {
        let count = len.min(self.used);
        self.read_pos = (self.read_pos + count) % self.capacity();
        self.used -= count;

        // Rewind when drained so the next write is contiguous
        if self.used == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
        }

        count
    }

    /// Drops all held bytes.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.used = 0;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_16_scenario() {
        let mut buffer = RingBuffer::new(16);
        let data: Vec<u8> = (0u8..20).collect();

        assert_eq!(buffer.write(&data[..10]), 10);
        assert_eq!(buffer.used_space(), 10);
        assert_eq!(buffer.free_space(), 6);

        assert_eq!(buffer.write(&data[10..20]), 6);
        assert_eq!(buffer.used_space(), 16);
        assert_eq!(buffer.free_space(), 0);
        assert!(buffer.is_full());

        let out = buffer.read(16);
        assert_eq!(out, &data[..16]);
        assert_eq!(buffer.used_space(), 0);
    }

    #[test]
    fn test_round_trip_across_wrap() {
        let mut buffer = RingBuffer::new(8);

        // Move the offsets so the next write wraps
        assert_eq!(buffer.write(&[9u8; 6]), 6);
        assert_eq!(buffer.read(5).len(), 5);

        let data = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(buffer.write(&data), 6);
        assert_eq!(buffer.read(1), vec![9]);
        assert_eq!(buffer.read(6), data.to_vec());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_returns_only_present_bytes() {
        let mut buffer = RingBuffer::new(32);
        buffer.write(b"hello");

        assert_eq!(buffer.read(100), b"hello".to_vec());
        assert!(buffer.read(100).is_empty());
    }

    #[test]
    fn test_write_never_exceeds_free_space() {
        let mut buffer = RingBuffer::new(10);
        for chunk in [3usize, 4, 5, 6] {
            let free = buffer.free_space();
            let written = buffer.write(&vec![7u8; chunk]);
            assert!(written <= free);
            assert!(buffer.used_space() <= buffer.capacity());
        }
        assert_eq!(buffer.write(b"x"), 0);
    }

    #[test]
    fn test_peek_and_consume() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"abcdef");

        assert_eq!(buffer.peek(3), b"abc".to_vec());
        assert_eq!(buffer.used_space(), 6);

        assert_eq!(buffer.consume(2), 2);
        assert_eq!(buffer.peek(10), b"cdef".to_vec());

        assert_eq!(buffer.consume(100), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buffer = RingBuffer::new(4);
        buffer.write(b"abcd");
        buffer.clear();
        assert_eq!(buffer.free_space(), 4);
        assert_eq!(buffer.write(b"wxyz"), 4);
        assert_eq!(buffer.read(4), b"wxyz".to_vec());
    }

    #[test]
    #[should_panic(expected = "Capacity must be greater than zero")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }
}
