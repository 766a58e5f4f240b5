//! Fixed-capacity circular byte buffer
//!
//! Decouples the producer and consumer of raw PCM bytes without allocating
//! per frame. Wrap-around is done with two copies (tail, then head).
//!
//! The buffer has no internal locking: its owner must make sure there is a
//! single producer and a single consumer and serialise them itself.

use crate::error::{DAudioError, Result};

/// Default capacity in bytes
pub const RING_BUFFER_CAPACITY: usize = 40960;

/// Disambiguates `write_pos == read_pos`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Empty,
    Partial,
    Full,
}

/// Circular byte buffer with explicit full/empty tagging
#[derive(Debug)]
pub struct RingBuffer {
    array: Box<[u8]>,
    write_pos: usize,
    read_pos: usize,
    tag: Tag,
}

impl RingBuffer {
    /// Allocate a buffer of [`RING_BUFFER_CAPACITY`] bytes
    pub fn init() -> Result<Self> {
        Self::with_capacity(RING_BUFFER_CAPACITY)
    }

    /// Allocate a buffer of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DAudioError::param_invalid("ring buffer capacity must be non-zero"));
        }
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| DAudioError::Alloc { size: capacity })?;
        storage.resize(capacity, 0);
        Ok(Self {
            array: storage.into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
            tag: Tag::Empty,
        })
    }

    pub fn capacity(&self) -> usize {
        self.array.len()
    }

    pub fn is_full(&self) -> bool {
        self.write_pos == self.read_pos && self.tag == Tag::Full
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos && self.tag == Tag::Empty
    }

    /// Bytes currently buffered and not yet read
    pub fn readable_len(&self) -> usize {
        match self.tag {
            Tag::Empty => 0,
            Tag::Full => self.capacity(),
            Tag::Partial => {
                if self.write_pos > self.read_pos {
                    self.write_pos - self.read_pos
                } else {
                    self.capacity() - self.read_pos + self.write_pos
                }
            }
        }
    }

    /// Bytes that can be inserted before the buffer is full
    pub fn free_len(&self) -> usize {
        self.capacity() - self.readable_len()
    }

    /// Whether at least `len` unread bytes are buffered
    pub fn can_buffer_read_len(&self, len: usize) -> bool {
        len <= self.readable_len()
    }

    /// Append `data` at the write position.
    ///
    /// Fails without writing anything when the buffer is full or `data` does
    /// not fit in the free space.
    pub fn insert(&mut self, data: &[u8]) -> Result<()> {
        let len = data.len();
        if len == 0 {
            return Ok(());
        }
        let capacity = self.capacity();
        if len > capacity {
            return Err(DAudioError::param_invalid(format!(
                "insert of {} bytes exceeds capacity {}",
                len, capacity
            )));
        }
        let free = self.free_len();
        if self.is_full() || len > free {
            return Err(DAudioError::BufferFull { needed: len, free });
        }

        let tail = capacity - self.write_pos;
        if len <= tail {
            self.array[self.write_pos..self.write_pos + len].copy_from_slice(data);
        } else {
            self.array[self.write_pos..].copy_from_slice(&data[..tail]);
            self.array[..len - tail].copy_from_slice(&data[tail..]);
        }
        self.write_pos = (self.write_pos + len) % capacity;
        self.tag = if self.write_pos == self.read_pos {
            Tag::Full
        } else {
            Tag::Partial
        };
        Ok(())
    }

    /// Fill `out` from the read position, consuming `out.len()` bytes.
    ///
    /// Fails without consuming anything when fewer bytes are buffered.
    pub fn get_data(&mut self, out: &mut [u8]) -> Result<()> {
        let len = out.len();
        if len == 0 {
            return Ok(());
        }
        let capacity = self.capacity();
        if len > capacity {
            return Err(DAudioError::param_invalid(format!(
                "read of {} bytes exceeds capacity {}",
                len, capacity
            )));
        }
        let available = self.readable_len();
        if len > available {
            return Err(DAudioError::InsufficientData {
                requested: len,
                available,
            });
        }

        let tail = capacity - self.read_pos;
        if len <= tail {
            out.copy_from_slice(&self.array[self.read_pos..self.read_pos + len]);
        } else {
            out[..tail].copy_from_slice(&self.array[self.read_pos..]);
            out[tail..].copy_from_slice(&self.array[..len - tail]);
        }
        self.read_pos = (self.read_pos + len) % capacity;
        self.tag = if self.read_pos == self.write_pos {
            Tag::Empty
        } else {
            Tag::Partial
        };
        Ok(())
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.tag = Tag::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default_capacity() {
        let ring = RingBuffer::init().unwrap();
        assert_eq!(ring.capacity(), RING_BUFFER_CAPACITY);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert!(!ring.can_buffer_read_len(1));
        assert!(ring.can_buffer_read_len(0));
    }

    #[test]
    fn test_zero_length_is_noop() {
        let mut ring = RingBuffer::with_capacity(8).unwrap();
        ring.insert(&[]).unwrap();
        ring.get_data(&mut []).unwrap();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrapped_round_trip() {
        let mut ring = RingBuffer::with_capacity(10).unwrap();
        ring.insert(&[0; 7]).unwrap();
        let mut sink = [0u8; 7];
        ring.get_data(&mut sink).unwrap();

        // write_pos is now 7; this write wraps with only 3 bytes of tail
        let data = [1, 2, 3, 4, 5, 6];
        ring.insert(&data).unwrap();
        assert_eq!(ring.readable_len(), 6);

        let mut out = [0u8; 6];
        ring.get_data(&mut out).unwrap();
        assert_eq!(out, data);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_and_overflow() {
        let mut ring = RingBuffer::with_capacity(4).unwrap();
        ring.insert(&[1, 2, 3]).unwrap();
        assert!(matches!(
            ring.insert(&[4, 5]),
            Err(DAudioError::BufferFull { needed: 2, free: 1 })
        ));
        ring.insert(&[4]).unwrap();
        assert!(ring.is_full());
        assert!(ring.can_buffer_read_len(4));
        assert!(matches!(ring.insert(&[9]), Err(DAudioError::BufferFull { .. })));

        let mut out = [0u8; 4];
        ring.get_data(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_oversized_and_underflow() {
        let mut ring = RingBuffer::with_capacity(4).unwrap();
        assert!(matches!(
            ring.insert(&[0; 5]),
            Err(DAudioError::ParamInvalid { .. })
        ));
        ring.insert(&[1, 2]).unwrap();
        let mut out = [0u8; 3];
        assert!(matches!(
            ring.get_data(&mut out),
            Err(DAudioError::InsufficientData { requested: 3, available: 2 })
        ));
        // Nothing consumed by the failed read
        assert_eq!(ring.readable_len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::with_capacity(4).unwrap();
        ring.insert(&[1, 2, 3, 4]).unwrap();
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.free_len(), 4);
    }
}
