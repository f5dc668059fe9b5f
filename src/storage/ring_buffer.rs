use core::cmp::min;
use core::fmt;

use managed::ManagedSlice;

/// A ring buffer.
///
/// This ring buffer implementation provides many ways to interact with it:
///
///  * Enqueueing or dequeueing one element from corresponding side of the buffer;
///  * Enqueueing or dequeueing a slice of elements from corresponding side of the buffer;
///  * Accessing allocated and unallocated areas directly.
///
/// `RingBuffer` is used to build `SocketBuffer`, which in turn is used to build `tcp::Socket`.
/// It is a direct port of the buffer the teacher's `tcp::Socket` already depends on
/// (`src/socket/tcp.rs: pub type SocketBuffer<'a> = RingBuffer<'a, u8>;`).
pub struct RingBuffer<'a, T: 'a> {
    storage: ManagedSlice<'a, T>,
    read_at: usize,
    length: usize,
}

impl<'a, T: 'a> RingBuffer<'a, T> {
    /// Create a ring buffer with the given storage.
    pub fn new<S>(storage: S) -> RingBuffer<'a, T>
    where
        S: Into<ManagedSlice<'a, T>>,
    {
        RingBuffer {
            storage: storage.into(),
            read_at: 0,
            length: 0,
        }
    }

    /// Clear the ring buffer.
    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    /// Return the maximum number of elements in the ring buffer.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Clear the ring buffer, and reset the read and write cursors.
    pub fn reset(&mut self) {
        self.clear();
    }

    /// Return the current number of elements in the ring buffer.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Return the number of elements that can be added to the ring buffer.
    pub fn window(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Return `true` if the ring buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Return `true` if the ring buffer is full.
    pub fn is_full(&self) -> bool {
        self.window() == 0
    }

    fn mask(&self, index: usize) -> usize {
        index % self.storage.len()
    }

    fn get_idx(&self, idx: usize) -> usize {
        self.mask(self.read_at + idx)
    }
}

impl<'a, T: 'a> RingBuffer<'a, T> {
    /// Call `f` with the largest contiguous slice of unallocated buffer elements,
    /// and enqueue the amount of elements returned by `f`.
    pub fn enqueue_many_with<'b, R, F>(&'b mut self, f: F) -> (usize, R)
    where
        F: FnOnce(&'b mut [T]) -> (usize, R),
    {
        if self.length == 0 {
            self.read_at = 0;
        }

        let write_at = self.mask(self.read_at + self.length);
        let max_size = self.capacity() - self.length;
        let write_at_end = min(write_at + max_size, self.storage.len());

        let (size, result) = f(&mut self.storage[write_at..write_at_end]);
        assert!(size <= max_size);
        self.length += size;
        (size, result)
    }

    /// Enqueue a slice of elements up to the given size into the buffer, and return a reference to them.
    pub fn enqueue_many(&mut self, size: usize) -> &mut [T] {
        self.enqueue_many_with(|buf| {
            let size = min(size, buf.len());
            (size, &mut buf[..size])
        })
        .1
    }

    /// Enqueue one element into the buffer.
    pub fn enqueue_one(&mut self) -> Result<&mut T, super::Full> {
        if self.is_full() {
            return Err(super::Full);
        }
        let index = self.get_idx(self.length);
        self.length += 1;
        Ok(&mut self.storage[index])
    }

    /// Enqueue as many elements from the given slice into the buffer as possible,
    /// and return the amount of elements that could fit.
    pub fn enqueue_slice(&mut self, data: &[T]) -> usize
    where
        T: Copy,
    {
        let (size_1, data) = self.enqueue_many_with(|buf| {
            let size = min(buf.len(), data.len());
            buf[..size].copy_from_slice(&data[..size]);
            (size, &data[size..])
        });
        let size_2 = self.enqueue_many_with(|buf| {
            let size = min(buf.len(), data.len());
            buf[..size].copy_from_slice(&data[..size]);
            (size, ())
        }).0;
        size_1 + size_2
    }

    /// Call `f` with the largest contiguous slice of allocated buffer elements,
    /// and dequeue the amount of elements returned by `f`.
    pub fn dequeue_many_with<'b, R, F>(&'b mut self, f: F) -> (usize, R)
    where
        F: FnOnce(&'b mut [T]) -> (usize, R),
    {
        let capacity = self.storage.len();
        let max_size = self.length;
        let read_at_end = min(self.read_at + max_size, capacity);

        let (size, result) = f(&mut self.storage[self.read_at..read_at_end]);
        assert!(size <= max_size);
        self.read_at = if capacity > 0 {
            self.mask(self.read_at + size)
        } else {
            0
        };
        self.length -= size;
        (size, result)
    }

    /// Dequeue a slice of elements up to the given size from the buffer, and return a reference to them.
    pub fn dequeue_many(&mut self, size: usize) -> &mut [T] {
        self.dequeue_many_with(|buf| {
            let size = min(size, buf.len());
            (size, &mut buf[..size])
        })
        .1
    }

    /// Dequeue one element from the buffer.
    pub fn dequeue_one(&mut self) -> Result<&mut T, super::Empty> {
        if self.is_empty() {
            return Err(super::Empty);
        }
        let next_at = self.get_idx(0);
        self.read_at = self.mask(self.read_at + 1);
        self.length -= 1;
        Ok(&mut self.storage[next_at])
    }

    /// Dequeue as many elements from the buffer into the given slice as possible,
    /// and return the amount of elements that could fit.
    pub fn dequeue_slice(&mut self, data: &mut [T]) -> usize
    where
        T: Copy,
    {
        let (size_1, data) = self.dequeue_many_with(|buf| {
            let size = min(buf.len(), data.len());
            data[..size].copy_from_slice(&buf[..size]);
            (size, &mut data[size..])
        });
        let size_2 = self.dequeue_many_with(|buf| {
            let size = min(buf.len(), data.len());
            data[..size].copy_from_slice(&buf[..size]);
            (size, ())
        }).0;
        size_1 + size_2
    }
}

impl<'a, T: 'a> RingBuffer<'a, T>
where
    T: Copy,
{
    /// Return the number of elements that can be added, at the given offset from the first
    /// unallocated element, before the ring buffer is full.
    pub fn get_allocated(&self, offset: usize, data: &mut [T]) -> usize {
        if offset > self.length {
            return 0;
        }
        let cap = self.storage.len();
        let size = min(self.length - offset, data.len());
        let mut read = self.mask(self.read_at + offset);
        for slot in data.iter_mut().take(size) {
            *slot = self.storage[read];
            read = if cap > 0 { (read + 1) % cap } else { 0 };
        }
        size
    }

    /// Write as many elements from the given slice into the buffer at the given offset as
    /// the buffer has room for, growing length if the write extends past the current length.
    pub fn write_unallocated(&mut self, offset: usize, data: &[T]) -> usize {
        let cap = self.storage.len();
        let max_size = cap.saturating_sub(offset);
        let size = min(max_size, data.len());
        let mut write = self.mask(self.read_at + offset);
        for item in data.iter().take(size) {
            self.storage[write] = *item;
            write = if cap > 0 { (write + 1) % cap } else { 0 };
        }
        if offset + size > self.length {
            self.length = offset + size;
        }
        size
    }
}

impl<'a, T: 'a> RingBuffer<'a, T> {
    /// Return the largest number of elements that can be added to the buffer
    /// without wrapping around (i.e. in a single `enqueue_many` call).
    pub fn contiguous_window(&self) -> usize {
        let write_at = self.mask(self.read_at + self.length);
        if write_at >= self.read_at && self.length > 0 {
            self.storage.len() - write_at
        } else {
            self.storage.len() - self.length
        }
    }

}

impl<'a, T: 'a> From<ManagedSlice<'a, T>> for RingBuffer<'a, T> {
    fn from(slice: ManagedSlice<'a, T>) -> RingBuffer<'a, T> {
        RingBuffer::new(slice)
    }
}

impl<'a, T: 'a> From<&'a mut [T]> for RingBuffer<'a, T> {
    fn from(slice: &'a mut [T]) -> RingBuffer<'a, T> {
        RingBuffer::new(slice)
    }
}

impl<'a, T: 'a> From<Vec<T>> for RingBuffer<'a, T> {
    fn from(vec: Vec<T>) -> RingBuffer<'a, T> {
        RingBuffer::new(vec)
    }
}

impl<'a, T: 'a> fmt::Debug for RingBuffer<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.length)
            .field("cap", &self.storage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_slice_wraps() {
        let mut ring = RingBuffer::new(vec![0u8; 4]);
        assert_eq!(ring.enqueue_slice(&[1, 2, 3]), 3);
        let mut out = [0u8; 2];
        assert_eq!(ring.dequeue_slice(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(ring.enqueue_slice(&[4, 5, 6]), 3);
        let mut out = [0u8; 4];
        assert_eq!(ring.dequeue_slice(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn full_and_empty() {
        let mut ring: RingBuffer<u8> = RingBuffer::new(vec![0u8; 2]);
        assert!(ring.is_empty());
        ring.enqueue_one().unwrap();
        ring.enqueue_one().unwrap();
        assert!(ring.is_full());
        assert!(ring.enqueue_one().is_err());
    }
}
