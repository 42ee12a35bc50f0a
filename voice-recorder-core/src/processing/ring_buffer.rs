/// Fixed-capacity circular buffer.
///
/// Capture callbacks write into it and blocking readers drain it; wrap in
/// `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops the oldest samples, so a stalled reader loses
/// the stale end of the stream rather than the live one.
#[derive(Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
    overflowed: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![T::default(); capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
            overflowed: 0,
        }
    }

    /// Append `items`, dropping the oldest on overflow.
    ///
    /// If `items` is larger than capacity only its last `capacity` elements are kept.
    pub fn write(&mut self, items: &[T]) {
        if items.is_empty() {
            return;
        }

        let skipped = items.len().saturating_sub(self.capacity);
        let items = &items[skipped..];

        let overflow = (self.available + items.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
        }
        self.overflowed += (skipped + overflow) as u64;

        for &item in items {
            self.buffer[self.write_index] = item;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.available += items.len();
    }

    /// Append only what fits without overwriting; returns how many were taken.
    pub fn write_available(&mut self, items: &[T]) -> usize {
        let take = items.len().min(self.free());
        self.write(&items[..take]);
        take
    }

    /// Remove up to `out.len()` items into `out`; returns how many were copied.
    pub fn read_into(&mut self, out: &mut [T]) -> usize {
        let to_read = out.len().min(self.available);
        for (i, slot) in out.iter_mut().take(to_read).enumerate() {
            *slot = self.buffer[(self.read_index + i) % self.capacity];
        }
        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        to_read
    }

    /// Remove and return up to `count` items.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let mut out = vec![T::default(); count.min(self.available)];
        self.read_into(&mut out);
        out
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items discarded by overflow since creation.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_write_read() {
        let mut buf = RingBuffer::new(10);
        buf.write(&[1i16, 2, 3]);

        assert_eq!(buf.count(), 3);
        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn read_partial() {
        let mut buf = RingBuffer::new(10);
        buf.write(&[1i16, 2, 3, 4, 5]);

        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert_eq!(buf.count(), 2);
        assert_eq!(buf.read(10), vec![4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RingBuffer::new(4);
        buf.write(&[1u8, 2, 3, 4]);
        buf.write(&[5, 6]);

        assert_eq!(buf.count(), 4);
        assert_eq!(buf.overflowed(), 2);
        assert_eq!(buf.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn write_larger_than_capacity() {
        let mut buf = RingBuffer::new(3);
        buf.write(&[1u8, 2, 3, 4, 5]);

        assert_eq!(buf.count(), 3);
        assert_eq!(buf.overflowed(), 2);
        assert_eq!(buf.read(3), vec![3, 4, 5]);
    }

    #[test]
    fn wraparound() {
        let mut buf = RingBuffer::new(4);
        buf.write(&[1i16, 2, 3]);
        buf.read(2);
        buf.write(&[4, 5, 6]);

        assert_eq!(buf.count(), 4);
        assert_eq!(buf.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn write_available_never_overwrites() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.write_available(&[1u8, 2, 3]), 3);
        assert_eq!(buf.write_available(&[4, 5, 6]), 1);
        assert_eq!(buf.overflowed(), 0);
        assert_eq!(buf.read(4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn read_into_slice() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[7i16, 8, 9]);
        let mut out = [0i16; 5];
        assert_eq!(buf.read_into(&mut out), 3);
        assert_eq!(&out[..3], &[7, 8, 9]);
    }

    #[test]
    fn reset_clears_buffer() {
        let mut buf = RingBuffer::new(10);
        buf.write(&[1u8, 2, 3]);
        buf.reset();

        assert!(buf.is_empty());
        assert!(buf.read(10).is_empty());
        assert_eq!(buf.free(), 10);
    }
}
