use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Fixed-capacity byte ring shared by one producer and one consumer.
///
/// A buffer of capacity `N` holds at most `N - 1` bytes; one slot stays
/// empty so that `read == write` always means "empty". Writes never block
/// and never overwrite unread data, excess bytes are dropped.
///
/// The producer only moves `write` and the consumer only moves `read`.
/// Correct results need exactly one thread on each side.
pub struct RingBuffer {
    data: Box<[AtomicU8]>,
    read: AtomicUsize,
    write: AtomicUsize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn read_available(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        Self::used(read, write, self.capacity())
    }

    pub fn write_available(&self) -> usize {
        self.capacity() - 1 - self.read_available()
    }

    /// Producer side. Returns the number of bytes actually stored.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let size = self.capacity();
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        let free = size - 1 - Self::used(read, write, size);

        let count = bytes.len().min(free);
        for (i, byte) in bytes[..count].iter().enumerate() {
            self.data[(write + i) % size].store(*byte, Ordering::Relaxed);
        }
        self.write.store((write + count) % size, Ordering::Release);

        if count < bytes.len() {
            log::trace!("🔁 Ring buffer full, dropped {} bytes", bytes.len() - count);
        }
        count
    }

    /// Consumer side. Reads up to `buf.len()` bytes, rounded down to whole
    /// 16-bit samples.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let count = self.read_available().min(buf.len()) & !1;
        self.consume(count, |i, byte| buf[i] = byte);
        count
    }

    /// Consumer side. Drains everything currently stored.
    pub fn read_all(&self) -> Vec<u8> {
        let count = self.read_available();
        let mut out = Vec::with_capacity(count);
        self.consume(count, |_, byte| out.push(byte));
        out
    }

    /// Consumer side. Discards everything currently stored.
    pub fn clear(&self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
    }

    fn consume(&self, count: usize, mut sink: impl FnMut(usize, u8)) {
        let size = self.capacity();
        let read = self.read.load(Ordering::Relaxed);
        for i in 0..count {
            sink(i, self.data[(read + i) % size].load(Ordering::Relaxed));
        }
        self.read.store((read + count) % size, Ordering::Release);
    }

    fn used(read: usize, write: usize, size: usize) -> usize {
        if write >= read {
            write - read
        } else {
            size - (read - write)
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("read_available", &self.read_available())
            .finish()
    }
}
