//! Fixed-capacity window carried across reads.
//!
//! # Responsibilities
//! - Hold bytes retained from the previous cycle at the front of the buffer
//! - Expose the free tail as the target of the next read
//! - Move a leftover suffix back to offset zero after each decision
//!
//! The buffer never grows. A window that fills it without reaching a
//! decision is forwarded verbatim by the relay.

/// Reusable scan window for one client → upstream direction.
#[derive(Debug)]
pub struct ScanBuffer {
    buf: Box<[u8]>,
    /// Number of bytes held at the front of `buf`.
    len: usize,
}

impl ScanBuffer {
    /// Create a buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently held (leftover plus freshly read).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// The logical window under examination.
    pub fn window(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Free space after the held bytes; the next read lands here.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Record `n` bytes written into [`spare_mut`](Self::spare_mut).
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    /// Drop the first `n` bytes of the window and shift the rest to offset zero.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Forget every held byte.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
