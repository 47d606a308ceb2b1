//! Output plumbing: a tee writer and a shareable capture buffer.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Writes every byte to `primary` and then to `capture`, in order.
///
/// Each `write` forwards the whole buffer to both sides, so the two streams
/// never diverge on a short write.
#[derive(Debug)]
pub struct TeeWriter<A, B> {
    primary: A,
    capture: B,
}

impl<A: Write, B: Write> TeeWriter<A, B> {
    /// Create a tee over `primary` and `capture`.
    pub fn new(primary: A, capture: B) -> Self {
        Self { primary, capture }
    }

    /// Consume the tee, returning both sides.
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.capture)
    }
}

impl<A: Write, B: Write> Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.capture.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.capture.flush()
    }
}

/// A cloneable in-memory sink. All clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bytes written so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the bytes written so far, leaving the buffer empty.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
