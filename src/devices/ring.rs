//! Definition of a loopback device over a ring buffer.

use crate::{Device, DirectReadable, Error, ErrorKind, Flushable, Outcome, Readable, Writable};
use crossio_ring::{DefaultRing, RingBuffer};
use std::io;

/// A loopback pipe, bytes written to it are read back in order.
///
/// Reading from an empty pipe reports end of file, even though more bytes
/// might be written later. Writing to a full pipe fails until some bytes are read.
#[derive(Debug)]
pub struct RingDevice<R> {
    ring: R,
    eof: bool,
}

impl RingDevice<DefaultRing> {
    /// Create a new pipe over the ring buffer selected for this build.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Requested capacity of the pipe, rounded up by some ring buffers.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        DefaultRing::try_with_capacity(capacity).map(Self::new)
    }
}

impl<R: RingBuffer> RingDevice<R> {
    /// Create a new pipe over a ring buffer.
    ///
    /// # Arguments
    ///
    /// * `ring` - Ring buffer that holds bytes in transit.
    pub fn new(ring: R) -> Self {
        Self { ring, eof: false }
    }

    /// Reference to the underlying ring buffer.
    pub fn ring(&self) -> &R {
        &self.ring
    }

    /// Return the underlying ring buffer.
    pub fn into_inner(self) -> R {
        self.ring
    }
}

impl<R: RingBuffer> Device for RingDevice<R> {}

impl<R: RingBuffer> Readable for RingDevice<R> {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        let read = self.ring.read(buf);
        self.eof = read == 0 && !buf.is_empty();
        match self.eof {
            true => Outcome::from_error(ErrorKind::EndOfFile),
            false => Outcome::ok(read),
        }
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn readable_memory(&mut self) -> Option<&mut dyn DirectReadable> {
        Some(self)
    }
}

impl<R: RingBuffer> Writable for RingDevice<R> {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        match self.ring.write(buf) {
            0 if !buf.is_empty() => {
                Outcome::from_error(Error::with_description(ErrorKind::OutOfRange, "ring is full"))
            }
            written => Outcome::ok(written),
        }
    }
}

impl<R: RingBuffer> Flushable for RingDevice<R> {
    fn flush(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl<R: RingBuffer> DirectReadable for RingDevice<R> {
    fn readable_window(&self) -> &[u8] {
        // Only the part before the wrap point, for rings that do not mirror memory.
        self.ring.peek(self.ring.in_use()).first()
    }

    fn consume(&mut self, len: usize) {
        self.ring.direct_read(len, |_| ());
    }
}
