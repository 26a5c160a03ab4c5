//! Definition of a device over a fixed size window of memory.

use super::{gather, scatter};
use crate::{
    AbsoluteSeekable, Device, DirectReadable, DirectWritable, Error, ErrorKind, Flushable, Outcome,
    Readable, RelativeSeekable, Syncable, Tellable, VectorReadable, VectorWritable, Whence,
    Writable, device::resolve_seek,
};
use std::io::{IoSlice, IoSliceMut};

/// A device over a borrowed, fixed size window of memory.
///
/// The device tracks how much of the window holds bytes. Reads stop there,
/// writes can go up to the end of the window, but never beyond it.
#[derive(Debug)]
pub struct SpanDevice<'a> {
    span: &'a mut [u8],
    len: usize,
    position: usize,
    eof: bool,
}

impl<'a> SpanDevice<'a> {
    /// Create an empty device, ready to be written.
    ///
    /// # Arguments
    ///
    /// * `span` - Memory to write bytes into.
    pub fn new(span: &'a mut [u8]) -> Self {
        Self {
            span,
            len: 0,
            position: 0,
            eof: false,
        }
    }

    /// Create a device full of bytes, ready to be read.
    ///
    /// # Arguments
    ///
    /// * `span` - Bytes to read.
    pub fn filled(span: &'a mut [u8]) -> Self {
        Self {
            len: span.len(),
            ..Self::new(span)
        }
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.span[..self.len]
    }

    /// Size of the window.
    pub fn capacity(&self) -> usize {
        self.span.len()
    }

    /// Current position of this device.
    pub fn position(&self) -> usize {
        self.position
    }

    fn full() -> Error {
        Error::with_description(ErrorKind::OutOfRange, "span is full")
    }
}

impl Device for SpanDevice<'_> {
    fn rewind(&mut self, len: usize) -> Outcome<bool> {
        let offset = i64::try_from(len).map_or(i64::MIN, |len| -len);
        self.seek_by(offset, Whence::Current).map(|_| true)
    }
}

impl Readable for SpanDevice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        let unread = &self.span[self.position..self.len];
        if unread.is_empty() && !buf.is_empty() {
            self.eof = true;
            return Outcome::from_error(ErrorKind::EndOfFile);
        }

        let len = buf.len().min(unread.len());
        buf[..len].copy_from_slice(&unread[..len]);
        self.position += len;
        Outcome::ok(len)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn readable_memory(&mut self) -> Option<&mut dyn DirectReadable> {
        Some(self)
    }
}

impl Writable for SpanDevice<'_> {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        let free = &mut self.span[self.position..];
        if free.is_empty() && !buf.is_empty() {
            return Outcome::from_error(Self::full());
        }

        let len = buf.len().min(free.len());
        free[..len].copy_from_slice(&buf[..len]);
        self.position += len;
        self.len = self.len.max(self.position);
        Outcome::ok(len)
    }

    fn writable_memory(&mut self) -> Option<&mut dyn DirectWritable> {
        Some(self)
    }
}

impl Flushable for SpanDevice<'_> {
    fn flush(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl Syncable for SpanDevice<'_> {
    fn sync(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl AbsoluteSeekable for SpanDevice<'_> {
    fn seek(&mut self, position: u64) -> Outcome<u64> {
        self.seek_by(i64::try_from(position).unwrap_or(i64::MAX), Whence::Start)
    }
}

impl RelativeSeekable for SpanDevice<'_> {
    fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64> {
        match resolve_seek(offset, whence, self.position as u64, self.len as u64) {
            Ok(position) => {
                self.position = position as usize;
                self.eof = false;
                Outcome::ok(position)
            }
            Err(error) => Outcome::with_error(self.position as u64, error),
        }
    }
}

impl Tellable for SpanDevice<'_> {
    fn tell(&mut self) -> Outcome<u64> {
        Outcome::ok(self.position as u64)
    }
}

impl VectorReadable for SpanDevice<'_> {
    fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize> {
        match usize::try_from(offset) {
            Ok(offset) if offset < self.len => {
                Outcome::ok(scatter(&self.span[offset..self.len], bufs))
            }
            _ => Outcome::from_error(ErrorKind::EndOfFile),
        }
    }
}

impl VectorWritable for SpanDevice<'_> {
    fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize> {
        let offset = match usize::try_from(offset) {
            Ok(offset) if offset <= self.len => offset,
            _ => {
                return Outcome::from_error(Error::with_description(
                    ErrorKind::OutOfRange,
                    format!("write at {offset} would leave a gap after {} bytes", self.len),
                ));
            }
        };

        let written = gather(bufs, &mut self.span[offset..]);
        self.len = self.len.max(offset + written);
        match written {
            0 if bufs.iter().any(|buf| !buf.is_empty()) => Outcome::from_error(Self::full()),
            written => Outcome::ok(written),
        }
    }
}

impl DirectReadable for SpanDevice<'_> {
    fn readable_window(&self) -> &[u8] {
        &self.span[self.position..self.len]
    }

    fn consume(&mut self, len: usize) {
        self.position += len.min(self.len - self.position);
    }
}

impl DirectWritable for SpanDevice<'_> {
    fn writable_window(&mut self) -> &mut [u8] {
        &mut self.span[self.position..]
    }

    fn commit(&mut self, len: usize) {
        self.position += len.min(self.span.len() - self.position);
        self.len = self.len.max(self.position);
    }
}
