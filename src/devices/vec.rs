//! Definition of a device over a growable vector of bytes.

use super::{gather, scatter, total_len};
use crate::{
    AbsoluteSeekable, Device, DirectReadable, DirectWritable, Error, ErrorKind, Flushable, Outcome,
    Readable, RelativeSeekable, Syncable, Tellable, VectorReadable, VectorWritable, Whence,
    Writable, device::resolve_seek,
};
use std::io::{IoSlice, IoSliceMut};

/// Writable windows are at least this large.
const MIN_WINDOW: usize = 64;

/// A device over a growable vector of bytes.
///
/// Writes overwrite bytes at the current position and extend the vector past
/// its end. Reads start at the beginning, use [`VecDevice::from`] to read
/// existing bytes.
#[derive(Debug, Clone, Default)]
pub struct VecDevice {
    // Might be longer than len, spare bytes back writable windows.
    bytes: Vec<u8>,
    len: usize,
    position: usize,
    eof: bool,
}

impl VecDevice {
    /// Create an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held by this device.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Number of bytes held by this device.
    pub fn len(&self) -> usize {
        self.len
    }

    /// true if this device holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position of this device.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the bytes held by this device.
    pub fn into_vec(self) -> Vec<u8> {
        let mut bytes = self.bytes;
        bytes.truncate(self.len);
        bytes
    }

    /// Copy bytes at an offset, growing the vector as needed.
    fn put(&mut self, bufs: &[IoSlice<'_>], offset: usize) -> usize {
        let end = offset + total_len(bufs);
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }

        let copied = gather(bufs, &mut self.bytes[offset..end]);
        self.len = self.len.max(end);
        copied
    }
}

impl From<Vec<u8>> for VecDevice {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            len: bytes.len(),
            bytes,
            position: 0,
            eof: false,
        }
    }
}

impl Device for VecDevice {
    fn rewind(&mut self, len: usize) -> Outcome<bool> {
        let offset = i64::try_from(len).map_or(i64::MIN, |len| -len);
        self.seek_by(offset, Whence::Current).map(|_| true)
    }
}

impl Readable for VecDevice {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        let unread = &self.bytes[self.position.min(self.len)..self.len];
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

impl Writable for VecDevice {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        let written = self.put(&[IoSlice::new(buf)], self.position);
        self.position += written;
        Outcome::ok(written)
    }

    fn writable_memory(&mut self) -> Option<&mut dyn DirectWritable> {
        Some(self)
    }
}

impl Flushable for VecDevice {
    fn flush(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl Syncable for VecDevice {
    fn sync(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl AbsoluteSeekable for VecDevice {
    fn seek(&mut self, position: u64) -> Outcome<u64> {
        self.seek_by(i64::try_from(position).unwrap_or(i64::MAX), Whence::Start)
    }
}

impl RelativeSeekable for VecDevice {
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

impl Tellable for VecDevice {
    fn tell(&mut self) -> Outcome<u64> {
        Outcome::ok(self.position as u64)
    }
}

impl VectorReadable for VecDevice {
    fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize> {
        match usize::try_from(offset) {
            Ok(offset) if offset < self.len => {
                Outcome::ok(scatter(&self.bytes[offset..self.len], bufs))
            }
            _ => Outcome::from_error(ErrorKind::EndOfFile),
        }
    }
}

impl VectorWritable for VecDevice {
    fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize> {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.len => Outcome::ok(self.put(bufs, offset)),
            _ => Outcome::from_error(Error::with_description(
                ErrorKind::OutOfRange,
                format!("write at {offset} would leave a gap after {} bytes", self.len),
            )),
        }
    }
}

impl DirectReadable for VecDevice {
    fn readable_window(&self) -> &[u8] {
        &self.bytes[self.position.min(self.len)..self.len]
    }

    fn consume(&mut self, len: usize) {
        self.position += len.min(self.len.saturating_sub(self.position));
    }
}

impl DirectWritable for VecDevice {
    fn writable_window(&mut self) -> &mut [u8] {
        if self.bytes.len() - self.position < MIN_WINDOW {
            let size = (self.bytes.len() * 2).max(self.position + MIN_WINDOW);
            self.bytes.resize(size, 0);
        }

        &mut self.bytes[self.position..]
    }

    fn commit(&mut self, len: usize) {
        self.position += len.min(self.bytes.len() - self.position);
        self.len = self.len.max(self.position);
    }
}
