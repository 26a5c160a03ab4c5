//! Capabilities of the innermost byte sources and sinks.
//!
//! A device implements exactly the traits for operations it supports. Code
//! that composes devices is written against whichever combination of traits it
//! needs, so an unsupported operation is a type error rather than a runtime one.

use crate::{Error, ErrorKind, Outcome};
use std::io::{IoSlice, IoSliceMut};

/// Base trait of every device.
pub trait Device {
    /// Release resources held by this device.
    ///
    /// Devices are also expected to release resources when dropped, this is
    /// for callers that want to observe errors of doing so.
    fn close(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }

    /// Move back over `len` bytes that were read ahead but never used.
    ///
    /// Streams call this before writing after a buffered read, so that the
    /// write lands right after the last byte that was used.
    ///
    /// * Returns true if the device moved back.
    /// * Returns false if reads and writes do not share a position, as with pipes.
    fn rewind(&mut self, _len: usize) -> Outcome<bool> {
        Outcome::ok(false)
    }
}

/// Device that bytes can be read from.
pub trait Readable: Device {
    /// Read some bytes into a buffer.
    ///
    /// * Returns number of bytes read, which can be less than `buf.len()`.
    /// * Returns 0 with [`ErrorKind::EndOfFile`] when the device is exhausted.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to read bytes into.
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize>;

    /// true once a read observed end of file.
    fn is_eof(&self) -> bool;

    /// Access to readable bytes in place, for devices backed by memory.
    fn readable_memory(&mut self) -> Option<&mut dyn DirectReadable> {
        None
    }
}

/// Device that bytes can be written to.
pub trait Writable: Device {
    /// Write some bytes from a buffer.
    ///
    /// * Returns number of bytes written, which can be less than `buf.len()`.
    ///
    /// # Arguments
    ///
    /// * `buf` - Bytes to write.
    fn write(&mut self, buf: &[u8]) -> Outcome<usize>;

    /// Access to writable space in place, for devices backed by memory.
    fn writable_memory(&mut self) -> Option<&mut dyn DirectWritable> {
        None
    }
}

/// Device with an intermediate buffer of its own that can be flushed.
pub trait Flushable: Device {
    /// Push any bytes held by the device towards their destination.
    fn flush(&mut self) -> Outcome<()>;
}

/// Device backed by durable storage.
pub trait Syncable: Device {
    /// Make every write durable.
    fn sync(&mut self) -> Outcome<()>;
}

/// Device that can seek to an absolute position.
pub trait AbsoluteSeekable: Device {
    /// Move to an absolute position, returning the new position.
    ///
    /// # Arguments
    ///
    /// * `position` - Offset from the start of the device.
    fn seek(&mut self, position: u64) -> Outcome<u64>;
}

/// Origin of a relative seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the device.
    Start,

    /// Relative to the current position.
    Current,

    /// Relative to the end of the device.
    End,
}

/// Device that can seek relative to some origin.
pub trait RelativeSeekable: Device {
    /// Move relative to an origin, returning the new absolute position.
    ///
    /// # Arguments
    ///
    /// * `offset` - Signed offset from origin.
    /// * `whence` - Origin of the seek.
    fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64>;
}

/// Device that knows its current position.
pub trait Tellable: Device {
    /// Current absolute position.
    fn tell(&mut self) -> Outcome<u64>;
}

/// Device that supports scatter reads at an explicit offset.
pub trait VectorReadable: Device {
    /// Read into a sequence of buffers starting at an offset.
    ///
    /// Current position of the device is not affected.
    ///
    /// # Arguments
    ///
    /// * `bufs` - Buffers to fill, in order.
    /// * `offset` - Absolute offset to read from.
    fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize>;
}

/// Device that supports gather writes at an explicit offset.
pub trait VectorWritable: Device {
    /// Write a sequence of buffers starting at an offset.
    ///
    /// Current position of the device is not affected.
    ///
    /// # Arguments
    ///
    /// * `bufs` - Buffers to write, in order.
    /// * `offset` - Absolute offset to write at.
    fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize>;
}

/// Device whose readable bytes can be accessed in place.
///
/// Implementors also return themselves from [`Readable::readable_memory`],
/// which is how streams find out that they need no read staging.
pub trait DirectReadable: Readable {
    /// Bytes available to read right now, without copying.
    fn readable_window(&self) -> &[u8];

    /// Mark bytes at the start of [`DirectReadable::readable_window`] as read.
    fn consume(&mut self, len: usize);
}

/// Device whose writable space can be accessed in place.
///
/// Implementors also return themselves from [`Writable::writable_memory`],
/// which is how streams find out that they need no write staging.
pub trait DirectWritable: Writable {
    /// Space available to write right now, without copying.
    fn writable_window(&mut self) -> &mut [u8];

    /// Mark bytes at the start of [`DirectWritable::writable_window`] as written.
    fn commit(&mut self, len: usize);
}

impl<D: Device + ?Sized> Device for &mut D {
    fn close(&mut self) -> Outcome<()> {
        (**self).close()
    }

    fn rewind(&mut self, len: usize) -> Outcome<bool> {
        (**self).rewind(len)
    }
}

impl<D: Readable + ?Sized> Readable for &mut D {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        (**self).read(buf)
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }

    fn readable_memory(&mut self) -> Option<&mut dyn DirectReadable> {
        (**self).readable_memory()
    }
}

impl<D: Writable + ?Sized> Writable for &mut D {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        (**self).write(buf)
    }

    fn writable_memory(&mut self) -> Option<&mut dyn DirectWritable> {
        (**self).writable_memory()
    }
}

impl<D: Flushable + ?Sized> Flushable for &mut D {
    fn flush(&mut self) -> Outcome<()> {
        (**self).flush()
    }
}

impl<D: Syncable + ?Sized> Syncable for &mut D {
    fn sync(&mut self) -> Outcome<()> {
        (**self).sync()
    }
}

impl<D: AbsoluteSeekable + ?Sized> AbsoluteSeekable for &mut D {
    fn seek(&mut self, position: u64) -> Outcome<u64> {
        (**self).seek(position)
    }
}

impl<D: RelativeSeekable + ?Sized> RelativeSeekable for &mut D {
    fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64> {
        (**self).seek_by(offset, whence)
    }
}

impl<D: Tellable + ?Sized> Tellable for &mut D {
    fn tell(&mut self) -> Outcome<u64> {
        (**self).tell()
    }
}

impl<D: VectorReadable + ?Sized> VectorReadable for &mut D {
    fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize> {
        (**self).read_vectored_at(bufs, offset)
    }
}

impl<D: VectorWritable + ?Sized> VectorWritable for &mut D {
    fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize> {
        (**self).write_vectored_at(bufs, offset)
    }
}

/// Repeat a partial operation until `len` bytes are processed.
///
/// Interrupted errors and steps that make no progress consume one of
/// `attempts` retries. Any other error stops immediately, along with the
/// number of bytes processed so far.
///
/// # Arguments
///
/// * `len` - Total number of bytes to process.
/// * `attempts` - Number of retries allowed.
/// * `stalled` - Description of the error reported when retries run out without progress.
/// * `step` - Processes bytes starting at the given offset.
pub(crate) fn drive(
    len: usize,
    attempts: usize,
    stalled: &'static str,
    mut step: impl FnMut(usize) -> Outcome<usize>,
) -> Outcome<usize> {
    let mut done = 0;
    let mut retries = attempts;
    while done < len {
        let (progress, error) = step(done).into_parts();
        done += progress;

        let error = match error {
            None if progress > 0 => continue,
            Some(error) if !error.is_interrupted() => return Outcome::with_error(done, error),
            error => error,
        };

        if retries == 0 {
            let error = error
                .unwrap_or_else(|| Error::with_description(ErrorKind::UnknownIoError, stalled));
            return Outcome::with_error(done, error);
        }

        retries -= 1;
        tracing::debug!(done, len, retries, "Retrying interrupted operation");
    }

    Outcome::ok(done)
}

/// Resolve a relative seek against a known position and length.
///
/// Shared by in-memory devices.
pub(crate) fn resolve_seek(
    offset: i64,
    whence: Whence,
    position: u64,
    len: u64,
) -> Result<u64, Error> {
    let origin = match whence {
        Whence::Start => 0,
        Whence::Current => position,
        Whence::End => len,
    };

    origin
        .checked_add_signed(offset)
        .filter(|target| *target <= len)
        .ok_or_else(|| {
            Error::with_description(
                ErrorKind::OutOfRange,
                format!("seek to {origin} {offset:+} is outside [0, {len}]"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_retries_interrupted_steps() {
        let mut script = vec![
            Outcome::ok(2),
            Outcome::from_error(std::io::Error::from(std::io::ErrorKind::Interrupted)),
            Outcome::ok(0),
            Outcome::ok(3),
        ]
        .into_iter();

        let outcome = drive(5, 2, "stalled", |_| script.next().unwrap());
        assert_eq!(outcome, Outcome::ok(5));
    }

    #[test]
    fn drive_gives_up_after_attempts() {
        let outcome = drive(5, 1, "stalled", |_| Outcome::ok(0));
        assert_eq!(*outcome.value(), 0);
        assert_eq!(outcome.error().and_then(Error::description), Some("stalled"));

        let outcome = drive(5, 8, "stalled", |done| match done {
            0 => Outcome::ok(1),
            _ => Outcome::with_error(0, ErrorKind::EndOfFile),
        });
        assert_eq!(*outcome.value(), 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::EndOfFile));
    }

    #[test]
    fn relative_seek_stays_in_bounds() {
        assert_eq!(resolve_seek(4, Whence::Start, 2, 10), Ok(4));
        assert_eq!(resolve_seek(-3, Whence::Current, 5, 10), Ok(2));
        assert_eq!(resolve_seek(0, Whence::End, 5, 10), Ok(10));

        let error = resolve_seek(-11, Whence::End, 5, 10).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::OutOfRange);
        assert!(resolve_seek(1, Whence::End, 0, 10).is_err());
    }
}
