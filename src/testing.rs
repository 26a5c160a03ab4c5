//! Devices with scripted behavior for unit tests.

use crate::{
    AbsoluteSeekable, Device, Error, ErrorKind, Flushable, Outcome, Readable, RelativeSeekable,
    Tellable, Whence, Writable, devices::VecDevice,
};
use std::{collections::VecDeque, io};

/// Sink that records every byte and every call to write.
#[derive(Debug, Default)]
pub(crate) struct Log {
    pub(crate) bytes: Vec<u8>,
    pub(crate) writes: Vec<usize>,
    pub(crate) flushes: usize,
    pub(crate) max_write: Option<usize>,
}

impl Log {
    /// Sink that accepts at most `max_write` bytes per call.
    pub(crate) fn short(max_write: usize) -> Self {
        Self {
            max_write: Some(max_write),
            ..Default::default()
        }
    }
}

impl Device for Log {}

impl Writable for Log {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        let len = self.max_write.map_or(buf.len(), |max| max.min(buf.len()));
        self.bytes.extend_from_slice(&buf[..len]);
        self.writes.push(len);
        Outcome::ok(len)
    }
}

impl Flushable for Log {
    fn flush(&mut self) -> Outcome<()> {
        self.flushes += 1;
        Outcome::ok(())
    }
}

/// What a scripted device does on its next call.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Accept or produce up to this many bytes.
    Bytes(usize),

    /// Fail with an interrupted error before any progress.
    Interrupted,

    /// Fail with this error before any progress.
    Fail(ErrorKind),
}

/// Device that follows a script, then behaves like a plain pipe.
#[derive(Debug, Default)]
pub(crate) struct Scripted {
    pub(crate) script: VecDeque<Step>,
    pub(crate) written: Vec<u8>,
    pub(crate) input: VecDeque<u8>,
    pub(crate) calls: usize,
    pub(crate) eof: bool,
}

impl Scripted {
    pub(crate) fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    pub(crate) fn with_input(mut self, input: &[u8]) -> Self {
        self.input.extend(input);
        self
    }

    fn next_limit(&mut self, len: usize) -> Result<usize, Error> {
        self.calls += 1;
        match self.script.pop_front() {
            None => Ok(len),
            Some(Step::Bytes(max)) => Ok(max.min(len)),
            Some(Step::Interrupted) => Err(io::Error::from(io::ErrorKind::Interrupted).into()),
            Some(Step::Fail(kind)) => Err(kind.into()),
        }
    }
}

impl Device for Scripted {}

impl Writable for Scripted {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        match self.next_limit(buf.len()) {
            Ok(len) => {
                self.written.extend_from_slice(&buf[..len]);
                Outcome::ok(len)
            }
            Err(error) => Outcome::from_error(error),
        }
    }
}

impl Readable for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        let len = match self.next_limit(buf.len()) {
            Ok(len) => len.min(self.input.len()),
            Err(error) => return Outcome::from_error(error),
        };

        if self.input.is_empty() && !buf.is_empty() {
            self.eof = true;
            return Outcome::from_error(ErrorKind::EndOfFile);
        }

        for (dst, src) in buf.iter_mut().zip(self.input.drain(..len)) {
            *dst = src;
        }

        Outcome::ok(len)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Seekable device over memory that does not expose it, so streams stage bytes for it.
#[derive(Debug, Default)]
pub(crate) struct Opaque(pub(crate) VecDevice);

impl Opaque {
    pub(crate) fn with_bytes(bytes: &[u8]) -> Self {
        Self(VecDevice::from(bytes.to_vec()))
    }
}

impl Device for Opaque {
    fn rewind(&mut self, len: usize) -> Outcome<bool> {
        self.0.rewind(len)
    }
}

impl Readable for Opaque {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        self.0.read(buf)
    }

    fn is_eof(&self) -> bool {
        self.0.is_eof()
    }
}

impl Writable for Opaque {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        self.0.write(buf)
    }
}

impl Flushable for Opaque {
    fn flush(&mut self) -> Outcome<()> {
        Outcome::ok(())
    }
}

impl AbsoluteSeekable for Opaque {
    fn seek(&mut self, position: u64) -> Outcome<u64> {
        self.0.seek(position)
    }
}

impl RelativeSeekable for Opaque {
    fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64> {
        self.0.seek_by(offset, whence)
    }
}

impl Tellable for Opaque {
    fn tell(&mut self) -> Outcome<u64> {
        self.0.tell()
    }
}
