//! Definition of a device over a file.

use crate::{
    AbsoluteSeekable, Device, Error, ErrorKind, Flushable, Outcome, Readable, RelativeSeekable,
    Syncable, Tellable, Whence, Writable,
};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// A device over a file.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    eof: bool,
}

impl FileDevice {
    /// Open an existing file for reading and writing.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from(file))
    }

    /// Create a file for reading and writing, truncating it if it exists.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self::from(file))
    }

    /// Reference to the underlying file.
    pub fn get_ref(&self) -> &File {
        &self.file
    }

    /// Return the underlying file.
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl From<File> for FileDevice {
    fn from(file: File) -> Self {
        Self { file, eof: false }
    }
}

/// Convert result of an I/O call into an outcome.
fn outcome<T: Default>(result: io::Result<T>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::ok(value),
        Err(error) => Outcome::from_error(error),
    }
}

impl Device for FileDevice {
    fn close(&mut self) -> Outcome<()> {
        outcome(self.file.flush())
    }

    fn rewind(&mut self, len: usize) -> Outcome<bool> {
        let offset = i64::try_from(len).map_or(i64::MIN, |len| -len);
        self.seek_by(offset, Whence::Current).map(|_| true)
    }
}

impl Readable for FileDevice {
    fn read(&mut self, buf: &mut [u8]) -> Outcome<usize> {
        match self.file.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.eof = true;
                Outcome::from_error(ErrorKind::EndOfFile)
            }
            result => outcome(result),
        }
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

impl Writable for FileDevice {
    fn write(&mut self, buf: &[u8]) -> Outcome<usize> {
        outcome(self.file.write(buf))
    }
}

impl Flushable for FileDevice {
    fn flush(&mut self) -> Outcome<()> {
        outcome(self.file.flush())
    }
}

impl Syncable for FileDevice {
    fn sync(&mut self) -> Outcome<()> {
        outcome(self.file.sync_all())
    }
}

impl AbsoluteSeekable for FileDevice {
    fn seek(&mut self, position: u64) -> Outcome<u64> {
        self.eof = false;
        outcome(self.file.seek(SeekFrom::Start(position)))
    }
}

impl RelativeSeekable for FileDevice {
    fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64> {
        let from = match whence {
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
            Whence::Start => match u64::try_from(offset) {
                Ok(offset) => SeekFrom::Start(offset),
                Err(_) => {
                    let error =
                        Error::with_description(ErrorKind::OutOfRange, "seek before start of file");
                    return Outcome::from_error(error);
                }
            },
        };

        self.eof = false;
        outcome(self.file.seek(from))
    }
}

impl Tellable for FileDevice {
    fn tell(&mut self) -> Outcome<u64> {
        outcome(self.file.stream_position())
    }
}

#[cfg(unix)]
mod positional {
    use super::FileDevice;
    use crate::{ErrorKind, Outcome, VectorReadable, VectorWritable};
    use std::{
        io::{IoSlice, IoSliceMut},
        os::unix::fs::FileExt,
    };

    impl VectorReadable for FileDevice {
        fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize> {
            let mut done = 0;
            for buf in bufs.iter_mut() {
                let mut filled = 0;
                while filled < buf.len() {
                    match self.file.read_at(&mut buf[filled..], offset + (done + filled) as u64) {
                        Ok(0) => break,
                        Ok(read) => filled += read,
                        Err(error) => return Outcome::with_error(done + filled, error),
                    }
                }

                done += filled;
                if filled < buf.len() {
                    break;
                }
            }

            match done {
                0 if bufs.iter().any(|buf| !buf.is_empty()) => {
                    Outcome::from_error(ErrorKind::EndOfFile)
                }
                done => Outcome::ok(done),
            }
        }
    }

    impl VectorWritable for FileDevice {
        fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize> {
            let mut done = 0;
            for buf in bufs {
                match self.file.write_all_at(buf, offset + done as u64) {
                    Ok(()) => done += buf.len(),
                    Err(error) => return Outcome::with_error(done, error),
                }
            }

            Outcome::ok(done)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device");

        let mut device = FileDevice::create(&path).unwrap();
        assert_eq!(device.write(b"hello world"), Outcome::ok(11));
        assert_eq!(device.tell(), Outcome::ok(11));
        assert_eq!(device.seek_by(-5, Whence::End), Outcome::ok(6));

        let mut buf = [0; 16];
        assert_eq!(device.read(&mut buf), Outcome::ok(5));
        assert_eq!(&buf[..5], b"world");
        assert_eq!(device.read(&mut buf).error_kind(), Some(ErrorKind::EndOfFile));
        assert!(device.is_eof());

        assert_eq!(device.seek(0), Outcome::ok(0));
        assert!(!device.is_eof());
        assert_eq!(device.sync(), Outcome::ok(()));
        assert_eq!(device.close(), Outcome::ok(()));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn seek_before_start_is_rejected() {
        let file = tempfile::tempfile().unwrap();
        let mut device = FileDevice::from(file);
        assert_eq!(device.seek_by(-1, Whence::Start).error_kind(), Some(ErrorKind::OutOfRange));
        assert_eq!(device.seek_by(-1, Whence::Current).error_kind(), Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileDevice::open(dir.path().join("missing")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn positional_io_keeps_position() {
        use crate::{VectorReadable, VectorWritable};
        use std::io::{IoSlice, IoSliceMut};

        let mut device = FileDevice::from(tempfile::tempfile().unwrap());
        let bufs = [IoSlice::new(b"abc"), IoSlice::new(b"def")];
        assert_eq!(device.write_vectored_at(&bufs, 2), Outcome::ok(6));
        assert_eq!(device.tell(), Outcome::ok(0));

        let (mut first, mut second) = ([0; 4], [0; 8]);
        let mut bufs = [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)];
        assert_eq!(device.read_vectored_at(&mut bufs, 2), Outcome::ok(6));
        assert_eq!(&first, b"abcd");
        assert_eq!(&second[..2], b"ef");

        let mut buf = [0; 1];
        let outcome = device.read_vectored_at(&mut [IoSliceMut::new(&mut buf)], 100);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::EndOfFile));
    }
}
