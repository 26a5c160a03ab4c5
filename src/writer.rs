//! Definition of the write staging layer that sits in front of a device.

use crate::{Error, ErrorKind, Outcome, Writable, device::drive};
use std::{fmt, mem::ManuallyDrop, ptr, str::FromStr};

/// Default size of staging buffers, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default number of retries for interrupted or stalled device operations.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 8;

const STALLED: &str = "device accepted no bytes";

/// Policy that decides when staged bytes are pushed to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BufferMode {
    /// Flush only when staging buffer is full.
    #[default]
    Full,

    /// Flush whenever a newline is staged, or staging buffer is full.
    Line,

    /// Every write goes straight to the device.
    None,

    /// Like [`BufferMode::Full`], with a staging buffer supplied by the caller.
    External,
}

impl BufferMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Line => "line",
            Self::None => "none",
            Self::External => "external",
        }
    }
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BufferMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "line" => Ok(Self::Line),
            "none" => Ok(Self::None),
            "external" => Ok(Self::External),
            other => Err(Error::with_description(
                ErrorKind::InvalidInput,
                format!("unknown buffer mode {other:?}"),
            )),
        }
    }
}

/// Write all bytes to a device, retrying interrupted and stalled writes.
///
/// * Returns number of bytes written, which is `bytes.len()` unless there is an error.
///
/// # Arguments
///
/// * `device` - Device to write into.
/// * `bytes` - Bytes to write.
/// * `attempts` - Number of retries allowed, see [`DEFAULT_RETRY_ATTEMPTS`].
pub fn write_all<D>(device: &mut D, bytes: &[u8], attempts: usize) -> Outcome<usize>
where
    D: Writable + ?Sized,
{
    drive(bytes.len(), attempts, STALLED, |done| device.write(&bytes[done..]))
}

/// Staging buffer for bytes on their way to a device.
///
/// The buffer does not own the device, every operation that might reach the
/// device borrows it. See [`BufferedWriter`] for a writer that owns one.
#[derive(Debug)]
pub struct WriteBuffer {
    mode: BufferMode,
    storage: Vec<u8>,
    staged: usize,
    attempts: usize,
}

impl WriteBuffer {
    /// Create a new staging buffer.
    ///
    /// Capacity is ignored when mode is [`BufferMode::None`], and a capacity of 0
    /// implies [`BufferMode::None`].
    ///
    /// # Arguments
    ///
    /// * `mode` - Flush policy, use [`WriteBuffer::external`] for [`BufferMode::External`].
    /// * `capacity` - Size of staging buffer in bytes.
    pub fn new(mode: BufferMode, capacity: usize) -> Self {
        let mode = match mode {
            _ if capacity == 0 => BufferMode::None,
            BufferMode::External => BufferMode::Full,
            mode => mode,
        };

        let capacity = match mode {
            BufferMode::None => 0,
            _ => capacity,
        };

        Self {
            mode,
            storage: vec![0; capacity],
            staged: 0,
            attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Create a staging buffer over memory supplied by the caller.
    ///
    /// Every byte of the vector's allocation is used for staging, its
    /// contents are overwritten. Use [`WriteBuffer::into_external`] to get it back.
    ///
    /// # Arguments
    ///
    /// * `storage` - Memory to stage bytes in.
    pub fn external(mut storage: Vec<u8>) -> Self {
        let capacity = storage.capacity().max(storage.len());
        storage.resize(capacity, 0);

        let mode = match capacity {
            0 => BufferMode::None,
            _ => BufferMode::External,
        };

        Self {
            mode,
            storage,
            staged: 0,
            attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Set the number of retries for unbuffered writes and draining.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Return memory supplied with [`WriteBuffer::external`].
    ///
    /// Vector is truncated to bytes that are still staged, so nothing is lost
    /// if the buffer was not flushed. Returns None for other modes.
    pub fn into_external(self) -> Option<Vec<u8>> {
        if self.mode != BufferMode::External {
            return None;
        }

        let mut storage = self.storage;
        storage.truncate(self.staged);
        Some(storage)
    }

    /// Flush policy of this buffer.
    #[inline]
    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Size of staging buffer in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.storage.len()
    }

    /// Number of staged bytes.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.staged
    }

    /// Number of bytes that can be staged before a flush is needed.
    #[inline]
    pub fn space_left(&self) -> usize {
        self.size() - self.staged
    }

    /// true if nothing more can be staged.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.space_left() == 0
    }

    /// true if nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.staged == 0
    }

    /// Bytes staged but not yet written to the device.
    #[inline]
    pub fn staged(&self) -> &[u8] {
        &self.storage[..self.staged]
    }

    /// Number of retries used for unbuffered writes and draining.
    #[inline]
    pub fn retry_attempts(&self) -> usize {
        self.attempts
    }

    /// Write bytes to a device through this buffer.
    ///
    /// * Returns number of bytes accepted, staged or written.
    /// * When there is an error, returned count is still accurate.
    ///
    /// # Arguments
    ///
    /// * `device` - Device that staged bytes are flushed to.
    /// * `bytes` - Bytes to write.
    pub fn write<D>(&mut self, device: &mut D, bytes: &[u8]) -> Outcome<usize>
    where
        D: Writable + ?Sized,
    {
        if bytes.is_empty() {
            return Outcome::ok(0);
        }

        match self.mode {
            BufferMode::None if self.staged > 0 => {
                let (_, error) = self.drain(device).into_parts();
                match error {
                    Some(error) => Outcome::with_error(0, error),
                    None => write_all(device, bytes, self.attempts),
                }
            }
            BufferMode::None => write_all(device, bytes, self.attempts),
            BufferMode::Full | BufferMode::External => self.write_full(device, bytes),
            BufferMode::Line => self.write_line(device, bytes),
        }
    }

    fn write_full<D>(&mut self, device: &mut D, bytes: &[u8]) -> Outcome<usize>
    where
        D: Writable + ?Sized,
    {
        let mut accepted = 0;
        loop {
            accepted += self.stage(&bytes[accepted..]);
            if accepted == bytes.len() {
                return Outcome::ok(accepted);
            }

            if let Some(error) = self.make_room(device) {
                return Outcome::with_error(accepted, error);
            }
        }
    }

    fn write_line<D>(&mut self, device: &mut D, bytes: &[u8]) -> Outcome<usize>
    where
        D: Writable + ?Sized,
    {
        // Only the last newline matters, anything before it is flushed anyway.
        let newline = bytes.iter().rposition(|byte| *byte == b'\n');

        let mut accepted = 0;
        loop {
            let end = match newline {
                Some(position) if position >= accepted => position + 1,
                _ => bytes.len(),
            };

            let start = accepted;
            accepted += self.stage(&bytes[start..end]);
            let newline_staged =
                newline.is_some_and(|position| start <= position && position < accepted);

            if newline_staged || self.is_full() {
                if let Some(error) = self.make_room(device) {
                    return Outcome::with_error(accepted, error);
                }
            }

            if accepted == bytes.len() {
                return Outcome::ok(accepted);
            }
        }
    }

    /// Stage every byte, growing staging buffer if they do not fit.
    ///
    /// For bytes that can no longer be handed back to the caller, such as
    /// filter output the device did not accept. They are written ahead of
    /// anything written later, in every mode.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to stage.
    pub fn retain(&mut self, bytes: &[u8]) {
        let end = self.staged + bytes.len();
        if end > self.size() {
            self.storage.resize(end, 0);
        }

        self.storage[self.staged..end].copy_from_slice(bytes);
        self.staged = end;
    }

    /// Copy as many bytes as fit into staging buffer.
    fn stage(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.space_left());
        self.storage[self.staged..self.staged + len].copy_from_slice(&bytes[..len]);
        self.staged += len;
        len
    }

    /// Flush once, failing if that did not free any space.
    fn make_room<D>(&mut self, device: &mut D) -> Option<Error>
    where
        D: Writable + ?Sized,
    {
        let (flushed, error) = self.flush(device).into_parts();
        match error {
            Some(error) => Some(error),
            None if flushed == 0 && self.staged > 0 => {
                Some(Error::with_description(ErrorKind::UnknownIoError, STALLED))
            }
            None => None,
        }
    }

    /// Write staged bytes to a device with a single call.
    ///
    /// Bytes the device did not accept are moved to the front of staging
    /// buffer, staged bytes are never dropped.
    ///
    /// * Returns number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to write into.
    pub fn flush<D>(&mut self, device: &mut D) -> Outcome<usize>
    where
        D: Writable + ?Sized,
    {
        if self.staged == 0 {
            return Outcome::ok(0);
        }

        let (written, error) = device.write(self.staged()).into_parts();
        self.discard(written);
        tracing::trace!(written, remaining = self.staged, "Flushed staged bytes");
        Outcome::new(written, error)
    }

    /// Write every staged byte to a device, retrying as needed.
    ///
    /// * Returns number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to write into.
    pub fn drain<D>(&mut self, device: &mut D) -> Outcome<usize>
    where
        D: Writable + ?Sized,
    {
        if self.staged == 0 {
            return Outcome::ok(0);
        }

        let outcome = write_all(device, self.staged(), self.attempts);
        self.discard(*outcome.value());
        tracing::trace!(
            written = *outcome.value(),
            remaining = self.staged,
            "Drained staged bytes"
        );
        outcome
    }

    /// Forget the first `len` staged bytes.
    fn discard(&mut self, len: usize) {
        let len = len.min(self.staged);
        self.storage.copy_within(len..self.staged, 0);
        self.staged -= len;
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(BufferMode::Full, DEFAULT_BUFFER_SIZE)
    }
}

/// A device along with a [`WriteBuffer`] in front of it.
///
/// Staged bytes are written to the device when the writer is dropped.
/// Errors at that point can only be logged, use [`BufferedWriter::flush`]
/// or [`BufferedWriter::into_inner`] to observe them.
#[derive(Debug)]
pub struct BufferedWriter<D: Writable> {
    device: D,
    buffer: WriteBuffer,
}

impl<D: Writable> BufferedWriter<D> {
    /// Create a new writer with a staging buffer of default size.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to write into.
    /// * `mode` - Flush policy.
    pub fn new(device: D, mode: BufferMode) -> Self {
        Self::with_buffer(device, WriteBuffer::new(mode, DEFAULT_BUFFER_SIZE))
    }

    /// Create a new writer with an existing staging buffer.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to write into.
    /// * `buffer` - Staging buffer.
    pub fn with_buffer(device: D, buffer: WriteBuffer) -> Self {
        Self { device, buffer }
    }

    /// Write bytes through the staging buffer, see [`WriteBuffer::write`].
    pub fn write(&mut self, bytes: &[u8]) -> Outcome<usize> {
        self.buffer.write(&mut self.device, bytes)
    }

    /// Write every staged byte to the device.
    pub fn flush(&mut self) -> Outcome<usize> {
        self.buffer.drain(&mut self.device)
    }

    /// Staging buffer of this writer.
    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    /// Reference to the underlying device.
    pub fn get_ref(&self) -> &D {
        &self.device
    }

    /// Mutable reference to the underlying device.
    ///
    /// Writing to the device directly bypasses staged bytes.
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Flush staged bytes and return the device.
    ///
    /// Device is returned even if flush failed, along with the error.
    pub fn into_inner(self) -> Outcome<D> {
        let (mut device, mut buffer) = self.into_parts();
        let (_, error) = buffer.drain(&mut device).into_parts();
        if error.is_some() {
            tracing::warn!(
                lost = buffer.in_use(),
                "Discarding staged bytes that could not be written"
            );
        }

        Outcome::new(device, error)
    }

    /// Split writer into device and staging buffer, without flushing.
    pub fn into_parts(self) -> (D, WriteBuffer) {
        let this = ManuallyDrop::new(self);

        // SAFETY: Fields are read exactly once and destructor of this never runs.
        unsafe { (ptr::read(&this.device), ptr::read(&this.buffer)) }
    }
}

impl<D: Writable> Drop for BufferedWriter<D> {
    fn drop(&mut self) {
        let (_, error) = self.buffer.drain(&mut self.device).into_parts();
        if let Some(error) = error {
            tracing::warn!(
                %error,
                lost = self.buffer.in_use(),
                "Failed to flush staged bytes on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Log, Scripted, Step};
    use bolero::{TypeGenerator, check};
    use rstest::rstest;

    #[derive(Debug, TypeGenerator)]
    enum Operation {
        Write(Vec<u8>),
        Flush,
        Drain,
    }

    #[rstest]
    #[case(BufferMode::Full)]
    #[case(BufferMode::Line)]
    #[case(BufferMode::None)]
    fn no_byte_is_lost_or_reordered(#[case] mode: BufferMode) {
        check!()
            .with_type::<(u8, Vec<Operation>)>()
            .for_each(|(max_write, operations)| {
                let mut device = Log::short(usize::from(*max_write).max(1));
                let mut buffer = WriteBuffer::new(mode, 64);
                let mut expected = Vec::new();

                for operation in operations {
                    match operation {
                        Operation::Write(bytes) => {
                            let outcome = buffer.write(&mut device, bytes);
                            assert_eq!(outcome, Outcome::ok(bytes.len()));
                            expected.extend_from_slice(bytes);
                        }

                        Operation::Flush => {
                            let outcome = buffer.flush(&mut device);
                            assert!(outcome.is_ok());
                        }

                        Operation::Drain => {
                            let outcome = buffer.drain(&mut device);
                            assert!(outcome.is_ok());
                            assert!(buffer.is_empty());
                        }
                    }

                    // Device log followed by staged bytes is everything written so far.
                    assert_eq!(device.bytes.len() + buffer.in_use(), expected.len());
                    assert_eq!(&expected[..device.bytes.len()], &device.bytes[..]);
                    assert_eq!(&expected[device.bytes.len()..], buffer.staged());
                }
            });
    }

    #[test]
    fn full_buffer_flushes_exactly_once() {
        let mut device = Log::default();
        let mut buffer = WriteBuffer::new(BufferMode::Full, 16);

        assert_eq!(buffer.write(&mut device, &[7; 16]), Outcome::ok(16));
        assert!(buffer.is_full());
        assert!(device.writes.is_empty());

        assert_eq!(buffer.write(&mut device, &[8]), Outcome::ok(1));
        assert_eq!(device.writes, vec![16]);
        assert_eq!(buffer.staged(), &[8]);
    }

    #[test]
    fn line_mode_flushes_on_newline() {
        let mut device = Log::default();
        let mut buffer = WriteBuffer::new(BufferMode::Line, 16);

        assert_eq!(buffer.write(&mut device, b"abc"), Outcome::ok(3));
        assert!(device.writes.is_empty());
        assert_eq!(buffer.staged(), b"abc");

        assert_eq!(buffer.write(&mut device, b"abc\n"), Outcome::ok(4));
        assert_eq!(device.bytes, b"abcabc\n");
        assert!(buffer.is_empty());

        assert_eq!(buffer.write(&mut device, b"x\ny\nzz"), Outcome::ok(6));
        assert_eq!(device.bytes, b"abcabc\nx\ny\n");
        assert_eq!(buffer.staged(), b"zz");
    }

    #[test]
    fn line_mode_splits_long_lines() {
        let mut device = Log::default();
        let mut buffer = WriteBuffer::new(BufferMode::Line, 4);

        assert_eq!(buffer.write(&mut device, b"0123456789\nab"), Outcome::ok(13));
        assert_eq!(device.writes, vec![4, 4, 3]);
        assert_eq!(buffer.staged(), b"ab");
    }

    #[test]
    fn unbuffered_write_retries_interrupts() {
        let mut device = Scripted::new([Step::Interrupted, Step::Bytes(2), Step::Interrupted]);
        let mut buffer = WriteBuffer::new(BufferMode::None, 0);

        assert_eq!(buffer.write(&mut device, b"hello"), Outcome::ok(5));
        assert_eq!(device.written, b"hello");
        assert_eq!(device.calls, 4);
    }

    #[test]
    fn unbuffered_write_surfaces_partial_progress() {
        let mut device = Scripted::new([Step::Bytes(2), Step::Fail(ErrorKind::OutOfRange)]);
        let mut buffer = WriteBuffer::new(BufferMode::None, 0);

        let outcome = buffer.write(&mut device, b"hello");
        assert_eq!(*outcome.value(), 2);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::OutOfRange));
    }

    #[test]
    fn write_all_gives_up_on_endless_interrupts() {
        let script = std::iter::once(Step::Bytes(1))
            .chain(std::iter::repeat_n(Step::Interrupted, DEFAULT_RETRY_ATTEMPTS + 1));
        let mut device = Scripted::new(script);

        let outcome = write_all(&mut device, b"hello", DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(*outcome.value(), 1);
        assert!(outcome.error().is_some_and(Error::is_interrupted));
        assert_eq!(device.written, b"h");
        assert_eq!(device.calls, DEFAULT_RETRY_ATTEMPTS + 2);
    }

    #[rstest]
    #[case(BufferMode::Full)]
    #[case(BufferMode::None)]
    fn retained_bytes_go_out_first(#[case] mode: BufferMode) {
        let mut device = Log::default();
        let mut buffer = WriteBuffer::new(mode, 4);

        buffer.retain(b"0123456");
        assert_eq!(buffer.staged(), b"0123456");
        assert!(buffer.size() >= 7);

        assert_eq!(buffer.write(&mut device, b"789"), Outcome::ok(3));
        assert!(buffer.drain(&mut device).is_ok());
        assert_eq!(device.bytes, b"0123456789");
    }

    #[test]
    fn stalled_device_is_an_error() {
        let mut device = Scripted::new([Step::Bytes(0)]);
        let mut buffer = WriteBuffer::new(BufferMode::Full, 4);

        let outcome = buffer.write(&mut device, b"hello");
        assert_eq!(*outcome.value(), 4);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownIoError));
        assert_eq!(buffer.staged(), b"hell");
    }

    #[test]
    fn external_storage_is_returned() {
        let mut device = Log::default();
        let mut buffer = WriteBuffer::external(Vec::with_capacity(8));
        assert_eq!(buffer.mode(), BufferMode::External);
        assert_eq!(buffer.size(), 8);

        assert_eq!(buffer.write(&mut device, b"0123456789"), Outcome::ok(10));
        assert_eq!(device.bytes, b"01234567");

        let storage = buffer.into_external().unwrap();
        assert_eq!(storage, b"89");
        assert!(storage.capacity() >= 8);
    }

    #[test]
    fn writer_flushes_on_drop() {
        let mut log = Log::default();
        {
            let mut writer = BufferedWriter::new(&mut log, BufferMode::Full);
            assert_eq!(writer.write(b"pending"), Outcome::ok(7));
            assert!(writer.get_ref().bytes.is_empty());
        }

        assert_eq!(log.bytes, b"pending");
    }

    #[test]
    fn into_inner_flushes() {
        let mut writer = BufferedWriter::new(Log::default(), BufferMode::Line);
        assert_eq!(writer.write(b"partial"), Outcome::ok(7));

        let (device, error) = writer.into_inner().into_parts();
        assert!(error.is_none());
        assert_eq!(device.bytes, b"partial");
    }

    #[rstest]
    #[case("full", BufferMode::Full)]
    #[case("Line", BufferMode::Line)]
    #[case(" none ", BufferMode::None)]
    #[case("external", BufferMode::External)]
    fn parse_buffer_mode(#[case] value: &str, #[case] mode: BufferMode) {
        assert_eq!(value.parse::<BufferMode>(), Ok(mode));
        assert_eq!(mode.to_string().parse::<BufferMode>(), Ok(mode));
    }

    #[test]
    fn reject_unknown_buffer_mode() {
        let error = "partial".parse::<BufferMode>().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }
}
