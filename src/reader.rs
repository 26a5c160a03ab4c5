//! Definition of the read staging layer that sits in front of a device.

use crate::{
    DEFAULT_BUFFER_SIZE, DEFAULT_RETRY_ATTEMPTS, Error, ErrorKind, Outcome, Readable, device::drive,
};

const STALLED: &str = "device produced no bytes";

/// Read bytes until `dest` is full, retrying interrupted and stalled reads.
///
/// Stops immediately at end of file, returning bytes read so far along with
/// [`ErrorKind::EndOfFile`].
///
/// # Arguments
///
/// * `device` - Device to read from.
/// * `dest` - Buffer to fill.
/// * `attempts` - Number of retries allowed.
pub fn read_all<D>(device: &mut D, dest: &mut [u8], attempts: usize) -> Outcome<usize>
where
    D: Readable + ?Sized,
{
    drive(dest.len(), attempts, STALLED, |done| device.read(&mut dest[done..]))
}

/// Staging buffer for bytes read from a device.
///
/// Layout of the staging buffer:
///
/// ```text
/// 0 ...... next ...... end ...... capacity
/// | consumed |  unread   |  free    |
/// ```
///
/// Bytes that are put back go right before `next`. When there is no room for
/// them the buffer grows, and shrinks back to its configured size once they
/// are read.
#[derive(Debug)]
pub struct ReadBuffer {
    storage: Vec<u8>,
    next: usize,
    end: usize,
    // Configured size, storage is larger only while bytes put back are unread.
    read_ahead: usize,
    attempts: usize,
}

impl ReadBuffer {
    /// Create a new staging buffer.
    ///
    /// A capacity of 0 disables read ahead, bytes put back are still staged.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Size of staging buffer in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            next: 0,
            end: 0,
            read_ahead: capacity,
            attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Set the number of retries for operations that loop.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Size of staging buffer in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of staged bytes that are not yet read.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.end - self.next
    }

    /// Number of bytes that can be staged without compaction.
    #[inline]
    pub fn space_left(&self) -> usize {
        self.capacity() - self.end
    }

    /// true if there are no unread bytes staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_use() == 0
    }

    /// Unread staged bytes.
    #[inline]
    pub fn peek(&self) -> &[u8] {
        &self.storage[self.next..self.end]
    }

    /// Mark unread staged bytes as read.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of bytes to consume, clamped to [`ReadBuffer::in_use`].
    pub fn consume(&mut self, len: usize) {
        self.next += len.min(self.in_use());
        self.settle();
    }

    /// Drop every staged byte.
    pub fn clear(&mut self) {
        self.next = 0;
        self.end = 0;
        self.settle();
    }

    /// Shrink back to configured size once bytes put back are read.
    fn settle(&mut self) {
        if self.next == self.end && self.capacity() > self.read_ahead {
            self.next = 0;
            self.end = 0;
            self.storage.truncate(self.read_ahead);
            self.storage.shrink_to_fit();
        }
    }

    /// Grow staging buffer.
    ///
    /// Buffers never shrink, a smaller size is ignored.
    ///
    /// # Arguments
    ///
    /// * `capacity` - New size of staging buffer in bytes.
    pub fn resize(&mut self, capacity: usize) {
        if capacity > self.read_ahead {
            self.read_ahead = capacity;
        }

        if capacity > self.capacity() {
            self.compact();
            self.storage.resize(capacity, 0);
        }
    }

    /// Move unread bytes to the front of staging buffer.
    fn compact(&mut self) {
        if self.next > 0 {
            self.storage.copy_within(self.next..self.end, 0);
            self.end -= self.next;
        }

        self.next = 0;
    }

    /// Copy unread bytes into a slice.
    fn take(&mut self, dest: &mut [u8]) -> usize {
        let len = dest.len().min(self.in_use());
        dest[..len].copy_from_slice(&self.storage[self.next..self.next + len]);
        self.next += len;
        self.settle();
        len
    }

    /// Read some bytes through this buffer.
    ///
    /// Staged bytes are served first. Otherwise reads large enough to fill the
    /// whole staging buffer go straight to the device, smaller ones refill
    /// staging buffer once.
    ///
    /// * Returns number of bytes read.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    /// * `dest` - Buffer to read bytes into.
    pub fn read<D>(&mut self, device: &mut D, dest: &mut [u8]) -> Outcome<usize>
    where
        D: Readable + ?Sized,
    {
        if dest.is_empty() {
            return Outcome::ok(0);
        }

        if self.is_empty() {
            if dest.len() >= self.capacity() {
                return device.read(dest);
            }

            let (_, error) = self.fill(device).into_parts();
            if let Some(error) = error {
                if self.is_empty() {
                    return Outcome::from_error(error);
                }
            }
        }

        Outcome::ok(self.take(dest))
    }

    /// Read bytes until `dest` is full, see [`read_all`].
    pub fn read_exact<D>(&mut self, device: &mut D, dest: &mut [u8]) -> Outcome<usize>
    where
        D: Readable + ?Sized,
    {
        drive(dest.len(), self.attempts, STALLED, |done| self.read(device, &mut dest[done..]))
    }

    /// Stage more bytes with a single device read.
    ///
    /// Unread bytes are moved to the front first, to make room.
    ///
    /// * Returns number of bytes staged.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    pub fn fill<D>(&mut self, device: &mut D) -> Outcome<usize>
    where
        D: Readable + ?Sized,
    {
        self.compact();
        if self.space_left() == 0 {
            return Outcome::ok(0);
        }

        let (read, error) = device.read(&mut self.storage[self.end..]).into_parts();
        self.end += read;
        Outcome::new(read, error)
    }

    /// Stage bytes so that they are read next, before anything else.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to put back.
    pub fn putback(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if len <= self.next {
            self.next -= len;
            self.storage[self.next..self.next + len].copy_from_slice(bytes);
            return;
        }

        let unread = self.in_use();
        if len + unread > self.capacity() {
            self.storage.resize(len + unread, 0);
        }

        self.storage.copy_within(self.next..self.end, len);
        self.storage[..len].copy_from_slice(bytes);
        self.next = 0;
        self.end = len + unread;
    }

    /// Stage a single byte so that it is read next.
    pub fn unget(&mut self, byte: u8) {
        self.putback(&[byte]);
    }

    /// Read bytes up to and including a delimiter.
    ///
    /// * Returns number of bytes appended to `out`.
    /// * Last chunk of input is returned without error even if it does not end with delimiter.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    /// * `delim` - Byte that ends the chunk.
    /// * `out` - Vector to append bytes to.
    pub fn read_until<D>(&mut self, device: &mut D, delim: u8, out: &mut Vec<u8>) -> Outcome<usize>
    where
        D: Readable + ?Sized,
    {
        let mut total = 0;
        let mut retries = self.attempts;
        loop {
            let unread = self.peek();
            if let Some(position) = unread.iter().position(|byte| *byte == delim) {
                out.extend_from_slice(&unread[..=position]);
                self.consume(position + 1);
                return Outcome::ok(total + position + 1);
            }

            out.extend_from_slice(unread);
            total += unread.len();
            self.consume(unread.len());

            let (read, error) = match self.capacity() {
                0 => {
                    let mut byte = [0u8];
                    let outcome = device.read(&mut byte);
                    if *outcome.value() == 1 {
                        self.unget(byte[0]);
                    }
                    outcome
                }
                _ => self.fill(device),
            }
            .into_parts();

            match error {
                None if read > 0 => continue,
                Some(error) if error.is_eof() => {
                    return match total {
                        0 => Outcome::from_error(error),
                        _ => Outcome::ok(total),
                    };
                }
                Some(error) if !error.is_interrupted() => return Outcome::with_error(total, error),
                Some(error) if retries == 0 => return Outcome::with_error(total, error),
                None if retries == 0 => {
                    let error = Error::with_description(ErrorKind::UnknownIoError, STALLED);
                    return Outcome::with_error(total, error);
                }
                _ => {
                    retries -= 1;
                    tracing::debug!(total, retries, "Retrying interrupted read");
                }
            }
        }
    }

    /// Read a line of UTF-8 text, including its newline.
    ///
    /// * Returns number of bytes appended to `line`.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    /// * `line` - String to append the line to.
    pub fn read_line<D>(&mut self, device: &mut D, line: &mut String) -> Outcome<usize>
    where
        D: Readable + ?Sized,
    {
        let mut bytes = Vec::new();
        let (read, error) = self.read_until(device, b'\n', &mut bytes).into_parts();
        append_utf8(line, bytes, read, error)
    }
}

/// Append bytes to a string if they are valid UTF-8.
pub(crate) fn append_utf8(
    line: &mut String,
    bytes: Vec<u8>,
    read: usize,
    error: Option<Error>,
) -> Outcome<usize> {
    match String::from_utf8(bytes) {
        Ok(text) => {
            line.push_str(&text);
            Outcome::new(read, error)
        }
        Err(invalid) => Outcome::with_error(
            0,
            Error::with_description(ErrorKind::InvalidInput, invalid.utf8_error().to_string()),
        ),
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// A device along with a [`ReadBuffer`] in front of it.
#[derive(Debug)]
pub struct BufferedReader<D: Readable> {
    device: D,
    buffer: ReadBuffer,
}

impl<D: Readable> BufferedReader<D> {
    /// Create a new reader with a staging buffer of default size.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    pub fn new(device: D) -> Self {
        Self::with_buffer(device, ReadBuffer::default())
    }

    /// Create a new reader with an existing staging buffer.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from.
    /// * `buffer` - Staging buffer.
    pub fn with_buffer(device: D, buffer: ReadBuffer) -> Self {
        Self { device, buffer }
    }

    /// Read some bytes, see [`ReadBuffer::read`].
    pub fn read(&mut self, dest: &mut [u8]) -> Outcome<usize> {
        self.buffer.read(&mut self.device, dest)
    }

    /// Read bytes until `dest` is full, see [`read_all`].
    pub fn read_all(&mut self, dest: &mut [u8]) -> Outcome<usize> {
        self.buffer.read_exact(&mut self.device, dest)
    }

    /// Stage bytes so that they are read next.
    pub fn putback(&mut self, bytes: &[u8]) {
        self.buffer.putback(bytes);
    }

    /// Read bytes up to and including a delimiter, see [`ReadBuffer::read_until`].
    pub fn read_until(&mut self, delim: u8, out: &mut Vec<u8>) -> Outcome<usize> {
        self.buffer.read_until(&mut self.device, delim, out)
    }

    /// Read a line of UTF-8 text, see [`ReadBuffer::read_line`].
    pub fn read_line(&mut self, line: &mut String) -> Outcome<usize> {
        self.buffer.read_line(&mut self.device, line)
    }

    /// Staging buffer of this reader.
    pub fn buffer(&self) -> &ReadBuffer {
        &self.buffer
    }

    /// Reference to the underlying device.
    pub fn get_ref(&self) -> &D {
        &self.device
    }

    /// Mutable reference to the underlying device.
    ///
    /// Reading from the device directly skips over staged bytes.
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Return the device, dropping any staged bytes.
    pub fn into_inner(self) -> D {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, Step};
    use rstest::rstest;

    fn device(input: &[u8]) -> Scripted {
        Scripted::default().with_input(input)
    }

    fn drain(reader: &mut BufferedReader<Scripted>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0; chunk];
        loop {
            let (read, error) = reader.read(&mut buf).into_parts();
            out.extend_from_slice(&buf[..read]);
            if let Some(error) = error {
                assert!(error.is_eof());
                return out;
            }
        }
    }

    #[rstest]
    #[case(0, 3)]
    #[case(4, 3)]
    #[case(4, 16)]
    #[case(64, 5)]
    fn reads_preserve_order(#[case] capacity: usize, #[case] chunk: usize) {
        let input: Vec<u8> = (0..=255).collect();
        let mut reader = BufferedReader::with_buffer(device(&input), ReadBuffer::new(capacity));
        assert_eq!(drain(&mut reader, chunk), input);
        assert!(reader.get_ref().is_eof());
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    #[case(64)]
    fn putback_is_read_exactly_once(#[case] capacity: usize) {
        let mut reader = BufferedReader::with_buffer(device(b"world"), ReadBuffer::new(capacity));

        let mut buf = [0; 2];
        assert_eq!(reader.read(&mut buf), Outcome::ok(2));
        assert_eq!(&buf, b"wo");

        reader.putback(b"hello ");
        reader.putback(b"wo");
        assert_eq!(drain(&mut reader, 3), b"wohello rld");
    }

    #[test]
    fn resize_never_shrinks() {
        let mut reader = BufferedReader::with_buffer(device(b"abcdef"), ReadBuffer::new(4));
        let mut buf = [0; 1];
        assert_eq!(reader.read(&mut buf), Outcome::ok(1));

        reader.buffer.resize(2);
        assert_eq!(reader.buffer().capacity(), 4);

        reader.buffer.resize(16);
        assert_eq!(reader.buffer().capacity(), 16);
        assert_eq!(reader.buffer().peek(), b"bcd");
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(64)]
    fn read_lines(#[case] capacity: usize) {
        let source = device(b"first\nsecond\nlast");
        let mut reader = BufferedReader::with_buffer(source, ReadBuffer::new(capacity));

        let mut line = String::new();
        assert_eq!(reader.read_line(&mut line), Outcome::ok(6));
        assert_eq!(line, "first\n");

        line.clear();
        assert_eq!(reader.read_line(&mut line), Outcome::ok(7));
        assert_eq!(line, "second\n");

        line.clear();
        assert_eq!(reader.read_line(&mut line), Outcome::ok(4));
        assert_eq!(line, "last");

        let outcome = reader.read_line(&mut line);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::EndOfFile));
    }

    #[test]
    fn invalid_utf8_line_is_rejected() {
        let mut reader = BufferedReader::new(device(b"\xff\xfe\n"));
        let mut line = String::new();

        let outcome = reader.read_line(&mut line);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::InvalidInput));
        assert!(line.is_empty());
    }

    #[test]
    fn read_all_stops_at_end_of_file() {
        let mut source = device(b"abc");
        let mut buf = [0; 8];

        let outcome = read_all(&mut source, &mut buf, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(*outcome.value(), 3);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::EndOfFile));
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn read_all_retries_interrupts() {
        let mut source =
            Scripted::new([Step::Bytes(1), Step::Interrupted, Step::Bytes(1)]).with_input(b"abc");
        let mut buf = [0; 3];

        assert_eq!(read_all(&mut source, &mut buf, 2), Outcome::ok(3));
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn read_all_gives_up_on_endless_interrupts() {
        let script = std::iter::once(Step::Bytes(1))
            .chain(std::iter::repeat_n(Step::Interrupted, DEFAULT_RETRY_ATTEMPTS + 1));
        let mut source = Scripted::new(script).with_input(b"abc");
        let mut buf = [0; 3];

        let outcome = read_all(&mut source, &mut buf, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(*outcome.value(), 1);
        assert!(outcome.error().is_some_and(Error::is_interrupted));
        assert_eq!(buf[0], b'a');
        assert_eq!(source.calls, DEFAULT_RETRY_ATTEMPTS + 2);
    }

    #[rstest]
    #[case(0, b'b')]
    #[case(4, b'e')]
    fn putback_growth_is_temporary(#[case] capacity: usize, #[case] next: u8) {
        let mut reader = BufferedReader::with_buffer(device(b"abcdef"), ReadBuffer::new(capacity));
        let mut buf = [0; 1];
        assert_eq!(reader.read(&mut buf), Outcome::ok(1));

        reader.putback(b"0123456789");
        assert!(reader.buffer().capacity() >= 10);

        let mut staged = vec![0; reader.buffer().in_use()];
        assert_eq!(reader.read_all(&mut staged), Outcome::ok(staged.len()));
        assert!(staged.starts_with(b"0123456789"));
        assert_eq!(reader.buffer().capacity(), capacity);

        assert_eq!(reader.read(&mut buf), Outcome::ok(1));
        assert_eq!(buf[0], next);
        assert_eq!(reader.buffer().capacity(), capacity);
    }

    #[test]
    fn unbuffered_read_until_reads_no_further() {
        let mut reader = BufferedReader::with_buffer(device(b"ab\ncd"), ReadBuffer::new(0));

        let mut out = Vec::new();
        assert_eq!(reader.read_until(b'\n', &mut out), Outcome::ok(3));
        assert_eq!(out, b"ab\n");
        assert_eq!(reader.buffer().capacity(), 0);
        assert_eq!(reader.get_ref().input, b"cd");
    }

    #[test]
    fn read_all_surfaces_other_errors() {
        let mut source = Scripted::new([Step::Bytes(1), Step::Fail(ErrorKind::OutOfMemory)])
            .with_input(b"abc");
        let mut buf = [0; 3];

        let outcome = read_all(&mut source, &mut buf, 8);
        assert_eq!(*outcome.value(), 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::OutOfMemory));
    }
}
