//! Definition of a stream, a device composed with staging buffers and filters.

use crate::{
    AbsoluteSeekable, BufferMode, Device, DirectReadable, DirectWritable, Encoding, Error,
    ErrorKind, Filter, FilterChain, FilterScratch, Flushable, Outcome, ReadBuffer, Readable,
    RelativeSeekable, StreamConfig, Syncable, Tellable, VectorReadable, VectorWritable, Whence,
    Writable, WriteBuffer, device::drive, reader::append_utf8,
};
use std::{
    collections::VecDeque,
    fmt,
    io::{IoSlice, IoSliceMut},
    mem::{self, ManuallyDrop},
    ptr,
};

/// Read staging buffers are at least this large once a source filter is installed.
const MIN_FILTER_INPUT: usize = 512;

const STALLED_READ: &str = "device produced no bytes";
const STALLED_WRITE: &str = "device accepted no bytes";

/// Flushes output of a stream whose device is known to be writable.
type OutputHook<D> = fn(&mut Stream<D>, bool) -> Outcome<()>;

macro_rules! ensure_open {
    ($stream:expr) => {
        if $stream.closed {
            let error = Error::with_description(ErrorKind::InvalidOperation, "stream is closed");
            return Outcome::from_error(error);
        }
    };
}

/// State of one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Bytes go straight between filters and the device.
    Unbuffered,

    /// Nothing is staged.
    Idle,

    /// Some bytes are staged.
    Dirty,

    /// Stream was closed, every operation fails.
    Closed,
}

/// A byte stream over a device.
///
/// Bytes written go through the sink filter chain, then the write staging
/// buffer, then the device. Bytes read come from the device through the read
/// staging buffer, then the source filter chain.
///
/// Staging buffers are built on first use, from the capabilities of the
/// device. A device that exposes its memory through [`DirectWritable`] or
/// [`DirectReadable`] gets no staging in that direction, bytes are copied
/// straight into or out of its windows.
///
/// Operations are available only when the device supports them, for example
/// [`Stream::seek`] needs an [`AbsoluteSeekable`] device.
///
/// Staged output is flushed when a stream is dropped. Errors at that point can
/// only be logged, use [`Stream::close`] or [`Stream::into_inner`] to observe them.
///
/// ```
/// use crossio::{Stream, StreamConfig, devices::VecDevice};
///
/// let mut stream = Stream::with_config(VecDevice::new(), StreamConfig::unbuffered());
/// assert!(writeln!(stream, "Hello {}!", "world").is_ok());
///
/// let device = stream.into_inner().into_result().unwrap();
/// assert_eq!(device.as_slice(), b"Hello world!\n");
/// ```
#[derive(Debug)]
pub struct Stream<D: Device> {
    device: D,
    config: StreamConfig,
    writer: Option<WriteBuffer>,
    reader: Option<ReadBuffer>,
    direct_writes: bool,
    direct_reads: bool,
    sink: FilterChain,
    source: FilterChain,
    sink_scratch: FilterScratch,
    source_scratch: FilterScratch,
    pending: VecDeque<u8>,
    needs_input: bool,
    input_finished: bool,
    output: Option<OutputHook<D>>,
    closed: bool,
}

impl<D: Device> Stream<D> {
    /// Create a new stream with default configuration.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from and write into.
    pub fn new(device: D) -> Self {
        Self::with_config(device, StreamConfig::default())
    }

    /// Create a new stream.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from and write into.
    /// * `config` - Configuration of the stream.
    pub fn with_config(device: D, config: StreamConfig) -> Self {
        Self {
            device,
            config,
            writer: None,
            reader: None,
            direct_writes: false,
            direct_reads: false,
            sink: FilterChain::new(),
            source: FilterChain::new(),
            sink_scratch: FilterScratch::default(),
            source_scratch: FilterScratch::default(),
            pending: VecDeque::new(),
            needs_input: false,
            input_finished: false,
            output: None,
            closed: false,
        }
    }

    /// Create a new stream with an existing write staging buffer.
    ///
    /// This is how [`BufferMode::External`] staging is supplied, see
    /// [`WriteBuffer::external`]. Write mode and capacity of `config` are
    /// ignored, and writes are staged even if the device exposes its memory.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to read from and write into.
    /// * `config` - Configuration of the stream.
    /// * `writer` - Write staging buffer.
    pub fn with_write_buffer(device: D, config: StreamConfig, writer: WriteBuffer) -> Self {
        let writer = writer.with_retry_attempts(config.retry_attempts);
        let mut stream = Self::with_config(device, config);
        stream.writer = Some(writer);
        stream
    }

    /// Configuration of this stream.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Encoding of text written to this stream.
    pub fn encoding(&self) -> Encoding {
        self.config.encoding
    }

    /// Reference to the underlying device.
    pub fn get_ref(&self) -> &D {
        &self.device
    }

    /// Mutable reference to the underlying device.
    ///
    /// Using the device directly bypasses staged bytes and filters.
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Write staging buffer of this stream, once one was built.
    pub fn write_buffer(&self) -> Option<&WriteBuffer> {
        self.writer.as_ref()
    }

    /// Read staging buffer of this stream, once one was built.
    pub fn read_buffer(&self) -> Option<&ReadBuffer> {
        self.reader.as_ref()
    }

    /// Append a filter to the chain that bytes pass through before they are written.
    pub fn push_sink_filter(&mut self, filter: impl Filter + 'static) {
        self.sink.push(filter);
    }

    /// Append a filter to the chain that bytes pass through after they are read.
    pub fn push_source_filter(&mut self, filter: impl Filter + 'static) {
        if let Some(reader) = &mut self.reader {
            reader.resize(MIN_FILTER_INPUT);
        }

        self.source.push(filter);
    }

    /// Filters applied to bytes that are written.
    pub fn sink_filters(&mut self) -> &mut FilterChain {
        &mut self.sink
    }

    /// Filters applied to bytes that are read.
    pub fn source_filters(&mut self) -> &mut FilterChain {
        &mut self.source
    }

    /// true if this stream was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// State of the write direction.
    pub fn state_write(&self) -> BufferState {
        let unbuffered = self.direct_writes
            || self.config.write_mode == BufferMode::None
            || self.config.write_capacity == 0;

        match &self.writer {
            _ if self.closed => BufferState::Closed,
            Some(writer) if !writer.is_empty() => BufferState::Dirty,
            Some(writer) if writer.mode() == BufferMode::None => BufferState::Unbuffered,
            Some(_) => BufferState::Idle,
            None if unbuffered => BufferState::Unbuffered,
            None => BufferState::Idle,
        }
    }

    /// State of the read direction.
    pub fn state_read(&self) -> BufferState {
        let staged = self.staged_input() > 0 || !self.pending.is_empty();
        let capacity = match &self.reader {
            Some(reader) => reader.capacity(),
            None if self.direct_reads => 0,
            None => self.config.read_capacity,
        };

        match capacity {
            _ if self.closed => BufferState::Closed,
            _ if staged => BufferState::Dirty,
            0 => BufferState::Unbuffered,
            _ => BufferState::Idle,
        }
    }

    /// Flush staged output, close the device and move into closed state.
    ///
    /// Filters get to emit output they held back before the flush. Every
    /// later operation fails with [`ErrorKind::InvalidOperation`].
    pub fn close(&mut self) -> Outcome<()> {
        ensure_open!(self);

        let (_, output_error) = self.flush_output(true).into_parts();
        let (_, close_error) = self.device.close().into_parts();
        self.discard_input();
        self.closed = true;

        tracing::debug!(lost = self.staged_output(), "Closed stream");
        Outcome::new((), output_error.or(close_error))
    }

    /// Flush staged output and return the device.
    ///
    /// Device is returned even if flush failed, along with the error.
    pub fn into_inner(self) -> Outcome<D> {
        self.into_parts().map(|(device, _)| device)
    }

    /// Flush staged output and return the device along with write staging buffer.
    ///
    /// Bytes that could not be flushed remain in the returned buffer. There is
    /// no buffer if nothing was ever staged for writing.
    pub fn into_parts(mut self) -> Outcome<(D, Option<WriteBuffer>)> {
        let error = match self.closed {
            true => None,
            false => self.flush_output(true).into_parts().1,
        };

        let this = ManuallyDrop::new(self);

        // SAFETY: Every field with a destructor is read exactly once, and
        // destructor of this never runs.
        let (device, writer) = unsafe {
            drop(ptr::read(&this.reader));
            drop(ptr::read(&this.sink));
            drop(ptr::read(&this.source));
            drop(ptr::read(&this.sink_scratch));
            drop(ptr::read(&this.source_scratch));
            drop(ptr::read(&this.pending));
            drop(ptr::read(&this.config));
            (ptr::read(&this.device), ptr::read(&this.writer))
        };

        Outcome::new((device, writer), error)
    }

    /// Number of bytes staged for writing.
    fn staged_output(&self) -> usize {
        self.writer.as_ref().map_or(0, WriteBuffer::in_use)
    }

    /// Number of bytes read from the device but not yet used.
    fn staged_input(&self) -> usize {
        self.reader.as_ref().map_or(0, ReadBuffer::in_use)
    }

    /// Size of read staging, source filters need room to work with.
    fn read_capacity(&self) -> usize {
        match self.source.is_empty() {
            true => self.config.read_capacity,
            false => self.config.read_capacity.max(MIN_FILTER_INPUT),
        }
    }

    /// Flush staged output, if anything was ever written.
    ///
    /// # Arguments
    ///
    /// * `end_of_stream` - true if filters should emit output they held back.
    fn flush_output(&mut self, end_of_stream: bool) -> Outcome<()> {
        match self.output {
            Some(hook) => hook(self, end_of_stream),
            None => Outcome::ok(()),
        }
    }

    /// Write staged output, so that reads that follow observe it.
    fn flush_before_read(&mut self) -> Outcome<()> {
        match self.staged_output() {
            0 => Outcome::ok(()),
            _ => self.flush_output(false),
        }
    }

    /// Give input that was read ahead back to the device, so that writes land
    /// right after the last byte used.
    ///
    /// Devices where reads and writes do not share a position keep their input.
    fn realign(&mut self) -> Outcome<()> {
        let unread = self.staged_input();
        if unread == 0 && self.pending.is_empty() {
            return Outcome::ok(());
        }

        let (moved, error) = self.device.rewind(unread).into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        if moved {
            tracing::trace!(
                unread,
                queued = self.pending.len(),
                "Dropped input read ahead of a write"
            );
            self.discard_input();
        }

        Outcome::ok(())
    }

    /// Forget staged and filtered input.
    fn discard_input(&mut self) {
        if let Some(reader) = &mut self.reader {
            reader.clear();
        }

        self.pending.clear();
        self.needs_input = false;
        self.input_finished = false;
    }

    /// Copy filtered bytes into a slice.
    fn take_pending(&mut self, dest: &mut [u8]) -> usize {
        let len = dest.len().min(self.pending.len());
        for (dst, src) in dest.iter_mut().zip(self.pending.drain(..len)) {
            *dst = src;
        }

        len
    }
}

impl<D: Device> Drop for Stream<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let (_, error) = self.flush_output(true).into_parts();
        if let Some(error) = error {
            tracing::warn!(%error, lost = self.staged_output(), "Failed to flush stream on drop");
        }
    }
}

impl<D: Writable> Stream<D> {
    /// Write bytes to this stream.
    ///
    /// Input that was read ahead is given back to the device first, so bytes
    /// land right after the last byte read.
    ///
    /// * Returns number of bytes accepted, which is `bytes.len()` unless there is an error.
    /// * Bytes accepted by sink filters are never dropped. Output the device did
    ///   not take stays staged and is written by the next flush.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to write.
    pub fn write(&mut self, bytes: &[u8]) -> Outcome<usize> {
        ensure_open!(self);
        self.output = Some(Self::finish_output as OutputHook<D>);

        let (_, error) = self.realign().into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        if self.sink.is_empty() {
            return self.emit(bytes);
        }

        let mut accepted = 0;
        while accepted < bytes.len() {
            let input = &bytes[accepted..];
            let (consumed, error) = self.sink.apply(input, &mut self.sink_scratch).into_parts();
            if let Some(error) = error {
                return Outcome::with_error(accepted, error);
            }

            if consumed == 0 {
                let error = Error::with_description(
                    ErrorKind::InvalidOperation,
                    "sink filters consumed no input",
                );
                return Outcome::with_error(accepted, error);
            }

            accepted += consumed;
            let (_, error) = self.emit_filtered().into_parts();
            if let Some(error) = error {
                return Outcome::with_error(accepted, error);
            }
        }

        Outcome::ok(accepted)
    }

    /// Write a single byte to this stream.
    pub fn put(&mut self, byte: u8) -> Outcome<()> {
        self.write(&[byte]).map(|_| ())
    }

    /// Write text to this stream, in encoding of this stream.
    ///
    /// * Returns number of encoded bytes accepted.
    pub fn write_str(&mut self, text: &str) -> Outcome<usize> {
        match self.config.encoding {
            Encoding::Utf8 => self.write(text.as_bytes()),
            encoding => {
                let mut encoded = Vec::with_capacity(text.len() * 2);
                encoding.encode(text, &mut encoded);
                self.write(&encoded)
            }
        }
    }

    /// Write formatted text to this stream, supports [`write!`] and [`writeln!`].
    ///
    /// * Returns number of encoded bytes accepted.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Outcome<usize> {
        if let Some(text) = args.as_str() {
            return self.write_str(text);
        }

        let mut adapter = Adapter {
            stream: self,
            written: 0,
            error: None,
        };

        match fmt::write(&mut adapter, args) {
            Ok(()) => Outcome::ok(adapter.written),
            Err(_) => {
                let error = adapter
                    .error
                    .unwrap_or_else(|| {
                        Error::with_description(ErrorKind::InvalidInput, "formatter failed")
                    });
                Outcome::with_error(adapter.written, error)
            }
        }
    }

    /// Hand bytes to write staging, or straight to device memory if the
    /// device exposes it and nothing is staged.
    fn emit(&mut self, bytes: &[u8]) -> Outcome<usize> {
        if self.writer.is_none() {
            if let Some(memory) = self.device.writable_memory() {
                self.direct_writes = true;
                return write_direct(memory, bytes);
            }
        }

        let config = &self.config;
        let writer = self.writer.get_or_insert_with(|| write_staging(config));
        writer.write(&mut self.device, bytes)
    }

    /// Hand output of sink filters to the device.
    ///
    /// Input behind that output was already consumed by filters, so whatever
    /// the device did not accept is staged, growing staging as needed.
    fn emit_filtered(&mut self) -> Outcome<usize> {
        let scratch = mem::take(&mut self.sink_scratch);
        let (written, error) = self.emit(scratch.output()).into_parts();
        if error.is_some() {
            let rest = scratch.output().get(written..).unwrap_or_default();
            if !rest.is_empty() {
                let config = &self.config;
                self.writer.get_or_insert_with(|| write_staging(config)).retain(rest);
                tracing::debug!(
                    staged = rest.len(),
                    "Kept filtered bytes the device did not accept"
                );
            }
        }

        self.sink_scratch = scratch;
        Outcome::new(written, error)
    }

    /// Emit held filter output if asked to, then write every staged byte.
    fn finish_output(&mut self, end_of_stream: bool) -> Outcome<()> {
        if end_of_stream && !self.sink.is_empty() {
            let (_, error) = self.sink.finish(&mut self.sink_scratch).into_parts();
            if let Some(error) = error {
                return Outcome::from_error(error);
            }

            let (_, error) = self.emit_filtered().into_parts();
            if let Some(error) = error {
                return Outcome::from_error(error);
            }
        }

        match &mut self.writer {
            Some(writer) => writer.drain(&mut self.device).map(|_| ()),
            None => Outcome::ok(()),
        }
    }
}

/// Write staging configured for a stream.
fn write_staging(config: &StreamConfig) -> WriteBuffer {
    WriteBuffer::new(config.write_mode, config.write_capacity)
        .with_retry_attempts(config.retry_attempts)
}

/// Copy bytes into writable memory of a device.
fn write_direct(memory: &mut dyn DirectWritable, bytes: &[u8]) -> Outcome<usize> {
    let mut written = 0;
    while written < bytes.len() {
        let window = memory.writable_window();
        if window.is_empty() {
            // No memory left, the device reports why or takes bytes some other way.
            let (len, error) = memory.write(&bytes[written..]).into_parts();
            written += len;
            match error {
                Some(error) => return Outcome::with_error(written, error),
                None if len == 0 => {
                    let error = Error::with_description(ErrorKind::UnknownIoError, STALLED_WRITE);
                    return Outcome::with_error(written, error);
                }
                None => continue,
            }
        }

        let len = window.len().min(bytes.len() - written);
        window[..len].copy_from_slice(&bytes[written..written + len]);
        memory.commit(len);
        written += len;
    }

    Outcome::ok(written)
}

/// Forwards formatted text into a stream, remembering the first error.
struct Adapter<'s, D: Writable> {
    stream: &'s mut Stream<D>,
    written: usize,
    error: Option<Error>,
}

impl<D: Writable> fmt::Write for Adapter<'_, D> {
    fn write_str(&mut self, text: &str) -> fmt::Result {
        let (written, error) = self.stream.write_str(text).into_parts();
        self.written += written;
        match error {
            None => Ok(()),
            Some(error) => {
                self.error = Some(error);
                Err(fmt::Error)
            }
        }
    }
}

impl<D: Writable + Flushable> Stream<D> {
    /// Write staged bytes to the device, then flush the device.
    pub fn flush(&mut self) -> Outcome<()> {
        ensure_open!(self);

        if let Some(writer) = &mut self.writer {
            let (_, error) = writer.drain(&mut self.device).into_parts();
            if let Some(error) = error {
                return Outcome::from_error(error);
            }
        }

        self.device.flush()
    }
}

impl<D: Writable + Flushable + Syncable> Stream<D> {
    /// Flush this stream, then make every write durable.
    pub fn sync(&mut self) -> Outcome<()> {
        let (_, error) = self.flush().into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        self.device.sync()
    }
}

impl<D: VectorWritable> Stream<D> {
    /// Write bytes at an absolute offset.
    ///
    /// Positional writes go straight to the device, they bypass filters and
    /// staging, and do not move the stream position.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to write.
    /// * `offset` - Absolute offset to write at.
    pub fn write_at(&mut self, bytes: &[u8], offset: u64) -> Outcome<usize> {
        self.write_vectored_at(&[IoSlice::new(bytes)], offset)
    }

    /// Write a sequence of buffers at an absolute offset, see [`Stream::write_at`].
    pub fn write_vectored_at(&mut self, bufs: &[IoSlice<'_>], offset: u64) -> Outcome<usize> {
        ensure_open!(self);
        self.device.write_vectored_at(bufs, offset)
    }
}

impl<D: Readable> Stream<D> {
    /// Read some bytes from this stream.
    ///
    /// Staged output is written first, so that it can be read back.
    ///
    /// * Returns number of bytes read, which can be less than `dest.len()`.
    /// * Returns 0 with [`ErrorKind::EndOfFile`] when stream is exhausted.
    ///
    /// # Arguments
    ///
    /// * `dest` - Buffer to read bytes into.
    pub fn read(&mut self, dest: &mut [u8]) -> Outcome<usize> {
        ensure_open!(self);
        if dest.is_empty() {
            return Outcome::ok(0);
        }

        let (_, error) = self.flush_before_read().into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        loop {
            if !self.pending.is_empty() {
                let taken = self.take_pending(dest);
                if taken == dest.len() || !self.source.is_empty() {
                    return Outcome::ok(taken);
                }

                // Bytes put back, then whatever the device has.
                return match self.read_unfiltered(&mut dest[taken..]).into_parts() {
                    (_, Some(error)) if error.is_eof() => Outcome::ok(taken),
                    (read, error) => Outcome::new(taken + read, error),
                };
            }

            if self.source.is_empty() {
                return self.read_unfiltered(dest);
            }

            let (_, error) = self.pump().into_parts();
            if let Some(error) = error {
                return Outcome::from_error(error);
            }
        }
    }

    /// Read bytes until `dest` is full.
    ///
    /// Stops at end of stream, returning the bytes read so far along with
    /// [`ErrorKind::EndOfFile`].
    pub fn read_exact(&mut self, dest: &mut [u8]) -> Outcome<usize> {
        let attempts = self.config.retry_attempts;
        drive(dest.len(), attempts, STALLED_READ, |done| self.read(&mut dest[done..]))
    }

    /// Read a single byte from this stream.
    pub fn get(&mut self) -> Outcome<u8> {
        let mut byte = [0u8];
        let outcome = self.read_exact(&mut byte);
        outcome.map(|_| byte[0])
    }

    /// Stage bytes so that they are read next, exactly once.
    ///
    /// Bytes are returned as is, they do not pass through source filters again.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to put back.
    pub fn putback(&mut self, bytes: &[u8]) -> Outcome<()> {
        ensure_open!(self);

        let staged = self.source.is_empty()
            && self.pending.is_empty()
            && self.device.readable_memory().is_none();

        match staged {
            true => self.reading().0.putback(bytes),
            false => {
                for byte in bytes.iter().rev() {
                    self.pending.push_front(*byte);
                }
            }
        }

        Outcome::ok(())
    }

    /// Read bytes up to and including a delimiter.
    ///
    /// * Returns number of bytes appended to `out`.
    /// * Last chunk of input is returned without error even if it does not end with delimiter.
    ///
    /// # Arguments
    ///
    /// * `delim` - Byte that ends the chunk.
    /// * `out` - Vector to append bytes to.
    pub fn read_until(&mut self, delim: u8, out: &mut Vec<u8>) -> Outcome<usize> {
        ensure_open!(self);

        let (_, error) = self.flush_before_read().into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        let mut total = 0;
        loop {
            if let Some(position) = self.pending.iter().position(|byte| *byte == delim) {
                out.extend(self.pending.drain(..=position));
                return Outcome::ok(total + position + 1);
            }

            total += self.pending.len();
            out.extend(self.pending.drain(..));

            let error = match self.source.is_empty() {
                true => {
                    let (read, error) = self.read_until_unfiltered(delim, out).into_parts();
                    total += read;
                    match error {
                        None => return Outcome::ok(total),
                        Some(error) => error,
                    }
                }
                false => match self.pump().into_parts() {
                    (_, None) => continue,
                    (_, Some(error)) => error,
                },
            };

            return match error {
                error if error.is_eof() && total > 0 => Outcome::ok(total),
                error => Outcome::with_error(total, error),
            };
        }
    }

    /// Read a line of text, including its newline.
    ///
    /// Only streams with [`Encoding::Utf8`] can be read as text.
    ///
    /// * Returns number of bytes appended to `line`.
    ///
    /// # Arguments
    ///
    /// * `line` - String to append the line to.
    pub fn read_line(&mut self, line: &mut String) -> Outcome<usize> {
        if self.config.encoding != Encoding::Utf8 {
            let error = Error::with_description(
                ErrorKind::InvalidInput,
                format!("lines are decoded as utf-8, stream encoding is {}", self.config.encoding),
            );
            return Outcome::from_error(error);
        }

        let mut bytes = Vec::new();
        let (read, error) = self.read_until(b'\n', &mut bytes).into_parts();
        append_utf8(line, bytes, read, error)
    }

    /// Read staging, built on first use, along with the device.
    fn reading(&mut self) -> (&mut ReadBuffer, &mut D) {
        let capacity = self.read_capacity();
        let attempts = self.config.retry_attempts;
        let reader = self
            .reader
            .get_or_insert_with(|| ReadBuffer::new(capacity).with_retry_attempts(attempts));

        (reader, &mut self.device)
    }

    /// Read bytes that need no filtering, from device memory when nothing is staged.
    fn read_unfiltered(&mut self, dest: &mut [u8]) -> Outcome<usize> {
        if self.staged_input() == 0 {
            if let Some(memory) = self.device.readable_memory() {
                self.direct_reads = true;
                return read_direct(memory, dest);
            }
        }

        let (reader, device) = self.reading();
        reader.read(device, dest)
    }

    /// Read bytes that need no filtering up to and including a delimiter.
    fn read_until_unfiltered(&mut self, delim: u8, out: &mut Vec<u8>) -> Outcome<usize> {
        if self.staged_input() == 0 {
            if let Some(memory) = self.device.readable_memory() {
                self.direct_reads = true;
                return read_until_direct(memory, delim, out);
            }
        }

        let (reader, device) = self.reading();
        reader.read_until(device, delim, out)
    }

    /// Run one round of staged input through source filters.
    ///
    /// * Returns number of filtered bytes queued.
    fn pump(&mut self) -> Outcome<usize> {
        let capacity = self.read_capacity();
        let attempts = self.config.retry_attempts;
        let reader = self
            .reader
            .get_or_insert_with(|| ReadBuffer::new(capacity).with_retry_attempts(attempts));

        if reader.is_empty() || self.needs_input {
            if reader.in_use() == reader.capacity() {
                let capacity = reader.capacity().max(MIN_FILTER_INPUT / 2) * 2;
                reader.resize(capacity);
            }

            let (read, error) = reader.fill(&mut self.device).into_parts();
            match error {
                Some(error) if error.is_eof() => return self.finish_input(error),
                Some(error) => return Outcome::from_error(error),
                None if read == 0 => {
                    let error = Error::with_description(ErrorKind::UnknownIoError, STALLED_READ);
                    return Outcome::from_error(error);
                }
                None => {}
            }
        }

        let (consumed, error) = self
            .source
            .apply(reader.peek(), &mut self.source_scratch)
            .into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        self.needs_input = consumed == 0;
        reader.consume(consumed);

        let filtered = self.source_scratch.output();
        self.pending.extend(filtered);
        Outcome::ok(filtered.len())
    }

    /// Queue output held back by source filters at end of input.
    fn finish_input(&mut self, eof: Error) -> Outcome<usize> {
        if self.input_finished {
            return Outcome::from_error(eof);
        }

        self.input_finished = true;
        let unconsumed = self.staged_input();
        if unconsumed > 0 {
            let error = Error::with_description(
                ErrorKind::InvalidInput,
                format!("source filters left {unconsumed} bytes unconsumed at end of input"),
            );
            return Outcome::from_error(error);
        }

        let (produced, error) = self.source.finish(&mut self.source_scratch).into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        if produced == 0 {
            return Outcome::from_error(eof);
        }

        self.pending.extend(self.source_scratch.output());
        Outcome::ok(produced)
    }
}

/// Copy bytes out of readable memory of a device.
fn read_direct(memory: &mut dyn DirectReadable, dest: &mut [u8]) -> Outcome<usize> {
    let window = memory.readable_window();
    if window.is_empty() {
        // End of file, or bytes the window does not show.
        return memory.read(dest);
    }

    let len = window.len().min(dest.len());
    dest[..len].copy_from_slice(&window[..len]);
    memory.consume(len);
    Outcome::ok(len)
}

/// Read up to and including a delimiter, straight out of readable memory of a device.
fn read_until_direct(
    memory: &mut dyn DirectReadable,
    delim: u8,
    out: &mut Vec<u8>,
) -> Outcome<usize> {
    let mut total = 0;
    loop {
        let window = memory.readable_window();
        if let Some(position) = window.iter().position(|byte| *byte == delim) {
            out.extend_from_slice(&window[..=position]);
            memory.consume(position + 1);
            return Outcome::ok(total + position + 1);
        }

        if !window.is_empty() {
            let len = window.len();
            out.extend_from_slice(window);
            memory.consume(len);
            total += len;
            continue;
        }

        let mut byte = [0u8];
        let (read, error) = memory.read(&mut byte).into_parts();
        match error {
            Some(error) => return Outcome::with_error(total, error),
            None if read == 0 => {
                let error = Error::with_description(ErrorKind::UnknownIoError, STALLED_READ);
                return Outcome::with_error(total, error);
            }
            None => {
                out.push(byte[0]);
                total += 1;
                if byte[0] == delim {
                    return Outcome::ok(total);
                }
            }
        }
    }
}

impl<D: VectorReadable> Stream<D> {
    /// Read bytes from an absolute offset.
    ///
    /// Positional reads go straight to the device, they bypass filters and
    /// staging, and do not move the stream position.
    ///
    /// # Arguments
    ///
    /// * `dest` - Buffer to read bytes into.
    /// * `offset` - Absolute offset to read from.
    pub fn read_at(&mut self, dest: &mut [u8], offset: u64) -> Outcome<usize> {
        self.read_vectored_at(&mut [IoSliceMut::new(dest)], offset)
    }

    /// Read into a sequence of buffers from an absolute offset, see [`Stream::read_at`].
    pub fn read_vectored_at(&mut self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> Outcome<usize> {
        ensure_open!(self);
        self.device.read_vectored_at(bufs, offset)
    }
}

impl<D: AbsoluteSeekable> Stream<D> {
    /// Move to an absolute position.
    ///
    /// Staged output is flushed and staged input is dropped first.
    ///
    /// * Returns the new position.
    ///
    /// # Arguments
    ///
    /// * `position` - Offset from the start of the device.
    pub fn seek(&mut self, position: u64) -> Outcome<u64> {
        ensure_open!(self);

        let (_, error) = self.flush_output(false).into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        self.discard_input();
        self.device.seek(position)
    }
}

impl<D: RelativeSeekable> Stream<D> {
    /// Move relative to an origin.
    ///
    /// Staged output is flushed and staged input is dropped first. Offsets
    /// relative to [`Whence::Current`] are relative to the position of the
    /// next byte read, not the device position.
    ///
    /// * Returns the new absolute position.
    ///
    /// # Arguments
    ///
    /// * `offset` - Signed offset from origin.
    /// * `whence` - Origin of the seek.
    pub fn seek_by(&mut self, offset: i64, whence: Whence) -> Outcome<u64> {
        ensure_open!(self);

        let (_, error) = self.flush_output(false).into_parts();
        if let Some(error) = error {
            return Outcome::from_error(error);
        }

        let unread = i64::try_from(self.staged_input()).unwrap_or(i64::MAX);
        let offset = match whence {
            Whence::Current => offset.saturating_sub(unread),
            _ => offset,
        };

        self.discard_input();
        self.device.seek_by(offset, whence)
    }
}

impl<D: Tellable> Stream<D> {
    /// Current logical position of this stream.
    ///
    /// Accounts for bytes that are staged but not yet written, and bytes that
    /// were read from the device but not yet consumed.
    pub fn tell(&mut self) -> Outcome<u64> {
        ensure_open!(self);

        let (position, error) = self.device.tell().into_parts();
        let position = (position + self.staged_output() as u64)
            .saturating_sub(self.staged_input() as u64);
        Outcome::new(position, error)
    }
}
