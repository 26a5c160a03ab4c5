//! Definition of a fixed capacity ring buffer of bytes.

use crate::{Windows, WindowsMut};
use std::cmp::min;

/// A fixed capacity circular buffer of bytes.
///
/// Bytes are appended at the head and consumed from the tail. A ring never
/// grows and never overwrites unread bytes, operations that do not fit are
/// truncated and the number of bytes actually processed is returned. It is
/// the responsibility of the caller to check that count.
///
/// There are two implementations of this trait, see [`crate::MirrorRing`] and
/// [`crate::PortableRing`]. Code written against this trait must be prepared
/// for direct windows that are split into two fragments.
pub trait RingBuffer {
    /// Maximum number of bytes this ring can hold.
    fn size(&self) -> usize;

    /// Number of bytes written but not yet read.
    fn in_use(&self) -> usize;

    /// Number of bytes that can be written without overflow.
    #[inline]
    fn free_space(&self) -> usize {
        self.size() - self.in_use()
    }

    /// true if there are no bytes to read, false otherwise.
    fn is_empty(&self) -> bool;

    /// true if there is no space left to write, false otherwise.
    #[inline]
    fn is_full(&self) -> bool {
        self.free_space() == 0
    }

    /// Append bytes at head of this ring.
    ///
    /// * Returns number of bytes written, i.e, min(bytes.len(), self.free_space()).
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to append.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Prepend bytes before tail of this ring, so that they are read next.
    ///
    /// Used to put back bytes that were previously read. If all the bytes
    /// cannot fit, only the trailing bytes are prepended, since those are the
    /// ones closest to the current read position.
    ///
    /// * Returns number of bytes prepended.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to prepend.
    fn write_tail(&mut self, bytes: &[u8]) -> usize;

    /// Consume bytes from tail of this ring.
    ///
    /// * Returns number of bytes read, i.e, min(dst.len(), self.in_use()).
    ///
    /// # Arguments
    ///
    /// * `dst` - Slice to copy bytes into.
    fn read(&mut self, dst: &mut [u8]) -> usize;

    /// View the last `len` bytes written, without consuming them.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of bytes to view, clamped to [`RingBuffer::in_use`].
    fn peek(&self, len: usize) -> Windows<'_>;

    /// Fill free space at head of this ring in place.
    ///
    /// Head is advanced only after `fill` returns, by the full window length.
    ///
    /// * Returns number of bytes made available to `fill` along with its result.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of bytes to write, clamped to [`RingBuffer::free_space`].
    /// * `fill` - Closure that populates every byte of the window.
    fn direct_write<R>(&mut self, len: usize, fill: impl FnOnce(WindowsMut<'_>) -> R) -> (usize, R);

    /// Consume bytes at tail of this ring in place.
    ///
    /// Tail is advanced only after `consume` returns, by the full window length.
    ///
    /// * Returns number of bytes made available to `consume` along with its result.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of bytes to read, clamped to [`RingBuffer::in_use`].
    /// * `consume` - Closure that processes the window.
    fn direct_read<R>(&mut self, len: usize, consume: impl FnOnce(Windows<'_>) -> R) -> (usize, R);

    /// Remove all bytes from this ring.
    fn clear(&mut self);
}

/// Memory region that backs a [`Ring`].
///
/// # Internal
///
/// Only exposed externally because it is part of type signature of [`Ring`].
/// Offsets handed to these methods are always < [`Region::size`] and lengths
/// are always <= [`Region::size`].
pub trait Region {
    /// Number of addressable bytes in this region.
    fn size(&self) -> usize;

    /// View `len` bytes starting at logical offset `start`.
    fn span(&self, start: usize, len: usize) -> Windows<'_>;

    /// Writable view of `len` bytes starting at logical offset `start`.
    fn span_mut(&mut self, start: usize, len: usize) -> WindowsMut<'_>;

    /// View `len` bytes that end right before logical offset `end`.
    fn span_before(&self, end: usize, len: usize) -> Windows<'_> {
        let start = (end + self.size() - len) % self.size();
        self.span(start, len)
    }

    /// Writable view of `len` bytes that end right before logical offset `end`.
    fn span_before_mut(&mut self, end: usize, len: usize) -> WindowsMut<'_> {
        let start = (end + self.size() - len) % self.size();
        self.span_mut(start, len)
    }
}

/// Read and write positions of a ring.
///
/// When head == tail the ring is either empty or completely full,
/// `empty` tells the two states apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursors {
    size: usize,
    head: usize,
    tail: usize,
    empty: bool,
}

impl Cursors {
    fn new(size: usize) -> Self {
        Self {
            size,
            head: 0,
            tail: 0,
            empty: true,
        }
    }

    /// Wrap an index that is < 2 * size back into range.
    #[inline]
    fn wrap(&self, index: usize) -> usize {
        // Mirrored rings are always a power of 2, so this is just a mask.
        if self.size.is_power_of_two() {
            index & (self.size - 1)
        } else {
            index % self.size
        }
    }

    #[inline]
    fn in_use(&self) -> usize {
        if self.empty {
            return 0;
        }

        match self.wrap(self.head + self.size - self.tail) {
            0 => self.size,
            len => len,
        }
    }

    #[inline]
    fn advance_head(&mut self, len: usize) {
        if len > 0 {
            self.head = self.wrap(self.head + len);
            self.empty = false;
        }
    }

    #[inline]
    fn advance_tail(&mut self, len: usize) {
        if len > 0 {
            self.tail = self.wrap(self.tail + len);
            self.empty = self.tail == self.head;
        }
    }

    #[inline]
    fn retreat_tail(&mut self, len: usize) {
        if len > 0 {
            self.tail = self.wrap(self.tail + self.size - len);
            self.empty = false;
        }
    }

    fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.empty = true;
    }
}

/// A [`RingBuffer`] over some [`Region`] of memory.
#[derive(Debug)]
pub struct Ring<M> {
    memory: M,
    cursors: Cursors,
}

impl<M: Region> Ring<M> {
    /// Construct a ring buffer from its backing memory.
    ///
    /// # Arguments
    ///
    /// * `memory` - Memory that holds bytes of the ring.
    pub(crate) fn from_region(memory: M) -> Self {
        let cursors = Cursors::new(memory.size());
        Self { memory, cursors }
    }
}

impl<M: Region> RingBuffer for Ring<M> {
    #[inline]
    fn size(&self) -> usize {
        self.cursors.size
    }

    #[inline]
    fn in_use(&self) -> usize {
        self.cursors.in_use()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.cursors.empty
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let len = min(bytes.len(), self.free_space());
        if len == 0 {
            return 0;
        }

        self.memory
            .span_mut(self.cursors.head, len)
            .copy_from(&bytes[..len]);

        self.cursors.advance_head(len);
        len
    }

    fn write_tail(&mut self, bytes: &[u8]) -> usize {
        let len = min(bytes.len(), self.free_space());
        if len == 0 {
            return 0;
        }

        // Bytes closest to the read position are the ones at the end.
        let (_, keep) = bytes.split_at(bytes.len() - len);
        self.memory
            .span_before_mut(self.cursors.tail, len)
            .copy_from(keep);

        self.cursors.retreat_tail(len);
        len
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let len = min(dst.len(), self.in_use());
        if len == 0 {
            return 0;
        }

        self.memory
            .span(self.cursors.tail, len)
            .copy_to(&mut dst[..len]);

        self.cursors.advance_tail(len);
        len
    }

    fn peek(&self, len: usize) -> Windows<'_> {
        let len = min(len, self.in_use());
        if len == 0 {
            return Windows::default();
        }

        self.memory.span_before(self.cursors.head, len)
    }

    fn direct_write<R>(
        &mut self,
        len: usize,
        fill: impl FnOnce(WindowsMut<'_>) -> R,
    ) -> (usize, R) {
        let len = min(len, self.free_space());
        let result = if len == 0 {
            fill(WindowsMut::default())
        } else {
            fill(self.memory.span_mut(self.cursors.head, len))
        };

        self.cursors.advance_head(len);
        (len, result)
    }

    fn direct_read<R>(
        &mut self,
        len: usize,
        consume: impl FnOnce(Windows<'_>) -> R,
    ) -> (usize, R) {
        let len = min(len, self.in_use());
        let result = if len == 0 {
            consume(Windows::default())
        } else {
            consume(self.memory.span(self.cursors.tail, len))
        };

        self.cursors.advance_tail(len);
        (len, result)
    }

    fn clear(&mut self) {
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultRing, Oracle, PortableRing};
    use bolero::{check, generator::*};
    use rstest::rstest;

    #[cfg(unix)]
    use crate::MirrorRing;

    /// Different types of ring buffer operations.
    #[derive(Debug, TypeGenerator)]
    enum Operation {
        Clear,
        Read(u16),
        Peek(u16),
        DirectRead(u16),
        Write(Vec<u8>),
        WriteTail(Vec<u8>),
        DirectWrite(Vec<u8>),
    }

    fn portable() -> PortableRing {
        PortableRing::with_capacity(1000)
    }

    fn default_ring() -> DefaultRing {
        DefaultRing::with_capacity(1000)
    }

    #[cfg(unix)]
    fn mirror() -> MirrorRing {
        MirrorRing::with_capacity(1000)
    }

    /// Run random operations against a ring and compare with the oracle.
    fn state_machine<R: RingBuffer>(ring: impl Fn() -> R + std::panic::RefUnwindSafe) {
        check!()
            .with_type::<Vec<Operation>>()
            .for_each(|operations| {
                let mut ring = ring();
                let mut oracle = Oracle::with_capacity(ring.size());

                for operation in operations {
                    match operation {
                        Operation::Clear => {
                            ring.clear();
                            oracle.clear();
                        }

                        Operation::Read(len) => {
                            let mut dst = vec![0; *len as usize];
                            let read = ring.read(&mut dst);
                            assert_eq!(&dst[..read], oracle.read(*len as usize));
                        }

                        Operation::Peek(len) => {
                            let view = ring.peek(*len as usize);
                            assert_eq!(view.to_vec(), oracle.peek(*len as usize));
                        }

                        Operation::DirectRead(len) => {
                            let (read, bytes) = ring.direct_read(*len as usize, |w| w.to_vec());
                            assert_eq!(read, bytes.len());
                            assert_eq!(bytes, oracle.read(*len as usize));
                        }

                        Operation::Write(bytes) => {
                            assert_eq!(ring.write(bytes), oracle.write(bytes));
                        }

                        Operation::WriteTail(bytes) => {
                            assert_eq!(ring.write_tail(bytes), oracle.write_tail(bytes));
                        }

                        Operation::DirectWrite(bytes) => {
                            let (written, copied) =
                                ring.direct_write(bytes.len(), |mut w| w.copy_from(bytes));
                            assert_eq!(written, copied);
                            assert_eq!(written, oracle.write(bytes));
                        }
                    }

                    // Invariants that must hold after every operation.
                    assert_eq!(ring.in_use(), oracle.in_use());
                    assert_eq!(ring.in_use() + ring.free_space(), ring.size());
                    assert_eq!(ring.is_empty(), ring.in_use() == 0);
                }
            })
    }

    #[test]
    fn portable_state_machine() {
        state_machine(portable);
    }

    #[test]
    #[cfg(unix)]
    fn mirror_state_machine() {
        state_machine(mirror);
    }

    #[rstest]
    #[case(portable())]
    #[case(default_ring())]
    fn writes_are_read_back_in_order<R: RingBuffer>(#[case] mut ring: R) {
        let bytes: Vec<u8> = (0..ring.size()).map(|i| (i % 251) as u8).collect();

        let mut written = 0;
        for chunk in bytes.chunks(97) {
            written += ring.write(chunk);
        }

        assert_eq!(written, ring.size());
        assert!(ring.is_full());

        let mut dst = vec![0; ring.size()];
        assert_eq!(ring.read(&mut dst), ring.size());
        assert_eq!(dst, bytes);

        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.in_use(), 0);
        assert_eq!(ring.free_space(), ring.size());
    }

    #[rstest]
    #[case(portable())]
    #[case(default_ring())]
    fn overflowing_write_is_truncated<R: RingBuffer>(#[case] mut ring: R) {
        let size = ring.size();
        assert_eq!(ring.write(&vec![1; size - 10]), size - 10);
        assert_eq!(ring.write(&[2; 100]), 10);
        assert_eq!(ring.write(&[3]), 0);
        assert_eq!(ring.in_use(), size);
    }

    #[rstest]
    #[case(portable())]
    #[case(default_ring())]
    fn direct_windows_round_trip_across_wrap<R: RingBuffer>(#[case] mut ring: R) {
        let size = ring.size();

        // Park cursors right before the end of the ring.
        let (len, _) = ring.direct_write(size - 5, |mut window| window.fill(0));
        assert_eq!(len, size - 5);
        let (len, _) = ring.direct_read(size - 5, |_| ());
        assert_eq!(len, size - 5);

        let (len, _) = ring.direct_write(16, |mut window| {
            window.copy_from(b"0123456789abcdef");
        });
        assert_eq!(len, 16);

        let (len, bytes) = ring.direct_read(16, |window| window.to_vec());
        assert_eq!(len, 16);
        assert_eq!(bytes, b"0123456789abcdef");
        assert!(ring.is_empty());
    }

    #[rstest]
    #[case(portable())]
    #[case(default_ring())]
    fn put_back_is_read_first<R: RingBuffer>(#[case] mut ring: R) {
        assert_eq!(ring.write(b"world"), 5);
        assert_eq!(ring.write_tail(b"hello "), 6);
        assert_eq!(ring.peek(3).to_vec(), b"rld");

        let mut dst = [0; 11];
        assert_eq!(ring.read(&mut dst), 11);
        assert_eq!(&dst, b"hello world");
    }

    #[test]
    fn third_write_reports_short_count() {
        let mut ring = PortableRing::with_capacity(1024);
        assert_eq!(ring.write(&[b'a'; 500]), 500);
        assert_eq!(ring.write(&[b'b'; 500]), 500);
        assert_eq!(ring.write(&[b'c'; 100]), 24);
        assert!(ring.is_full());
    }

    #[test]
    fn cursors_distinguish_empty_and_full() {
        let mut cursors = Cursors::new(8);
        assert_eq!(cursors.in_use(), 0);

        cursors.advance_head(8);
        assert_eq!(cursors.head, cursors.tail);
        assert_eq!(cursors.in_use(), 8);

        cursors.advance_tail(8);
        assert!(cursors.empty);
        assert_eq!(cursors.in_use(), 0);
    }

    #[test]
    fn cursors_wrap_without_power_of_two() {
        let mut cursors = Cursors::new(10);
        cursors.advance_head(7);
        cursors.advance_tail(7);
        cursors.advance_head(6);

        assert_eq!(cursors.head, 3);
        assert_eq!(cursors.tail, 7);
        assert_eq!(cursors.in_use(), 6);

        cursors.retreat_tail(4);
        assert_eq!(cursors.tail, 3);
        assert_eq!(cursors.in_use(), 10);
    }
}
