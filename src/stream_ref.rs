//! Definition of type erased references to streams.
//!
//! A [`StreamRef`] borrows a [`Stream`] of any device, and exposes the subset
//! of its operations named by a capability set. Code that takes a
//! `StreamRef<'_, Sink>` works with every stream that can be written and
//! flushed, without being generic over the device.
//!
//! Capability sets are declared with [`capability_set!`](crate::capability_set).
//! A reference can be narrowed to a smaller set, but never widened, both
//! checks happen at compile time.
//!
//! ```
//! use crossio::{Stream, Outcome, devices::VecDevice, stream_ref::{Duplex, Sink, StreamRef}};
//!
//! fn greet(mut sink: StreamRef<'_, Sink>) -> Outcome<usize> {
//!     sink.write(b"hello")
//! }
//!
//! let mut stream = Stream::new(VecDevice::new());
//! let mut duplex = StreamRef::<Duplex>::new(&mut stream);
//! assert!(greet(duplex.narrow()).is_ok());
//! assert!(duplex.flush().is_ok());
//! ```
//!
//! A stream over a pipe cannot be referenced as seekable:
//!
//! ```compile_fail
//! use crossio::{Stream, devices::RingDevice, stream_ref::{RandomAccess, StreamRef}};
//!
//! let mut stream = Stream::new(RingDevice::with_capacity(64).unwrap());
//! let _ = StreamRef::<RandomAccess>::new(&mut stream);
//! ```
//!
//! A reference cannot be widened:
//!
//! ```compile_fail
//! use crossio::{Stream, devices::VecDevice, stream_ref::{Duplex, Sink, StreamRef}};
//!
//! let mut stream = Stream::new(VecDevice::new());
//! let mut sink = StreamRef::<Sink>::new(&mut stream);
//! let _ = sink.narrow::<Duplex>();
//! ```
//!
//! Operations outside the capability set cannot be called:
//!
//! ```compile_fail
//! use crossio::{Stream, devices::VecDevice, stream_ref::{Source, StreamRef}};
//!
//! let mut stream = Stream::new(VecDevice::new());
//! let mut source = StreamRef::<Source>::new(&mut stream);
//! let _ = source.write(b"nope");
//! ```

use crate::{
    AbsoluteSeekable, Caps, Device, Flushable, Outcome, Readable, RelativeSeekable, Stream,
    Syncable, Tellable, VectorReadable, VectorWritable, Whence, Writable,
};
use std::{fmt, marker::PhantomData, ptr::NonNull, rc::Rc};

/// A set of stream operations, see [`capability_set!`](crate::capability_set).
pub trait CapabilitySet {
    /// Operations in this set.
    const CAPS: Caps;
}

/// A single stream operation.
pub trait Op {
    /// Bit of this operation.
    const CAP: Caps;

    /// Name of this operation.
    const NAME: &'static str;
}

/// Operation that can be installed into the table of a stream type.
#[doc(hidden)]
pub trait Installs<S> {
    fn install(table: &mut OpTable);
}

/// Capability set whose every operation is supported by a stream type.
pub trait Bind<S>: CapabilitySet {
    /// Table of operations bound to the stream type.
    #[doc(hidden)]
    fn table() -> OpTable;
}

/// Declare a capability set.
///
/// Operations are named by their markers in [`stream_ref::ops`](crate::stream_ref::ops).
/// Along with the set, this declares which streams it can be bound to: every
/// stream whose device supports all the listed operations.
///
/// ```
/// use crossio::{Caps, capability_set, stream_ref::CapabilitySet};
///
/// capability_set! {
///     /// Append only log.
///     pub struct Appender { Write, Sync }
/// }
///
/// assert_eq!(Appender::CAPS, Caps::WRITE | Caps::SYNC);
/// ```
#[macro_export]
macro_rules! capability_set {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($op:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::stream_ref::CapabilitySet for $name {
            const CAPS: $crate::Caps = $crate::Caps::NONE
                $(.union(<$crate::stream_ref::ops::$op as $crate::stream_ref::Op>::CAP))*;
        }

        impl<D: $crate::Device> $crate::stream_ref::Bind<$crate::Stream<D>> for $name
        where
            $($crate::stream_ref::ops::$op: $crate::stream_ref::Installs<$crate::Stream<D>>,)*
        {
            fn table() -> $crate::stream_ref::OpTable {
                let mut table = $crate::stream_ref::OpTable::default();
                $(
                    <$crate::stream_ref::ops::$op
                        as $crate::stream_ref::Installs<$crate::Stream<D>>>::install(&mut table);
                )*
                table
            }
        }
    };
}

/// A mutable borrow of a stream, limited to operations in a capability set.
pub struct StreamRef<'a, C> {
    stream: NonNull<()>,
    table: Rc<OpTable>,
    _marker: PhantomData<(&'a mut (), C)>,
}

impl<'a, C: CapabilitySet> StreamRef<'a, C> {
    /// Create a new reference to a stream.
    ///
    /// Fails to compile if the device of the stream does not support every
    /// operation in the capability set.
    ///
    /// # Arguments
    ///
    /// * `stream` - Stream to reference.
    pub fn new<D: Device>(stream: &'a mut Stream<D>) -> Self
    where
        C: Bind<Stream<D>>,
    {
        Self {
            stream: NonNull::from(stream).cast(),
            table: Rc::new(C::table()),
            _marker: PhantomData,
        }
    }

    /// Operations allowed through this reference.
    pub fn caps(&self) -> Caps {
        C::CAPS
    }

    /// Reborrow this reference with a smaller set of operations.
    ///
    /// Fails to compile if `T` is not a subset of `C`.
    pub fn narrow<T: CapabilitySet>(&mut self) -> StreamRef<'_, T> {
        const { assert!(C::CAPS.contains(T::CAPS), "narrowed capability set must be a subset") };
        StreamRef {
            stream: self.stream,
            table: Rc::clone(&self.table),
            _marker: PhantomData,
        }
    }

    /// Convert this reference into one with a smaller set of operations.
    ///
    /// Fails to compile if `T` is not a subset of `C`.
    pub fn into_narrow<T: CapabilitySet>(self) -> StreamRef<'a, T> {
        const { assert!(C::CAPS.contains(T::CAPS), "narrowed capability set must be a subset") };
        StreamRef {
            stream: self.stream,
            table: self.table,
            _marker: PhantomData,
        }
    }
}

impl<C: CapabilitySet> fmt::Debug for StreamRef<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRef")
            .field("caps", &C::CAPS)
            .field("stream", &self.stream)
            .finish()
    }
}

#[cold]
fn missing(op: &'static str, caps: Caps) -> ! {
    tracing::error!(op, %caps, "Stream reference has no entry for operation");
    std::process::abort()
}

macro_rules! operations {
    ($(
        $(#[$doc:meta])*
        fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty
            as $marker:ident, $cap:ident where $($bound:path),+;
    )*) => {
        /// Markers of operations that make up capability sets.
        pub mod ops {
            $(
                #[doc = concat!("Marker of `", stringify!($name), "`.")]
                #[derive(Debug, Clone, Copy)]
                pub struct $marker;

                impl super::Op for $marker {
                    const CAP: crate::Caps = crate::Caps::$cap;
                    const NAME: &'static str = stringify!($name);
                }
            )*
        }

        /// Type erased operations of one stream type.
        ///
        /// Only slots for operations of the bound capability set are filled.
        #[doc(hidden)]
        #[derive(Default)]
        pub struct OpTable {
            $($name: Option<unsafe fn(NonNull<()> $(, $ty)*) -> $ret>,)*
        }

        $(
            impl<D: Device $(+ $bound)+> Installs<Stream<D>> for ops::$marker {
                fn install(table: &mut OpTable) {
                    /// # Safety
                    ///
                    /// `stream` must point to a live `Stream<D>` that is not borrowed elsewhere.
                    unsafe fn thunk<D: Device $(+ $bound)+>(
                        stream: NonNull<()> $(, $arg: $ty)*
                    ) -> $ret {
                        // SAFETY: Guaranteed by caller.
                        let stream = unsafe { stream.cast::<Stream<D>>().as_mut() };
                        stream.$name($($arg),*)
                    }

                    table.$name = Some(thunk::<D> as unsafe fn(NonNull<()> $(, $ty)*) -> $ret);
                }
            }
        )*

        impl<C: CapabilitySet> StreamRef<'_, C> {
            $(
                $(#[$doc])*
                pub fn $name(&mut self $(, $arg: $ty)*) -> $ret {
                    const {
                        assert!(
                            C::CAPS.contains(Caps::$cap),
                            concat!("capability set does not allow ", stringify!($name)),
                        )
                    };

                    match self.table.$name {
                        // SAFETY: Table was built for the type of stream this points to,
                        // and the stream is exclusively borrowed for lifetime of this reference.
                        Some(op) => unsafe { op(self.stream $(, $arg)*) },
                        None => missing(<ops::$marker as Op>::NAME, C::CAPS),
                    }
                }
            )*
        }
    };
}

operations! {
    /// Write bytes, see [`Stream::write`].
    fn write(bytes: &[u8]) -> Outcome<usize> as Write, WRITE where Writable;

    /// Write bytes at an absolute offset, see [`Stream::write_at`].
    fn write_at(bytes: &[u8], offset: u64) -> Outcome<usize>
        as WriteAt, WRITE_AT where VectorWritable;

    /// Write a single byte, see [`Stream::put`].
    fn put(byte: u8) -> Outcome<()> as Put, PUT where Writable;

    /// Flush staged output, see [`Stream::flush`].
    fn flush() -> Outcome<()> as Flush, FLUSH where Writable, Flushable;

    /// Make writes durable, see [`Stream::sync`].
    fn sync() -> Outcome<()> as Sync, SYNC where Writable, Flushable, Syncable;

    /// Read some bytes, see [`Stream::read`].
    fn read(dest: &mut [u8]) -> Outcome<usize> as Read, READ where Readable;

    /// Read bytes from an absolute offset, see [`Stream::read_at`].
    fn read_at(dest: &mut [u8], offset: u64) -> Outcome<usize>
        as ReadAt, READ_AT where VectorReadable;

    /// Read a single byte, see [`Stream::get`].
    fn get() -> Outcome<u8> as Get, GET where Readable;

    /// Stage bytes so that they are read next, see [`Stream::putback`].
    fn putback(bytes: &[u8]) -> Outcome<()> as Putback, PUTBACK where Readable;

    /// Move to an absolute position, see [`Stream::seek`].
    fn seek(position: u64) -> Outcome<u64> as Seek, SEEK where AbsoluteSeekable;

    /// Move relative to an origin, see [`Stream::seek_by`].
    fn seek_by(offset: i64, whence: Whence) -> Outcome<u64>
        as SeekBy, SEEK_BY where RelativeSeekable;

    /// Current logical position, see [`Stream::tell`].
    fn tell() -> Outcome<u64> as Tell, TELL where Tellable;
}

capability_set! {
    /// Streams that can be written.
    pub struct Sink { Write, Put, Flush }
}

capability_set! {
    /// Streams that can be read.
    pub struct Source { Read, Get, Putback }
}

capability_set! {
    /// Streams that can be read and written.
    pub struct Duplex { Write, Put, Flush, Read, Get, Putback }
}

capability_set! {
    /// Streams that can be written anywhere.
    pub struct SeekableSink { Write, Put, Flush, Seek, SeekBy, Tell }
}

capability_set! {
    /// Streams that can be read from anywhere.
    pub struct SeekableSource { Read, Get, Putback, Seek, SeekBy, Tell }
}

capability_set! {
    /// Streams that can be read and written anywhere.
    pub struct RandomAccess { Write, Put, Flush, Read, Get, Putback, Seek, SeekBy, Tell }
}

capability_set! {
    /// Streams that can be read and written at explicit offsets.
    pub struct Positional { WriteAt, ReadAt }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, devices::VecDevice};

    capability_set! {
        struct Appender { Write, Tell }
    }

    fn append(mut log: StreamRef<'_, Appender>, bytes: &[u8]) -> Outcome<u64> {
        let (_, error) = log.write(bytes).into_parts();
        assert!(error.is_none());
        log.tell()
    }

    #[test]
    fn predefined_sets() {
        assert_eq!(Sink::CAPS, Caps::WRITE | Caps::PUT | Caps::FLUSH);
        assert_eq!(Source::CAPS, Caps::READ | Caps::GET | Caps::PUTBACK);
        assert_eq!(Duplex::CAPS, Sink::CAPS | Source::CAPS);
        assert_eq!(RandomAccess::CAPS, Duplex::CAPS | Caps::SEEK | Caps::SEEK_BY | Caps::TELL);
        assert!(SeekableSink::CAPS.contains(Sink::CAPS));
        assert!(SeekableSource::CAPS.contains(Source::CAPS));
        assert_eq!(Positional::CAPS.to_string(), "{write_at, read_at}");
    }

    #[test]
    fn operation_names_match_capabilities() {
        assert_eq!(<ops::SeekBy as Op>::NAME, "seek_by");
        assert_eq!(<ops::SeekBy as Op>::CAP, Caps::SEEK_BY);
        assert_eq!(format!("{{{}}}", <ops::WriteAt as Op>::NAME), Caps::WRITE_AT.to_string());
        assert_eq!(format!("{{{}}}", <ops::Putback as Op>::NAME), Caps::PUTBACK.to_string());
    }

    #[test]
    fn operations_reach_the_stream() {
        let mut stream = Stream::new(VecDevice::new());
        {
            let mut random = StreamRef::<RandomAccess>::new(&mut stream);
            assert_eq!(random.caps(), RandomAccess::CAPS);
            assert_eq!(random.write(b"hello"), Outcome::ok(5));
            assert_eq!(random.put(b'!'), Outcome::ok(()));
            assert_eq!(random.seek(1), Outcome::ok(1));
            assert_eq!(random.get(), Outcome::ok(b'e'));
            assert_eq!(random.putback(b"E"), Outcome::ok(()));

            let mut buf = [0; 8];
            assert_eq!(random.read(&mut buf), Outcome::ok(5));
            assert_eq!(&buf[..5], b"Ello!");
            assert_eq!(random.seek_by(-2, Whence::End), Outcome::ok(4));
            assert_eq!(random.tell(), Outcome::ok(4));
        }

        assert_eq!(stream.get_ref().as_slice(), b"hello!");
    }

    #[test]
    fn narrowed_references_share_the_stream() {
        let mut stream = Stream::new(VecDevice::new());
        let mut random = StreamRef::<RandomAccess>::new(&mut stream);

        assert_eq!(append(random.narrow(), b"abc"), Outcome::ok(3));
        assert_eq!(append(random.narrow(), b"de"), Outcome::ok(5));

        let mut source = random.into_narrow::<SeekableSource>();
        assert_eq!(source.seek(0), Outcome::ok(0));
        assert_eq!(source.get(), Outcome::ok(b'a'));
    }

    #[test]
    fn positional_operations() {
        let mut stream = Stream::new(VecDevice::from(b"0123".to_vec()));
        let mut positional = StreamRef::<Positional>::new(&mut stream);
        assert_eq!(positional.write_at(b"ab", 4), Outcome::ok(2));

        let mut buf = [0; 3];
        assert_eq!(positional.read_at(&mut buf, 3), Outcome::ok(3));
        assert_eq!(&buf, b"3ab");
    }

    #[test]
    fn errors_pass_through() {
        let mut stream = Stream::new(VecDevice::new());
        let mut source = StreamRef::<Source>::new(&mut stream);
        assert_eq!(source.get().error_kind(), Some(ErrorKind::EndOfFile));
    }
}
