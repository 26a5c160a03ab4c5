//! # Crossio
//!
//! Crossio provides buffered byte streams over devices that support different subsets
//! of I/O operations.
//!
//! ## Device
//!
//! A [`Device`] is anything bytes can be moved to or from: a file, a window of memory,
//! a growable vector or a loopback pipe. Each operation a device supports is a separate
//! trait, such as [`Readable`], [`Writable`] or [`RelativeSeekable`]. Ready made devices
//! live in [`devices`].
//!
//! ## Stream
//!
//! A [`Stream`] wraps a device with a write buffer, a read buffer and optional chains of
//! [`Filter`]s on either side. Operations of a stream are available only when its device
//! supports them, so reading from a write only device fails to compile.
//!
//! A [`StreamRef`] erases the device type of a stream and exposes only the operations of a
//! capability set, see [`stream_ref`].
//!
//! ## Outcome
//!
//! Operations return an [`Outcome`], which carries the progress that was made along with
//! an optional [`Error`]. A write that fails midway still reports how many bytes went out.
//!
//! ### Features
//!
//! * `mirror` - Back loopback pipes with ring buffers that mirror virtual memory (unix only).

pub(crate) mod caps;
pub(crate) mod config;
pub(crate) mod device;
pub(crate) mod error;
pub(crate) mod filter;
pub(crate) mod outcome;
pub(crate) mod reader;
pub(crate) mod record;
pub(crate) mod stream;
pub(crate) mod writer;

pub mod devices;
pub mod filters;
pub mod stream_ref;

#[cfg(test)]
mod testing;

// Externally exposed types.
pub use caps::Caps;
pub use config::{Encoding, StreamConfig};
pub use device::{
    AbsoluteSeekable, Device, DirectReadable, DirectWritable, Flushable, Readable,
    RelativeSeekable, Syncable, Tellable, VectorReadable, VectorWritable, Whence, Writable,
};
pub use error::{Error, ErrorKind};
pub use filter::{Filter, FilterChain, FilterScratch, Progress};
pub use outcome::Outcome;
pub use reader::{BufferedReader, ReadBuffer, read_all};
pub use record::Record;
pub use stream::{BufferState, Stream};
pub use stream_ref::{Bind, CapabilitySet, StreamRef};
pub use writer::{
    BufferMode, BufferedWriter, DEFAULT_BUFFER_SIZE, DEFAULT_RETRY_ATTEMPTS, WriteBuffer, write_all,
};

// Ring buffers behind loopback pipes.
pub use crossio_ring as ring;
