//! Concrete devices.
//!
//! * [`FileDevice`] - A file on disk.
//! * [`SpanDevice`] - A fixed size window of borrowed memory.
//! * [`VecDevice`] - A growable vector of bytes.
//! * [`RingDevice`] - A loopback pipe over a ring buffer, bytes written are read back.

mod file;
mod ring;
mod span;
mod vec;

pub use file::FileDevice;
pub use ring::RingDevice;
pub use span::SpanDevice;
pub use vec::VecDevice;

use std::io::{IoSlice, IoSliceMut};

/// Scatter bytes into a sequence of buffers.
///
/// * Returns number of bytes copied.
pub(crate) fn scatter(mut src: &[u8], bufs: &mut [IoSliceMut<'_>]) -> usize {
    let mut copied = 0;
    for buf in bufs {
        let len = buf.len().min(src.len());
        buf[..len].copy_from_slice(&src[..len]);
        src = &src[len..];
        copied += len;
    }

    copied
}

/// Gather bytes from a sequence of buffers.
///
/// * Returns number of bytes copied.
pub(crate) fn gather(bufs: &[IoSlice<'_>], mut dst: &mut [u8]) -> usize {
    let mut copied = 0;
    for buf in bufs {
        let len = buf.len().min(dst.len());
        let (head, tail) = std::mem::take(&mut dst).split_at_mut(len);
        head.copy_from_slice(&buf[..len]);
        dst = tail;
        copied += len;
    }

    copied
}

/// Total number of bytes in a sequence of buffers.
pub(crate) fn total_len(bufs: &[IoSlice<'_>]) -> usize {
    bufs.iter().map(|buf| buf.len()).sum()
}
