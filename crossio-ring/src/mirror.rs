//! Ring buffer memory that is mirrored using virtual memory tricks.

use crate::{Ring, Windows, WindowsMut, ring::Region};
use std::{
    fmt, io,
    os::fd::AsRawFd,
    ptr::{self, NonNull},
    slice::{from_raw_parts, from_raw_parts_mut},
};

/// Number of consecutive views of the same pages.
const VIEWS: usize = 3;

/// Type alias for a [`Ring`] backed by [`Mirror`] memory.
pub type MirrorRing = Ring<Mirror>;

// Safety: Pages are exclusively owned and only exposed via borrows of self.
// Not Sync, cursors of a ring are updated without any synchronization.
unsafe impl Send for Mirror {}

/// Memory where the same pages are mapped three times back to back.
///
/// A byte at index `i` aliases bytes at `i - size` and `i + size`, so any
/// logical range of at most `size` bytes is a single contiguous run of memory,
/// even when it wraps around the end of the ring. Addressing starts from the
/// middle view, which makes it possible to go backwards from the start of the
/// ring as well (used to put back bytes before the tail).
///
/// The pages are backed by an unlinked temporary file. File descriptor is
/// closed once mapped, mappings keep the pages alive until unmapped.
pub struct Mirror {
    origin: NonNull<u8>,
    size: usize,
}

impl Mirror {
    /// Map some number of bytes three times back to back.
    ///
    /// * Size is rounded up to a power of 2 that is a multiple of page size.
    /// * Frees memory using RAII pattern, so no method to deallocate memory.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Minimum number of bytes in the mirror.
    fn alloc(capacity: usize) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring capacity must be > 0",
            ));
        }

        // Page size is always a power of 2, so the power of 2 that is >= page
        // size is guaranteed to be a whole number of pages.
        let size = capacity
            .max(page_size::get())
            .checked_next_power_of_two()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ring is too large"))?;

        let total = size
            .checked_mul(VIEWS)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ring is too large"))?;

        // Pages shared by all the views.
        let file = tempfile::tempfile()?;
        file.set_len(size as u64)?;

        // Safety: Reserve address space that no one else is going to use. Nothing
        // is ever accessed through this mapping, it's replaced by the views below.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        for view in 0..VIEWS {
            // Safety
            // * Address is within reservation that we exclusively own.
            // * MAP_FIXED atomically replaces part of that reservation.
            let mapped = unsafe {
                let addr = base.cast::<u8>().add(view * size);
                libc::mmap(
                    addr.cast(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    file.as_raw_fd(),
                    0,
                )
            };

            if mapped == libc::MAP_FAILED {
                let error = io::Error::last_os_error();

                // Safety: Reservation is not exposed anywhere yet.
                unsafe { libc::munmap(base, total) };
                return Err(error);
            }
        }

        // Safety: mmap never returns null on success and origin is in bounds.
        let origin = unsafe { NonNull::new_unchecked(base.cast::<u8>().add(size)) };
        Ok(Self { origin, size })
    }

    #[inline]
    fn ptr(&self, offset: isize) -> *mut u8 {
        // Safety: Callers stay within [-size, 2 * size) of origin.
        unsafe { self.origin.as_ptr().offset(offset) }
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        // Safety: Cannot initialize with invalid pointer and size.
        unsafe {
            let base = self.origin.as_ptr().sub(self.size);
            libc::munmap(base.cast(), self.size * VIEWS);
        }
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("origin", &self.origin)
            .field("size", &self.size)
            .finish()
    }
}

impl Region for Mirror {
    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn span(&self, start: usize, len: usize) -> Windows<'_> {
        // Safety: start < size and len <= size, so range ends before the last view ends.
        let bytes = unsafe { from_raw_parts(self.ptr(start as isize), len) };
        Windows::new(bytes, &[])
    }

    #[inline]
    fn span_mut(&mut self, start: usize, len: usize) -> WindowsMut<'_> {
        // Safety: Same as span, plus exclusive borrow of self.
        let bytes = unsafe { from_raw_parts_mut(self.ptr(start as isize), len) };
        WindowsMut::new(bytes, &mut [])
    }

    #[inline]
    fn span_before(&self, end: usize, len: usize) -> Windows<'_> {
        // Safety: end < size and len <= size, so range starts after the first view starts.
        let bytes = unsafe { from_raw_parts(self.ptr(end as isize - len as isize), len) };
        Windows::new(bytes, &[])
    }

    #[inline]
    fn span_before_mut(&mut self, end: usize, len: usize) -> WindowsMut<'_> {
        // Safety: Same as span_before, plus exclusive borrow of self.
        let bytes = unsafe { from_raw_parts_mut(self.ptr(end as isize - len as isize), len) };
        WindowsMut::new(bytes, &mut [])
    }
}

impl MirrorRing {
    /// Create a new ring buffer backed by mirrored memory.
    ///
    /// Note that this variant panics when memory cannot be mapped.
    /// For a non-panicking alternative, use [`MirrorRing::try_with_capacity`].
    ///
    /// # Arguments
    ///
    /// * `capacity` - Minimum number of bytes this ring can accommodate.
    #[track_caller]
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(ring) => ring,
            Err(e) => panic!("Error mapping memory for ring: {e}"),
        }
    }

    /// Create a new ring buffer backed by mirrored memory.
    ///
    /// * Capacity is rounded up to a power of 2 that is a multiple of page size.
    /// * Returns an I/O error if temporary file cannot be created or mapped.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Minimum number of bytes this ring can accommodate.
    pub fn try_with_capacity(capacity: usize) -> io::Result<Self> {
        let memory = Mirror::alloc(capacity)?;
        tracing::debug!(requested = capacity, size = memory.size, "mapped mirror ring");
        Ok(Ring::from_region(memory))
    }
}
