//! Copy based ring buffer memory that works on every platform.

use crate::{Ring, Windows, WindowsMut, ring::Region};
use memmap2::{MmapMut, MmapOptions};
use std::io;

/// Type alias for a [`Ring`] backed by [`Anon`] memory.
pub type PortableRing = Ring<Anon>;

/// Off heap memory that backs a [`PortableRing`].
///
/// There is no aliasing of pages here, so a logical range that wraps around
/// the end of the ring is handed out as two fragments.
#[derive(Debug)]
pub struct Anon(MmapMut);

impl Anon {
    /// Allocate some number of bytes using anonymous mmap.
    ///
    /// * Frees memory using RAII pattern, so no method to deallocate memory.
    /// * If successful memory is guaranteed to be page aligned.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of bytes to allocate.
    fn alloc(capacity: usize) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring capacity must be > 0",
            ));
        }

        let mmap = MmapOptions::new()
            .len(capacity)
            // Fault all pages so that they are eagerly initialized.
            .populate()
            .map_anon()?;

        Ok(Self(mmap))
    }
}

impl Region for Anon {
    #[inline]
    fn size(&self) -> usize {
        self.0.len()
    }

    fn span(&self, start: usize, len: usize) -> Windows<'_> {
        let (second, first) = self.0.split_at(start);
        match first.split_at_checked(len) {
            Some((first, _)) => Windows::new(first, &[]),
            None => Windows::new(first, &second[..len - first.len()]),
        }
    }

    fn span_mut(&mut self, start: usize, len: usize) -> WindowsMut<'_> {
        let (second, first) = self.0.split_at_mut(start);
        if len <= first.len() {
            WindowsMut::new(&mut first[..len], &mut [])
        } else {
            let wrapped = len - first.len();
            WindowsMut::new(first, &mut second[..wrapped])
        }
    }
}

impl PortableRing {
    /// Create a new ring buffer backed by anonymous memory.
    ///
    /// Note that this variant panics when memory cannot be allocated via mmap.
    /// For a non-panicking alternative, use [`PortableRing::try_with_capacity`].
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of bytes this ring can accommodate.
    #[track_caller]
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(ring) => ring,
            Err(e) => panic!("Error allocating memory for ring: {e}"),
        }
    }

    /// Create a new ring buffer backed by anonymous memory.
    ///
    /// * Capacity is used as is, it does not have to be a power of 2.
    /// * Returns an I/O error if capacity is 0 or memory allocation fails.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of bytes this ring can accommodate.
    pub fn try_with_capacity(capacity: usize) -> io::Result<Self> {
        let memory = Anon::alloc(capacity)?;
        tracing::debug!(capacity, "allocated portable ring");
        Ok(Ring::from_region(memory))
    }
}
