//! Zero-copy views into ring buffer memory.

use std::cmp::min;

/// Read-only view of a contiguous logical range of ring buffer bytes.
///
/// A range that straddles the wrap point of a ring without a virtual memory
/// mirror is made of two fragments. Rings with a mirror always hand out a
/// single fragment, in which case `second` is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Windows<'a> {
    first: &'a [u8],
    second: &'a [u8],
}

impl<'a> Windows<'a> {
    /// Create a view from its fragments, in logical order.
    pub fn new(first: &'a [u8], second: &'a [u8]) -> Self {
        Self { first, second }
    }

    /// Total number of bytes in view.
    #[inline]
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    /// true if view holds no bytes, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// true if all the bytes are in a single fragment.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.second.is_empty()
    }

    /// First fragment.
    #[inline]
    pub fn first(&self) -> &'a [u8] {
        self.first
    }

    /// Second fragment, empty unless view wraps around.
    #[inline]
    pub fn second(&self) -> &'a [u8] {
        self.second
    }

    /// Iterate through the non-empty fragments in logical order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + use<'a> {
        [self.first, self.second]
            .into_iter()
            .filter(|fragment| !fragment.is_empty())
    }

    /// Copy bytes from this view into a slice.
    ///
    /// * Returns number of bytes copied, i.e, min(self.len(), dst.len()).
    ///
    /// # Arguments
    ///
    /// * `dst` - Slice to copy bytes into.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        for fragment in self.iter() {
            let len = min(fragment.len(), dst.len() - copied);
            dst[copied..copied + len].copy_from_slice(&fragment[..len]);
            copied += len;
        }

        copied
    }

    /// Copy all the bytes in view into a new [`Vec`].
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(self.first);
        bytes.extend_from_slice(self.second);
        bytes
    }
}

/// Writable view of a contiguous logical range of ring buffer bytes.
///
/// See [`Windows`] for when a view is split into two fragments.
#[derive(Debug, Default)]
pub struct WindowsMut<'a> {
    first: &'a mut [u8],
    second: &'a mut [u8],
}

impl<'a> WindowsMut<'a> {
    /// Create a view from its fragments, in logical order.
    pub fn new(first: &'a mut [u8], second: &'a mut [u8]) -> Self {
        Self { first, second }
    }

    /// Total number of bytes in view.
    #[inline]
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    /// true if view holds no bytes, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// true if all the bytes are in a single fragment.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.second.is_empty()
    }

    /// Both fragments in logical order.
    pub fn as_mut_slices(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut *self.first, &mut *self.second)
    }

    /// Iterate through the non-empty fragments in logical order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        [&mut *self.first, &mut *self.second]
            .into_iter()
            .filter(|fragment| !fragment.is_empty())
    }

    /// Copy bytes from a slice into this view.
    ///
    /// * Returns number of bytes copied, i.e, min(self.len(), src.len()).
    ///
    /// # Arguments
    ///
    /// * `src` - Slice to copy bytes from.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        let mut copied = 0;
        for fragment in self.iter_mut() {
            let len = min(fragment.len(), src.len() - copied);
            fragment[..len].copy_from_slice(&src[copied..copied + len]);
            copied += len;
        }

        copied
    }

    /// Fill every byte in view with the same value.
    pub fn fill(&mut self, value: u8) {
        self.first.fill(value);
        self.second.fill(value);
    }
}
