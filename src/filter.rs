//! Definition of byte transformations that sit between a stream and its device.

use crate::{Error, ErrorKind, Outcome};
use std::fmt;

/// Progress of a single [`Filter::transform`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Number of input bytes consumed.
    pub consumed: usize,

    /// Number of output bytes produced.
    pub produced: usize,
}

impl Progress {
    /// Progress of a filter that consumed and produced some bytes.
    pub fn new(consumed: usize, produced: usize) -> Self {
        Self { consumed, produced }
    }
}

/// A transformation of bytes on their way to or from a device.
pub trait Filter {
    /// Number of output bytes needed to transform all of `input`.
    ///
    /// # Arguments
    ///
    /// * `input` - Bytes about to be transformed.
    fn required_output_space(&self, input: &[u8]) -> usize;

    /// Transform bytes from input into output.
    ///
    /// Output always has at least [`Filter::required_output_space`] bytes.
    /// Only the first filter of a chain may leave input unconsumed, those
    /// bytes are presented again on the next call.
    ///
    /// # Arguments
    ///
    /// * `input` - Bytes to transform.
    /// * `output` - Buffer to write transformed bytes into.
    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress>;

    /// Append output held back by this filter, at the end of a stream.
    ///
    /// # Arguments
    ///
    /// * `output` - Vector to append held output to.
    fn finish(&mut self, output: &mut Vec<u8>) {
        let _ = output;
    }

    /// Name of this filter, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Scratch memory used to run a [`FilterChain`].
///
/// Owned by the stream, so that chains can be swapped without reallocation.
#[derive(Debug, Default)]
pub struct FilterScratch {
    input: Vec<u8>,
    output: Vec<u8>,
    produced: usize,
}

impl FilterScratch {
    /// Create scratch memory with some initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            input: vec![0; capacity],
            output: vec![0; capacity],
            produced: 0,
        }
    }

    /// Output of the last [`FilterChain::apply`] or [`FilterChain::finish`].
    #[inline]
    pub fn output(&self) -> &[u8] {
        &self.output[..self.produced]
    }

    /// Grow output buffer to hold at least `len` bytes.
    ///
    /// Grows by at least twice the shortfall, so that chains with slowly
    /// growing needs do not reallocate on every call.
    fn reserve_output(&mut self, len: usize) {
        let size = self.output.len();
        if size < len {
            self.output.resize(size + 2 * (len - size), 0);
        }
    }

    /// Output of one stage becomes input of the next.
    fn rotate(&mut self) {
        std::mem::swap(&mut self.input, &mut self.output);
    }
}

/// An ordered list of filters.
///
/// Filters run strictly in the order they were pushed. A chain with no filters
/// is the identity transformation.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter at the end of this chain.
    ///
    /// # Arguments
    ///
    /// * `filter` - Filter to append.
    pub fn push(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Number of filters in this chain.
    #[inline]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// true if chain has no filters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Remove every filter from this chain.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// Names of filters in this chain, in order.
    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.iter().map(|filter| filter.name())
    }

    /// Run input through every filter of this chain.
    ///
    /// Filtered bytes are left in [`FilterScratch::output`].
    ///
    /// * Returns number of input bytes consumed by the first filter.
    /// * A failing filter aborts the chain, nothing is left in scratch output.
    ///
    /// # Arguments
    ///
    /// * `input` - Bytes to transform.
    /// * `scratch` - Memory for intermediate results.
    pub fn apply(&mut self, input: &[u8], scratch: &mut FilterScratch) -> Outcome<usize> {
        scratch.produced = 0;
        if self.filters.is_empty() {
            scratch.reserve_output(input.len());
            scratch.output[..input.len()].copy_from_slice(input);
            scratch.produced = input.len();
            return Outcome::ok(input.len());
        }

        let mut consumed = 0;
        let mut carried = 0;
        for (index, filter) in self.filters.iter_mut().enumerate() {
            let source = match index {
                0 => input,
                _ => &scratch.input[..carried],
            };

            let required = filter.required_output_space(source);
            let size = scratch.output.len();
            if size < required {
                scratch.output.resize(size + 2 * (required - size), 0);
            }

            let (progress, error) = filter.transform(source, &mut scratch.output).into_parts();
            if index == 0 {
                consumed = progress.consumed;
            }

            if let Some(error) = error {
                return Outcome::with_error(consumed, error);
            }

            if index > 0 && progress.consumed < source.len() {
                let error = Error::with_description(
                    ErrorKind::InvalidOperation,
                    format!(
                        "filter {} left {} bytes unconsumed",
                        filter.name(),
                        source.len() - progress.consumed
                    ),
                );
                return Outcome::with_error(consumed, error);
            }

            carried = progress.produced;
            scratch.rotate();
        }

        scratch.rotate();
        scratch.produced = carried;
        Outcome::ok(consumed)
    }

    /// Collect output held back by filters at the end of a stream.
    ///
    /// Held output of a filter still runs through every filter after it.
    /// Result is left in [`FilterScratch::output`].
    ///
    /// * Returns number of bytes produced.
    ///
    /// # Arguments
    ///
    /// * `scratch` - Memory for the result.
    pub fn finish(&mut self, scratch: &mut FilterScratch) -> Outcome<usize> {
        let mut carried = Vec::new();
        for filter in &mut self.filters {
            let mut output = Vec::new();
            if !carried.is_empty() {
                output.resize(filter.required_output_space(&carried), 0);
                let (progress, error) = filter.transform(&carried, &mut output).into_parts();
                if let Some(error) = error {
                    return Outcome::from_error(error);
                }

                if progress.consumed < carried.len() {
                    let error = Error::with_description(
                        ErrorKind::InvalidOperation,
                        format!("filter {} left input unconsumed at end of stream", filter.name()),
                    );
                    return Outcome::from_error(error);
                }

                output.truncate(progress.produced);
            }

            filter.finish(&mut output);
            carried = output;
        }

        scratch.produced = 0;
        scratch.reserve_output(carried.len());
        scratch.output[..carried.len()].copy_from_slice(&carried);
        scratch.produced = carried.len();
        Outcome::ok(carried.len())
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
