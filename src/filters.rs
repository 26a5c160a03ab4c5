//! Stock implementations of [`Filter`].

use crate::{Filter, Outcome, Progress};
use std::{cell::RefCell, rc::Rc};

/// Passes bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Filter for Identity {
    fn required_output_space(&self, input: &[u8]) -> usize {
        input.len()
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress> {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        Outcome::ok(Progress::new(len, len))
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Passes bytes through unchanged, while computing a BLAKE3 digest of them.
///
/// ```
/// use crossio::filters::Digest;
///
/// let digest = Digest::new();
/// let handle = digest.handle();
/// assert_eq!(handle.finalize(), blake3::hash(b""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Digest {
    hasher: Rc<RefCell<blake3::Hasher>>,
}

impl Digest {
    /// Create a new filter with an empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to read the digest after the filter was pushed into a chain.
    pub fn handle(&self) -> DigestHandle {
        DigestHandle {
            hasher: Rc::clone(&self.hasher),
        }
    }
}

impl Filter for Digest {
    fn required_output_space(&self, input: &[u8]) -> usize {
        input.len()
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress> {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        self.hasher.borrow_mut().update(&input[..len]);
        Outcome::ok(Progress::new(len, len))
    }

    fn name(&self) -> &'static str {
        "digest"
    }
}

/// Shared view of the digest computed by a [`Digest`] filter.
#[derive(Debug, Clone)]
pub struct DigestHandle {
    hasher: Rc<RefCell<blake3::Hasher>>,
}

impl DigestHandle {
    /// Digest of every byte that passed through the filter so far.
    pub fn finalize(&self) -> blake3::Hash {
        self.hasher.borrow().finalize()
    }

    /// Number of bytes that passed through the filter so far.
    pub fn count(&self) -> u64 {
        self.hasher.borrow().count()
    }
}

/// Encodes every byte as two lowercase hexadecimal digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexEncode;

impl Filter for HexEncode {
    fn required_output_space(&self, input: &[u8]) -> usize {
        input.len() * 2
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress> {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";

        let len = input.len().min(output.len() / 2);
        for (byte, pair) in input[..len].iter().zip(output.chunks_exact_mut(2)) {
            pair[0] = DIGITS[usize::from(byte >> 4)];
            pair[1] = DIGITS[usize::from(byte & 0x0f)];
        }

        Outcome::ok(Progress::new(len, len * 2))
    }

    fn name(&self) -> &'static str {
        "hex"
    }
}

/// Replaces every byte from a set with a mask byte.
#[derive(Debug, Clone)]
pub struct Redact {
    hidden: [bool; 256],
    mask: u8,
}

impl Redact {
    /// Create a new filter.
    ///
    /// # Arguments
    ///
    /// * `hidden` - Bytes to replace.
    /// * `mask` - Byte to replace them with.
    pub fn new(hidden: impl IntoIterator<Item = u8>, mask: u8) -> Self {
        let mut set = [false; 256];
        for byte in hidden {
            set[usize::from(byte)] = true;
        }

        Self { hidden: set, mask }
    }

    /// Filter that masks ASCII digits with `*`.
    pub fn digits() -> Self {
        Self::new(b'0'..=b'9', b'*')
    }
}

impl Filter for Redact {
    fn required_output_space(&self, input: &[u8]) -> usize {
        input.len()
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress> {
        let len = input.len().min(output.len());
        for (src, dst) in input[..len].iter().zip(output.iter_mut()) {
            *dst = match self.hidden[usize::from(*src)] {
                true => self.mask,
                false => *src,
            };
        }

        Outcome::ok(Progress::new(len, len))
    }

    fn name(&self) -> &'static str {
        "redact"
    }
}

/// Converts between LF and CRLF line endings.
#[derive(Debug, Clone)]
pub struct LineEnding {
    to_crlf: bool,
    held_cr: bool,
}

impl LineEnding {
    /// Filter that expands every LF into CRLF, for the sink side of a stream.
    pub fn to_crlf() -> Self {
        Self {
            to_crlf: true,
            held_cr: false,
        }
    }

    /// Filter that collapses every CRLF into LF, for the source side of a stream.
    ///
    /// A CR at the end of input is held until the next call, since the LF that
    /// completes it might not have arrived yet.
    pub fn to_lf() -> Self {
        Self {
            to_crlf: false,
            held_cr: false,
        }
    }

    fn expand(input: &[u8], output: &mut [u8]) -> Progress {
        let mut progress = Progress::default();
        for byte in input {
            let needed = if *byte == b'\n' { 2 } else { 1 };
            if progress.produced + needed > output.len() {
                break;
            }

            if *byte == b'\n' {
                output[progress.produced] = b'\r';
                progress.produced += 1;
            }

            output[progress.produced] = *byte;
            progress.produced += 1;
            progress.consumed += 1;
        }

        progress
    }

    fn collapse(&mut self, input: &[u8], output: &mut [u8]) -> Progress {
        let mut progress = Progress::default();
        for byte in input {
            if self.held_cr {
                // Held CR is dropped if it turns out to be part of CRLF.
                if *byte != b'\n' {
                    if progress.produced == output.len() {
                        break;
                    }

                    output[progress.produced] = b'\r';
                    progress.produced += 1;
                }

                self.held_cr = false;
            }

            if *byte == b'\r' {
                self.held_cr = true;
                progress.consumed += 1;
                continue;
            }

            if progress.produced == output.len() {
                break;
            }

            output[progress.produced] = *byte;
            progress.produced += 1;
            progress.consumed += 1;
        }

        progress
    }
}

impl Filter for LineEnding {
    fn required_output_space(&self, input: &[u8]) -> usize {
        match self.to_crlf {
            true => input.iter().filter(|byte| **byte == b'\n').count() + input.len(),
            false => input.len() + usize::from(self.held_cr),
        }
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Outcome<Progress> {
        let progress = match self.to_crlf {
            true => Self::expand(input, output),
            false => self.collapse(input, output),
        };

        Outcome::ok(progress)
    }

    fn finish(&mut self, output: &mut Vec<u8>) {
        if std::mem::take(&mut self.held_cr) {
            output.push(b'\r');
        }
    }

    fn name(&self) -> &'static str {
        "line-ending"
    }
}
