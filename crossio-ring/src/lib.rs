//! # Ring
//!
//! Fixed capacity byte ring buffers that serve as staging areas for streams.
//!
//! ## Variants
//!
//! * [`MirrorRing`] - Pages are mapped three times back to back, so every
//!   logical range is contiguous in memory. Unix only.
//! * [`PortableRing`] - Plain anonymous memory, ranges that wrap around the
//!   end of the ring are split in two.
//!
//! Both implement [`RingBuffer`]. [`DefaultRing`] picks one of them at build
//! time, controlled by the `mirror` feature.

pub(crate) mod oracle;
pub(crate) mod portable;
pub(crate) mod ring;
pub(crate) mod window;

#[cfg(unix)]
pub(crate) mod mirror;

// Externally exposed types.
pub use oracle::Oracle;
pub use portable::{Anon, PortableRing};
pub use ring::{Region, Ring, RingBuffer};
pub use window::{Windows, WindowsMut};

#[cfg(unix)]
pub use mirror::{Mirror, MirrorRing};

/// Ring buffer selected for this build.
#[cfg(all(unix, feature = "mirror"))]
pub type DefaultRing = MirrorRing;

/// Ring buffer selected for this build.
#[cfg(not(all(unix, feature = "mirror")))]
pub type DefaultRing = PortableRing;
