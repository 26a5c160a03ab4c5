//! Definition of the set of operations a stream supports.

use std::fmt;

/// Set of stream operations, one bit per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Caps(u16);

impl Caps {
    pub const NONE: Self = Self(0);
    pub const WRITE: Self = Self(1 << 0);
    pub const WRITE_AT: Self = Self(1 << 1);
    pub const PUT: Self = Self(1 << 2);
    pub const FLUSH: Self = Self(1 << 3);
    pub const SYNC: Self = Self(1 << 4);
    pub const READ: Self = Self(1 << 5);
    pub const READ_AT: Self = Self(1 << 6);
    pub const GET: Self = Self(1 << 7);
    pub const PUTBACK: Self = Self(1 << 8);
    pub const SEEK: Self = Self(1 << 9);
    pub const SEEK_BY: Self = Self(1 << 10);
    pub const TELL: Self = Self(1 << 11);

    /// Every operation along with its name.
    const NAMES: [(Self, &'static str); 12] = [
        (Self::WRITE, "write"),
        (Self::WRITE_AT, "write_at"),
        (Self::PUT, "put"),
        (Self::FLUSH, "flush"),
        (Self::SYNC, "sync"),
        (Self::READ, "read"),
        (Self::READ_AT, "read_at"),
        (Self::GET, "get"),
        (Self::PUTBACK, "putback"),
        (Self::SEEK, "seek"),
        (Self::SEEK_BY, "seek_by"),
        (Self::TELL, "tell"),
    ];

    /// Raw bits of this set.
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Set with operations from both sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set with operations of this set that are not in the other one.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// true if every operation of the other set is in this set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// true if there are no operations in this set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of operations in this set.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(op, _)| self.contains(*op))
            .map(|(_, name)| name)
    }
}

impl std::ops::BitOr for Caps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, name) in self.names().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_checks() {
        let sink = Caps::WRITE | Caps::PUT | Caps::FLUSH;
        assert!(sink.contains(Caps::WRITE | Caps::FLUSH));
        assert!(!sink.contains(Caps::WRITE | Caps::READ));
        assert!(sink.contains(Caps::NONE));
        assert_eq!(sink.difference(Caps::PUT), Caps::WRITE | Caps::FLUSH);
    }

    #[test]
    fn display_lists_names() {
        assert_eq!((Caps::READ | Caps::TELL).to_string(), "{read, tell}");
        assert_eq!(Caps::NONE.to_string(), "{}");
    }
}
