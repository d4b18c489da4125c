//! Sink kinds and delivery masks
//!
//! A `SinkKind` identifies one independent consumer of blocks. The
//! `DeliveryMask` tracks which kinds have consumed a given block as an
//! atomic bitmask: bits are only ever added, so marking needs no
//! exclusive lock on the queue. Adding a sink kind means extending the
//! enum and `SinkKind::ALL` - the queue algorithm is unaffected.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// An independent consumer of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// Standard output.
    Console,
    /// One file per block in the output directory.
    File,
}

impl SinkKind {
    /// Every configured sink kind.
    pub const ALL: [SinkKind; 2] = [SinkKind::Console, SinkKind::File];

    /// Bit assigned to this kind in a `SinkSet`.
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            SinkKind::Console => 0b01,
            SinkKind::File => 0b10,
        }
    }

    /// Short name for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            SinkKind::Console => "console",
            SinkKind::File => "file",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable set of sink kinds, backed by a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSet(u8);

impl SinkSet {
    /// The empty set.
    pub const EMPTY: SinkSet = SinkSet(0);

    /// The set containing every configured kind.
    pub const FULL: SinkSet = {
        let mut bits = 0u8;
        let mut i = 0;
        while i < SinkKind::ALL.len() {
            bits |= SinkKind::ALL[i].bit();
            i += 1;
        }
        SinkSet(bits)
    };

    /// Check membership.
    #[inline]
    pub const fn contains(self, kind: SinkKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Return a copy with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: SinkKind) -> SinkSet {
        SinkSet(self.0 | kind.bit())
    }

    /// True when every configured kind is present.
    #[inline]
    pub const fn is_full(self) -> bool {
        self.0 == SinkSet::FULL.0
    }
}

/// Grow-only delivery mask attached to a queued block.
///
/// Bits are set with `fetch_or` under any lock mode; the mask never
/// shrinks until the owning queue entry is reclaimed.
#[derive(Debug, Default)]
pub struct DeliveryMask(AtomicU8);

impl DeliveryMask {
    /// Create an empty mask.
    pub const fn new() -> Self {
        DeliveryMask(AtomicU8::new(0))
    }

    /// Mark `kind` delivered; returns the resulting set.
    #[inline]
    pub fn mark(&self, kind: SinkKind) -> SinkSet {
        let prev = self.0.fetch_or(kind.bit(), Ordering::AcqRel);
        SinkSet(prev | kind.bit())
    }

    /// Current snapshot of the mask.
    #[inline]
    pub fn load(&self) -> SinkSet {
        SinkSet(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_set_covers_all_kinds() {
        for kind in SinkKind::ALL {
            assert!(SinkSet::FULL.contains(kind));
        }
        assert!(SinkSet::FULL.is_full());
        assert!(!SinkSet::EMPTY.is_full());
    }

    #[test]
    fn test_mask_grows_monotonically() {
        let mask = DeliveryMask::new();
        assert_eq!(mask.load(), SinkSet::EMPTY);

        let after_console = mask.mark(SinkKind::Console);
        assert!(after_console.contains(SinkKind::Console));
        assert!(!after_console.is_full());

        // Marking twice is idempotent
        assert_eq!(mask.mark(SinkKind::Console), after_console);

        let after_file = mask.mark(SinkKind::File);
        assert!(after_file.is_full());
        assert!(mask.load().is_full());
    }
}
