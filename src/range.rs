//! Half-open byte ranges over absolute stream offsets.

use std::fmt;

/// A half-open range `[start, end)` of absolute byte offsets.
///
/// Ranges never shrink below zero length: `end >= start` always holds.
/// All classification methods compare against another range without
/// mutating either side; `advance` produces a new range instead of
/// moving this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    /// Create a new range. `end` must be at least `start`.
    #[inline]
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "range end ({end}) precedes start ({start})");
        Self { start, end }
    }

    /// Create a range starting at `start` spanning `len` bytes.
    #[inline]
    pub fn of_len(start: u64, len: u64) -> Self {
        Self::new(start, start + len)
    }

    /// The next window of `offset` bytes: `[end, end + offset)`.
    #[inline]
    pub fn advance(&self, offset: u64) -> Self {
        Self::new(self.end, self.end + offset)
    }

    /// Returns the number of bytes covered.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the range covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if `other` lies entirely inside this range.
    #[inline]
    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// True if this range sits strictly past the start of `other` while
    /// still covering its tail. Data in `other` before `self.start` has
    /// scrolled out and must come from secondary storage.
    #[inline]
    pub fn is_ahead(&self, other: &Range) -> bool {
        self.start > other.start && self.end >= other.end
    }

    /// True if this range ends before `other` does: servicing `other`
    /// requires bytes this range has not yet reached.
    #[inline]
    pub fn is_behind(&self, other: &Range) -> bool {
        self.end < other.end
    }

    /// True if this range begins at or past the end of `other`.
    ///
    /// Half-open semantics: a range starting exactly at `other.end` holds
    /// no byte of `other`, so the comparison is `>=`.
    #[inline]
    pub fn starts_after(&self, other: &Range) -> bool {
        self.start >= other.end
    }

    /// Intersection with `other`, but only when this range can fully
    /// service it. Returns `None` for disjoint ranges and for
    /// intersections that spill outside `self`, so a caller never acts
    /// on an overlap claim this range cannot honor.
    pub fn overlap(&self, other: &Range) -> Option<Range> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);

        if start > end {
            return None;
        }

        let overlap = Range::new(start, end);
        if self.contains(&overlap) {
            Some(overlap)
        } else {
            None
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
