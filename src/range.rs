//! Row range primitive shared by both pipeline threads

use serde::{Deserialize, Serialize};

/// Inclusive `[top, bottom]` range of view-row indices.
///
/// `top == bottom == -1` is the empty range. All operations are pure; a
/// range is never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub top: i64,
    pub bottom: i64,
}

impl Default for RowRange {
    fn default() -> Self {
        Self { top: -1, bottom: -1 }
    }
}

impl RowRange {
    pub fn new(top: i64, bottom: i64) -> Self {
        Self { top, bottom }
    }

    pub fn is_valid(&self) -> bool {
        self.top >= 0 && self.bottom >= 0 && self.bottom >= self.top
    }

    pub fn contains(&self, row: i64) -> bool {
        row >= self.top && row <= self.bottom
    }

    /// True when both endpoints of `other` lie inside with at least
    /// `padding` rows of margin on each side.
    pub fn contains_with_padding(&self, other: &RowRange, padding: i64) -> bool {
        debug_assert!(other.is_valid());

        if !self.contains(other.top) || !self.contains(other.bottom) {
            return false;
        }
        if other.top - self.top < padding {
            return false;
        }
        if self.bottom - other.bottom < padding {
            return false;
        }
        true
    }

    pub fn intersects(&self, other: &RowRange) -> bool {
        self.contains(other.top)
            || self.contains(other.bottom)
            || other.contains(self.top)
            || other.contains(self.bottom)
    }

    /// One range when the two intersect, otherwise both ordered by top.
    pub fn union(&self, other: &RowRange) -> Vec<RowRange> {
        if self.intersects(other) {
            vec![RowRange::new(
                self.top.min(other.top),
                self.bottom.max(other.bottom),
            )]
        } else if other.top < self.top {
            vec![*other, *self]
        } else {
            vec![*self, *other]
        }
    }

    /// 0 when contained, the gap to the nearest endpoint otherwise,
    /// `i64::MAX` for an invalid range.
    pub fn distance_to(&self, row: i64) -> i64 {
        if !self.is_valid() {
            return i64::MAX;
        }
        if self.contains(row) {
            return 0;
        }
        if row < self.top {
            return self.top - row;
        }
        row - self.bottom
    }

    /// `bottom - top`; 0 for an invalid range.
    pub fn span(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        self.bottom - self.top
    }

    /// The row itself when contained (or the range is invalid), else the
    /// nearest endpoint.
    pub fn nearest_row(&self, row: i64) -> i64 {
        if !self.is_valid() || self.contains(row) {
            return row;
        }
        if row < self.top {
            return self.top;
        }
        self.bottom
    }

    /// Grow both sides by `offset`, clamping top at 0.
    pub fn expand(&self, offset: i64) -> RowRange {
        let top = (self.top - offset).max(0);
        RowRange::new(top, (self.bottom + offset).max(top))
    }

    pub fn count(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        self.bottom - self.top + 1
    }

    /// Translate the whole range so that `row` is contained.
    pub fn scroll_to(&self, row: i64) -> RowRange {
        let dst = if !self.is_valid() {
            0
        } else if row < self.top {
            row - self.top
        } else if row > self.bottom {
            row - self.bottom
        } else {
            0
        };
        RowRange::new(self.top + dst, self.bottom + dst)
    }

    /// Scroll so `row` is contained, then correct for a partially visible
    /// bottom row.
    ///
    /// When the caller lands exactly on the new bottom and that row is not
    /// fully visible the range shifts down by one to reveal the next row —
    /// unless the bottom already is the last data row, in which case only
    /// the top moves (the scrollbar advances without overscrolling the end).
    pub fn scroll_to_with_correction(
        &self,
        row: i64,
        _top_is_full: bool,
        bottom_is_full: bool,
        bottom_is_end: bool,
    ) -> RowRange {
        let dst = if row < self.top {
            // Scrolling up always lands top on a whole row; nothing more to fix.
            row - self.top
        } else if row > self.bottom {
            row - self.bottom
        } else {
            0
        };

        let tmp = RowRange::new(self.top + dst, self.bottom + dst);

        let mut dst_top = 0;
        let mut dst_bottom = 0;
        if row == tmp.bottom && !bottom_is_full {
            dst_top = 1;
            dst_bottom = if bottom_is_end { 0 } else { 1 };
        }

        RowRange::new((tmp.top + dst_top).max(0), tmp.bottom + dst_bottom)
    }
}

impl std::fmt::Display for RowRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}; {}]", self.top, self.bottom)
    }
}
