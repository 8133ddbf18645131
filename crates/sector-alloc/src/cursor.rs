//! A ranged cursor for view iteration restricted to a set of entity-id
//! ranges over a [`crate::chunk::ChunkedStore`]'s linear index space.

use sector_core::id::SectorId;

/// One `[start, end)` linear-index span, typically produced by clipping a
/// logical entity-id range against the dense array's id-to-index mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpan {
    /// First linear index in the span (inclusive).
    pub start: usize,
    /// One past the last linear index in the span (exclusive).
    pub end: usize,
}

/// Walks a pre-flattened, ascending, non-overlapping sequence of linear
/// index spans, maintaining a current position.
///
/// Built by the joined-view machinery from a set of entity-id ranges after
/// binary-searching each range's bounds against the dense `ids` array.
pub struct RangesCursor {
    spans: Vec<RangeSpan>,
    span_idx: usize,
    pos: usize,
}

impl RangesCursor {
    /// Start a cursor over `spans`, positioned at the first span's start
    /// (or exhausted immediately if `spans` is empty).
    pub fn new(spans: Vec<RangeSpan>) -> Self {
        let pos = spans.first().map(|s| s.start).unwrap_or(0);
        Self {
            spans,
            span_idx: 0,
            pos,
        }
    }

    /// The linear index the cursor currently points at, or `None` if
    /// exhausted.
    pub fn current(&self) -> Option<usize> {
        if self.span_idx >= self.spans.len() {
            return None;
        }
        Some(self.pos)
    }

    /// Advance one step, returning the index that was current before the
    /// advance (so `advance()` behaves like a classic "yield and step"
    /// iterator primitive).
    pub fn advance(&mut self) -> Option<usize> {
        let idx = self.current()?;
        self.pos += 1;
        if self.pos >= self.spans[self.span_idx].end {
            self.span_idx += 1;
            if let Some(next) = self.spans.get(self.span_idx) {
                self.pos = next.start;
            }
        }
        Some(idx)
    }

    /// Advance until the dense id at the current position is `>= target`.
    ///
    /// Does a bounded linear scan of at most `linear_threshold` steps
    /// first (cheap for the common "next id is close" case), then falls
    /// back to a binary search across the remaining spans by each span's
    /// last id, followed by a binary search within the chosen span.
    /// Returns `None` if the cursor is exhausted before reaching `target`.
    pub fn advance_to_id(
        &mut self,
        ids: &[SectorId],
        target: SectorId,
        linear_threshold: usize,
    ) -> Option<usize> {
        for _ in 0..linear_threshold {
            match self.current() {
                Some(idx) if ids[idx] < target => {
                    self.advance();
                }
                Some(idx) => return Some(idx),
                None => return None,
            }
        }
        self.current()?;

        let mut lo = self.span_idx;
        let mut hi = self.spans.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let last_id = ids[self.spans[mid].end - 1];
            if last_id < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo >= self.spans.len() {
            self.span_idx = self.spans.len();
            return None;
        }
        self.span_idx = lo;
        let span = self.spans[lo];

        let mut s = span.start;
        let mut e = span.end;
        while s < e {
            let mid = s + (e - s) / 2;
            if ids[mid] < target {
                s = mid + 1;
            } else {
                e = mid;
            }
        }
        self.pos = s;
        self.current()
    }
}
