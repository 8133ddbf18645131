//! Hierarchical presence bitmap: O(log N) "highest set id" queries over a
//! sparse, frequently-changing set of sector ids.
//!
//! The structure is a fixed-depth tree of 64-bit words. Level 0 holds one
//! bit per id. Each level above holds one bit per *word* of the level
//! below (fan-out 64: bit `b` of word `w` at level `L+1` tracks whether
//! word `w*64+b` at level `L` is non-zero). Six levels comfortably cover
//! every `u32` id (`64^6` far exceeds `u32::MAX`), so the level count is
//! fixed at construction — only the word vector *within* each level grows
//! lazily. Fixing the level count up front avoids having to retroactively
//! propagate already-set low-level bits into newly created ancestor levels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

const FANOUT_BITS: u32 = 6; // log2(64)
const MAX_LEVELS: usize = 6; // 64^6 > u32::MAX + 1

/// A hierarchical bitmap over `u64`-valued ids (sector ids are `u32` but
/// widened here to keep the arithmetic uniform).
pub struct HierarchicalBitmap {
    levels: RwLock<Vec<Vec<AtomicU64>>>,
}

impl Default for HierarchicalBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalBitmap {
    /// Create an empty bitmap.
    pub fn new() -> Self {
        Self {
            levels: RwLock::new((0..MAX_LEVELS).map(|_| Vec::new()).collect()),
        }
    }

    fn ensure_word(&self, level: usize, word_idx: usize) {
        {
            let levels = self.levels.read().expect("bitmap lock poisoned");
            if word_idx < levels[level].len() {
                return;
            }
        }
        let mut levels = self.levels.write().expect("bitmap lock poisoned");
        while levels[level].len() <= word_idx {
            levels[level].push(AtomicU64::new(0));
        }
    }

    /// Set or clear the bit for `id`.
    pub fn set(&self, id: u64, value: bool) {
        if value {
            self.set_true(id);
        } else {
            self.set_false(id);
        }
    }

    fn set_true(&self, id: u64) {
        let mut idx = id;
        for level in 0..MAX_LEVELS {
            let word_idx = (idx >> FANOUT_BITS) as usize;
            let bit = (idx & 63) as u32;
            self.ensure_word(level, word_idx);
            let levels = self.levels.read().expect("bitmap lock poisoned");
            let before = levels[level][word_idx].fetch_or(1u64 << bit, Ordering::AcqRel);
            if before != 0 {
                return; // ancestor already reflects this word being non-empty
            }
            idx = word_idx as u64;
        }
    }

    fn set_false(&self, id: u64) {
        let mut idx = id;
        for level in 0..MAX_LEVELS {
            let word_idx = (idx >> FANOUT_BITS) as usize;
            let bit = (idx & 63) as u32;
            let levels = self.levels.read().expect("bitmap lock poisoned");
            if word_idx >= levels[level].len() {
                return; // nothing was ever set on this path
            }
            let after = levels[level][word_idx].fetch_and(!(1u64 << bit), Ordering::AcqRel) & !(1u64 << bit);
            if after != 0 {
                return; // word still has other bits set, stop propagating
            }
            idx = word_idx as u64;
        }
    }

    /// Test the bit for `id`.
    pub fn test(&self, id: u64) -> bool {
        let word_idx = (id >> FANOUT_BITS) as usize;
        let bit = (id & 63) as u32;
        let levels = self.levels.read().expect("bitmap lock poisoned");
        match levels[0].get(word_idx) {
            Some(word) => (word.load(Ordering::Acquire) >> bit) & 1 == 1,
            None => false,
        }
    }

    /// The highest id with its bit set, or `-1` if the bitmap is empty.
    pub fn highest_set(&self) -> i64 {
        let levels = self.levels.read().expect("bitmap lock poisoned");
        let mut found = None;
        for level in (0..MAX_LEVELS).rev() {
            if let Some((word_idx, _)) = levels[level]
                .iter()
                .enumerate()
                .rev()
                .find(|(_, w)| w.load(Ordering::Acquire) != 0)
            {
                found = Some((level, word_idx as u64));
                break;
            }
        }
        let (mut level, mut idx) = match found {
            Some(v) => v,
            None => return -1,
        };
        loop {
            let word = levels[level][idx as usize].load(Ordering::Acquire);
            let bit = 63 - word.leading_zeros() as u64;
            idx = (idx << FANOUT_BITS) | bit;
            if level == 0 {
                break;
            }
            level -= 1;
        }
        idx as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bitmap_has_no_highest_set() {
        let bm = HierarchicalBitmap::new();
        assert_eq!(bm.highest_set(), -1);
        assert!(!bm.test(0));
    }

    #[test]
    fn set_and_test_round_trip() {
        let bm = HierarchicalBitmap::new();
        bm.set(42, true);
        assert!(bm.test(42));
        assert!(!bm.test(41));
        bm.set(42, false);
        assert!(!bm.test(42));
    }

    #[test]
    fn highest_set_tracks_the_maximum_id() {
        let bm = HierarchicalBitmap::new();
        bm.set(5, true);
        bm.set(9000, true);
        bm.set(17, true);
        assert_eq!(bm.highest_set(), 9000);
        bm.set(9000, false);
        assert_eq!(bm.highest_set(), 17);
        bm.set(17, false);
        assert_eq!(bm.highest_set(), 5);
        bm.set(5, false);
        assert_eq!(bm.highest_set(), -1);
    }

    #[test]
    fn growing_into_new_levels_preserves_existing_low_bits() {
        // Set a small id first (only touches the lower levels), then a
        // very large one that forces every level up to the root to be
        // populated. The small id's highest_set must still resolve once
        // the large one is cleared.
        let bm = HierarchicalBitmap::new();
        bm.set(3, true);
        assert_eq!(bm.highest_set(), 3);
        bm.set(4_000_000_000, true);
        assert_eq!(bm.highest_set(), 4_000_000_000);
        bm.set(4_000_000_000, false);
        assert_eq!(bm.highest_set(), 3);
    }

    #[test]
    fn clearing_one_of_several_bits_in_a_word_does_not_clear_ancestor() {
        let bm = HierarchicalBitmap::new();
        bm.set(10, true);
        bm.set(11, true); // same level-0 word as 10
        bm.set(11, false);
        assert!(bm.test(10));
        assert_eq!(bm.highest_set(), 10);
    }
}
