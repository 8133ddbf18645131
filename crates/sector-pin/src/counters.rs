//! Per-sector pin counters and the aggregates writers consult before
//! relocating sectors.

use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, RwLock};

use sector_core::id::SectorId;

use crate::bitmap::HierarchicalBitmap;

/// Counters are allocated in blocks of this many ids at a time.
const BLOCK_SIZE: usize = 4096;

/// Cache-line-padded bundle of the aggregate atomics every `pin`/`unpin`
/// touches, kept off the same line as unrelated fields so contending
/// pinners on different ids don't false-share a cache line with readers
/// polling the aggregate.
#[repr(align(64))]
struct Aggregates {
    total_pinned: AtomicU32,
    max_pinned_id: AtomicI64,
    epoch: AtomicU64,
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Aggregates>();
};

/// Tracks, per sector id, how many outstanding "do not relocate this
/// sector" references exist, plus the aggregates a writer consults before
/// compacting: the total pinned count and the highest pinned id.
///
/// Block-allocates `AtomicU16` counters lazily in chunks of
/// [`BLOCK_SIZE`] ids so pinning a low id range never has to size an
/// array to the largest id ever seen.
pub struct PinCounters {
    blocks: RwLock<Vec<Box<[AtomicU16; BLOCK_SIZE]>>>,
    presence: HierarchicalBitmap,
    aggregates: Aggregates,
    notify_gate: Mutex<()>,
    notify: Condvar,
}

impl Default for PinCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl PinCounters {
    /// Create an empty set of counters (nothing pinned).
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
            presence: HierarchicalBitmap::new(),
            aggregates: Aggregates {
                total_pinned: AtomicU32::new(0),
                max_pinned_id: AtomicI64::new(-1),
                epoch: AtomicU64::new(0),
            },
            notify_gate: Mutex::new(()),
            notify: Condvar::new(),
        }
    }

    fn block_and_offset(id: SectorId) -> (usize, usize) {
        let i = id.index();
        (i / BLOCK_SIZE, i % BLOCK_SIZE)
    }

    fn ensure_block(&self, block_idx: usize) {
        {
            let blocks = self.blocks.read().expect("pin counter lock poisoned");
            if block_idx < blocks.len() {
                return;
            }
        }
        let mut blocks = self.blocks.write().expect("pin counter lock poisoned");
        while blocks.len() <= block_idx {
            blocks.push(Box::new(std::array::from_fn(|_| AtomicU16::new(0))));
        }
    }

    fn counter_value(&self, id: SectorId) -> u16 {
        let (block_idx, offset) = Self::block_and_offset(id);
        let blocks = self.blocks.read().expect("pin counter lock poisoned");
        match blocks.get(block_idx) {
            Some(block) => block[offset].load(Ordering::Acquire),
            None => 0,
        }
    }

    /// Increment the pin count for `id`.
    pub fn pin(&self, id: SectorId) {
        let (block_idx, offset) = Self::block_and_offset(id);
        self.ensure_block(block_idx);
        let first_pin = {
            let blocks = self.blocks.read().expect("pin counter lock poisoned");
            blocks[block_idx][offset].fetch_add(1, Ordering::AcqRel) == 0
        };
        if first_pin {
            self.presence.set(id.index() as u64, true);
            self.aggregates.total_pinned.fetch_add(1, Ordering::AcqRel);
            self.raise_max_pinned(id);
        }
        self.aggregates.epoch.fetch_add(1, Ordering::AcqRel);
        self.notify_waiters();
        debug_assert!(
            self.presence.test(id.index() as u64) == (self.counter_value(id) > 0),
            "presence bitmap disagrees with {id}'s pin counter"
        );
        debug_assert_eq!(
            self.max_pinned_id() == -1,
            self.total_pinned() == 0,
            "max_pinned_id and total_pinned disagree about whether anything is pinned"
        );
    }

    /// Decrement the pin count for `id`.
    ///
    /// # Panics
    /// Panics (debug builds only) if `id` had no outstanding pin.
    pub fn unpin(&self, id: SectorId) {
        let (block_idx, offset) = Self::block_and_offset(id);
        let last_unpin = {
            let blocks = self.blocks.read().expect("pin counter lock poisoned");
            let prev = blocks[block_idx][offset].fetch_sub(1, Ordering::AcqRel);
            debug_assert!(prev > 0, "unpin called without a matching pin for {id}");
            prev == 1
        };
        if last_unpin {
            self.presence.set(id.index() as u64, false);
            self.aggregates.total_pinned.fetch_sub(1, Ordering::AcqRel);
            self.update_max_pinned();
        }
        self.aggregates.epoch.fetch_add(1, Ordering::AcqRel);
        self.notify_waiters();
        debug_assert!(
            self.presence.test(id.index() as u64) == (self.counter_value(id) > 0),
            "presence bitmap disagrees with {id}'s pin counter"
        );
    }

    fn raise_max_pinned(&self, id: SectorId) {
        let target = id.index() as i64;
        loop {
            let current = self.aggregates.max_pinned_id.load(Ordering::Acquire);
            if current >= target {
                return;
            }
            if self
                .aggregates
                .max_pinned_id
                .compare_exchange_weak(current, target, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Re-derive the highest pinned id from the presence bitmap and
    /// publish it, but only if the epoch has not advanced since this call
    /// started (a racing pin/unpin will run its own `update_max_pinned`
    /// and supersede a stale value).
    pub fn update_max_pinned(&self) {
        let epoch_before = self.aggregates.epoch.load(Ordering::Acquire);
        let highest = self.presence.highest_set();
        if self.aggregates.epoch.load(Ordering::Acquire) != epoch_before {
            return;
        }
        let current = self.aggregates.max_pinned_id.load(Ordering::Acquire);
        if highest != current {
            let _ = self.aggregates.max_pinned_id.compare_exchange(
                current,
                highest,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Whether `id` may currently be relocated: it must be above the
    /// highest pinned id and hold no outstanding pin itself.
    pub fn can_move(&self, id: SectorId) -> bool {
        id.index() as i64 > self.aggregates.max_pinned_id.load(Ordering::Acquire)
            && self.counter_value(id) == 0
    }

    /// Total number of distinct ids with an outstanding pin.
    pub fn total_pinned(&self) -> u32 {
        self.aggregates.total_pinned.load(Ordering::Acquire)
    }

    /// The highest pinned id, or `-1` if nothing is pinned.
    pub fn max_pinned_id(&self) -> i64 {
        self.aggregates.max_pinned_id.load(Ordering::Acquire)
    }

    /// Block until `id` is changeable: no sector at or below `id` is
    /// pinned, and `id` itself holds no pin. `SectorId(0)` is a barrier
    /// waiting for every pin to clear.
    pub fn wait_until_changeable(&self, id: SectorId) {
        let target = id.index() as i64;
        let guard = self.notify_gate.lock().expect("pin counter lock poisoned");
        let _guard = self
            .notify
            .wait_while(guard, |_| target <= self.aggregates.max_pinned_id.load(Ordering::Acquire))
            .expect("pin counter lock poisoned");
        drop(_guard);
        let guard = self.notify_gate.lock().expect("pin counter lock poisoned");
        let _guard = self
            .notify
            .wait_while(guard, |_| self.counter_value(id) > 0)
            .expect("pin counter lock poisoned");
    }

    fn notify_waiters(&self) {
        let _guard = self.notify_gate.lock().expect("pin counter lock poisoned");
        self.notify.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pin_then_unpin_round_trip_clears_aggregates() {
        let counters = PinCounters::new();
        counters.pin(SectorId(5));
        assert_eq!(counters.total_pinned(), 1);
        assert_eq!(counters.max_pinned_id(), 5);
        assert!(!counters.can_move(SectorId(5)));
        assert!(!counters.can_move(SectorId(3))); // below max_pinned_id

        counters.unpin(SectorId(5));
        assert_eq!(counters.total_pinned(), 0);
        assert_eq!(counters.max_pinned_id(), -1);
        assert!(counters.can_move(SectorId(5)));
        assert!(counters.can_move(SectorId(3)));
    }

    #[test]
    fn multiple_pins_on_same_id_require_matching_unpins() {
        let counters = PinCounters::new();
        counters.pin(SectorId(9));
        counters.pin(SectorId(9));
        assert_eq!(counters.total_pinned(), 1); // one distinct pinned id
        counters.unpin(SectorId(9));
        assert!(!counters.can_move(SectorId(9))); // still one outstanding pin
        counters.unpin(SectorId(9));
        assert!(counters.can_move(SectorId(9)));
    }

    #[test]
    fn max_pinned_id_tracks_highest_after_partial_unpin() {
        let counters = PinCounters::new();
        counters.pin(SectorId(3));
        counters.pin(SectorId(100));
        assert_eq!(counters.max_pinned_id(), 100);
        counters.unpin(SectorId(100));
        assert_eq!(counters.max_pinned_id(), 3);
        counters.unpin(SectorId(3));
        assert_eq!(counters.max_pinned_id(), -1);
    }

    #[test]
    fn wait_until_changeable_blocks_until_unpin() {
        let counters = std::sync::Arc::new(PinCounters::new());
        counters.pin(SectorId(5));

        let (tx, rx) = mpsc::channel();
        let waiter_counters = counters.clone();
        let waiter = thread::spawn(move || {
            waiter_counters.wait_until_changeable(SectorId(5));
            tx.send(()).unwrap();
        });

        // The waiter should still be blocked after a short grace period.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        counters.unpin(SectorId(5));
        rx.recv_timeout(Duration::from_secs(5))
            .expect("waiter did not wake after unpin");
        waiter.join().unwrap();
    }

    #[test]
    fn wait_until_changeable_with_nothing_pinned_returns_immediately() {
        let counters = PinCounters::new();
        counters.wait_until_changeable(SectorId(0));
    }
}
