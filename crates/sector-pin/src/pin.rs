//! Move-only RAII guard releasing a pin on drop.

use std::sync::Arc;

use sector_core::id::SectorId;

use crate::counters::PinCounters;

/// Holds one outstanding pin on a sector id, decrementing the counter
/// when dropped.
///
/// This is the low-level counter-only guard; the sectors container wraps
/// it together with a payload pointer and liveness mask to produce the
/// public `Pin` type callers interact with.
pub struct CounterGuard {
    counters: Arc<PinCounters>,
    id: SectorId,
}

impl CounterGuard {
    /// Pin `id` against `counters`, returning a guard that unpins on drop.
    pub fn new(counters: Arc<PinCounters>, id: SectorId) -> Self {
        counters.pin(id);
        Self { counters, id }
    }

    /// The pinned sector id.
    pub fn id(&self) -> SectorId {
        self.id
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.counters.unpin(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_pins_on_construction_and_unpins_on_drop() {
        let counters = Arc::new(PinCounters::new());
        {
            let guard = CounterGuard::new(counters.clone(), SectorId(4));
            assert_eq!(guard.id(), SectorId(4));
            assert!(!counters.can_move(SectorId(4)));
        }
        assert!(counters.can_move(SectorId(4)));
        assert_eq!(counters.total_pinned(), 0);
    }
}
