//! The thread-safe sectors container: a [`Container`] behind a
//! shared/exclusive lock, plus the pin subsystem and pending-erase queue
//! that make concurrent readers safe.
//!
//! Structural mutation (`insert`, `remove_entity`, `defragment`,
//! `reserve`, `clear`, ...) takes the exclusive side of the lock. Reads
//! (`get`, `has`) take the shared side. Pin/unpin never touch this lock —
//! they go through [`PinCounters`]' atomics — but `defragment` waits on
//! the pin counters' aggregate before it takes the exclusive lock's work,
//! so a held [`Pin`] blocks compaction without blocking plain reads.

use std::sync::{Arc, Mutex, RwLock};

use sector_core::id::SectorId;
use sector_core::layout::SectorLayoutMeta;
use sector_pin::{CounterGuard, PinCounters};

use crate::container::Container;
use crate::error::ContainerError;
use crate::pin::Pin;

/// Thread-safe wrapper around [`Container`].
pub struct SyncContainer {
    inner: Arc<RwLock<Container>>,
    pins: Arc<PinCounters>,
    pending_erases: Mutex<Vec<SectorId>>,
}

impl SyncContainer {
    /// Build an empty thread-safe container for `layout`.
    pub fn new(layout: SectorLayoutMeta, chunk_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Container::new(layout, chunk_capacity))),
            pins: Arc::new(PinCounters::new()),
            pending_erases: Mutex::new(Vec::new()),
        }
    }

    /// Override the defragment ratio threshold (clamped to `[0, 1]`).
    pub fn with_defrag_threshold(self, threshold: f32) -> Self {
        let container = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("with_defrag_threshold must run before sharing the container"))
            .into_inner()
            .expect("container lock poisoned");
        Self {
            inner: Arc::new(RwLock::new(container.with_defrag_threshold(threshold))),
            pins: self.pins,
            pending_erases: self.pending_erases,
        }
    }

    /// Current dense size.
    pub fn size(&self) -> usize {
        self.inner.read().expect("container lock poisoned").size()
    }

    /// Total indexable payload capacity.
    pub fn capacity(&self) -> usize {
        self.inner.read().expect("container lock poisoned").capacity()
    }

    /// `defrag_size / size`.
    pub fn defrag_ratio(&self) -> f32 {
        self.inner.read().expect("container lock poisoned").defrag_ratio()
    }

    /// Whether `defrag_ratio()` exceeds the configured threshold.
    pub fn needs_defragment(&self) -> bool {
        self.inner.read().expect("container lock poisoned").needs_defragment()
    }

    /// Number of distinct pinned ids.
    pub fn total_pinned(&self) -> u32 {
        self.pins.total_pinned()
    }

    /// Grow chunk storage so at least `n` sectors can be held.
    pub fn reserve(&self, n: usize) {
        self.inner.write().expect("container lock poisoned").reserve(n);
    }

    /// Store `value` for `id`, destroying any previous value of the same
    /// type first.
    pub fn insert<T: 'static>(&self, id: SectorId, value: T) -> Result<(), ContainerError> {
        self.inner.write().expect("container lock poisoned").insert(id, value)?;
        Ok(())
    }

    /// Construct a value in place via `build` once the sector slot has
    /// been acquired.
    pub fn emplace<T: 'static>(&self, id: SectorId, build: impl FnOnce() -> T) -> Result<(), ContainerError> {
        self.inner.write().expect("container lock poisoned").emplace(id, build)?;
        Ok(())
    }

    /// Clone out `id`'s `T` member, if alive.
    ///
    /// Unlike [`Container::get`], this returns an owned value rather than
    /// a borrow: a reference scoped to a lock guard cannot safely outlive
    /// the call, and the pin mechanism ([`pin_sector`](Self::pin_sector))
    /// is the supported way to hold a live pointer across time under this
    /// variant. Requires `T: Clone`.
    pub fn get<T: Clone + 'static>(&self, id: SectorId) -> Result<Option<T>, ContainerError> {
        let container = self.inner.read().expect("container lock poisoned");
        Ok(container.get::<T>(id)?.cloned())
    }

    /// Whether `id` currently has a live `T` member.
    pub fn has<T: 'static>(&self, id: SectorId) -> Result<bool, ContainerError> {
        self.inner.read().expect("container lock poisoned").has::<T>(id)
    }

    /// Destroy `id`'s `T` member if alive.
    pub fn remove<T: 'static>(&self, id: SectorId) -> Result<(), ContainerError> {
        self.inner.write().expect("container lock poisoned").remove::<T>(id)
    }

    /// Destroy every alive member of `id` immediately.
    pub fn remove_entity(&self, id: SectorId) {
        self.inner.write().expect("container lock poisoned").remove_entity(id);
    }

    /// Queue `id` for asynchronous removal, drained by
    /// [`process_pending_erases`](Self::process_pending_erases).
    pub fn erase_async(&self, id: SectorId) {
        self.pending_erases.lock().expect("pending erase lock poisoned").push(id);
    }

    /// Drain the pending-erase queue, destroying every queued id whose
    /// pin counters allow relocation and re-queuing the rest. If
    /// `do_defragment` is set and the resulting defrag ratio exceeds the
    /// threshold, follows with a [`defragment`](Self::defragment) call.
    pub fn process_pending_erases(&self, do_defragment: bool) {
        let mut pending = {
            let mut guard = self.pending_erases.lock().expect("pending erase lock poisoned");
            std::mem::take(&mut *guard)
        };
        pending.sort_unstable();
        pending.dedup();

        let mut remaining = Vec::new();
        {
            let mut container = self.inner.write().expect("container lock poisoned");
            for id in pending {
                if self.pins.can_move(id) {
                    container.remove_entity(id);
                    debug_assert!(
                        self.pins.can_move(id),
                        "{id} became pinned mid-erase while the container lock was held"
                    );
                } else {
                    remaining.push(id);
                }
            }
        }
        if !remaining.is_empty() {
            self.pending_erases
                .lock()
                .expect("pending erase lock poisoned")
                .extend(remaining);
        }

        if do_defragment && self.needs_defragment() {
            self.defragment();
        }
    }

    /// Compact the dense arrays. Blocks until no pin is outstanding.
    pub fn defragment(&self) {
        self.pins.wait_until_changeable(SectorId(0));
        debug_assert_eq!(
            self.pins.total_pinned(),
            0,
            "defragment began relocating sectors while one was still pinned"
        );
        self.inner.write().expect("container lock poisoned").defragment();
    }

    /// Compact the dense arrays, but return immediately without doing any
    /// work if a pin is currently outstanding. Best-effort: a pin taken
    /// between the check and the exclusive-lock acquisition still defers
    /// to the next `defragment`/`try_defragment` call, since `defragment`
    /// itself will wait on the pin before compacting.
    pub fn try_defragment(&self) -> bool {
        if self.pins.total_pinned() > 0 {
            return false;
        }
        self.defragment();
        true
    }

    /// Destroy every alive member of every sector and reset to empty.
    pub fn clear(&self) {
        self.inner.write().expect("container lock poisoned").clear();
    }

    /// Free chunks strictly beyond the current size.
    pub fn shrink_to_fit(&self) {
        self.inner.write().expect("container lock poisoned").shrink_to_fit();
    }

    /// Pin `id` against relocation, if it currently has a sector slot.
    pub fn pin_sector(&self, id: SectorId) -> Option<Pin> {
        let container = self.inner.read().expect("container lock poisoned");
        let idx = container.find_slot(id)?;
        let guard = CounterGuard::new(self.pins.clone(), id);
        drop(container);
        Some(Pin::new(self.inner.clone(), guard, idx))
    }

    /// Pin the sector currently at dense linear index `idx`.
    pub fn pin_sector_at(&self, idx: usize) -> Option<Pin> {
        let container = self.inner.read().expect("container lock poisoned");
        let id = *container.ids().get(idx)?;
        let guard = CounterGuard::new(self.pins.clone(), id);
        drop(container);
        Some(Pin::new(self.inner.clone(), guard, idx))
    }

    /// Acquire a read guard over the underlying container, for `sector-view`'s
    /// `View`/`JoinView2`/`JoinView3` to borrow from while held.
    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, Container> {
        self.inner.read().expect("container lock poisoned")
    }

    /// A raw pointer identifying the container this handle wraps, for
    /// ordering lock acquisition across containers by address (never
    /// dereferenced).
    pub fn identity(&self) -> *const RwLock<Container> {
        Arc::as_ptr(&self.inner)
    }

    /// Pin the last sector in dense order.
    pub fn pin_back(&self) -> Option<Pin> {
        let container = self.inner.read().expect("container lock poisoned");
        let idx = container.size().checked_sub(1)?;
        let id = container.ids()[idx];
        let guard = CounterGuard::new(self.pins.clone(), id);
        drop(container);
        Some(Pin::new(self.inner.clone(), guard, idx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use sector_core::layout::LayoutBuilder;
    use sector_test_utils::Pos;

    use super::*;

    fn pos_layout() -> SectorLayoutMeta {
        let mut builder = LayoutBuilder::new();
        builder.register_copyable::<Pos>().unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn insert_get_has_remove_round_trip() {
        let sc = SyncContainer::new(pos_layout(), 4);
        sc.insert(SectorId(0), Pos { x: 1.0, y: 2.0 }).unwrap();
        assert!(sc.has::<Pos>(SectorId(0)).unwrap());
        assert_eq!(sc.get::<Pos>(SectorId(0)).unwrap(), Some(Pos { x: 1.0, y: 2.0 }));

        sc.remove::<Pos>(SectorId(0)).unwrap();
        assert!(!sc.has::<Pos>(SectorId(0)).unwrap());
    }

    #[test]
    fn pin_blocks_defragment_until_dropped() {
        let sc = Arc::new(SyncContainer::new(pos_layout(), 4));
        for i in 0..4u32 {
            sc.insert(SectorId(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }
        sc.remove_entity(SectorId(1));

        let pin = sc.pin_sector(SectorId(2)).expect("sector 2 is alive");

        let (tx, rx) = mpsc::channel();
        let worker_sc = sc.clone();
        let worker = thread::spawn(move || {
            worker_sc.defragment();
            tx.send(()).expect("main thread still receiving");
        });

        assert!(
            rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "defragment must wait for the pin to clear"
        );

        drop(pin);
        rx.recv_timeout(Duration::from_secs(5)).expect("defragment did not unblock after unpin");
        worker.join().unwrap();

        assert_eq!(sc.size(), 3);
    }

    #[test]
    fn try_defragment_is_a_no_op_while_pinned() {
        let sc = SyncContainer::new(pos_layout(), 4);
        sc.insert(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
        let pin = sc.pin_sector(SectorId(0)).unwrap();

        assert!(!sc.try_defragment());
        drop(pin);
        assert!(sc.try_defragment());
    }

    #[test]
    fn erase_async_requeues_while_pinned_then_applies_after_unpin() {
        let sc = SyncContainer::new(pos_layout(), 4);
        sc.insert(SectorId(7), Pos { x: 7.0, y: 0.0 }).unwrap();
        let pin = sc.pin_sector(SectorId(7)).expect("sector 7 is alive");

        sc.erase_async(SectorId(7));
        sc.process_pending_erases(false);
        assert!(sc.has::<Pos>(SectorId(7)).unwrap(), "erase stays queued while pinned");

        drop(pin);
        sc.process_pending_erases(false);
        assert!(!sc.has::<Pos>(SectorId(7)).unwrap(), "erase applies once the pin clears");
    }

    #[test]
    fn process_pending_erases_can_trigger_defragment() {
        let sc = SyncContainer::new(pos_layout(), 4);
        for i in 0..4u32 {
            sc.insert(SectorId(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }
        sc.erase_async(SectorId(0));
        sc.erase_async(SectorId(1));
        sc.process_pending_erases(true);

        assert_eq!(sc.size(), 2);
        assert_eq!(sc.defrag_ratio(), 0.0);
    }

    #[test]
    fn with_defrag_threshold_overrides_before_sharing() {
        let sc = SyncContainer::new(pos_layout(), 4).with_defrag_threshold(0.0);
        sc.insert(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
        sc.insert(SectorId(1), Pos { x: 1.0, y: 0.0 }).unwrap();
        sc.remove_entity(SectorId(0));
        assert!(sc.needs_defragment());
    }

    #[test]
    fn identity_distinguishes_distinct_containers() {
        let a = SyncContainer::new(pos_layout(), 4);
        let b = SyncContainer::new(pos_layout(), 4);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a.identity());
    }
}
