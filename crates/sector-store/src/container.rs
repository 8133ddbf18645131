//! The single-threaded sectors container: dense/sparse storage over a
//! [`ChunkedStore`], exclusive-access (`&mut self`) mutation, and
//! defragmentation. See [`crate::sync::SyncContainer`] for the
//! thread-safe wrapper built on top of this core.

#![allow(unsafe_code)]

use sector_alloc::{ChunkedStore, RetireBin};
use sector_core::id::SectorId;
use sector_core::layout::SectorLayoutMeta;

use crate::error::ContainerError;

const INVALID_SPARSE: u32 = u32::MAX;

/// Default sectors-per-chunk used when a container is built without an
/// explicit chunk capacity.
pub const DEFAULT_CHUNK_CAPACITY: usize = 8192;

/// Default defragment ratio threshold.
pub const DEFAULT_DEFRAG_THRESHOLD: f32 = 0.2;

/// Dense/sparse storage for a fixed set of component types, addressed by
/// [`SectorId`].
///
/// Exclusive access (`&mut self` for every mutator) means pointers
/// returned from `get`/`get_mut`/`insert` are tied to the borrow of
/// `self` — the borrow checker itself enforces the "stable until the
/// next structural mutation" contract.
pub struct Container {
    layout: SectorLayoutMeta,
    chunked: ChunkedStore,
    ids: Vec<SectorId>,
    live: Vec<u32>,
    sparse: Vec<u32>,
    defrag_size: usize,
    defrag_threshold: f32,
    retire: RetireBin,
}

impl Container {
    /// Build an empty container for `layout`, with `chunk_capacity`
    /// sectors per chunk (rounded up to a power of two).
    pub fn new(layout: SectorLayoutMeta, chunk_capacity: usize) -> Self {
        let stride = layout.stride();
        Self {
            chunked: ChunkedStore::new(stride, chunk_capacity),
            layout,
            ids: Vec::new(),
            live: Vec::new(),
            sparse: Vec::new(),
            defrag_size: 0,
            defrag_threshold: DEFAULT_DEFRAG_THRESHOLD,
            retire: RetireBin::new(),
        }
    }

    /// Override the defragment ratio threshold (clamped to `[0, 1]`).
    pub fn with_defrag_threshold(mut self, threshold: f32) -> Self {
        self.defrag_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// The container's layout.
    pub fn layout(&self) -> &SectorLayoutMeta {
        &self.layout
    }

    /// Number of dense slots (alive + pending-compaction).
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    /// Total indexable payload capacity.
    pub fn capacity(&self) -> usize {
        self.chunked.capacity()
    }

    /// Number of dense slots whose liveness mask is zero, awaiting
    /// `defragment`.
    pub fn defrag_size(&self) -> usize {
        self.defrag_size
    }

    /// `defrag_size / size`, or 0 if empty.
    pub fn defrag_ratio(&self) -> f32 {
        if self.ids.is_empty() {
            0.0
        } else {
            self.defrag_size as f32 / self.ids.len() as f32
        }
    }

    /// Whether `defrag_ratio()` exceeds the configured threshold.
    pub fn needs_defragment(&self) -> bool {
        self.defrag_ratio() > self.defrag_threshold
    }

    /// Dense ids in ascending order, for iteration and view construction.
    pub fn ids(&self) -> &[SectorId] {
        &self.ids
    }

    /// Liveness masks parallel to [`ids`](Self::ids).
    pub fn live_masks(&self) -> &[u32] {
        &self.live
    }

    /// Grow chunk storage (and reserve dense-array capacity) so at least
    /// `n` sectors can be held without further chunk allocation.
    pub fn reserve(&mut self, n: usize) {
        self.chunked.allocate(n);
        if n > self.ids.len() {
            self.ids.reserve(n - self.ids.len());
            self.live.reserve(n - self.ids.len());
        }
    }

    /// Raw pointer to the payload at dense linear index `idx`. For use by
    /// [`crate::pin::Pin`] only, which is responsible for only calling
    /// this with an index a pin still protects from relocation.
    pub(crate) fn raw_chunk_ptr(&self, idx: usize) -> *const u8 {
        self.chunked.at(idx)
    }

    /// Mutable counterpart of [`raw_chunk_ptr`](Self::raw_chunk_ptr).
    pub(crate) fn raw_chunk_ptr_mut(&mut self, idx: usize) -> *mut u8 {
        self.chunked.at_mut(idx)
    }

    /// Raw pointer to the payload at dense linear index `idx`. Public so
    /// that `sector-view` can address members through [`layout`](Self::layout)
    /// offsets without this crate re-exporting `ChunkedStore` itself. Callers
    /// outside this workspace's view crate should prefer
    /// [`get`](Self::get)/[`get_mut`](Self::get_mut).
    pub fn chunk_ptr(&self, idx: usize) -> *const u8 {
        self.chunked.at(idx)
    }

    /// Dense linear index of `id`, if it has a slot (alive or pending
    /// compaction).
    pub fn find_slot(&self, id: SectorId) -> Option<usize> {
        let i = id.index();
        match self.sparse.get(i) {
            Some(&idx) if idx != INVALID_SPARSE => Some(idx as usize),
            _ => None,
        }
    }

    fn grow_sparse(&mut self, id: SectorId) {
        let i = id.index();
        if i >= self.sparse.len() {
            self.sparse.resize(i + 1, INVALID_SPARSE);
        }
    }

    /// Get or create the dense slot for `id`, shifting later sectors right
    /// by one if a new slot has to be inserted to keep `ids` ascending.
    fn acquire_sector(&mut self, id: SectorId) -> usize {
        self.debug_check_invariants();
        self.grow_sparse(id);
        if let Some(idx) = self.find_slot(id) {
            self.debug_check_invariants();
            return idx;
        }

        let pos = self.ids.partition_point(|&x| x < id);
        let new_len = self.ids.len() + 1;
        self.chunked.allocate(new_len);

        if pos < self.ids.len() {
            let run_len = self.ids.len() - pos;
            let masks = self.live[pos..pos + run_len].to_vec();
            self.chunked.move_sectors(pos + 1, pos, run_len, &self.layout, &masks);
            self.ids.insert(pos, id);
            self.live.insert(pos, 0);
            for i in (pos + 1)..self.ids.len() {
                self.sparse[self.ids[i].index()] = i as u32;
            }
        } else {
            self.ids.push(id);
            self.live.push(0);
        }
        self.sparse[id.index()] = pos as u32;
        self.debug_check_invariants();
        pos
    }

    /// Store `value` for `id`, destroying any previous value of the same
    /// type first. Returns a reference to the stored value.
    pub fn insert<T: 'static>(&mut self, id: SectorId, value: T) -> Result<&mut T, ContainerError> {
        self.debug_check_invariants();
        let entry = *self.layout.layout_of_type::<T>()?;
        let idx = self.acquire_sector(id);
        let ptr = unsafe { self.chunked.at_mut(idx).add(entry.offset as usize) } as *mut T;
        if self.live[idx] & entry.live_mask != 0 {
            unsafe { std::ptr::drop_in_place(ptr) };
        }
        unsafe { ptr.write(value) };
        self.live[idx] |= entry.live_mask;
        self.debug_check_invariants();
        Ok(unsafe { &mut *ptr })
    }

    /// Construct a value in place via `build`, only evaluating it once the
    /// sector slot has been acquired. Semantically identical to
    /// [`insert`](Self::insert) for every type this crate can express —
    /// Rust has no separate "placement new" — kept as a distinct method to
    /// mirror the construct-in-place call site.
    pub fn emplace<T: 'static>(
        &mut self,
        id: SectorId,
        build: impl FnOnce() -> T,
    ) -> Result<&mut T, ContainerError> {
        self.insert(id, build())
    }

    /// Read-only access to `id`'s `T` member, if the sector exists and the
    /// member is alive.
    pub fn get<T: 'static>(&self, id: SectorId) -> Result<Option<&T>, ContainerError> {
        let entry = *self.layout.layout_of_type::<T>()?;
        let Some(idx) = self.find_slot(id) else {
            return Ok(None);
        };
        if self.live[idx] & entry.live_mask == 0 {
            return Ok(None);
        }
        let ptr = unsafe { self.chunked.at(idx).add(entry.offset as usize) } as *const T;
        Ok(Some(unsafe { &*ptr }))
    }

    /// Mutable access to `id`'s `T` member, if the sector exists and the
    /// member is alive.
    pub fn get_mut<T: 'static>(&mut self, id: SectorId) -> Result<Option<&mut T>, ContainerError> {
        let entry = *self.layout.layout_of_type::<T>()?;
        let Some(idx) = self.find_slot(id) else {
            return Ok(None);
        };
        if self.live[idx] & entry.live_mask == 0 {
            return Ok(None);
        }
        let ptr = unsafe { self.chunked.at_mut(idx).add(entry.offset as usize) } as *mut T;
        Ok(Some(unsafe { &mut *ptr }))
    }

    /// Whether `id` currently has a live `T` member.
    pub fn has<T: 'static>(&self, id: SectorId) -> Result<bool, ContainerError> {
        Ok(self.get::<T>(id)?.is_some())
    }

    /// Destroy `id`'s `T` member if alive; a no-op if absent or already
    /// dead. If the sector has no more alive members afterward, it is
    /// marked pending compaction (its dense slot is left in place until
    /// [`defragment`](Self::defragment)).
    pub fn remove<T: 'static>(&mut self, id: SectorId) -> Result<(), ContainerError> {
        self.debug_check_invariants();
        let entry = *self.layout.layout_of_type::<T>()?;
        if let Some(idx) = self.find_slot(id) {
            if self.live[idx] & entry.live_mask != 0 {
                let ptr = unsafe { self.chunked.at_mut(idx).add(entry.offset as usize) };
                unsafe { (entry.vtable.drop_fn)(ptr) };
                self.live[idx] &= entry.clear_mask;
                if self.live[idx] == 0 {
                    self.defrag_size += 1;
                }
            }
        }
        self.debug_check_invariants();
        Ok(())
    }

    /// Destroy every alive member of `id` and mark the sector pending
    /// compaction. The sparse entry is left pointing at the now-dead slot
    /// until [`defragment`](Self::defragment) relocates survivors.
    pub fn remove_entity(&mut self, id: SectorId) {
        self.debug_check_invariants();
        let Some(idx) = self.find_slot(id) else {
            return;
        };
        let mask = self.live[idx];
        if mask == 0 {
            return;
        }
        for (_, member) in self.layout.iter() {
            if mask & member.live_mask != 0 {
                let ptr = unsafe { self.chunked.at_mut(idx).add(member.offset as usize) };
                unsafe { (member.vtable.drop_fn)(ptr) };
            }
        }
        self.live[idx] = 0;
        self.defrag_size += 1;
        self.debug_check_invariants();
    }

    /// Compact the dense arrays, collapsing runs of dead sectors and
    /// freeing now-empty trailing chunks.
    pub fn defragment(&mut self) {
        self.debug_check_invariants();
        let len = self.ids.len();
        let mut read = 0usize;
        let mut write = 0usize;
        while read < len {
            if self.live[read] == 0 {
                self.sparse[self.ids[read].index()] = INVALID_SPARSE;
                read += 1;
                continue;
            }
            let run_start = read;
            while read < len && self.live[read] != 0 {
                read += 1;
            }
            let run_len = read - run_start;
            if run_start != write {
                let masks = self.live[run_start..run_start + run_len].to_vec();
                self.chunked.move_sectors(write, run_start, run_len, &self.layout, &masks);
                for i in 0..run_len {
                    self.ids[write + i] = self.ids[run_start + i];
                    self.live[write + i] = self.live[run_start + i];
                    self.sparse[self.ids[write + i].index()] = (write + i) as u32;
                }
            }
            write += run_len;
        }
        self.ids.truncate(write);
        self.live.truncate(write);
        self.defrag_size = 0;
        self.chunked.deallocate_trailing(write, &self.retire);
        self.retire.drain();
        self.debug_check_invariants();
    }

    /// Destroy every alive member of every sector and reset to empty,
    /// dropping all chunks.
    pub fn clear(&mut self) {
        for idx in 0..self.ids.len() {
            let mask = self.live[idx];
            if mask == 0 {
                continue;
            }
            for (_, member) in self.layout.iter() {
                if mask & member.live_mask != 0 {
                    let ptr = unsafe { self.chunked.at_mut(idx).add(member.offset as usize) };
                    unsafe { (member.vtable.drop_fn)(ptr) };
                }
            }
        }
        self.ids.clear();
        self.live.clear();
        self.sparse.clear();
        self.defrag_size = 0;
        self.chunked.deallocate_trailing(0, &self.retire);
        self.retire.drain();
    }

    /// Free chunks strictly beyond the current size.
    pub fn shrink_to_fit(&mut self) {
        self.chunked.deallocate_trailing(self.ids.len(), &self.retire);
        self.retire.drain();
    }

    /// Check I1–I3 against the container's own fields: sparse/dense
    /// agreement, strictly ascending ids, and `defrag_size` matching the
    /// actual count of dead dense slots. Panics via `debug_assert!` (never
    /// compiled into release builds), using [`ContainerError::InvariantViolation`]'s
    /// `Display` text as the panic message so a corruption report always
    /// names the same failure the same way. I4 (a member is alive iff its
    /// bit is set in `live[i]`) has no independent source of truth to check
    /// against — the live mask *is* the definition — so it isn't checked
    /// here. I5–I7 concern pin state, which this single-threaded type has
    /// no knowledge of; see `sector-pin::PinCounters` and
    /// `SyncContainer::defragment` for those.
    #[cfg(debug_assertions)]
    fn debug_check_invariants(&self) {
        debug_assert_eq!(
            self.ids.len(),
            self.live.len(),
            "{}",
            ContainerError::InvariantViolation("dense id/live arrays out of lockstep")
        );
        for (i, &id) in self.ids.iter().enumerate() {
            debug_assert_eq!(
                self.sparse.get(id.index()).copied(),
                Some(i as u32),
                "{}",
                ContainerError::InvariantViolation("sparse/dense mismatch (I1)")
            );
        }
        debug_assert!(
            self.ids.windows(2).all(|w| w[0] < w[1]),
            "{}",
            ContainerError::InvariantViolation("dense ids not strictly ascending (I2)")
        );
        let dead = self.live.iter().filter(|&&mask| mask == 0).count();
        debug_assert_eq!(
            dead,
            self.defrag_size,
            "{}",
            ContainerError::InvariantViolation("defrag_size out of sync with dead slot count (I3)")
        );
    }

    #[cfg(not(debug_assertions))]
    fn debug_check_invariants(&self) {}

    fn layouts_compatible(&self, other: &Container) -> bool {
        self.layout.member_count() == other.layout.member_count()
            && self.layout.iter().all(|(token, _)| other.layout.contains(*token))
    }

    /// Move or copy every alive sector from `self` into `dst`, which must
    /// have an identical component-type set (though it may use a
    /// different chunk capacity). Moving empties `self` afterward through
    /// its own [`clear`](Self::clear) path; copying requires every member
    /// type to be `Copy`-registered.
    pub fn transfer_into(&mut self, dst: &mut Container, copy: bool) -> Result<(), ContainerError> {
        if !self.layouts_compatible(dst) {
            return Err(ContainerError::LayoutMismatch);
        }
        for idx in 0..self.ids.len() {
            let id = self.ids[idx];
            let mask = self.live[idx];
            if mask == 0 {
                continue;
            }
            let dst_idx = dst.acquire_sector(id);
            for (_, member) in self.layout.iter() {
                if mask & member.live_mask == 0 {
                    continue;
                }
                let src_ptr = unsafe { self.chunked.at_mut(idx).add(member.offset as usize) };
                let dst_ptr = unsafe { dst.chunked.at_mut(dst_idx).add(member.offset as usize) };
                if copy {
                    let copy_fn = member.vtable.copy_fn.ok_or(ContainerError::LayoutMismatch)?;
                    unsafe { copy_fn(dst_ptr, src_ptr as *const u8) };
                } else {
                    unsafe { (member.vtable.move_fn)(dst_ptr, src_ptr) };
                }
                dst.live[dst_idx] |= member.live_mask;
            }
        }
        if !copy {
            self.clear();
        }
        Ok(())
    }
}
