//! Chunked raw-byte storage for fixed-stride sector payloads.
//!
//! [`ChunkedStore`] grows in fixed-size power-of-two chunks instead of one
//! contiguous buffer, so growth never triggers a bulk reallocation (and
//! thus never needs to move already-placed payload bytes). Freed trailing
//! chunks are handed to a [`RetireBin`] rather than dropped immediately,
//! since a concurrent reader may still hold a pointer derived from an
//! earlier published view.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use sector_core::layout::SectorLayoutMeta;

use crate::retire::RetireBin;

/// Indexed storage for fixed-stride sector payloads, backed by a sequence
/// of fixed-capacity chunks.
pub struct ChunkedStore {
    chunks: Vec<Box<[u8]>>,
    chunk_capacity: usize,
    shift: u32,
    mask: usize,
    stride: usize,
    move_ops: AtomicU64,
}

impl ChunkedStore {
    /// Create an empty store. `stride` is the per-sector payload size
    /// (from [`SectorLayoutMeta::stride`]); `chunk_capacity` is rounded up
    /// to the next power of two (minimum 1).
    pub fn new(stride: u32, chunk_capacity: usize) -> Self {
        let chunk_capacity = chunk_capacity.max(1).next_power_of_two();
        Self {
            chunks: Vec::new(),
            chunk_capacity,
            shift: chunk_capacity.trailing_zeros(),
            mask: chunk_capacity - 1,
            stride: stride as usize,
            move_ops: AtomicU64::new(0),
        }
    }

    /// Per-sector payload size in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sectors per chunk (a power of two).
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Total indexable capacity: `chunk_count * chunk_capacity`.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.chunk_capacity
    }

    /// Number of member move-function invocations since the last
    /// [`reset_move_op_count`](Self::reset_move_op_count). Diagnostic only —
    /// not used by production code paths, only by tests that assert how
    /// many relocations a non-trivial member underwent.
    pub fn move_op_count(&self) -> u64 {
        self.move_ops.load(Ordering::Relaxed)
    }

    /// Reset the move-operation counter to zero.
    pub fn reset_move_op_count(&self) {
        self.move_ops.store(0, Ordering::Relaxed);
    }

    /// Pointer to the payload at linear index `i`.
    ///
    /// # Panics
    /// Panics (via slice indexing) if `i >= capacity()`.
    pub fn at(&self, i: usize) -> *const u8 {
        let chunk = &self.chunks[i >> self.shift];
        let offset = (i & self.mask) * self.stride;
        unsafe { chunk.as_ptr().add(offset) }
    }

    /// Mutable pointer to the payload at linear index `i`.
    ///
    /// # Panics
    /// Panics (via slice indexing) if `i >= capacity()`.
    pub fn at_mut(&mut self, i: usize) -> *mut u8 {
        let stride = self.stride;
        let mask = self.mask;
        let shift = self.shift;
        let chunk = &mut self.chunks[i >> shift];
        let offset = (i & mask) * stride;
        unsafe { chunk.as_mut_ptr().add(offset) }
    }

    /// Grow by appending fresh zero-initialized chunks until
    /// `capacity() >= new_capacity`. Never shrinks.
    pub fn allocate(&mut self, new_capacity: usize) {
        while self.capacity() < new_capacity {
            let bytes = self.chunk_capacity * self.stride;
            self.chunks.push(vec![0u8; bytes].into_boxed_slice());
        }
    }

    /// Free trailing chunks beyond the one covering `keep_capacity - 1`,
    /// retiring them into `retire_bin` rather than dropping immediately.
    pub fn deallocate_trailing(&mut self, keep_capacity: usize, retire_bin: &RetireBin) {
        let keep_chunks = keep_capacity.div_ceil(self.chunk_capacity);
        if keep_chunks >= self.chunks.len() {
            return;
        }
        let freed = self.chunks.split_off(keep_chunks);
        retire_bin.retire(freed);
    }

    /// Reverse-lookup the linear index of an in-range pointer previously
    /// returned by [`at`](Self::at)/[`at_mut`](Self::at_mut). `None` if
    /// `ptr` falls outside every chunk.
    pub fn find(&self, ptr: *const u8) -> Option<usize> {
        let addr = ptr as usize;
        for (chunk_idx, chunk) in self.chunks.iter().enumerate() {
            let start = chunk.as_ptr() as usize;
            let end = start + chunk.len();
            if addr >= start && addr < end {
                let within = (addr - start) / self.stride;
                return Some(chunk_idx * self.chunk_capacity + within);
            }
        }
        None
    }

    /// Move the payloads of `n` sectors from linear index `src` to `dst`.
    ///
    /// `live_masks[k]` is the liveness mask of the sector currently at
    /// `src + k`, for `k in 0..n`. For a trivial layout the whole stride is
    /// memmoved regardless of liveness (uninitialized bytes in a dead
    /// member slot are harmless to copy). For a non-trivial layout only
    /// members whose liveness bit is set are relocated through the
    /// layout's move function — the rest of a sector's payload may hold
    /// bytes that do not represent a valid value of that member's type,
    /// so calling its move function on them would be unsound.
    ///
    /// # Panics
    /// Panics if `live_masks.len() != n`.
    pub fn move_sectors(
        &mut self,
        dst: usize,
        src: usize,
        n: usize,
        layout: &SectorLayoutMeta,
        live_masks: &[u32],
    ) {
        assert_eq!(live_masks.len(), n, "live_masks must cover every moved sector");
        if n == 0 || dst == src {
            return;
        }
        if layout.is_trivial() {
            self.move_bytes(dst, src, n);
            return;
        }
        if dst < src {
            for i in 0..n {
                self.move_one_sector(dst + i, src + i, layout, live_masks[i]);
            }
        } else {
            for i in (0..n).rev() {
                self.move_one_sector(dst + i, src + i, layout, live_masks[i]);
            }
        }
    }

    fn move_one_sector(&mut self, dst_idx: usize, src_idx: usize, layout: &SectorLayoutMeta, live_mask: u32) {
        for (_, member) in layout.iter() {
            if live_mask & member.live_mask == 0 {
                continue;
            }
            let dst_ptr = unsafe { self.at_mut(dst_idx).add(member.offset as usize) };
            let src_ptr = unsafe { self.at_mut(src_idx).add(member.offset as usize) };
            unsafe {
                (member.vtable.move_fn)(dst_ptr, src_ptr);
            }
            self.move_ops.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn move_bytes(&mut self, dst: usize, src: usize, n: usize) {
        let stride = self.stride;
        if dst < src {
            let mut moved = 0;
            while moved < n {
                let s = src + moved;
                let d = dst + moved;
                let run = self
                    .room_forward(s, n - moved)
                    .min(self.room_forward(d, n - moved));
                unsafe {
                    let src_ptr = self.at_mut(s);
                    let dst_ptr = self.at_mut(d);
                    std::ptr::copy(src_ptr, dst_ptr, run * stride);
                }
                moved += run;
            }
        } else {
            let mut remaining = n;
            while remaining > 0 {
                let s_end = src + remaining;
                let d_end = dst + remaining;
                let run = self
                    .room_backward(s_end, remaining)
                    .min(self.room_backward(d_end, remaining));
                let s_start = s_end - run;
                let d_start = d_end - run;
                unsafe {
                    let src_ptr = self.at_mut(s_start);
                    let dst_ptr = self.at_mut(d_start);
                    std::ptr::copy(src_ptr, dst_ptr, run * stride);
                }
                remaining -= run;
            }
        }
    }

    fn room_forward(&self, idx: usize, remaining: usize) -> usize {
        let room = self.chunk_capacity - (idx & self.mask);
        room.min(remaining)
    }

    fn room_backward(&self, end_exclusive: usize, remaining: usize) -> usize {
        let last = end_exclusive - 1;
        let room = (last & self.mask) + 1;
        room.min(remaining)
    }
}
