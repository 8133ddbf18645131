//! The public pin handle: a payload pointer plus a [`CounterGuard`] that
//! keeps the pinned sector from being relocated for as long as the handle
//! lives.

#![allow(unsafe_code)]

use std::sync::{Arc, RwLock};

use sector_core::id::SectorId;
use sector_pin::CounterGuard;

use crate::container::Container;

/// A held reference into a [`crate::sync::SyncContainer`] sector.
///
/// While a `Pin` is alive, `defragment`/`try_defragment` on the container
/// that produced it will not relocate this sector's payload (or any
/// sector at a lower id), so [`data_ptr`](Self::data_ptr) stays valid.
/// Pinning does not, by itself, stop a concurrent `remove`/`remove_entity`
/// call on the same id — callers that need that guarantee must arrange
/// their own coordination, matching the upstream contract this type
/// mirrors.
///
/// Exclusively move-only: dropping releases the pin.
pub struct Pin {
    inner: Arc<RwLock<Container>>,
    guard: CounterGuard,
    idx: usize,
}

impl Pin {
    pub(crate) fn new(inner: Arc<RwLock<Container>>, guard: CounterGuard, idx: usize) -> Self {
        Self { inner, guard, idx }
    }

    /// The pinned entity id.
    pub fn id(&self) -> SectorId {
        self.guard.id()
    }

    /// The sector's current liveness mask.
    pub fn live(&self) -> u32 {
        let container = self.inner.read().expect("container lock poisoned");
        container.live_masks()[self.idx]
    }

    /// Raw pointer to the start of the sector's payload. Callers add a
    /// member's [`sector_core::layout::LayoutData::offset`] to address a
    /// specific component.
    pub fn data_ptr(&self) -> *const u8 {
        let container = self.inner.read().expect("container lock poisoned");
        container_chunk_ptr(&container, self.idx)
    }

    /// Mutable raw pointer variant of [`data_ptr`](Self::data_ptr).
    pub fn data_ptr_mut(&self) -> *mut u8 {
        let mut container = self.inner.write().expect("container lock poisoned");
        container_chunk_ptr_mut(&mut container, self.idx)
    }
}

fn container_chunk_ptr(container: &Container, idx: usize) -> *const u8 {
    // SAFETY: `idx` was acquired under this same container's lock while
    // holding a pin, so it remains a valid payload index for as long as
    // the pin lives (relocation is deferred until the pin is released).
    container.raw_chunk_ptr(idx)
}

fn container_chunk_ptr_mut(container: &mut Container, idx: usize) -> *mut u8 {
    container.raw_chunk_ptr_mut(idx)
}
