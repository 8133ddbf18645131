//! A handle to one registered component set, bundling the operations a
//! caller performs against it.

use std::sync::Arc;

use sector_core::id::SectorId;
use sector_store::{Container, ContainerError, Pin, SyncContainer};

/// A non-owning reference to a registered component set's container; the
/// [`crate::registry::Registry`] that produced it owns the container for
/// as long as the process runs. Cloning shares the same underlying
/// container.
#[derive(Clone)]
pub struct ComponentSetHandle {
    pub(crate) container: Arc<SyncContainer>,
}

impl std::fmt::Debug for ComponentSetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSetHandle")
            .field("container", &Arc::as_ptr(&self.container))
            .finish()
    }
}

impl ComponentSetHandle {
    pub(crate) fn new(container: Arc<SyncContainer>) -> Self {
        Self { container }
    }

    /// Grow chunk storage so at least `n` sectors can be held.
    pub fn reserve(&self, n: usize) {
        self.container.reserve(n);
    }

    /// Store `value` for `id`'s `T` member; the previous value, if any, is
    /// destroyed first.
    pub fn add<T: 'static>(&self, id: SectorId, value: T) -> Result<(), ContainerError> {
        self.container.insert(id, value)
    }

    /// Destroy `id`'s `T` member; a no-op if absent.
    pub fn remove<T: 'static>(&self, id: SectorId) -> Result<(), ContainerError> {
        self.container.remove::<T>(id)
    }

    /// Whether `id` currently has a live `T` member.
    pub fn has<T: 'static>(&self, id: SectorId) -> Result<bool, ContainerError> {
        self.container.has::<T>(id)
    }

    /// A clone of `id`'s `T` member, if alive.
    pub fn get<T: Clone + 'static>(&self, id: SectorId) -> Result<Option<T>, ContainerError> {
        self.container.get::<T>(id)
    }

    /// Pin `id` against relocation until the returned handle is dropped.
    pub fn pin(&self, id: SectorId) -> Option<Pin> {
        self.container.pin_sector(id)
    }

    /// Destroy every alive member of `id` immediately.
    pub fn remove_entity(&self, id: SectorId) {
        self.container.remove_entity(id);
    }

    /// Queue `id` for asynchronous removal, drained by
    /// [`process_pending`](Self::process_pending).
    pub fn erase_async(&self, id: SectorId) {
        self.container.erase_async(id);
    }

    /// Drain queued async erases; additionally defragments if `do_defrag`.
    pub fn process_pending(&self, do_defrag: bool) {
        self.container.process_pending_erases(do_defrag);
    }

    /// Block until no pin is outstanding, then compact the dense arrays.
    pub fn defragment(&self) {
        self.container.defragment();
    }

    /// Destroy every alive member of every sector and reset to empty.
    pub fn clear(&self) {
        self.container.clear();
    }

    /// Current dense size.
    pub fn size(&self) -> usize {
        self.container.size()
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, Container> {
        self.container.read()
    }

    pub(crate) fn identity(&self) -> usize {
        self.container.identity() as usize
    }
}
