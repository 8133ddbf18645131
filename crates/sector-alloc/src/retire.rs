//! Deferred reclamation for buffers displaced by a structural mutation.
//!
//! A [`RetireBin`] is an append-only bag of owned, type-erased values
//! guarded by a mutex. Every reader of the sectors container goes through
//! `SyncContainer::read()`'s `RwLockReadGuard`, and the only callers that
//! ever displace a buffer (`defragment`, `clear`, `shrink_to_fit`) already
//! hold that lock's exclusive side while they do it — so no reader can be
//! mid-access when a buffer is retired. [`RetireBin::drain`] is therefore
//! always safe to call immediately after the matching `retire` calls, with
//! no real deferral window between them; the bin exists so the move logic
//! in [`crate::chunk::ChunkedStore`] can hand off a displaced buffer
//! without having to drop it inline mid-move, not to bridge a gap between
//! writer and reader.
//!
//! The C-family original threads a raw `(pointer, free-fn)` pair through a
//! custom allocator. Rust already owns a safe vocabulary for "destroy this
//! later, type erased": `Box<dyn Send>`. Retiring a `Vec<T>` is simply
//! boxing it and pushing the box; draining drops the boxes.

use std::sync::Mutex;

/// Holds retired buffers until a quiescent drain destroys them.
///
/// One bin per container (see the sectors container's resource model).
/// Cloning a container does not clone its bin; each container owns one.
#[derive(Default)]
pub struct RetireBin {
    pending: Mutex<Vec<Box<dyn Send>>>,
}

impl RetireBin {
    /// Create an empty bin.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Retire `value`, deferring its drop until the next [`drain`](Self::drain).
    ///
    /// Called by [`crate::chunk::ChunkedStore`] when a move displaces a
    /// buffer, so the buffer can be handed off rather than dropped inline
    /// mid-move. Safe to call even though the container's exclusive lock is
    /// already held by the caller at this point — nothing reads `value`
    /// again before `drain` runs.
    pub fn retire<T: Send + 'static>(&self, value: T) {
        let mut pending = self.pending.lock().expect("retire bin mutex poisoned");
        pending.push(Box::new(value));
    }

    /// Destroy every retired buffer.
    ///
    /// Called at the end of the structural mutation that did the
    /// retiring, while that mutation still holds the container's
    /// exclusive lock — there is no window in which a reader could be
    /// observing a retired buffer, so this runs back-to-back with the
    /// `retire` calls that fed it.
    pub fn drain(&self) {
        let mut pending = self.pending.lock().expect("retire bin mutex poisoned");
        pending.clear();
    }

    /// Number of buffers currently awaiting drain. Exposed for tests and
    /// diagnostics only.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("retire bin mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropSignal(Arc<AtomicUsize>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn retired_value_is_not_dropped_until_drain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bin = RetireBin::new();
        bin.retire(DropSignal(counter.clone()));
        assert_eq!(bin.pending_count(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        bin.drain();
        assert_eq!(bin.pending_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_on_empty_bin_is_a_no_op() {
        let bin = RetireBin::new();
        bin.drain();
        assert_eq!(bin.pending_count(), 0);
    }

    #[test]
    fn multiple_retirements_all_drop_on_one_drain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bin = RetireBin::new();
        for _ in 0..5 {
            bin.retire(DropSignal(counter.clone()));
        }
        assert_eq!(bin.pending_count(), 5);
        bin.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
