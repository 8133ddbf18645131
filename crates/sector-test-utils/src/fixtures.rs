//! Reusable component-type fixtures for storage-engine tests.
//!
//! - [`Pos`] and [`Tag`] — trivial (`Copy`, no drop glue) component types.
//! - [`DropCounter`] — non-trivial component wrapping a value plus a
//!   shared drop counter, so tests can assert "destructed exactly N times"
//!   without inspecting allocator internals.
//! - [`MoveCounting`] — a non-trivial component carrying an id, useful for
//!   asserting relocation correctness (content follows identity) across
//!   defragment and cross-chunk moves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A trivial 2D position component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pos {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

/// A trivial zero-size marker component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag;

/// A non-trivial component that increments a shared counter when dropped.
///
/// Clone the `Arc<AtomicUsize>` before handing the container ownership of
/// the value, then read `counter.load(Ordering::SeqCst)` after the
/// operation under test to assert exactly how many destructions occurred.
#[derive(Debug)]
pub struct DropCounter {
    /// Payload value, preserved across moves for identity assertions.
    pub value: u32,
    counter: Arc<AtomicUsize>,
}

impl DropCounter {
    /// Create a new value backed by `counter`, which is incremented by one
    /// every time an instance (this one, or one moved from it) is dropped.
    pub fn new(value: u32, counter: Arc<AtomicUsize>) -> Self {
        Self { value, counter }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A non-trivial component carrying an identifying payload, for asserting
/// that relocation (defragment, cross-container move) preserves content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCounting {
    /// Payload preserved across relocation.
    pub payload: String,
}

impl MoveCounting {
    /// Create a new value with the given payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}
