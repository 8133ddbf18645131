//! Shared test fixtures for the `sectors` workspace.
//!
//! Provides canned component types — trivial (`Copy`) and non-trivial
//! (owns a heap allocation, counts moves/drops) — so that allocator,
//! pin, store, and view tests exercise both code paths without each
//! crate re-inventing the same mock types.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{DropCounter, MoveCounting, Pos, Tag};
