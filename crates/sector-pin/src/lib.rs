//! Pin counters and the hierarchical presence bitmap that back relocation
//! safety for the sectors workspace.
//!
//! A pin is "I am reading this sector, do not move it." [`PinCounters`]
//! tracks outstanding pins per id plus the aggregates a writer consults
//! before compacting (total pinned count, highest pinned id), backed by a
//! [`bitmap::HierarchicalBitmap`] for O(log N) highest-id queries over a
//! sparse, fast-changing set. [`pin::CounterGuard`] is the RAII handle
//! that releases a pin on drop.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bitmap;
pub mod counters;
pub mod pin;

pub use bitmap::HierarchicalBitmap;
pub use counters::PinCounters;
pub use pin::CounterGuard;
