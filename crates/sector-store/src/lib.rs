//! The sectors container: dense/sparse storage over fixed-stride payload
//! chunks, a single-threaded [`Container`] and a thread-safe
//! [`SyncContainer`] built on top of it, plus the [`Pin`] handle that lets
//! a thread-safe caller hold a stable payload pointer across time.
//!
//! Unsafe code is confined to [`container`] (raw payload pointer
//! arithmetic driving per-member construct/drop/move calls) and [`pin`]
//! (forwarding those same raw pointers out through the pin handle) —
//! everything else in this crate is safe.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod container;
pub mod error;
pub mod pin;
pub mod sync;

pub use container::{Container, DEFAULT_CHUNK_CAPACITY, DEFAULT_DEFRAG_THRESHOLD};
pub use error::ContainerError;
pub use pin::Pin;
pub use sync::SyncContainer;
