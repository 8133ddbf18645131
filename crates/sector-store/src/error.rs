//! Errors from the sectors container.
//!
//! Absence (a missing id, a component bit that is off) is never an error —
//! see [`Container::get`](crate::Container::get) and friends, which return
//! `Option`. This type covers only programming errors: referencing a type
//! the container's layout doesn't know about, moving/copying sectors
//! between two containers with incompatible layouts, or a debug-only
//! sparse/dense consistency check failing.

use std::error::Error;
use std::fmt;

use sector_core::error::LayoutError;

/// Errors surfaced by [`crate::Container`] operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerError {
    /// The operation referenced a type not present in this container's
    /// layout.
    UnknownType,
    /// A cross-container copy or move was attempted between containers
    /// whose layouts are not identical.
    LayoutMismatch,
    /// A sparse/dense (or pin-aggregate) consistency check failed.
    ///
    /// This variant names the failure class that [`Container`](crate::Container)'s
    /// `debug_assert!`/`debug_assert_eq!` checks guard against — those
    /// checks panic directly (and are compiled out in release builds)
    /// rather than returning this value, but every such assertion message
    /// is this variant's [`Display`](fmt::Display) text so a panic and this
    /// type always describe the failure the same way. The payload names
    /// which invariant failed, for the panic message.
    InvariantViolation(&'static str),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType => write!(f, "type is not registered in this container's layout"),
            Self::LayoutMismatch => write!(f, "source and destination containers have different layouts"),
            Self::InvariantViolation(what) => write!(f, "internal invariant violated: {what}"),
        }
    }
}

impl Error for ContainerError {}

impl From<LayoutError> for ContainerError {
    fn from(e: LayoutError) -> Self {
        match e {
            LayoutError::UnknownType => Self::UnknownType,
            _ => Self::UnknownType,
        }
    }
}
