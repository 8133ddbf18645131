//! Shared error types for layout registration and type-token resolution.
//!
//! Absence (a missing id, a component bit that is off) is never an error —
//! it is encoded as `Option` at the call site. Only programming errors and
//! genuine resource exhaustion get an enum variant here.

use std::error::Error;
use std::fmt;

/// Errors from [`crate::layout::LayoutBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The same component type was registered twice in one layout.
    DuplicateMember,
    /// A layout was built with zero registered members.
    EmptyLayout,
    /// More than [`crate::layout::MAX_MEMBERS`] members were registered —
    /// there is only one liveness bit per member in the 32-bit word.
    TooManyMembers {
        /// The maximum allowed member count.
        max: usize,
    },
    /// Computing the padded stride overflowed `u32`.
    StrideOverflow,
    /// A lookup referenced a type not present in the layout. Indicates a
    /// programming error at the call site (wrong container, or a type
    /// that was never registered).
    UnknownType,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateMember => write!(f, "component type registered twice in one layout"),
            Self::EmptyLayout => write!(f, "layout has no registered members"),
            Self::TooManyMembers { max } => {
                write!(f, "layout exceeds the maximum of {max} members")
            }
            Self::StrideOverflow => write!(f, "sector stride overflowed u32"),
            Self::UnknownType => write!(f, "type is not registered in this layout"),
        }
    }
}

impl Error for LayoutError {}

/// Errors from registering a component type into the facade's registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A component type was registered into a second, different set after
    /// already belonging to one.
    DuplicateRegistration {
        /// Name of the offending type, for diagnostics.
        type_name: &'static str,
    },
    /// Underlying layout construction failed.
    Layout(LayoutError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRegistration { type_name } => {
                write!(f, "component type `{type_name}` already belongs to another set")
            }
            Self::Layout(e) => write!(f, "{e}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LayoutError> for RegistryError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}
