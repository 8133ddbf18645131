//! Embeddable ECS sector storage: register a fixed set of component types,
//! then `add`/`remove`/`has`/`get`/`pin`/`view` against the handle that
//! comes back.
//!
//! ```
//! use sectors::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let registry = Registry::new();
//! let positions = register_copyable_component_set!(registry, 1024; Position).unwrap();
//! positions.add(SectorId(0), Position { x: 1.0, y: 2.0 }).unwrap();
//! assert_eq!(positions.get::<Position>(SectorId(0)).unwrap(), Some(Position { x: 1.0, y: 2.0 }));
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod handle;
pub mod registry;
pub mod view;

/// Re-exported so `register_component_set!`/`register_copyable_component_set!`
/// can resolve their expansion without requiring every caller to add
/// `sector-core` as a direct dependency.
#[doc(hidden)]
pub mod reexported {
    pub use sector_core;
}

pub use handle::ComponentSetHandle;
pub use registry::Registry;
pub use sector_core::error::RegistryError;
pub use sector_core::id::SectorId;
pub use sector_store::{ContainerError, Pin};
pub use sector_view::{JoinView2, JoinView3, View};
pub use view::{with_join_view2, with_join_view3, with_ranged_view, with_view};

/// Common imports for a binding crate building on `sectors`.
pub mod prelude {
    pub use crate::view::{with_join_view2, with_join_view3, with_ranged_view, with_view};
    pub use crate::{
        register_component_set, register_copyable_component_set, ComponentSetHandle, ContainerError, Pin, Registry,
        RegistryError, SectorId,
    };
}
