//! The process-local component-set registry: maps a component type to the
//! [`SyncContainer`] it was grouped into at registration time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sector_core::error::RegistryError;
use sector_core::layout::SectorLayoutMeta;
use sector_core::token::TypeToken;
use sector_store::SyncContainer;

use crate::handle::ComponentSetHandle;

/// Owns every registered [`SyncContainer`] and the type-to-container
/// mapping used to reject a type being grouped into two different sets.
///
/// Registration is expected at startup, before the hot path runs; both
/// internal maps are behind a plain `Mutex` rather than a read/write lock,
/// since lookups during registration are comparatively rare.
#[derive(Default)]
pub struct Registry {
    groups: Mutex<Vec<Arc<SyncContainer>>>,
    tokens: Mutex<HashMap<TypeToken, usize>>,
}

impl Registry {
    /// An empty registry with nothing grouped yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `tokens` (paired with a diagnostic type name each) into a new
    /// container built from `layout`. Fails if any token already belongs
    /// to a previously registered set.
    pub fn register(
        &self,
        layout: SectorLayoutMeta,
        tokens: &[(TypeToken, &'static str)],
        chunk_capacity: usize,
    ) -> Result<ComponentSetHandle, RegistryError> {
        let mut token_map = self.tokens.lock().expect("registry lock poisoned");
        for &(token, type_name) in tokens {
            if token_map.contains_key(&token) {
                return Err(RegistryError::DuplicateRegistration { type_name });
            }
        }

        let container = Arc::new(SyncContainer::new(layout, chunk_capacity));
        let mut groups = self.groups.lock().expect("registry lock poisoned");
        let idx = groups.len();
        groups.push(container.clone());
        for &(token, _) in tokens {
            token_map.insert(token, idx);
        }
        Ok(ComponentSetHandle::new(container))
    }

    /// The container a previously registered type belongs to, if any.
    pub fn container_for(&self, token: TypeToken) -> Option<Arc<SyncContainer>> {
        let token_map = self.tokens.lock().expect("registry lock poisoned");
        let idx = *token_map.get(&token)?;
        let groups = self.groups.lock().expect("registry lock poisoned");
        groups.get(idx).cloned()
    }

    /// Number of distinct component sets registered.
    pub fn group_count(&self) -> usize {
        self.groups.lock().expect("registry lock poisoned").len()
    }
}

/// Build a [`SectorLayoutMeta`] plus its `(TypeToken, type_name)` list for
/// one or more move-only component types, then [`Registry::register`] it.
///
/// ```ignore
/// let registry = Registry::new();
/// let set = register_component_set!(registry, 8192; Position, Velocity)?;
/// ```
#[macro_export]
macro_rules! register_component_set {
    ($registry:expr, $chunk_capacity:expr; $($ty:ty),+ $(,)?) => {{
        (|| -> Result<$crate::handle::ComponentSetHandle, $crate::reexported::sector_core::error::RegistryError> {
            let mut builder = $crate::reexported::sector_core::layout::LayoutBuilder::new();
            $( builder.register::<$ty>()?; )+
            let layout = builder.build()?;
            let tokens = [$((
                $crate::reexported::sector_core::token::token_of::<$ty>(),
                std::any::type_name::<$ty>(),
            )),+];
            $registry.register(layout, &tokens, $chunk_capacity)
        })()
    }};
}

/// Like [`register_component_set!`], but every member must be `Copy` —
/// the resulting set additionally supports container-to-container copy
/// (see [`sector_store::Container::transfer_into`]).
#[macro_export]
macro_rules! register_copyable_component_set {
    ($registry:expr, $chunk_capacity:expr; $($ty:ty),+ $(,)?) => {{
        (|| -> Result<$crate::handle::ComponentSetHandle, $crate::reexported::sector_core::error::RegistryError> {
            let mut builder = $crate::reexported::sector_core::layout::LayoutBuilder::new();
            $( builder.register_copyable::<$ty>()?; )+
            let layout = builder.build()?;
            let tokens = [$((
                $crate::reexported::sector_core::token::token_of::<$ty>(),
                std::any::type_name::<$ty>(),
            )),+];
            $registry.register(layout, &tokens, $chunk_capacity)
        })()
    }};
}
