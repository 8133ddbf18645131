//! Scoped joined-view access over one or more [`ComponentSetHandle`]s.
//!
//! Each `with_*` function takes the read lock(s) needed, builds the view,
//! and hands it to a closure — the lock(s) release as soon as the closure
//! returns, instead of exposing a guard type the caller could accidentally
//! hold past its usefulness. Crossing two containers locks them in address
//! order to avoid the classic two-writer deadlock.

use sector_store::ContainerError;
use sector_view::{JoinView2, JoinView3, View};

use crate::handle::ComponentSetHandle;

/// Iterate every alive `T` in `handle`'s container.
pub fn with_view<T: 'static, R>(handle: &ComponentSetHandle, f: impl FnOnce(View<'_, T>) -> R) -> Result<R, ContainerError> {
    let guard = handle.read();
    let view = View::<T>::new(&guard)?;
    Ok(f(view))
}

/// Iterate alive `T`s in `handle` whose id falls in `[lo, hi)`.
pub fn with_ranged_view<T: 'static, R>(
    handle: &ComponentSetHandle,
    lo: sector_core::id::SectorId,
    hi: sector_core::id::SectorId,
    f: impl FnOnce(View<'_, T>) -> R,
) -> Result<R, ContainerError> {
    let guard = handle.read();
    let view = View::<T>::ranged(&guard, lo, hi)?;
    Ok(f(view))
}

/// Iterate entities alive for `T` in `primary`, each paired with `C1` from
/// `secondary` (pass `primary` again for the grouped case). Locks are
/// acquired in container-address order when `primary` and `secondary`
/// differ.
pub fn with_join_view2<T: 'static, C1: 'static, R>(
    primary: &ComponentSetHandle,
    secondary: &ComponentSetHandle,
    c1_required: bool,
    f: impl FnOnce(JoinView2<'_, T, C1>) -> R,
) -> Result<R, ContainerError> {
    if primary.identity() == secondary.identity() {
        let guard = primary.read();
        let view = JoinView2::<T, C1>::new(&guard, &guard, c1_required)?;
        return Ok(f(view));
    }
    if primary.identity() < secondary.identity() {
        let g1 = primary.read();
        let g2 = secondary.read();
        let view = JoinView2::<T, C1>::new(&g1, &g2, c1_required)?;
        Ok(f(view))
    } else {
        let g2 = secondary.read();
        let g1 = primary.read();
        let view = JoinView2::<T, C1>::new(&g1, &g2, c1_required)?;
        Ok(f(view))
    }
}

/// Three-type counterpart of [`with_join_view2`].
#[allow(clippy::too_many_arguments)]
pub fn with_join_view3<T: 'static, C1: 'static, C2: 'static, R>(
    primary: &ComponentSetHandle,
    secondary1: &ComponentSetHandle,
    c1_required: bool,
    secondary2: &ComponentSetHandle,
    c2_required: bool,
    f: impl FnOnce(JoinView3<'_, T, C1, C2>) -> R,
) -> Result<R, ContainerError> {
    let mut identities = vec![
        (primary.identity(), 0u8),
        (secondary1.identity(), 1u8),
        (secondary2.identity(), 2u8),
    ];
    identities.sort_by_key(|&(addr, _)| addr);
    identities.dedup_by_key(|&mut (addr, _)| addr);

    // Acquire each distinct container's read lock exactly once, in address
    // order, then build the view from the already-held guards.
    let guards: Vec<_> = identities
        .iter()
        .map(|&(_, which)| match which {
            0 => primary.read(),
            1 => secondary1.read(),
            _ => secondary2.read(),
        })
        .collect();

    let find = |addr: usize| -> &sector_store::Container {
        let pos = identities
            .iter()
            .position(|&(a, _)| a == addr)
            .expect("every identity was locked above");
        &guards[pos]
    };

    let primary_guard = find(primary.identity());
    let secondary1_guard = find(secondary1.identity());
    let secondary2_guard = find(secondary2.identity());

    let view = JoinView3::<T, C1, C2>::new(primary_guard, secondary1_guard, c1_required, secondary2_guard, c2_required)?;
    Ok(f(view))
}
