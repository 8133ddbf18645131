//! Joined iteration over one or more [`Container`]s.
//!
//! [`View`] iterates entities holding a single component type. [`JoinView2`]
//! and [`JoinView3`] additionally fetch one or two more component types per
//! entity, either from the same container (the grouped fast path — no
//! secondary lookup, just another offset into the same payload) or from a
//! distinct container (the general path — a `find_slot` lookup per entity).
//! Each extra type is independently marked required or optional at
//! construction: optional extras surface as `None` when absent; required
//! extras skip the entity entirely when absent.
//!
//! Iteration always proceeds in ascending entity-id order, since it walks
//! the dense array(s) in order.

#![allow(unsafe_code)]

use std::marker::PhantomData;

use sector_alloc::{RangeSpan, RangesCursor};
use sector_core::id::SectorId;
use sector_store::{Container, ContainerError};

fn spans_for_range(ids: &[SectorId], lo: SectorId, hi: SectorId) -> RangeSpan {
    let start = ids.partition_point(|&id| id < lo);
    let end = ids.partition_point(|&id| id < hi);
    RangeSpan { start, end }
}

/// Iterates entities with a live `T` member, in ascending id order.
pub struct View<'a, T> {
    container: &'a Container,
    cursor: RangesCursor,
    offset: u32,
    mask: u32,
    _marker: PhantomData<&'a T>,
}

impl<'a, T: 'static> View<'a, T> {
    /// Iterate every alive `T` in `container`.
    pub fn new(container: &'a Container) -> Result<Self, ContainerError> {
        let span = RangeSpan { start: 0, end: container.size() };
        Self::from_spans(container, vec![span])
    }

    /// Iterate alive `T`s whose entity id falls in `[lo, hi)`.
    pub fn ranged(container: &'a Container, lo: SectorId, hi: SectorId) -> Result<Self, ContainerError> {
        let span = spans_for_range(container.ids(), lo, hi);
        Self::from_spans(container, vec![span])
    }

    /// Iterate alive `T`s whose entity id falls in any of `ranges`, which
    /// must be sorted and non-overlapping.
    pub fn multi_ranged(container: &'a Container, ranges: &[(SectorId, SectorId)]) -> Result<Self, ContainerError> {
        let ids = container.ids();
        let spans = ranges.iter().map(|&(lo, hi)| spans_for_range(ids, lo, hi)).collect();
        Self::from_spans(container, spans)
    }

    fn from_spans(container: &'a Container, spans: Vec<RangeSpan>) -> Result<Self, ContainerError> {
        let entry = *container.layout().layout_of_type::<T>()?;
        Ok(Self {
            container,
            cursor: RangesCursor::new(spans),
            offset: entry.offset,
            mask: entry.live_mask,
            _marker: PhantomData,
        })
    }
}

impl<'a, T: 'static> Iterator for View<'a, T> {
    type Item = (SectorId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.cursor.advance() {
            if self.container.live_masks()[idx] & self.mask != 0 {
                let id = self.container.ids()[idx];
                // SAFETY: idx is a valid dense slot in `container` for the
                // lifetime 'a of the borrow this view holds; the live check
                // above confirms T's bytes at this offset are initialized.
                let ptr = unsafe { self.container.chunk_ptr(idx).add(self.offset as usize) as *const T };
                return Some((id, unsafe { &*ptr }));
            }
        }
        None
    }
}

struct MemberAccess {
    offset: u32,
    mask: u32,
}

fn member_access<C: 'static>(container: &Container) -> Result<MemberAccess, ContainerError> {
    let entry = *container.layout().layout_of_type::<C>()?;
    Ok(MemberAccess { offset: entry.offset, mask: entry.live_mask })
}

/// Fetch an optional-or-required extra member for entity `id` at dense
/// index `idx` in `primary`, from `secondary` (which may be `primary`
/// itself — the grouped fast path, addressed by offset alone).
fn fetch_extra<'a, C: 'static>(
    primary: &'a Container,
    idx: usize,
    id: SectorId,
    secondary: &'a Container,
    same_container: bool,
    access: &MemberAccess,
) -> Option<&'a C> {
    if same_container {
        if primary.live_masks()[idx] & access.mask != 0 {
            // SAFETY: same liveness-checked-idx argument as `View::next`.
            Some(unsafe { &*(primary.chunk_ptr(idx).add(access.offset as usize) as *const C) })
        } else {
            None
        }
    } else {
        let sidx = secondary.find_slot(id)?;
        if secondary.live_masks()[sidx] & access.mask != 0 {
            Some(unsafe { &*(secondary.chunk_ptr(sidx).add(access.offset as usize) as *const C) })
        } else {
            None
        }
    }
}

/// Iterates entities with a live `T`, plus an optional-or-required `C1`.
pub struct JoinView2<'a, T, C1> {
    primary: &'a Container,
    secondary: &'a Container,
    same_container: bool,
    cursor: RangesCursor,
    main: MemberAccess,
    c1: MemberAccess,
    c1_required: bool,
    _marker: PhantomData<(&'a T, &'a C1)>,
}

impl<'a, T: 'static, C1: 'static> JoinView2<'a, T, C1> {
    /// Iterate every entity alive in `primary` for `T`. `c1` is fetched
    /// from `secondary` (pass `primary` again for the grouped case); if
    /// `c1_required`, entities missing it are skipped rather than yielding
    /// `None`.
    pub fn new(
        primary: &'a Container,
        secondary: &'a Container,
        c1_required: bool,
    ) -> Result<Self, ContainerError> {
        let span = RangeSpan { start: 0, end: primary.size() };
        Self::from_spans(primary, secondary, c1_required, vec![span])
    }

    /// Ranged variant of [`new`](Self::new), restricted to ids in `[lo, hi)`.
    pub fn ranged(
        primary: &'a Container,
        secondary: &'a Container,
        c1_required: bool,
        lo: SectorId,
        hi: SectorId,
    ) -> Result<Self, ContainerError> {
        let span = spans_for_range(primary.ids(), lo, hi);
        Self::from_spans(primary, secondary, c1_required, vec![span])
    }

    fn from_spans(
        primary: &'a Container,
        secondary: &'a Container,
        c1_required: bool,
        spans: Vec<RangeSpan>,
    ) -> Result<Self, ContainerError> {
        let main = member_access::<T>(primary)?;
        let c1 = member_access::<C1>(secondary)?;
        Ok(Self {
            primary,
            secondary,
            same_container: std::ptr::eq(primary, secondary),
            cursor: RangesCursor::new(spans),
            main,
            c1,
            c1_required,
            _marker: PhantomData,
        })
    }
}

impl<'a, T: 'static, C1: 'static> Iterator for JoinView2<'a, T, C1> {
    type Item = (SectorId, &'a T, Option<&'a C1>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.cursor.advance() {
            if self.primary.live_masks()[idx] & self.main.mask == 0 {
                continue;
            }
            let id = self.primary.ids()[idx];
            let c1 = fetch_extra::<C1>(self.primary, idx, id, self.secondary, self.same_container, &self.c1);
            if c1.is_none() && self.c1_required {
                continue;
            }
            let main_ptr = unsafe { &*(self.primary.chunk_ptr(idx).add(self.main.offset as usize) as *const T) };
            return Some((id, main_ptr, c1));
        }
        None
    }
}

/// Iterates entities with a live `T`, plus two optional-or-required extras.
pub struct JoinView3<'a, T, C1, C2> {
    primary: &'a Container,
    secondary1: &'a Container,
    secondary2: &'a Container,
    same1: bool,
    same2: bool,
    cursor: RangesCursor,
    main: MemberAccess,
    c1: MemberAccess,
    c2: MemberAccess,
    c1_required: bool,
    c2_required: bool,
    _marker: PhantomData<(&'a T, &'a C1, &'a C2)>,
}

impl<'a, T: 'static, C1: 'static, C2: 'static> JoinView3<'a, T, C1, C2> {
    /// See [`JoinView2::new`]; this variant fetches two extras, each with
    /// its own container and required flag.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: &'a Container,
        secondary1: &'a Container,
        c1_required: bool,
        secondary2: &'a Container,
        c2_required: bool,
    ) -> Result<Self, ContainerError> {
        let main = member_access::<T>(primary)?;
        let c1 = member_access::<C1>(secondary1)?;
        let c2 = member_access::<C2>(secondary2)?;
        let span = RangeSpan { start: 0, end: primary.size() };
        Ok(Self {
            primary,
            secondary1,
            secondary2,
            same1: std::ptr::eq(primary, secondary1),
            same2: std::ptr::eq(primary, secondary2),
            cursor: RangesCursor::new(vec![span]),
            main,
            c1,
            c2,
            c1_required,
            c2_required,
            _marker: PhantomData,
        })
    }
}

impl<'a, T: 'static, C1: 'static, C2: 'static> Iterator for JoinView3<'a, T, C1, C2> {
    type Item = (SectorId, &'a T, Option<&'a C1>, Option<&'a C2>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.cursor.advance() {
            if self.primary.live_masks()[idx] & self.main.mask == 0 {
                continue;
            }
            let id = self.primary.ids()[idx];
            let c1 = fetch_extra::<C1>(self.primary, idx, id, self.secondary1, self.same1, &self.c1);
            if c1.is_none() && self.c1_required {
                continue;
            }
            let c2 = fetch_extra::<C2>(self.primary, idx, id, self.secondary2, self.same2, &self.c2);
            if c2.is_none() && self.c2_required {
                continue;
            }
            let main_ptr = unsafe { &*(self.primary.chunk_ptr(idx).add(self.main.offset as usize) as *const T) };
            return Some((id, main_ptr, c1, c2));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sector_core::layout::LayoutBuilder;
    use sector_test_utils::{Pos, Tag};

    fn pos_only_layout() -> sector_core::layout::SectorLayoutMeta {
        let mut b = LayoutBuilder::new();
        b.register_copyable::<Pos>().unwrap();
        b.build().unwrap()
    }

    fn pos_tag_layout() -> sector_core::layout::SectorLayoutMeta {
        let mut b = LayoutBuilder::new();
        b.register_copyable::<Pos>().unwrap();
        b.register_copyable::<Tag>().unwrap();
        b.build().unwrap()
    }

    #[test]
    fn ordered_insertion_and_iteration_scenario() {
        let mut c = Container::new(pos_only_layout(), 4);
        c.insert(SectorId(5), Pos { x: 10.0, y: 0.0 }).unwrap();
        c.insert(SectorId(2), Pos { x: 20.0, y: 0.0 }).unwrap();
        c.insert(SectorId(9), Pos { x: 30.0, y: 0.0 }).unwrap();
        c.insert(SectorId(2), Pos { x: 21.0, y: 0.0 }).unwrap();

        let seen: Vec<_> = View::<Pos>::new(&c).unwrap().map(|(id, p)| (id.0, p.x)).collect();
        assert_eq!(seen, vec![(2, 21.0), (5, 10.0), (9, 30.0)]);
    }

    #[test]
    fn joined_view_of_grouped_types_requires_both_alive() {
        let mut c = Container::new(pos_tag_layout(), 4);
        c.insert(SectorId(1), Pos { x: 1.0, y: 1.0 }).unwrap();
        c.insert(SectorId(1), Tag).unwrap();
        c.insert(SectorId(2), Pos { x: 2.0, y: 2.0 }).unwrap();
        c.insert(SectorId(3), Tag).unwrap();

        let both: Vec<_> = JoinView2::<Pos, Tag>::new(&c, &c, true)
            .unwrap()
            .map(|(id, _, _)| id.0)
            .collect();
        assert_eq!(both, vec![1]);

        let all_pos: Vec<_> = JoinView2::<Pos, Tag>::new(&c, &c, false)
            .unwrap()
            .map(|(id, _, tag)| (id.0, tag.is_some()))
            .collect();
        assert_eq!(all_pos, vec![(1, true), (2, false)]);
    }

    #[test]
    fn empty_container_view_yields_nothing() {
        let c = Container::new(pos_only_layout(), 4);
        assert_eq!(View::<Pos>::new(&c).unwrap().count(), 0);
    }

    #[test]
    fn split_ranges_match_a_single_full_view() {
        let mut c = Container::new(pos_only_layout(), 4);
        for i in 0..10u32 {
            c.insert(SectorId(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }

        let lo_half: Vec<_> = View::<Pos>::ranged(&c, SectorId(0), SectorId(5))
            .unwrap()
            .map(|(id, _)| id.0)
            .collect();
        let hi_half: Vec<_> = View::<Pos>::ranged(&c, SectorId(5), SectorId(10))
            .unwrap()
            .map(|(id, _)| id.0)
            .collect();
        let whole: Vec<_> = View::<Pos>::ranged(&c, SectorId(0), SectorId(10))
            .unwrap()
            .map(|(id, _)| id.0)
            .collect();

        let mut split = lo_half;
        split.extend(hi_half);
        assert_eq!(split, whole);
    }

    #[test]
    fn multi_ranged_matches_sequential_single_ranges() {
        let mut c = Container::new(pos_only_layout(), 4);
        for i in 0..10u32 {
            c.insert(SectorId(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }

        let combined: Vec<_> = View::<Pos>::multi_ranged(&c, &[(SectorId(0), SectorId(3)), (SectorId(7), SectorId(10))])
            .unwrap()
            .map(|(id, _)| id.0)
            .collect();
        assert_eq!(combined, vec![0, 1, 2, 7, 8, 9]);
    }

    #[test]
    fn cross_container_join_looks_up_secondary_by_id() {
        let mut positions = Container::new(pos_only_layout(), 4);
        let mut tags = Container::new({
            let mut b = LayoutBuilder::new();
            b.register_copyable::<Tag>().unwrap();
            b.build().unwrap()
        }, 4);
        positions.insert(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
        positions.insert(SectorId(1), Pos { x: 1.0, y: 1.0 }).unwrap();
        tags.insert(SectorId(1), Tag).unwrap();

        let seen: Vec<_> = JoinView2::<Pos, Tag>::new(&positions, &tags, false)
            .unwrap()
            .map(|(id, _, tag)| (id.0, tag.is_some()))
            .collect();
        assert_eq!(seen, vec![(0, false), (1, true)]);
    }
}
