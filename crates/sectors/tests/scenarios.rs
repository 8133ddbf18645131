//! End-to-end coverage of the public façade: registration, the handle's
//! operations, and the scoped view helpers, exercised together the way a
//! binding crate would actually call them.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use sector_test_utils::fixtures::{Pos, Tag};
use sectors::prelude::*;

fn pos_handle(chunk_capacity: usize) -> ComponentSetHandle {
    let registry = Registry::new();
    register_copyable_component_set!(registry, chunk_capacity; Pos).unwrap()
}

#[test]
fn add_get_remove_round_trip() {
    let positions = pos_handle(8);
    positions.add(SectorId(0), Pos { x: 1.0, y: 2.0 }).unwrap();
    assert_eq!(positions.get::<Pos>(SectorId(0)).unwrap(), Some(Pos { x: 1.0, y: 2.0 }));
    assert!(positions.has::<Pos>(SectorId(0)).unwrap());

    positions.remove::<Pos>(SectorId(0)).unwrap();
    assert!(!positions.has::<Pos>(SectorId(0)).unwrap());
    assert_eq!(positions.get::<Pos>(SectorId(0)).unwrap(), None);
}

#[test]
fn duplicate_registration_is_rejected() {
    let registry = Registry::new();
    let _first = register_copyable_component_set!(registry, 8; Pos).unwrap();
    let err = register_copyable_component_set!(registry, 8; Pos).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration { .. }));
    assert_eq!(registry.group_count(), 1);
}

#[test]
fn pin_blocks_defragment_until_dropped() {
    let positions = pos_handle(8);
    for i in 0..4u32 {
        positions.add(SectorId(i), Pos { x: i as f32, y: 0.0 }).unwrap();
    }
    // Leave a hole in the middle so defragment has something to compact.
    positions.remove_entity(SectorId(1));

    let pin = positions.pin(SectorId(2)).expect("sector 2 is alive");

    let (tx, rx) = mpsc::channel();
    let worker_handle = positions.clone();
    let worker = thread::spawn(move || {
        worker_handle.defragment();
        tx.send(()).expect("main thread still receiving");
    });

    assert!(
        rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "defragment must not complete while sector 2 is pinned"
    );

    drop(pin);
    rx.recv_timeout(Duration::from_secs(5)).expect("defragment did not unblock after the pin dropped");
    worker.join().unwrap();

    assert_eq!(positions.size(), 3);
}

#[test]
fn erase_async_requeues_while_pinned_then_applies_after_unpin() {
    let positions = pos_handle(4);
    positions.add(SectorId(7), Pos { x: 7.0, y: 0.0 }).unwrap();
    let pin = positions.pin(SectorId(7)).expect("sector 7 is alive");

    positions.erase_async(SectorId(7));
    positions.process_pending(false);
    assert!(
        positions.has::<Pos>(SectorId(7)).unwrap(),
        "erase must stay queued while the sector is pinned"
    );

    drop(pin);
    positions.process_pending(false);
    assert!(!positions.has::<Pos>(SectorId(7)).unwrap(), "erase applies once the pin clears");
}

#[test]
fn with_view_iterates_in_ascending_id_order() {
    let positions = pos_handle(8);
    positions.add(SectorId(5), Pos { x: 5.0, y: 0.0 }).unwrap();
    positions.add(SectorId(1), Pos { x: 1.0, y: 0.0 }).unwrap();
    positions.add(SectorId(3), Pos { x: 3.0, y: 0.0 }).unwrap();

    let ids: Vec<u32> = with_view::<Pos, _>(&positions, |view| view.map(|(id, _)| id.0).collect())
        .unwrap();
    assert_eq!(ids, vec![1, 3, 5]);
}

#[test]
fn with_join_view2_across_two_containers_matches_by_id() {
    let registry = Registry::new();
    let positions = register_copyable_component_set!(registry, 8; Pos).unwrap();
    let tags = register_copyable_component_set!(registry, 8; Tag).unwrap();

    positions.add(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
    positions.add(SectorId(1), Pos { x: 1.0, y: 1.0 }).unwrap();
    tags.add(SectorId(1), Tag).unwrap();

    let rows: Vec<(u32, bool)> = with_join_view2::<Pos, Tag, _>(&positions, &tags, false, |view| {
        view.map(|(id, _, tag)| (id.0, tag.is_some())).collect()
    })
    .unwrap();

    assert_eq!(rows, vec![(0, false), (1, true)]);
}

#[test]
fn with_join_view2_required_secondary_skips_entities_without_it() {
    let registry = Registry::new();
    let positions = register_copyable_component_set!(registry, 8; Pos).unwrap();
    let tags = register_copyable_component_set!(registry, 8; Tag).unwrap();

    positions.add(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
    positions.add(SectorId(1), Pos { x: 1.0, y: 1.0 }).unwrap();
    tags.add(SectorId(1), Tag).unwrap();

    let rows: Vec<u32> = with_join_view2::<Pos, Tag, _>(&positions, &tags, true, |view| {
        view.map(|(id, _, _)| id.0).collect()
    })
    .unwrap();

    assert_eq!(rows, vec![1]);
}

#[test]
fn clear_removes_every_entity() {
    let positions = pos_handle(4);
    positions.add(SectorId(0), Pos { x: 0.0, y: 0.0 }).unwrap();
    positions.add(SectorId(1), Pos { x: 1.0, y: 0.0 }).unwrap();
    positions.clear();
    assert_eq!(positions.size(), 0);
    assert!(!positions.has::<Pos>(SectorId(0)).unwrap());
}
