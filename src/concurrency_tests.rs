use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::Vec3;

use crate::test_mesh_helpers::{grid_mesh, install_square_tile, square_tile, tile_center};
use crate::{NavMesh, QueryFilter, DEFAULT_AREA};

#[test]
fn queries_race_tile_swaps_without_tearing() {
    let mesh = Arc::new(grid_mesh(4, 1));
    let filter = QueryFilter::default();

    let writer = {
        let mesh = Arc::clone(&mesh);
        thread::spawn(move || {
            for round in 0..200 {
                let x = (round % 4) as i32;
                install_square_tile(&mesh, x, 0, DEFAULT_AREA);
            }
        })
    };

    let reader = {
        let mesh = Arc::clone(&mesh);
        let filter = filter.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                // Any answer is fine as long as it is internally consistent.
                if let Some(loc) =
                    mesh.find_nearest_polygon(tile_center(1, 0), Vec3::splat(0.5), &filter)
                {
                    assert!(mesh.poly_center(loc.poly).is_some() || !mesh.is_valid_ref(loc.poly));
                }
                let _ = mesh.find_path(tile_center(0, 0), tile_center(3, 0), &filter);
            }
        })
    };

    writer.join().expect("writer");
    reader.join().expect("reader");

    assert_eq!(mesh.pending_rebuild_count(), 0);
    assert!(mesh.test_path(tile_center(0, 0), tile_center(3, 0), &filter));
}

#[test]
fn batch_scope_blocks_swaps_until_dropped() {
    let mesh = Arc::new(grid_mesh(2, 1));
    let filter = QueryFilter::default();

    let batch = mesh.begin_batch();
    let before = mesh
        .find_nearest_polygon(tile_center(0, 0), Vec3::splat(0.5), &filter)
        .expect("tile present");

    let writer = {
        let mesh = Arc::clone(&mesh);
        thread::spawn(move || {
            mesh.begin_tile_rebuild();
            let old = mesh.tile_snapshot(0);
            // Blocks on the gate until the batch below is dropped.
            mesh.notify_new_tile(0, old.as_ref(), Some(square_tile(2, 1, 0, 0, DEFAULT_AREA)));
        })
    };

    // The swap cannot land while the batch holds the gate.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(mesh.pending_rebuild_count(), 1);
    let during = mesh
        .find_nearest_polygon(tile_center(0, 0), Vec3::splat(0.5), &filter)
        .expect("tile present");
    assert_eq!(before.poly, during.poly);

    drop(batch);
    writer.join().expect("writer");
    assert_eq!(mesh.pending_rebuild_count(), 0);
    // Now the swap has landed and the old ref is stale.
    assert!(!mesh.is_valid_ref(before.poly));
}

#[test]
fn queries_reenter_the_gate_within_a_batch() {
    let mesh = grid_mesh(2, 1);
    let filter = QueryFilter::default();

    let _batch = mesh.begin_batch();
    // Each call re-acquires the gate on the same thread; none may deadlock.
    let loc = mesh
        .find_nearest_polygon(tile_center(0, 0), Vec3::splat(0.5), &filter)
        .expect("tile present");
    assert!(mesh.is_valid_ref(loc.poly));
    assert!(mesh.test_path(tile_center(0, 0), tile_center(1, 0), &filter));
    let _ = mesh.random_point(&filter);
}

#[test]
fn wait_for_pending_rebuilds_blocks_until_quiet() {
    let mesh = Arc::new(grid_mesh(1, 1));
    mesh.begin_tile_rebuild();

    let finisher = {
        let mesh = Arc::clone(&mesh);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let old = mesh.tile_snapshot(0);
            mesh.notify_new_tile(0, old.as_ref(), Some(square_tile(1, 1, 0, 0, DEFAULT_AREA)));
        })
    };

    mesh.wait_for_pending_rebuilds();
    assert_eq!(mesh.pending_rebuild_count(), 0);
    finisher.join().expect("finisher");
}

#[test]
fn mesh_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NavMesh>();
}
