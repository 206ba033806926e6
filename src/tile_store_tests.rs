use glam::Vec3;

use crate::test_mesh_helpers::{
    grid_mesh, grid_params, install_square_tile, square_tile, tile_center, TILE_BYTES,
};
use crate::{NavMesh, QueryFilter, DEFAULT_AREA};

#[test]
fn reserving_same_dimensions_keeps_tiles() {
    let mesh = grid_mesh(2, 2);
    assert_eq!(mesh.total_data_size(), 4 * TILE_BYTES);

    mesh.reserve_tile_grid(2, 2);
    assert_eq!(mesh.total_data_size(), 4 * TILE_BYTES);
    assert_eq!(mesh.polys_in_tile(0).len(), 1);
}

#[test]
fn reserving_new_dimensions_drops_tiles() {
    let mesh = grid_mesh(2, 2);
    mesh.reserve_tile_grid(3, 2);

    assert_eq!(mesh.tile_count(), 6);
    assert_eq!(mesh.total_data_size(), 0);
    for i in 0..6 {
        assert!(mesh.polys_in_tile(i).is_empty());
    }
}

#[test]
fn swap_accounting_tracks_resident_bytes() {
    let mesh = grid_mesh(2, 1);
    assert_eq!(mesh.total_data_size(), 2 * TILE_BYTES);

    mesh.remove_tile(0);
    assert_eq!(mesh.total_data_size(), TILE_BYTES);

    // Removing an already-empty slot deducts nothing.
    mesh.remove_tile(0);
    assert_eq!(mesh.total_data_size(), TILE_BYTES);
}

#[test]
fn mismatched_swap_still_installs_the_replacement() {
    let mesh = grid_mesh(2, 1);
    let stale = mesh.tile_snapshot(0);

    // Someone else replaces the tile first.
    install_square_tile(&mesh, 0, 0, DEFAULT_AREA);

    mesh.begin_tile_rebuild();
    let replacement = square_tile(2, 1, 0, 0, 7);
    // The newest output wins; the return value flags the stale snapshot.
    assert!(!mesh.notify_new_tile(0, stale.as_ref(), Some(replacement)));
    assert_eq!(mesh.pending_rebuild_count(), 0);

    let poly = mesh.polys_in_tile(0)[0];
    assert_eq!(mesh.poly_area(poly), Some(7));
    assert_eq!(mesh.total_data_size(), 2 * TILE_BYTES);
}

#[test]
fn refs_go_stale_after_swap() {
    let mesh = grid_mesh(1, 1);
    let filter = QueryFilter::default();
    let loc = mesh
        .find_nearest_polygon(tile_center(0, 0), Vec3::splat(0.5), &filter)
        .expect("tile present");
    assert!(mesh.is_valid_ref(loc.poly));

    mesh.remove_tile(0);
    assert!(!mesh.is_valid_ref(loc.poly));
    assert_eq!(mesh.poly_center(loc.poly), None);

    // Reinstalling does not resurrect the old reference.
    install_square_tile(&mesh, 0, 0, DEFAULT_AREA);
    assert!(!mesh.is_valid_ref(loc.poly));
    assert_eq!(mesh.polys_in_tile(0).len(), 1);
}

#[test]
fn bounds_cover_loaded_tiles_only() {
    let mesh = grid_mesh(2, 1);
    mesh.remove_tile(1);

    let bounds = mesh.bounds();
    assert!((bounds.max.x - 1.0).abs() < 1e-6);
    assert!((bounds.min.x - 0.0).abs() < 1e-6);
}

#[test]
fn tile_lookup_by_coordinates() {
    let mesh = grid_mesh(3, 2);
    let index = mesh.tile_index_at(2, 1);
    assert_eq!(mesh.tile_xy(index), (2, 1));

    let bounds = mesh.tile_bounds(index);
    assert!((bounds.min.x - 2.0).abs() < 1e-6);
    assert!((bounds.min.z - 1.0).abs() < 1e-6);
}

#[test]
#[should_panic(expected = "out of range")]
fn tile_bounds_panics_out_of_range() {
    let mesh = grid_mesh(1, 1);
    let _ = mesh.tile_bounds(5);
}

#[test]
#[should_panic(expected = "outside")]
fn tile_index_panics_outside_grid() {
    let mesh = grid_mesh(2, 2);
    let _ = mesh.tile_index_at(2, 0);
}

#[test]
fn priorities_order_tiles_by_distance() {
    let mesh = grid_mesh(3, 1);
    mesh.update_tile_priorities(tile_center(2, 0));

    let order = mesh.tiles_by_priority();
    assert_eq!(order, vec![2, 1, 0]);
}

#[test]
fn empty_mesh_reports_no_tiles() {
    let mesh = NavMesh::new(grid_params(0, 0));
    assert_eq!(mesh.tile_count(), 0);
    assert_eq!(mesh.total_data_size(), 0);
    assert!(mesh.bounds().is_empty());
}
