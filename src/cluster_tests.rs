use std::sync::Arc;

use crate::test_mesh_helpers::{grid_mesh, tile_center};
use crate::tile::NO_CLUSTER;
use crate::{NavMesh, PathResult, QueryFilter};

/// Strips the cluster graph from every loaded tile.
fn strip_clusters(mesh: &NavMesh) {
    for index in 0..mesh.tile_count() {
        let Some(old) = mesh.tile_snapshot(index) else {
            continue;
        };
        let mut data = (*old).clone();
        data.clusters.clear();
        for poly in &mut data.polys {
            poly.cluster = NO_CLUSTER;
        }
        mesh.begin_tile_rebuild();
        assert!(mesh.notify_new_tile(index, Some(&old), Some(Arc::new(data))));
    }
}

#[test]
fn every_grid_poly_has_a_cluster() {
    let mesh = grid_mesh(2, 2);
    for y in 0..2 {
        for x in 0..2 {
            assert!(mesh.cluster_at(tile_center(x, y)).is_some());
        }
    }
}

#[test]
fn cluster_center_matches_the_tile() {
    let mesh = grid_mesh(2, 1);
    let cluster = mesh.cluster_at(tile_center(1, 0)).expect("cluster");

    let stored = mesh.cluster_center(cluster, false).expect("resolves");
    assert_eq!(stored, tile_center(1, 0));

    // The center polygon's centroid is the same point on this fixture.
    let on_poly = mesh.cluster_center(cluster, true).expect("resolves");
    assert_eq!(on_poly, tile_center(1, 0));
}

#[test]
fn poly_cluster_links_poly_to_its_cluster() {
    let mesh = grid_mesh(2, 1);
    let poly = mesh.polys_in_tile(1)[0];
    let cluster = mesh.poly_cluster(poly).expect("cluster");
    assert_eq!(Some(cluster), mesh.cluster_at(tile_center(1, 0)));
}

#[test]
fn random_point_in_cluster_stays_inside_it() {
    let mesh = grid_mesh(3, 1);
    mesh.set_random_seed(5);
    let cluster = mesh.cluster_at(tile_center(1, 0)).expect("cluster");

    for _ in 0..16 {
        let loc = mesh.random_point_in_cluster(cluster).expect("surface");
        // The cluster covers exactly the middle tile.
        assert!(loc.position.x >= 1.0 && loc.position.x <= 2.0);
        assert_eq!(mesh.poly_cluster(loc.poly), Some(cluster));
    }
}

#[test]
fn cluster_path_walks_the_corridor() {
    let mesh = grid_mesh(3, 1);
    let path = mesh
        .find_cluster_path(tile_center(0, 0), tile_center(2, 0))
        .expect("connected");

    assert_eq!(path.len(), 3);
    assert_eq!(Some(path[0]), mesh.cluster_at(tile_center(0, 0)));
    assert_eq!(Some(path[2]), mesh.cluster_at(tile_center(2, 0)));
}

#[test]
fn cluster_path_to_self_is_trivial() {
    let mesh = grid_mesh(2, 1);
    let path = mesh
        .find_cluster_path(tile_center(0, 0), tile_center(0, 0))
        .expect("same cluster");
    assert_eq!(path.len(), 1);
}

#[test]
fn cluster_reachability_tracks_the_tiles() {
    let mesh = grid_mesh(3, 1);
    assert!(mesh.test_cluster_path(tile_center(0, 0), tile_center(2, 0)));

    mesh.remove_tile(1);
    assert!(!mesh.test_cluster_path(tile_center(0, 0), tile_center(2, 0)));
}

#[test]
fn cluster_test_falls_back_without_cluster_data() {
    let mesh = grid_mesh(3, 1);
    strip_clusters(&mesh);

    assert!(mesh.cluster_at(tile_center(0, 0)).is_none());
    // No cluster graph, but the polygon graph still answers.
    assert!(mesh.test_cluster_path(tile_center(0, 0), tile_center(2, 0)));
}

#[test]
fn clusters_within_cost_honors_the_budget() {
    let mesh = grid_mesh(3, 1);
    let center = tile_center(1, 0);

    // Each cluster link costs 1.0, so a budget of 1.0 reaches both
    // neighbors and nothing further.
    let without_origin = mesh.clusters_within_distance(center, 1.0, false);
    assert_eq!(without_origin.len(), 2);

    let with_origin = mesh.clusters_within_distance(center, 1.0, true);
    assert_eq!(with_origin.len(), 3);

    let tight = mesh.clusters_within_distance(center, 0.5, false);
    assert!(tight.is_empty());
}

#[test]
fn hierarchical_path_matches_plain_on_open_ground() {
    let mesh = grid_mesh(3, 1);
    let start = tile_center(0, 0);
    let end = tile_center(2, 0);

    let plain = mesh.find_path(start, end, &QueryFilter::default());
    let guided = mesh.find_hierarchical_path(start, end);
    assert_eq!(
        plain.path().expect("plain").points,
        guided.path().expect("guided").points
    );
}

#[test]
fn hierarchical_path_works_without_cluster_data() {
    let mesh = grid_mesh(3, 1);
    strip_clusters(&mesh);

    let result = mesh.find_hierarchical_path(tile_center(0, 0), tile_center(2, 0));
    assert!(matches!(result, PathResult::Succeeded(_)));
}

#[test]
fn stale_cluster_refs_stop_resolving() {
    let mesh = grid_mesh(2, 1);
    let cluster = mesh.cluster_at(tile_center(0, 0)).expect("cluster");

    mesh.remove_tile(0);
    assert!(mesh.cluster_center(cluster, false).is_none());
}
