//! Fixture meshes for the query tests.
//!
//! The workhorse is a `width x height` grid of 1x1 tiles, each holding one
//! square polygon spanning the tile and one cluster wrapping that polygon.
//! Cross-tile adjacency and cluster links are wired for every in-grid
//! neighbor, so paths and cluster corridors cross tile seams exactly like
//! they would on generator output.

use std::sync::Arc;

use glam::Vec3;

use crate::geometry::Aabb;
use crate::tile::{Cluster, ClusterLink, NavPoly, PortalEdge, TileData, TileHeader};
use crate::{NavMesh, NavMeshParams, PolyFlags, DEFAULT_AREA};

pub(crate) const TILE_BYTES: usize = 256;

pub(crate) fn grid_params(width: i32, height: i32) -> NavMeshParams {
    NavMeshParams {
        bounds: Aabb::new(
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(width as f32, 1.0, height as f32),
        ),
        grid_width: width,
        grid_height: height,
        tile_size: 1.0,
        default_query_extent: Vec3::new(0.5, 2.0, 0.5),
        ..NavMeshParams::default()
    }
}

/// One tile holding a single square polygon covering the whole cell.
pub(crate) fn square_tile(width: i32, height: i32, x: i32, y: i32, area: u8) -> Arc<TileData> {
    let fx = x as f32;
    let fz = y as f32;
    // CCW around +Y.
    let verts = vec![
        Vec3::new(fx, 0.0, fz),
        Vec3::new(fx, 0.0, fz + 1.0),
        Vec3::new(fx + 1.0, 0.0, fz + 1.0),
        Vec3::new(fx + 1.0, 0.0, fz),
    ];

    let slot = |tx: i32, ty: i32| (ty * width + tx) as u32;
    let edge_to = |tx: i32, ty: i32| {
        if tx >= 0 && tx < width && ty >= 0 && ty < height {
            PortalEdge::External {
                slot: slot(tx, ty),
                poly: 0,
            }
        } else {
            PortalEdge::Border
        }
    };

    // Edge i runs verts[i] -> verts[i + 1]: left, far, right, near.
    let neighbors = [
        edge_to(x - 1, y),
        edge_to(x, y + 1),
        edge_to(x + 1, y),
        edge_to(x, y - 1),
        PortalEdge::Border,
        PortalEdge::Border,
    ];

    let mut links = Vec::new();
    for (tx, ty) in [(x - 1, y), (x, y + 1), (x + 1, y), (x, y - 1)] {
        if tx >= 0 && tx < width && ty >= 0 && ty < height {
            links.push(ClusterLink {
                target_slot: slot(tx, ty),
                target_cluster: 0,
                cost: 1.0,
            });
        }
    }

    let bounds = Aabb::from_points(verts.iter().copied());
    let center = Vec3::new(fx + 0.5, 0.0, fz + 0.5);

    Arc::new(TileData {
        header: TileHeader {
            x,
            y,
            layer: 0,
            bounds,
            data_size: TILE_BYTES,
        },
        verts,
        polys: vec![NavPoly {
            verts: [0, 1, 2, 3, 0, 0],
            vert_count: 4,
            neighbors,
            flags: PolyFlags::WALK,
            area,
            cluster: 0,
        }],
        clusters: vec![Cluster {
            center,
            center_poly: 0,
            bounds,
            polys: vec![0],
            links,
        }],
    })
}

/// Installs a square tile through the normal rebuild protocol.
pub(crate) fn install_square_tile(mesh: &NavMesh, x: i32, y: i32, area: u8) {
    let index = mesh.tile_index_at(x, y);
    let old = mesh.tile_snapshot(index);
    let width = mesh.params().grid_width;
    let height = mesh.params().grid_height;
    mesh.begin_tile_rebuild();
    assert!(mesh.notify_new_tile(index, old.as_ref(), Some(square_tile(width, height, x, y, area))));
}

/// Fully populated grid mesh with a per-tile area assignment.
pub(crate) fn grid_mesh_with_areas(
    width: i32,
    height: i32,
    area: impl Fn(i32, i32) -> u8,
) -> NavMesh {
    let mesh = NavMesh::new(grid_params(width, height));
    for y in 0..height {
        for x in 0..width {
            install_square_tile(&mesh, x, y, area(x, y));
        }
    }
    mesh
}

/// Fully populated grid mesh, all default area.
pub(crate) fn grid_mesh(width: i32, height: i32) -> NavMesh {
    grid_mesh_with_areas(width, height, |_, _| DEFAULT_AREA)
}

/// Center of a grid cell at surface height.
pub(crate) fn tile_center(x: i32, y: i32) -> Vec3 {
    Vec3::new(x as f32 + 0.5, 0.0, y as f32 + 0.5)
}
