//! Point-to-mesh queries: nearest polygon, projection, random sampling.
//!
//! Every query takes the tile store by reference under the gate; candidate
//! polygons are gathered by walking the tiles whose bounds overlap the query
//! volume.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;
use rand::Rng;

use crate::geometry::{
    closest_point_on_poly_boundary, dist_2d_sqr, point_in_poly_2d, poly_height_at,
    poly_surface_area, random_point_in_triangle, tri_area_2d, Aabb,
};
use crate::path_engine::portal_points;
use crate::query_filter::QueryFilter;
use crate::tile::{NavPoly, TileData};
use crate::tile_store::TileStore;
use crate::PolyRef;

/// A position resolved onto the mesh surface, with the polygon under it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavLocation {
    pub position: Vec3,
    pub poly: PolyRef,
}

/// Closest point to `p` on the polygon surface.
///
/// Inside the polygon (in XZ) the point is `p` snapped to the surface height;
/// outside it is the nearest boundary point.
pub(crate) fn closest_point_on_poly(tile: &TileData, poly: &NavPoly, p: Vec3) -> Vec3 {
    let verts = tile.poly_vertices(poly);
    if point_in_poly_2d(p, &verts) {
        let y = poly_height_at(p, &verts).unwrap_or(p.y);
        Vec3::new(p.x, y, p.z)
    } else {
        closest_point_on_poly_boundary(p, &verts)
    }
}

/// All polygon refs whose bounds overlap `bounds` and pass `filter`.
pub(crate) fn query_polygons(
    store: &TileStore,
    bounds: &Aabb,
    filter: &QueryFilter,
) -> Vec<PolyRef> {
    let mut out = Vec::new();
    for (slot, tile) in store.loaded_tiles() {
        if !tile.header.bounds.overlaps(bounds) {
            continue;
        }
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            if !filter.passes(poly) {
                continue;
            }
            if tile.poly_bounds(poly).overlaps(bounds) {
                out.push(store.make_poly_ref(slot, poly_index as u16));
            }
        }
    }
    out
}

/// Nearest polygon to `center` within the box of `half_extents`.
pub(crate) fn find_nearest_poly(
    store: &TileStore,
    center: Vec3,
    half_extents: Vec3,
    filter: &QueryFilter,
) -> Option<NavLocation> {
    let bounds = Aabb::around(center, half_extents);
    let mut best: Option<NavLocation> = None;
    let mut best_d = f32::MAX;

    for (slot, tile) in store.loaded_tiles() {
        if !tile.header.bounds.overlaps(&bounds) {
            continue;
        }
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            if !filter.passes(poly) {
                continue;
            }
            if !tile.poly_bounds(poly).overlaps(&bounds) {
                continue;
            }
            let point = closest_point_on_poly(tile, poly, center);
            let d = center.distance_squared(point);
            if d < best_d {
                best_d = d;
                best = Some(NavLocation {
                    position: point,
                    poly: store.make_poly_ref(slot, poly_index as u16),
                });
            }
        }
    }
    best
}

/// Projects `p` onto the mesh surface within the extent box.
///
/// Candidates are ranked by vertical distance first and XZ distance second,
/// so a point hovering between two floors resolves to the nearer floor, and
/// a point slightly off the mesh in XZ snaps to the closest boundary within
/// the horizontal extents.
pub(crate) fn project_point(
    store: &TileStore,
    p: Vec3,
    half_extents: Vec3,
    filter: &QueryFilter,
) -> Option<NavLocation> {
    let bounds = Aabb::around(p, half_extents);
    let mut best: Option<NavLocation> = None;
    let mut best_key = (f32::MAX, f32::MAX);

    for (slot, tile) in store.loaded_tiles() {
        if !tile.header.bounds.overlaps(&bounds) {
            continue;
        }
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            if !filter.passes(poly) {
                continue;
            }
            if !tile.poly_bounds(poly).overlaps(&bounds) {
                continue;
            }
            let point = closest_point_on_poly(tile, poly, p);
            let delta = point - p;
            if delta.x.abs() > half_extents.x
                || delta.y.abs() > half_extents.y
                || delta.z.abs() > half_extents.z
            {
                continue;
            }
            let key = (delta.y.abs(), dist_2d_sqr(p, point));
            if key < best_key {
                best_key = key;
                best = Some(NavLocation {
                    position: point,
                    poly: store.make_poly_ref(slot, poly_index as u16),
                });
            }
        }
    }
    best
}

/// Every mesh surface directly above or below `p` within `vertical_band`.
///
/// One location per overlapping floor, unordered. This is how multi-story
/// interiors are disambiguated before pathfinding.
pub(crate) fn project_point_multi(
    store: &TileStore,
    p: Vec3,
    vertical_band: f32,
    filter: &QueryFilter,
) -> Vec<NavLocation> {
    let bounds = Aabb::around(p, Vec3::new(0.01, vertical_band, 0.01));
    let mut out = Vec::new();

    for (slot, tile) in store.loaded_tiles() {
        if !tile.header.bounds.overlaps(&bounds) {
            continue;
        }
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            if !filter.passes(poly) {
                continue;
            }
            let verts = tile.poly_vertices(poly);
            if !point_in_poly_2d(p, &verts) {
                continue;
            }
            let Some(y) = poly_height_at(p, &verts) else {
                continue;
            };
            if (y - p.y).abs() > vertical_band {
                continue;
            }
            out.push(NavLocation {
                position: Vec3::new(p.x, y, p.z),
                poly: store.make_poly_ref(slot, poly_index as u16),
            });
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct DijkstraEntry {
    poly: PolyRef,
    cost: f32,
}

impl PartialEq for DijkstraEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for DijkstraEntry {}

impl PartialOrd for DijkstraEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap.
        other.cost.total_cmp(&self.cost)
    }
}

/// All polygons reachable from `center` within `max_cost` of accumulated
/// filter cost.
///
/// This walks the adjacency graph like the path engine does (portal midpoint
/// to portal midpoint), so an expensive area shrinks the reachable set the
/// same way it lengthens paths.
pub(crate) fn polygons_within_distance(
    store: &TileStore,
    center: Vec3,
    max_cost: f32,
    filter: &QueryFilter,
) -> Vec<PolyRef> {
    let Some(start) = find_nearest_poly(store, center, Vec3::splat(max_cost), filter) else {
        return Vec::new();
    };

    let mut best: HashMap<PolyRef, f32> = HashMap::new();
    let mut positions: HashMap<PolyRef, Vec3> = HashMap::new();
    let mut frontier = BinaryHeap::new();
    best.insert(start.poly, 0.0);
    positions.insert(start.poly, start.position);
    frontier.push(DijkstraEntry {
        poly: start.poly,
        cost: 0.0,
    });

    while let Some(entry) = frontier.pop() {
        if entry.cost > best.get(&entry.poly).copied().unwrap_or(f32::MAX) {
            continue;
        }
        let Some((_, poly)) = store.get_tile_and_poly(entry.poly) else {
            continue;
        };
        let Some(slot) = entry.poly.slot() else {
            continue;
        };
        let pos = positions[&entry.poly];

        for edge_index in 0..poly.vert_count() {
            let Some(neighbor) = store.resolve_edge(slot, poly.neighbors[edge_index]) else {
                continue;
            };
            let Some((_, nb_poly)) = store.get_tile_and_poly(neighbor) else {
                continue;
            };
            if !filter.passes(nb_poly) {
                continue;
            }
            let Some((left, right)) = portal_points(store, entry.poly, neighbor) else {
                continue;
            };
            let mid = (left + right) * 0.5;
            let cost = entry.cost + filter.traversal_cost(poly.area, nb_poly.area, pos.distance(mid));
            if cost > max_cost {
                continue;
            }
            if cost < best.get(&neighbor).copied().unwrap_or(f32::MAX) {
                best.insert(neighbor, cost);
                positions.insert(neighbor, mid);
                frontier.push(DijkstraEntry {
                    poly: neighbor,
                    cost,
                });
            }
        }
    }

    let mut out: Vec<PolyRef> = best.into_keys().collect();
    out.sort_by_key(|r| r.id());
    out
}

/// Uniform random point over the whole walkable surface.
///
/// Polygons are reservoir-sampled weighted by surface area, then a point is
/// drawn from the winning polygon's triangle fan, again area-weighted.
pub(crate) fn random_point<R: Rng>(
    store: &TileStore,
    rng: &mut R,
    filter: &QueryFilter,
) -> Option<NavLocation> {
    let mut chosen: Option<(usize, usize)> = None;
    let mut area_sum = 0.0_f32;

    for (slot, tile) in store.loaded_tiles() {
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            if !filter.passes(poly) {
                continue;
            }
            let area = poly_surface_area(&tile.poly_vertices(poly));
            if area <= 0.0 {
                continue;
            }
            area_sum += area;
            if rng.gen::<f32>() * area_sum <= area {
                chosen = Some((slot, poly_index));
            }
        }
    }

    let (slot, poly_index) = chosen?;
    let tile = store.tile(slot)?;
    let poly = &tile.polys[poly_index];
    let position = random_point_in_poly(tile, poly, rng);
    Some(NavLocation {
        position,
        poly: store.make_poly_ref(slot, poly_index as u16),
    })
}

/// Uniform random point within `radius` (XZ) of `center`.
pub(crate) fn random_point_in_radius<R: Rng>(
    store: &TileStore,
    rng: &mut R,
    center: Vec3,
    radius: f32,
    filter: &QueryFilter,
) -> Option<NavLocation> {
    const ATTEMPTS: usize = 32;

    let radius_sq = radius * radius;
    // Keep only polygons whose surface actually reaches into the circle.
    let mut candidates = polygons_within_distance(store, center, radius, filter);
    candidates.retain(|&r| {
        store
            .get_tile_and_poly(r)
            .map(|(tile, poly)| {
                dist_2d_sqr(center, closest_point_on_poly(tile, poly, center)) <= radius_sq
            })
            .unwrap_or(false)
    });
    if candidates.is_empty() {
        return None;
    }

    for _ in 0..ATTEMPTS {
        let loc = random_point_in_polys(store, rng, &candidates)?;
        if dist_2d_sqr(center, loc.position) <= radius_sq {
            return Some(loc);
        }
    }

    // Rejection missed a tiny circle; every candidate still has surface
    // inside it, so take the closest point on one of them.
    let loc = random_point_in_polys(store, rng, &candidates)?;
    let (tile, poly) = store.get_tile_and_poly(loc.poly)?;
    Some(NavLocation {
        position: closest_point_on_poly(tile, poly, center),
        poly: loc.poly,
    })
}

/// Area-weighted random point over an explicit set of polygons.
pub(crate) fn random_point_in_polys<R: Rng>(
    store: &TileStore,
    rng: &mut R,
    candidates: &[PolyRef],
) -> Option<NavLocation> {
    let mut chosen = None;
    let mut area_sum = 0.0_f32;
    for &r in candidates {
        let Some((tile, poly)) = store.get_tile_and_poly(r) else {
            continue;
        };
        let area = poly_surface_area(&tile.poly_vertices(poly));
        if area <= 0.0 {
            continue;
        }
        area_sum += area;
        if rng.gen::<f32>() * area_sum <= area {
            chosen = Some(r);
        }
    }
    let r = chosen?;
    let (tile, poly) = store.get_tile_and_poly(r)?;
    Some(NavLocation {
        position: random_point_in_poly(tile, poly, rng),
        poly: r,
    })
}

/// Area-weighted random point on one polygon.
fn random_point_in_poly<R: Rng>(tile: &TileData, poly: &NavPoly, rng: &mut R) -> Vec3 {
    let verts = tile.poly_vertices(poly);

    // Pick a fan triangle weighted by area.
    let mut tri = 1usize;
    let mut area_sum = 0.0_f32;
    for i in 1..verts.len() - 1 {
        let area = tri_area_2d(verts[0], verts[i], verts[i + 1]).abs() * 0.5;
        area_sum += area;
        if rng.gen::<f32>() * area_sum <= area {
            tri = i;
        }
    }

    random_point_in_triangle(
        verts[0],
        verts[tri],
        verts[tri + 1],
        rng.gen::<f32>(),
        rng.gen::<f32>(),
    )
}
