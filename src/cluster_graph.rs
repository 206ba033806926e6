//! Coarse pathfinding over the cluster graph.
//!
//! Each tile groups its polygons into clusters; links between clusters (both
//! within a tile and across tile seams) carry precomputed traversal costs.
//! Cluster queries answer reachability and corridors orders of magnitude
//! faster than polygon A*, at the cost of precision, and double as a
//! restriction set for a subsequent polygon search.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;

use crate::tile::{Cluster, TileData, NO_CLUSTER};
use crate::tile_store::TileStore;
use crate::{ClusterRef, PolyRef};

/// Resolves a cluster ref against the live store.
pub(crate) fn get_cluster<'a>(
    store: &'a TileStore,
    r: ClusterRef,
) -> Option<(&'a TileData, &'a Cluster)> {
    let slot = r.slot()?;
    if store.tile_salt(slot) != r.salt() {
        return None;
    }
    let tile = store.tile(slot)?;
    let cluster = tile.clusters.get(r.index() as usize)?;
    Some((tile, cluster))
}

/// Cluster the polygon belongs to, stamped with the live salt.
pub(crate) fn cluster_of_poly(store: &TileStore, poly: PolyRef) -> Option<ClusterRef> {
    let (_, p) = store.get_tile_and_poly(poly)?;
    if p.cluster == NO_CLUSTER {
        return None;
    }
    let slot = poly.slot()?;
    Some(ClusterRef::encode(
        store.tile_salt(slot),
        slot,
        p.cluster as u32,
    ))
}

/// Representative center point of a cluster.
///
/// With `use_center_poly` the centroid of the cluster's central polygon is
/// returned instead of the stored center, which is guaranteed to lie on
/// walkable surface.
pub(crate) fn cluster_center(
    store: &TileStore,
    r: ClusterRef,
    use_center_poly: bool,
) -> Option<Vec3> {
    let (tile, cluster) = get_cluster(store, r)?;
    if use_center_poly {
        let poly = tile.polys.get(cluster.center_poly as usize)?;
        Some(tile.poly_center(poly))
    } else {
        Some(cluster.center)
    }
}

/// Live refs of the cluster's member polygons.
pub(crate) fn cluster_polys(store: &TileStore, r: ClusterRef) -> Vec<PolyRef> {
    let slot = match r.slot() {
        Some(s) if store.tile_salt(s) == r.salt() => s,
        _ => return Vec::new(),
    };
    match get_cluster(store, r) {
        Some((_, cluster)) => cluster
            .polys
            .iter()
            .map(|&p| store.make_poly_ref(slot, p))
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    cluster: ClusterRef,
    cost: f32,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap.
        other.cost.total_cmp(&self.cost)
    }
}

fn neighbors(store: &TileStore, r: ClusterRef) -> Vec<(ClusterRef, f32)> {
    let Some((_, cluster)) = get_cluster(store, r) else {
        return Vec::new();
    };
    cluster
        .links
        .iter()
        .filter_map(|link| {
            let slot = link.target_slot as usize;
            let tile = store.tile(slot)?;
            if tile.clusters.len() <= link.target_cluster as usize {
                return None;
            }
            let target = ClusterRef::encode(
                store.tile_salt(slot),
                slot,
                link.target_cluster as u32,
            );
            Some((target, link.cost))
        })
        .collect()
}

/// Dijkstra over cluster links from `start` to `end`.
///
/// Returns the cluster corridor including both endpoints, or `None` when the
/// clusters are disconnected or either ref is stale.
pub(crate) fn find_cluster_path(
    store: &TileStore,
    start: ClusterRef,
    end: ClusterRef,
) -> Option<Vec<ClusterRef>> {
    get_cluster(store, start)?;
    get_cluster(store, end)?;
    if start == end {
        return Some(vec![start]);
    }

    let mut best: HashMap<ClusterRef, f32> = HashMap::new();
    let mut parent: HashMap<ClusterRef, ClusterRef> = HashMap::new();
    let mut frontier = BinaryHeap::new();

    best.insert(start, 0.0);
    frontier.push(FrontierEntry {
        cluster: start,
        cost: 0.0,
    });

    while let Some(entry) = frontier.pop() {
        if entry.cost > best.get(&entry.cluster).copied().unwrap_or(f32::MAX) {
            continue;
        }
        if entry.cluster == end {
            // Reconstruct by walking parents back to the start.
            let mut path = vec![end];
            let mut cur = end;
            while let Some(&prev) = parent.get(&cur) {
                path.push(prev);
                cur = prev;
            }
            path.reverse();
            return Some(path);
        }
        for (neighbor, link_cost) in neighbors(store, entry.cluster) {
            let cost = entry.cost + link_cost.max(0.0);
            if cost < best.get(&neighbor).copied().unwrap_or(f32::MAX) {
                best.insert(neighbor, cost);
                parent.insert(neighbor, entry.cluster);
                frontier.push(FrontierEntry {
                    cluster: neighbor,
                    cost,
                });
            }
        }
    }
    None
}

/// Whether two clusters are connected at all.
pub(crate) fn test_cluster_path(store: &TileStore, start: ClusterRef, end: ClusterRef) -> bool {
    find_cluster_path(store, start, end).is_some()
}

/// All clusters reachable from the cluster under `center` within `max_cost`.
///
/// `include_origin` controls whether the starting cluster itself appears in
/// the result.
pub(crate) fn clusters_within_cost(
    store: &TileStore,
    origin: ClusterRef,
    max_cost: f32,
    include_origin: bool,
) -> Vec<ClusterRef> {
    if get_cluster(store, origin).is_none() {
        return Vec::new();
    }

    let mut best: HashMap<ClusterRef, f32> = HashMap::new();
    let mut frontier = BinaryHeap::new();
    best.insert(origin, 0.0);
    frontier.push(FrontierEntry {
        cluster: origin,
        cost: 0.0,
    });

    while let Some(entry) = frontier.pop() {
        if entry.cost > best.get(&entry.cluster).copied().unwrap_or(f32::MAX) {
            continue;
        }
        for (neighbor, link_cost) in neighbors(store, entry.cluster) {
            let cost = entry.cost + link_cost.max(0.0);
            if cost > max_cost {
                continue;
            }
            if cost < best.get(&neighbor).copied().unwrap_or(f32::MAX) {
                best.insert(neighbor, cost);
                frontier.push(FrontierEntry {
                    cluster: neighbor,
                    cost,
                });
            }
        }
    }

    let mut out: Vec<ClusterRef> = best.into_keys().collect();
    if !include_origin {
        out.retain(|&c| c != origin);
    }
    out.sort_by_key(|c| c.id());
    out
}
