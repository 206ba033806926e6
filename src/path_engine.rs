//! Polygon-graph pathfinding: A*, string pulling, and raycasts.
//!
//! The search works on packed refs and resolves them through the tile store
//! on every expansion, so a tile swapped out mid-slice is noticed (the slice
//! aborts) rather than walked into. Costs come entirely from the caller's
//! [`QueryFilter`].

use std::collections::HashSet;

use glam::Vec3;
use tracing::trace;

use crate::geometry::{intersect_segment_poly_2d, tri_area_2d};
use crate::node_pool::{NodeFlags, NodePool, OpenList};
use crate::query_filter::QueryFilter;
use crate::spatial_query::closest_point_on_poly;
use crate::tile_store::TileStore;
use crate::{ClusterRef, PolyRef};

/// Hard cap on polygons a single raycast may walk.
const RAYCAST_LOOP_LIMIT: usize = 256;

/// A found path: the polygon corridor and the string-pulled waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct NavPath {
    /// Polygons crossed, start to end.
    pub corridor: Vec<PolyRef>,
    /// Waypoints after string pulling, including start and end points.
    pub points: Vec<Vec3>,
    /// Filter cost accumulated along the corridor.
    pub cost: f32,
    /// Euclidean length of the waypoint polyline.
    pub length: f32,
    /// Whether the path stops short of the requested goal.
    pub partial: bool,
}

/// Outcome of a pathfinding request.
///
/// An unreachable goal is *not* a failure; the engine returns the best
/// partial path toward it. `Failed` means the start could not be resolved at
/// all, `Aborted` means the tiles under the search were replaced mid-query.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResult {
    Succeeded(NavPath),
    PartialSucceeded(NavPath),
    Failed,
    Aborted,
}

impl PathResult {
    /// The path carried by a successful or partial result.
    pub fn path(&self) -> Option<&NavPath> {
        match self {
            PathResult::Succeeded(p) | PathResult::PartialSucceeded(p) => Some(p),
            PathResult::Failed | PathResult::Aborted => None,
        }
    }

    pub fn into_path(self) -> Option<NavPath> {
        match self {
            PathResult::Succeeded(p) | PathResult::PartialSucceeded(p) => Some(p),
            PathResult::Failed | PathResult::Aborted => None,
        }
    }

    /// True for both full and partial paths.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PathResult::Succeeded(_) | PathResult::PartialSucceeded(_)
        )
    }
}

/// Result of walking a straight line across the mesh surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastResult {
    /// Whether the ray stopped at an unwalkable edge before reaching the end.
    pub hit: bool,
    /// Parameter along the segment where the walk stopped; 1.0 on a clear ray.
    pub hit_fraction: f32,
    /// World position where the walk stopped.
    pub position: Vec3,
    /// Last polygon the walk stood on.
    pub last_poly: PolyRef,
}

/// Progress of an incremental path search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicedPathState {
    /// More iterations are needed.
    InProgress,
    /// The goal polygon was reached.
    Complete,
    /// The frontier is exhausted; only a partial path exists.
    Partial,
    /// The search could not start or lost its endpoints.
    Failed,
    /// A tile under the search was replaced; results would be stale.
    Aborted,
}

impl SlicedPathState {
    pub fn is_done(self) -> bool {
        !matches!(self, SlicedPathState::InProgress)
    }
}

/// A* search over the polygon graph, advanced in slices.
pub(crate) struct PathSearch {
    pool: NodePool,
    open: OpenList,
    filter: QueryFilter,
    start: PolyRef,
    start_pos: Vec3,
    end: PolyRef,
    end_pos: Vec3,
    /// Node closest to the goal so far, for partial results.
    best: u16,
    best_heuristic: f32,
    /// When set, expansion is confined to polygons of these clusters.
    allowed_clusters: Option<HashSet<ClusterRef>>,
    state: SlicedPathState,
}

impl PathSearch {
    pub(crate) fn new(
        store: &TileStore,
        start: PolyRef,
        start_pos: Vec3,
        end: PolyRef,
        end_pos: Vec3,
        filter: &QueryFilter,
        allowed_clusters: Option<HashSet<ClusterRef>>,
    ) -> PathSearch {
        let mut search = PathSearch {
            pool: NodePool::new(filter.max_search_nodes()),
            open: OpenList::new(),
            filter: filter.clone(),
            start,
            start_pos,
            end,
            end_pos,
            best: 0,
            best_heuristic: f32::MAX,
            allowed_clusters,
            state: SlicedPathState::InProgress,
        };

        if !store.is_valid_ref(start) || !store.is_valid_ref(end) {
            search.state = SlicedPathState::Failed;
            return search;
        }

        // Start node; alloc cannot fail on an empty pool.
        if let Some(index) = search.pool.find_or_alloc(start) {
            let h = start_pos.distance(end_pos) * search.filter.heuristic_scale();
            let node = search.pool.node_mut(index);
            node.pos = start_pos;
            node.cost = 0.0;
            node.flags.insert(NodeFlags::OPEN);
            search.open.push(index, h);
            search.best = index;
            search.best_heuristic = h;
        } else {
            search.state = SlicedPathState::Failed;
        }
        search
    }

    pub(crate) fn state(&self) -> SlicedPathState {
        self.state
    }

    /// Runs up to `max_iters` node expansions.
    pub(crate) fn advance(&mut self, store: &TileStore, max_iters: usize) -> SlicedPathState {
        if self.state != SlicedPathState::InProgress {
            return self.state;
        }
        // The tiles holding the endpoints must survive across slices.
        if !store.is_valid_ref(self.start) || !store.is_valid_ref(self.end) {
            self.state = SlicedPathState::Aborted;
            return self.state;
        }

        for _ in 0..max_iters {
            let Some(current) = self.open.pop(&self.pool) else {
                self.state = SlicedPathState::Partial;
                return self.state;
            };

            {
                let node = self.pool.node_mut(current);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
            }

            let cur_node = self.pool.node(current).clone();
            if cur_node.poly == self.end {
                self.best = current;
                self.state = SlicedPathState::Complete;
                return self.state;
            }

            let Some((_, cur_poly)) = store.get_tile_and_poly(cur_node.poly) else {
                self.state = SlicedPathState::Aborted;
                return self.state;
            };
            let cur_slot = match cur_node.poly.slot() {
                Some(s) => s,
                None => {
                    self.state = SlicedPathState::Aborted;
                    return self.state;
                }
            };
            for edge_index in 0..cur_poly.vert_count() {
                let Some(neighbor_ref) =
                    store.resolve_edge(cur_slot, cur_poly.neighbors[edge_index])
                else {
                    continue;
                };
                if Some(neighbor_ref)
                    == cur_node.parent.map(|p| self.pool.node(p).poly)
                {
                    continue;
                }
                let Some((nb_tile, nb_poly)) = store.get_tile_and_poly(neighbor_ref) else {
                    continue;
                };
                if !self.filter.passes(nb_poly) {
                    continue;
                }
                if let Some(allowed) = &self.allowed_clusters {
                    let nb_slot = match neighbor_ref.slot() {
                        Some(s) => s,
                        None => continue,
                    };
                    if nb_poly.cluster == crate::tile::NO_CLUSTER {
                        continue;
                    }
                    let cluster_ref = ClusterRef::encode(
                        store.tile_salt(nb_slot),
                        nb_slot,
                        nb_poly.cluster as u32,
                    );
                    if neighbor_ref != self.end && !allowed.contains(&cluster_ref) {
                        continue;
                    }
                }

                let nb_area = nb_poly.area;
                let nb_pos = if neighbor_ref == self.end {
                    self.end_pos
                } else {
                    match portal_points(store, cur_node.poly, neighbor_ref) {
                        Some((left, right)) => (left + right) * 0.5,
                        None => nb_tile.poly_center(nb_poly),
                    }
                };

                let step_cost = self.filter.traversal_cost(
                    cur_poly.area,
                    nb_area,
                    cur_node.pos.distance(nb_pos),
                );
                let cost = cur_node.cost + step_cost;
                let heuristic = if neighbor_ref == self.end {
                    0.0
                } else {
                    nb_pos.distance(self.end_pos) * self.filter.heuristic_scale()
                };

                let Some(nb_index) = self.pool.find_or_alloc(neighbor_ref) else {
                    // Node budget exhausted; stop widening this frontier.
                    trace!(nodes = self.pool.len(), "search node budget exhausted");
                    continue;
                };
                let nb_node = self.pool.node(nb_index);
                let visited = nb_node.flags.contains(NodeFlags::OPEN)
                    || nb_node.flags.contains(NodeFlags::CLOSED);
                if visited && cost >= nb_node.cost {
                    continue;
                }

                let node = self.pool.node_mut(nb_index);
                node.pos = nb_pos;
                node.cost = cost;
                node.parent = Some(current);
                node.flags.remove(NodeFlags::CLOSED);
                node.flags.insert(NodeFlags::OPEN);
                self.open.push(nb_index, cost + heuristic);

                if heuristic < self.best_heuristic {
                    self.best_heuristic = heuristic;
                    self.best = nb_index;
                }
            }
        }

        if self.open.is_empty() {
            self.state = SlicedPathState::Partial;
        }
        self.state
    }

    /// Builds the final result once the search has stopped.
    pub(crate) fn build_result(&self, store: &TileStore) -> PathResult {
        let (tail, partial) = match self.state {
            SlicedPathState::Failed => return PathResult::Failed,
            SlicedPathState::Aborted | SlicedPathState::InProgress => {
                return PathResult::Aborted
            }
            SlicedPathState::Complete => (self.best, false),
            SlicedPathState::Partial => (self.best, true),
        };

        let mut corridor = Vec::new();
        let mut cursor = Some(tail);
        while let Some(index) = cursor {
            let node = self.pool.node(index);
            corridor.push(node.poly);
            cursor = node.parent;
        }
        corridor.reverse();

        // A partial path ends at the closest reachable point to the goal.
        let end_pos = if partial {
            let last = self.pool.node(tail);
            match store.get_tile_and_poly(last.poly) {
                Some((tile, poly)) => closest_point_on_poly(tile, poly, self.end_pos),
                None => return PathResult::Aborted,
            }
        } else {
            self.end_pos
        };

        let points = match string_pull(store, self.start_pos, end_pos, &corridor) {
            Some(points) => points,
            None => return PathResult::Aborted,
        };
        let length = points
            .windows(2)
            .map(|w| w[0].distance(w[1]))
            .sum::<f32>();

        let mut cost = self.pool.node(tail).cost;
        if partial {
            let last = self.pool.node(tail);
            if let Some((_, poly)) = store.get_tile_and_poly(last.poly) {
                cost += self
                    .filter
                    .traversal_cost(poly.area, poly.area, last.pos.distance(end_pos));
            }
        }

        let path = NavPath {
            corridor,
            points,
            cost,
            length,
            partial,
        };
        if partial {
            PathResult::PartialSucceeded(path)
        } else {
            PathResult::Succeeded(path)
        }
    }
}

/// Shared edge of two adjacent corridor polygons as a (left, right) portal.
///
/// Left/right follow the winding order of the `from` polygon, which is what
/// the funnel code expects.
pub(crate) fn portal_points(
    store: &TileStore,
    from: PolyRef,
    to: PolyRef,
) -> Option<(Vec3, Vec3)> {
    let (tile, poly) = store.get_tile_and_poly(from)?;
    let slot = from.slot()?;
    for edge_index in 0..poly.vert_count() {
        if store.resolve_edge(slot, poly.neighbors[edge_index]) == Some(to) {
            let va = tile.verts[poly.verts[edge_index] as usize];
            let vb = tile.verts[poly.verts[(edge_index + 1) % poly.vert_count()] as usize];
            return Some((va, vb));
        }
    }
    None
}

#[inline]
fn same_point(a: Vec3, b: Vec3) -> bool {
    crate::geometry::dist_2d_sqr(a, b) < crate::SAME_POINT_TOLERANCE_SQ
}

/// Funnel string pulling over a polygon corridor.
///
/// Returns the tightened waypoint polyline from `start` to `end`, or `None`
/// when a corridor portal can no longer be resolved.
pub(crate) fn string_pull(
    store: &TileStore,
    start: Vec3,
    end: Vec3,
    corridor: &[PolyRef],
) -> Option<Vec<Vec3>> {
    let mut points = vec![start];
    if corridor.len() <= 1 {
        points.push(end);
        return Some(points);
    }

    // Portals between consecutive corridor polys, closed off by the endpoint.
    let mut portals = Vec::with_capacity(corridor.len());
    for pair in corridor.windows(2) {
        portals.push(portal_points(store, pair[0], pair[1])?);
    }
    portals.push((end, end));

    let mut apex = start;
    let mut left = start;
    let mut right = start;
    let mut left_index = 0usize;
    let mut right_index = 0usize;

    let mut i = 0;
    while i < portals.len() {
        let (portal_left, portal_right) = portals[i];

        // Tighten the right side of the funnel.
        if tri_area_2d(apex, right, portal_right) <= 0.0 {
            if same_point(apex, right) || tri_area_2d(apex, left, portal_right) > 0.0 {
                right = portal_right;
                right_index = i;
            } else {
                // Right would cross left: the left corner is a waypoint.
                if !same_point(*points.last()?, left) {
                    points.push(left);
                }
                apex = left;
                right = apex;
                right_index = left_index;
                i = left_index + 1;
                continue;
            }
        }

        // Tighten the left side of the funnel.
        if tri_area_2d(apex, left, portal_left) >= 0.0 {
            if same_point(apex, left) || tri_area_2d(apex, right, portal_left) < 0.0 {
                left = portal_left;
                left_index = i;
            } else {
                if !same_point(*points.last()?, right) {
                    points.push(right);
                }
                apex = right;
                left = apex;
                left_index = right_index;
                i = right_index + 1;
                continue;
            }
        }

        i += 1;
    }

    if !same_point(*points.last()?, end) {
        points.push(end);
    }
    Some(points)
}

/// Walks a straight segment across the mesh from `start_pos` on `start_ref`
/// toward `end_pos`, stopping at the first unwalkable edge.
pub(crate) fn raycast(
    store: &TileStore,
    start_ref: PolyRef,
    start_pos: Vec3,
    end_pos: Vec3,
    filter: &QueryFilter,
) -> Option<RaycastResult> {
    let mut current = start_ref;
    store.get_tile_and_poly(current)?;

    for _ in 0..RAYCAST_LOOP_LIMIT {
        let (tile, poly) = store.get_tile_and_poly(current)?;
        let slot = current.slot()?;
        let verts = tile.poly_vertices(poly);

        let Some((_tmin, tmax, _seg_min, seg_max)) =
            intersect_segment_poly_2d(start_pos, end_pos, &verts)
        else {
            // Numerically skated off the polygon; report a hit in place.
            return Some(RaycastResult {
                hit: true,
                hit_fraction: 0.0,
                position: start_pos,
                last_poly: current,
            });
        };

        if tmax >= 1.0 {
            return Some(RaycastResult {
                hit: false,
                hit_fraction: 1.0,
                position: end_pos,
                last_poly: current,
            });
        }

        let next = if seg_max >= 0 {
            store
                .resolve_edge(slot, poly.neighbors[seg_max as usize])
                .filter(|&r| {
                    store
                        .get_tile_and_poly(r)
                        .map(|(_, p)| filter.passes(p))
                        .unwrap_or(false)
                })
        } else {
            None
        };

        match next {
            Some(next) => current = next,
            None => {
                let position = start_pos + (end_pos - start_pos) * tmax;
                return Some(RaycastResult {
                    hit: true,
                    hit_fraction: tmax,
                    position,
                    last_poly: current,
                });
            }
        }
    }

    // Loop limit acts as a hit at the last confirmed position.
    Some(RaycastResult {
        hit: true,
        hit_fraction: 0.0,
        position: start_pos,
        last_poly: current,
    })
}

/// An incremental pathfinding query, advanced by the owning mesh.
pub struct SlicedPathQuery {
    pub(crate) search: PathSearch,
}

impl SlicedPathQuery {
    pub fn state(&self) -> SlicedPathState {
        self.search.state()
    }
}
