//! The navigation mesh facade.
//!
//! [`NavMesh`] owns the tile store behind the query gate and exposes every
//! query and tile-management operation. All methods take `&self`; internal
//! locking makes the mesh safe to share across query threads and generator
//! workers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::cluster_graph;
use crate::gate::{BatchQueryScope, TileGate};
use crate::geometry::Aabb;
use crate::path_engine::{
    raycast, NavPath, PathResult, PathSearch, RaycastResult, SlicedPathQuery, SlicedPathState,
};
use crate::query_filter::QueryFilter;
use crate::spatial_query::{self, NavLocation};
use crate::tile::TileData;
use crate::tile_store::TileStore;
use crate::{ClusterRef, PolyRef, SAME_POINT_TOLERANCE_SQ};

/// Properties of the agent the mesh was generated for.
///
/// Queries do not consult these; they are carried so tooling can check that
/// a mesh matches the agent asking questions of it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentParams {
    pub radius: f32,
    pub height: f32,
    pub max_climb: f32,
    pub max_slope_degrees: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        AgentParams {
            radius: 0.6,
            height: 2.0,
            max_climb: 0.9,
            max_slope_degrees: 45.0,
        }
    }
}

/// Static configuration of a navigation mesh.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshParams {
    /// World volume the tile grid covers; tiles partition its XZ footprint.
    pub bounds: Aabb,
    /// Tile columns along X.
    pub grid_width: i32,
    /// Tile rows along Z.
    pub grid_height: i32,
    /// Side length of one square tile in world units.
    pub tile_size: f32,
    /// Horizontal voxel size the generator rasterized at.
    pub cell_size: f32,
    /// Vertical voxel size the generator rasterized at.
    pub cell_height: f32,
    pub agent: AgentParams,
    /// Half extents used to resolve raw query points onto the mesh.
    pub default_query_extent: Vec3,
}

impl Default for NavMeshParams {
    fn default() -> Self {
        NavMeshParams {
            bounds: Aabb::new(Vec3::ZERO, Vec3::ZERO),
            grid_width: 0,
            grid_height: 0,
            tile_size: 64.0,
            cell_size: 0.3,
            cell_height: 0.2,
            agent: AgentParams::default(),
            default_query_extent: Vec3::new(1.0, 2.0, 1.0),
        }
    }
}

impl NavMeshParams {
    fn slot_bounds(&self, x: i32, y: i32) -> Aabb {
        let min = Vec3::new(
            self.bounds.min.x + x as f32 * self.tile_size,
            self.bounds.min.y,
            self.bounds.min.z + y as f32 * self.tile_size,
        );
        let max = Vec3::new(
            min.x + self.tile_size,
            self.bounds.max.y,
            min.z + self.tile_size,
        );
        Aabb::new(min, max)
    }
}

/// A tiled polygonal navigation mesh.
///
/// Queries run on the calling thread; tile swaps from generator workers are
/// serialized against them by an internal gate. See the crate docs for the
/// overall model.
pub struct NavMesh {
    params: NavMeshParams,
    gate: TileGate,
    default_filter: QueryFilter,
    /// Tiles currently being regenerated off-thread.
    pending_rebuilds: AtomicU32,
    rng: Mutex<SmallRng>,
}

impl NavMesh {
    pub fn new(params: NavMeshParams) -> NavMesh {
        let mut store = TileStore::new();
        if params.grid_width > 0 && params.grid_height > 0 {
            let p = params.clone();
            store.reserve(params.grid_width, params.grid_height, |x, y| {
                p.slot_bounds(x, y)
            });
        }
        NavMesh {
            params,
            gate: TileGate::new(store),
            default_filter: QueryFilter::default(),
            pending_rebuilds: AtomicU32::new(0),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub(crate) fn from_parts(params: NavMeshParams, store: TileStore) -> NavMesh {
        NavMesh {
            params,
            gate: TileGate::new(store),
            default_filter: QueryFilter::default(),
            pending_rebuilds: AtomicU32::new(0),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    pub fn default_filter(&self) -> &QueryFilter {
        &self.default_filter
    }

    pub fn set_default_filter(&mut self, filter: QueryFilter) {
        self.default_filter = filter;
    }

    /// Reseeds the sampler behind [`NavMesh::random_point`].
    pub fn set_random_seed(&self, seed: u64) {
        *self.rng.lock() = SmallRng::seed_from_u64(seed);
    }

    // ---- tile management ----------------------------------------------

    /// Sizes the tile grid; idempotent for unchanged dimensions, resets all
    /// tiles otherwise.
    pub fn reserve_tile_grid(&self, width: i32, height: i32) {
        let guard = self.gate.lock();
        let params = &self.params;
        guard
            .write()
            .reserve(width, height, |x, y| params.slot_bounds(x, y));
    }

    pub fn tile_count(&self) -> usize {
        self.gate.lock().read().slot_count()
    }

    /// Marks a tile rebuild as in flight. Pair with
    /// [`NavMesh::notify_new_tile`] or [`NavMesh::cancel_tile_rebuild`].
    pub fn begin_tile_rebuild(&self) {
        self.pending_rebuilds.fetch_add(1, Ordering::SeqCst);
    }

    pub fn cancel_tile_rebuild(&self) {
        self.pending_rebuilds.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending_rebuild_count(&self) -> u32 {
        self.pending_rebuilds.load(Ordering::SeqCst)
    }

    /// Current tile blob in a slot, for a generator to diff against.
    pub fn tile_snapshot(&self, index: usize) -> Option<Arc<TileData>> {
        self.gate.lock().read().tile(index).cloned()
    }

    /// Installs a regenerated tile, completing a rebuild begun with
    /// [`NavMesh::begin_tile_rebuild`].
    ///
    /// `old` is the snapshot the generator built against. The newest
    /// generator output always wins, so `new` is installed even when the
    /// slot changed underneath; `false` then tells the caller its snapshot
    /// was stale. Either way the rebuild is no longer pending.
    pub fn notify_new_tile(
        &self,
        index: usize,
        old: Option<&Arc<TileData>>,
        new: Option<Arc<TileData>>,
    ) -> bool {
        let matched = {
            let guard = self.gate.lock();
            let mut store = guard.write();
            store.swap_tile(index, old, new)
        };
        self.pending_rebuilds.fetch_sub(1, Ordering::SeqCst);
        debug!(index, matched, "tile swapped in");
        matched
    }

    /// Drops the tile in a slot immediately. Refs into it go stale.
    pub fn remove_tile(&self, index: usize) -> Option<Arc<TileData>> {
        let guard = self.gate.lock();
        let mut store = guard.write();
        store.remove_tile(index)
    }

    /// Union of the bounds of all loaded tiles.
    pub fn bounds(&self) -> Aabb {
        self.gate.lock().read().bounds()
    }

    /// World bounds of one slot. Panics when `index` is out of range.
    pub fn tile_bounds(&self, index: usize) -> Aabb {
        self.gate.lock().read().tile_bounds(index)
    }

    /// Grid coordinates of one slot. Panics when `index` is out of range.
    pub fn tile_xy(&self, index: usize) -> (i32, i32) {
        self.gate.lock().read().tile_xy(index)
    }

    /// Flat slot index for grid coordinates. Panics when out of range.
    pub fn tile_index_at(&self, x: i32, y: i32) -> usize {
        self.gate.lock().read().index_at(x, y)
    }

    /// Bytes of tile data currently resident.
    pub fn total_data_size(&self) -> usize {
        self.gate.lock().read().total_data_size()
    }

    /// Reorders rebuild priorities around `origin` (closest first).
    pub fn update_tile_priorities(&self, origin: Vec3) {
        self.gate.lock().write().update_tile_priorities(origin);
    }

    /// Slot indices in rebuild order, closest to the last priority origin
    /// first.
    pub fn tiles_by_priority(&self) -> Vec<usize> {
        self.gate.lock().read().tiles_by_priority()
    }

    /// Blocks until no tile rebuild is in flight.
    pub fn wait_for_pending_rebuilds(&self) {
        while self.pending_rebuilds.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // ---- queries ------------------------------------------------------

    /// Holds the query gate across a burst of queries so no tile swap can
    /// land between them.
    pub fn begin_batch(&self) -> BatchQueryScope<'_> {
        BatchQueryScope::new(self.gate.lock())
    }

    /// Nearest polygon to `center` within `half_extents`.
    pub fn find_nearest_polygon(
        &self,
        center: Vec3,
        half_extents: Vec3,
        filter: &QueryFilter,
    ) -> Option<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        spatial_query::find_nearest_poly(&store, center, half_extents, filter)
    }

    /// Snaps `p` onto the mesh surface within the given vertical extent.
    pub fn project_point(
        &self,
        p: Vec3,
        half_extents: Vec3,
        filter: &QueryFilter,
    ) -> Option<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        spatial_query::project_point(&store, p, half_extents, filter)
    }

    /// Every floor above or below `p` within `vertical_band`, for
    /// multi-story disambiguation.
    pub fn project_point_multi(
        &self,
        p: Vec3,
        vertical_band: f32,
        filter: &QueryFilter,
    ) -> Vec<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        spatial_query::project_point_multi(&store, p, vertical_band, filter)
    }

    /// Uniform random point over the whole walkable surface.
    pub fn random_point(&self, filter: &QueryFilter) -> Option<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        let mut rng = self.rng.lock();
        spatial_query::random_point(&store, &mut *rng, filter)
    }

    /// Uniform random point within `radius` of `center` (XZ metric).
    pub fn random_point_in_radius(
        &self,
        center: Vec3,
        radius: f32,
        filter: &QueryFilter,
    ) -> Option<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        let mut rng = self.rng.lock();
        spatial_query::random_point_in_radius(&store, &mut *rng, center, radius, filter)
    }

    /// All polygons whose bounds overlap `bounds` and pass `filter`.
    pub fn polygons_in_box(&self, bounds: &Aabb, filter: &QueryFilter) -> Vec<PolyRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        spatial_query::query_polygons(&store, bounds, filter)
    }

    /// All polygons reachable from `center` within `max_cost` of accumulated
    /// filter cost.
    pub fn polygons_within_distance(
        &self,
        center: Vec3,
        max_cost: f32,
        filter: &QueryFilter,
    ) -> Vec<PolyRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        spatial_query::polygons_within_distance(&store, center, max_cost, filter)
    }

    /// Whether a reference still resolves against the live tile set.
    pub fn is_valid_ref(&self, r: PolyRef) -> bool {
        self.gate.lock().read().is_valid_ref(r)
    }

    /// Centroid of the referenced polygon.
    pub fn poly_center(&self, r: PolyRef) -> Option<Vec3> {
        let guard = self.gate.lock();
        let store = guard.read();
        let (tile, poly) = store.get_tile_and_poly(r)?;
        Some(tile.poly_center(poly))
    }

    /// Vertices of the referenced polygon, in winding order.
    pub fn poly_vertices(&self, r: PolyRef) -> Option<Vec<Vec3>> {
        let guard = self.gate.lock();
        let store = guard.read();
        let (tile, poly) = store.get_tile_and_poly(r)?;
        Some(tile.poly_vertices(poly))
    }

    /// Area type of the referenced polygon.
    pub fn poly_area(&self, r: PolyRef) -> Option<u8> {
        let guard = self.gate.lock();
        let store = guard.read();
        let (_, poly) = store.get_tile_and_poly(r)?;
        Some(poly.area)
    }

    /// Live refs for every polygon in one tile slot.
    pub fn polys_in_tile(&self, index: usize) -> Vec<PolyRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        match store.tile(index) {
            Some(tile) => (0..tile.polys.len())
                .map(|i| store.make_poly_ref(index, i as u16))
                .collect(),
            None => Vec::new(),
        }
    }

    // ---- pathfinding --------------------------------------------------

    /// Finds a path from `start` to `end`.
    ///
    /// An unreachable `end` yields [`PathResult::PartialSucceeded`] toward
    /// the closest reachable point; an unresolvable endpoint yields
    /// [`PathResult::Failed`].
    pub fn find_path(&self, start: Vec3, end: Vec3, filter: &QueryFilter) -> PathResult {
        self.find_path_internal(start, end, filter, None)
    }

    /// Coarse-then-fine pathfinding.
    ///
    /// Runs a cluster-graph search first and confines the polygon search to
    /// the resulting cluster corridor; falls back to a plain search when the
    /// mesh carries no cluster data. Uses the mesh default filter, as cluster
    /// link costs are precomputed without per-query policies.
    pub fn find_hierarchical_path(&self, start: Vec3, end: Vec3) -> PathResult {
        let filter = self.default_filter.clone();
        let guard = self.gate.lock();
        let allowed = {
            let store = guard.read();
            let start_cluster = spatial_query::find_nearest_poly(
                &store,
                start,
                self.params.default_query_extent,
                &filter,
            )
            .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly));
            let end_cluster = spatial_query::find_nearest_poly(
                &store,
                end,
                self.params.default_query_extent,
                &filter,
            )
            .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly));
            match (start_cluster, end_cluster) {
                (Some(s), Some(e)) => cluster_graph::find_cluster_path(&store, s, e)
                    .map(|path| path.into_iter().collect::<HashSet<_>>()),
                _ => None,
            }
        };
        // Still holding the gate; the polygon search below re-enters it and
        // sees the same tile set the cluster corridor was built from.
        let result = self.find_path_internal(start, end, &filter, allowed);
        drop(guard);
        result
    }

    fn find_path_internal(
        &self,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
        allowed_clusters: Option<HashSet<ClusterRef>>,
    ) -> PathResult {
        let guard = self.gate.lock();
        let store = guard.read();

        // Degenerate request: start and end are the same point.
        if start.distance_squared(end) < SAME_POINT_TOLERANCE_SQ {
            return match spatial_query::find_nearest_poly(
                &store,
                start,
                self.params.default_query_extent,
                filter,
            ) {
                Some(loc) => PathResult::Succeeded(NavPath {
                    corridor: vec![loc.poly],
                    points: vec![loc.position],
                    cost: 0.0,
                    length: 0.0,
                    partial: false,
                }),
                None => PathResult::Failed,
            };
        }

        let Some(start_loc) = spatial_query::find_nearest_poly(
            &store,
            start,
            self.params.default_query_extent,
            filter,
        ) else {
            return PathResult::Failed;
        };
        let Some(end_loc) = spatial_query::find_nearest_poly(
            &store,
            end,
            self.params.default_query_extent,
            filter,
        ) else {
            return PathResult::Failed;
        };

        let mut search = PathSearch::new(
            &store,
            start_loc.poly,
            start_loc.position,
            end_loc.poly,
            end_loc.position,
            filter,
            allowed_clusters,
        );
        while search.advance(&store, 1024) == SlicedPathState::InProgress {}
        search.build_result(&store)
    }

    /// Whether `end` is reachable from `start`; cheaper than building the
    /// full path.
    pub fn test_path(&self, start: Vec3, end: Vec3, filter: &QueryFilter) -> bool {
        matches!(
            self.find_path(start, end, filter),
            PathResult::Succeeded(_)
        )
    }

    /// Length and filter cost of the path between two points, `None` when no
    /// path at all exists. A partial path still reports its own length.
    pub fn path_cost_and_length(
        &self,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
    ) -> Option<(f32, f32)> {
        self.find_path(start, end, filter)
            .path()
            .map(|p| (p.length, p.cost))
    }

    /// Walks a straight line from `start` toward `end` along the surface.
    ///
    /// `None` when `start` cannot be resolved onto the mesh.
    pub fn raycast(&self, start: Vec3, end: Vec3, filter: &QueryFilter) -> Option<RaycastResult> {
        let guard = self.gate.lock();
        let store = guard.read();
        let start_loc =
            spatial_query::find_nearest_poly(&store, start, self.params.default_query_extent, filter)?;
        raycast(&store, start_loc.poly, start_loc.position, end, filter)
    }

    // ---- sliced pathfinding -------------------------------------------

    /// Starts an incremental path search to be advanced with
    /// [`NavMesh::update_sliced_path`].
    pub fn init_sliced_path(
        &self,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
    ) -> SlicedPathQuery {
        let guard = self.gate.lock();
        let store = guard.read();

        let endpoints = spatial_query::find_nearest_poly(
            &store,
            start,
            self.params.default_query_extent,
            filter,
        )
        .zip(spatial_query::find_nearest_poly(
            &store,
            end,
            self.params.default_query_extent,
            filter,
        ));
        let (start_loc, end_loc) = match endpoints {
            Some(pair) => pair,
            None => {
                // Poison the search; its state reports the failure.
                return SlicedPathQuery {
                    search: PathSearch::new(
                        &store,
                        PolyRef::NULL,
                        start,
                        PolyRef::NULL,
                        end,
                        filter,
                        None,
                    ),
                };
            }
        };

        SlicedPathQuery {
            search: PathSearch::new(
                &store,
                start_loc.poly,
                start_loc.position,
                end_loc.poly,
                end_loc.position,
                filter,
                None,
            ),
        }
    }

    /// Runs up to `max_iters` expansions of a sliced search.
    pub fn update_sliced_path(
        &self,
        query: &mut SlicedPathQuery,
        max_iters: usize,
    ) -> SlicedPathState {
        let guard = self.gate.lock();
        let store = guard.read();
        query.search.advance(&store, max_iters)
    }

    /// Builds the result of a finished sliced search.
    pub fn finalize_sliced_path(&self, query: &SlicedPathQuery) -> PathResult {
        let guard = self.gate.lock();
        let store = guard.read();
        query.search.build_result(&store)
    }

    // ---- cluster queries ----------------------------------------------

    /// Cluster under a point, if the mesh there carries cluster data.
    pub fn cluster_at(&self, p: Vec3) -> Option<ClusterRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        let loc = spatial_query::find_nearest_poly(
            &store,
            p,
            self.params.default_query_extent,
            &self.default_filter,
        )?;
        cluster_graph::cluster_of_poly(&store, loc.poly)
    }

    /// Cluster a polygon belongs to, `None` for stale refs or meshes built
    /// without cluster data.
    pub fn poly_cluster(&self, r: PolyRef) -> Option<ClusterRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        cluster_graph::cluster_of_poly(&store, r)
    }

    /// Representative center of a cluster. With `use_center_poly` the
    /// centroid of the cluster's central polygon is returned instead, which
    /// is guaranteed to lie on walkable surface.
    pub fn cluster_center(&self, r: ClusterRef, use_center_poly: bool) -> Option<Vec3> {
        let guard = self.gate.lock();
        let store = guard.read();
        cluster_graph::cluster_center(&store, r, use_center_poly)
    }

    /// Area-weighted random point on the cluster's member polygons.
    pub fn random_point_in_cluster(&self, r: ClusterRef) -> Option<NavLocation> {
        let guard = self.gate.lock();
        let store = guard.read();
        let polys = cluster_graph::cluster_polys(&store, r);
        let mut rng = self.rng.lock();
        spatial_query::random_point_in_polys(&store, &mut *rng, &polys)
    }

    /// Coarse corridor of clusters from `start` to `end`, both endpoints
    /// included. Uses the mesh default filter.
    pub fn find_cluster_path(&self, start: Vec3, end: Vec3) -> Option<Vec<ClusterRef>> {
        let guard = self.gate.lock();
        let store = guard.read();
        let s = spatial_query::find_nearest_poly(
            &store,
            start,
            self.params.default_query_extent,
            &self.default_filter,
        )
        .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly))?;
        let e = spatial_query::find_nearest_poly(
            &store,
            end,
            self.params.default_query_extent,
            &self.default_filter,
        )
        .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly))?;
        cluster_graph::find_cluster_path(&store, s, e)
    }

    /// Fast reachability test on the cluster graph, falling back to a full
    /// polygon search where cluster data is missing.
    pub fn test_cluster_path(&self, start: Vec3, end: Vec3) -> bool {
        {
            let guard = self.gate.lock();
            let store = guard.read();
            let s = spatial_query::find_nearest_poly(
                &store,
                start,
                self.params.default_query_extent,
                &self.default_filter,
            )
            .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly));
            let e = spatial_query::find_nearest_poly(
                &store,
                end,
                self.params.default_query_extent,
                &self.default_filter,
            )
            .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly));
            if let (Some(s), Some(e)) = (s, e) {
                return cluster_graph::test_cluster_path(&store, s, e);
            }
        }
        self.test_path(start, end, &self.default_filter)
    }

    /// All clusters reachable within `max_cost` of the cluster under
    /// `center`.
    pub fn clusters_within_distance(
        &self,
        center: Vec3,
        max_cost: f32,
        include_origin: bool,
    ) -> Vec<ClusterRef> {
        let guard = self.gate.lock();
        let store = guard.read();
        let Some(origin) = spatial_query::find_nearest_poly(
            &store,
            center,
            self.params.default_query_extent,
            &self.default_filter,
        )
        .and_then(|loc| cluster_graph::cluster_of_poly(&store, loc.poly)) else {
            return Vec::new();
        };
        cluster_graph::clusters_within_cost(&store, origin, max_cost, include_origin)
    }

    // ---- internal -----------------------------------------------------

    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&TileStore) -> T) -> T {
        let guard = self.gate.lock();
        let store = guard.read();
        f(&store)
    }
}

impl Drop for NavMesh {
    fn drop(&mut self) {
        // Generators signal completion through the pending counter; tearing
        // the mesh down under them would hand out dangling expectations.
        let mut waited = 0u32;
        while self.pending_rebuilds.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(1));
            waited += 1;
            if waited > 5_000 {
                warn!("dropping navmesh with tile rebuilds still pending");
                break;
            }
        }
    }
}
