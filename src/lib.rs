//! Tiled polygonal navigation mesh for worlds that rebuild themselves.
//!
//! The mesh is a grid of rectangular tiles, each holding an immutable blob of
//! connected convex polygons produced by an external tile generator. Queries
//! (nearest polygon, pathfinding, raycasts, random sampling) run synchronously
//! on the calling thread while generator workers swap regenerated tiles in
//! from the side; a single re-entrant gate keeps the two from ever observing
//! a torn tile.
//!
//! Entry point is [`NavMesh`]. A typical frame looks like:
//!
//! ```no_run
//! use tilenav::{NavMesh, NavMeshParams, QueryFilter};
//! use glam::Vec3;
//!
//! let mesh = NavMesh::new(NavMeshParams::default());
//! let filter = QueryFilter::default();
//!
//! let _batch = mesh.begin_batch();
//! let result = mesh.find_path(Vec3::ZERO, Vec3::new(10.0, 0.0, 4.0), &filter);
//! if let Some(path) = result.path() {
//!     for point in &path.points {
//!         // feed the steering system
//!         let _ = point;
//!     }
//! }
//! ```
//!
//! Pathfinding failure is an ordinary value, never a panic or an `Err`: an
//! unreachable goal yields [`PathResult::PartialSucceeded`] ending at the
//! closest reachable point, and only an unresolvable start point yields
//! [`PathResult::Failed`].

mod binary_format;
mod cluster_graph;
mod gate;
mod geometry;
mod nav_mesh;
mod nav_ref;
mod node_pool;
mod path_engine;
mod query_filter;
mod spatial_query;
mod tile;
mod tile_store;

#[cfg(test)]
mod test_mesh_helpers;

#[cfg(test)]
mod cluster_tests;
#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod serialization_tests;
#[cfg(test)]
mod tile_store_tests;

pub use binary_format::{
    load_navmesh, save_navmesh, LoadOutcome, VERSION_LATEST, VERSION_MIN_COMPATIBLE,
};
pub use gate::BatchQueryScope;
pub use geometry::Aabb;
pub use nav_mesh::{AgentParams, NavMesh, NavMeshParams};
pub use nav_ref::{ClusterRef, PolyRef};
pub use path_engine::{NavPath, PathResult, RaycastResult, SlicedPathQuery, SlicedPathState};
pub use query_filter::{NamedFilter, QueryFilter};
pub use spatial_query::NavLocation;
pub use tile::{Cluster, ClusterLink, NavPoly, PortalEdge, TileData, TileHeader, NO_CLUSTER};
pub use tile_store::TileStore;

/// Maximum number of vertices a navigation polygon may have.
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Number of distinct area types a mesh can carry.
pub const AREA_COUNT: usize = 64;

/// Area id assigned to plain walkable surface by the generator.
pub const DEFAULT_AREA: u8 = (AREA_COUNT - 1) as u8;

/// Area cost at or above which a polygon is treated as unwalkable.
pub const UNWALKABLE_COST: f32 = f32::MAX;

/// Two query points closer than this (squared) are the same point.
pub(crate) const SAME_POINT_TOLERANCE_SQ: f32 = 1.0e-8;

/// Per-polygon behavior flags.
///
/// The top bit is reserved: it marks polygons that represent traversal links
/// (jump-downs, teleporters) rather than walkable surface, so filters can
/// exclude them wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyFlags(pub u16);

impl PolyFlags {
    /// Ordinary walkable surface.
    pub const WALK: PolyFlags = PolyFlags(0x0001);
    /// The polygon stands in for a traversal link, not surface.
    pub const NAV_LINK: PolyFlags = PolyFlags(1 << 15);

    pub const fn empty() -> PolyFlags {
        PolyFlags(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: PolyFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: PolyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PolyFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PolyFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for PolyFlags {
    type Output = PolyFlags;

    fn bitor(self, rhs: PolyFlags) -> PolyFlags {
        PolyFlags(self.0 | rhs.0)
    }
}

/// Error types for the crate.
///
/// Expected query misses (no polygon in range, unreachable goal) are *not*
/// errors; they surface as `Option`/[`PathResult`] values. `Error` is
/// reserved for I/O and malformed persisted data.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("navigation data is corrupted: {0}")]
    Corrupted(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, Error>;
