//! Immutable tile data blobs.
//!
//! A tile is produced whole by an external generator and handed to the mesh
//! as a single allocation behind an `Arc`. Nothing in here is mutated after
//! construction; regeneration replaces the whole blob.

use glam::Vec3;

use crate::geometry::Aabb;
use crate::{PolyFlags, MAX_VERTS_PER_POLY};

/// Cluster index meaning "this polygon belongs to no cluster".
pub const NO_CLUSTER: u16 = u16::MAX;

/// Placement and bookkeeping for one tile blob.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileHeader {
    /// Grid coordinate along X.
    pub x: i32,
    /// Grid coordinate along Z.
    pub y: i32,
    /// Vertical layer the generator produced this tile for.
    pub layer: i32,
    /// World-space bounds of everything in the tile.
    pub bounds: Aabb,
    /// Size in bytes of the serialized blob, for memory accounting.
    pub data_size: usize,
}

/// What lies on the far side of one polygon edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PortalEdge {
    /// Solid boundary; nothing to cross into.
    Border,
    /// Another polygon in the same tile.
    Internal(u16),
    /// A polygon in a neighboring tile slot.
    External { slot: u32, poly: u16 },
}

/// One convex navigation polygon.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavPoly {
    /// Indices into the tile's vertex pool, CCW around +Y.
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// How many of `verts` are used.
    pub vert_count: u8,
    /// Per-edge adjacency, parallel to `verts`.
    pub neighbors: [PortalEdge; MAX_VERTS_PER_POLY],
    /// Behavior flags.
    pub flags: PolyFlags,
    /// Area type, indexes the filter cost tables.
    pub area: u8,
    /// Cluster this polygon belongs to, [`NO_CLUSTER`] if none.
    pub cluster: u16,
}

impl NavPoly {
    pub fn vert_count(&self) -> usize {
        self.vert_count as usize
    }
}

/// Edge of the cluster graph leading out of a tile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterLink {
    /// Tile slot the linked cluster lives in.
    pub target_slot: u32,
    /// Cluster index within that tile.
    pub target_cluster: u16,
    /// Approximate traversal cost of crossing between the clusters.
    pub cost: f32,
}

/// A connected group of polygons used for coarse hierarchical queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    /// Representative point on the cluster surface.
    pub center: Vec3,
    /// Polygon the center lies on.
    pub center_poly: u16,
    /// Bounds of all member polygons.
    pub bounds: Aabb,
    /// Member polygon indices.
    pub polys: Vec<u16>,
    /// Outgoing edges to clusters in other tiles.
    pub links: Vec<ClusterLink>,
}

/// Complete navigation data for one tile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileData {
    pub header: TileHeader,
    /// Shared vertex pool.
    pub verts: Vec<Vec3>,
    pub polys: Vec<NavPoly>,
    pub clusters: Vec<Cluster>,
}

impl TileData {
    /// Bytes this tile counts against the mesh memory budget.
    pub fn byte_size(&self) -> usize {
        self.header.data_size
    }

    /// Vertex positions of one polygon, in winding order.
    pub fn poly_vertices(&self, poly: &NavPoly) -> Vec<Vec3> {
        poly.verts[..poly.vert_count()]
            .iter()
            .map(|&v| self.verts[v as usize])
            .collect()
    }

    /// Centroid of one polygon.
    pub fn poly_center(&self, poly: &NavPoly) -> Vec3 {
        let mut sum = Vec3::ZERO;
        for &v in &poly.verts[..poly.vert_count()] {
            sum += self.verts[v as usize];
        }
        sum / poly.vert_count() as f32
    }

    /// World bounds of one polygon.
    pub fn poly_bounds(&self, poly: &NavPoly) -> Aabb {
        Aabb::from_points(
            poly.verts[..poly.vert_count()]
                .iter()
                .map(|&v| self.verts[v as usize]),
        )
    }
}
