//! Versioned binary persistence for a whole mesh.
//!
//! Layout is `[u32 version][u32 block_size][block]`, little-endian. The
//! version gates the block: data older than the oldest compatible version is
//! skipped wholesale (the `block_size` makes that possible without parsing)
//! and reported as [`LoadOutcome::NeedsRebuild`], never as an error. Streams
//! that claim the current version but do not parse are corrupt.

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use tracing::{info, warn};

use crate::geometry::Aabb;
use crate::nav_mesh::{AgentParams, NavMesh, NavMeshParams};
use crate::tile::{Cluster, ClusterLink, NavPoly, PortalEdge, TileData, TileHeader};
use crate::tile_store::TileStore;
use crate::{Error, PolyFlags, Result, MAX_VERTS_PER_POLY};

// Version history: 1 first cut, 2 cluster graph, 3 per-area cost tables,
// 4 tile layers, 5 typed portal edges, 6 agent params in the header,
// 7 tile priorities, 8 wider slot salts, 9 64-bit packed refs.

/// Version written by this build.
pub const VERSION_LATEST: u32 = 9;

/// Oldest version this build still loads. Anything older is skipped and
/// reported as needing a rebuild.
pub const VERSION_MIN_COMPATIBLE: u32 = 9;

/// Result of loading persisted navigation data.
pub enum LoadOutcome {
    /// The stream was current and the mesh is ready to query.
    Loaded(NavMesh),
    /// The stream was valid but stale; regenerate the tiles from source.
    NeedsRebuild,
}

/// Writes the mesh to `w` at [`VERSION_LATEST`].
///
/// A mesh with tile rebuilds in flight cannot be snapshotted consistently;
/// it is written as an empty block that loads as
/// [`LoadOutcome::NeedsRebuild`].
pub fn save_navmesh<W: Write>(mesh: &NavMesh, w: &mut W) -> Result<()> {
    w.write_u32::<LittleEndian>(VERSION_LATEST)?;

    if mesh.pending_rebuild_count() > 0 {
        warn!(
            pending = mesh.pending_rebuild_count(),
            "serializing while tiles rebuild, writing empty navigation block"
        );
        w.write_u32::<LittleEndian>(0)?;
        return Ok(());
    }

    let mut block = Vec::new();
    write_params(&mut block, mesh.params())?;
    mesh.with_store(|store| write_store(&mut block, store))?;

    w.write_u32::<LittleEndian>(block.len() as u32)?;
    w.write_all(&block)?;
    Ok(())
}

/// Reads a mesh previously written by [`save_navmesh`].
pub fn load_navmesh<R: Read>(r: &mut R) -> Result<LoadOutcome> {
    let version = r.read_u32::<LittleEndian>()?;
    let block_size = r.read_u32::<LittleEndian>()? as u64;

    if version < VERSION_MIN_COMPATIBLE || version > VERSION_LATEST {
        // Skip the block so the caller's stream stays positioned.
        std::io::copy(&mut r.take(block_size), &mut std::io::sink())?;
        info!(version, "incompatible navigation data version, skipping");
        return Ok(LoadOutcome::NeedsRebuild);
    }
    if block_size == 0 {
        return Ok(LoadOutcome::NeedsRebuild);
    }

    let mut block = vec![0u8; block_size as usize];
    r.read_exact(&mut block)?;
    let mut cursor = &block[..];

    let params = read_params(&mut cursor)?;
    let store = read_store(&mut cursor, &params)?;
    Ok(LoadOutcome::Loaded(NavMesh::from_parts(params, store)))
}

// ---- params ----------------------------------------------------------

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)?;
    Ok(())
}

fn read_vec3<R: Read>(r: &mut R) -> Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn write_aabb<W: Write>(w: &mut W, b: &Aabb) -> Result<()> {
    write_vec3(w, b.min)?;
    write_vec3(w, b.max)?;
    Ok(())
}

fn read_aabb<R: Read>(r: &mut R) -> Result<Aabb> {
    Ok(Aabb::new(read_vec3(r)?, read_vec3(r)?))
}

fn write_params<W: Write>(w: &mut W, p: &NavMeshParams) -> Result<()> {
    write_aabb(w, &p.bounds)?;
    w.write_i32::<LittleEndian>(p.grid_width)?;
    w.write_i32::<LittleEndian>(p.grid_height)?;
    w.write_f32::<LittleEndian>(p.tile_size)?;
    w.write_f32::<LittleEndian>(p.cell_size)?;
    w.write_f32::<LittleEndian>(p.cell_height)?;
    w.write_f32::<LittleEndian>(p.agent.radius)?;
    w.write_f32::<LittleEndian>(p.agent.height)?;
    w.write_f32::<LittleEndian>(p.agent.max_climb)?;
    w.write_f32::<LittleEndian>(p.agent.max_slope_degrees)?;
    write_vec3(w, p.default_query_extent)?;
    Ok(())
}

fn read_params<R: Read>(r: &mut R) -> Result<NavMeshParams> {
    let bounds = read_aabb(r)?;
    let grid_width = r.read_i32::<LittleEndian>()?;
    let grid_height = r.read_i32::<LittleEndian>()?;
    let tile_size = r.read_f32::<LittleEndian>()?;
    let cell_size = r.read_f32::<LittleEndian>()?;
    let cell_height = r.read_f32::<LittleEndian>()?;
    let agent = AgentParams {
        radius: r.read_f32::<LittleEndian>()?,
        height: r.read_f32::<LittleEndian>()?,
        max_climb: r.read_f32::<LittleEndian>()?,
        max_slope_degrees: r.read_f32::<LittleEndian>()?,
    };
    let default_query_extent = read_vec3(r)?;
    if grid_width < 0 || grid_height < 0 {
        return Err(Error::Corrupted("negative tile grid dimensions".into()));
    }
    Ok(NavMeshParams {
        bounds,
        grid_width,
        grid_height,
        tile_size,
        cell_size,
        cell_height,
        agent,
        default_query_extent,
    })
}

// ---- store -----------------------------------------------------------

fn write_store<W: Write>(w: &mut W, store: &TileStore) -> Result<()> {
    w.write_i32::<LittleEndian>(store.width())?;
    w.write_i32::<LittleEndian>(store.height())?;
    for slot in store.slots() {
        w.write_u32::<LittleEndian>(slot.salt)?;
        match &slot.data {
            Some(data) => {
                w.write_u8(1)?;
                write_tile(w, data)?;
            }
            None => w.write_u8(0)?,
        }
    }
    Ok(())
}

fn read_store<R: Read>(r: &mut R, params: &NavMeshParams) -> Result<TileStore> {
    let width = r.read_i32::<LittleEndian>()?;
    let height = r.read_i32::<LittleEndian>()?;
    if width != params.grid_width || height != params.grid_height {
        return Err(Error::Corrupted(
            "tile grid does not match mesh parameters".into(),
        ));
    }

    let mut store = TileStore::new();
    if width > 0 && height > 0 {
        store.reserve(width, height, |x, y| params_slot_bounds(params, x, y));
        for index in 0..(width * height) as usize {
            let salt = r.read_u32::<LittleEndian>()?;
            let data = match r.read_u8()? {
                0 => None,
                1 => Some(Arc::new(read_tile(r)?)),
                other => {
                    return Err(Error::Corrupted(format!(
                        "bad tile presence marker {other}"
                    )))
                }
            };
            store.restore_slot(index, salt, data);
        }
    }
    Ok(store)
}

fn params_slot_bounds(p: &NavMeshParams, x: i32, y: i32) -> Aabb {
    let min = Vec3::new(
        p.bounds.min.x + x as f32 * p.tile_size,
        p.bounds.min.y,
        p.bounds.min.z + y as f32 * p.tile_size,
    );
    let max = Vec3::new(min.x + p.tile_size, p.bounds.max.y, min.z + p.tile_size);
    Aabb::new(min, max)
}

// ---- tiles -----------------------------------------------------------

fn write_tile<W: Write>(w: &mut W, tile: &TileData) -> Result<()> {
    w.write_i32::<LittleEndian>(tile.header.x)?;
    w.write_i32::<LittleEndian>(tile.header.y)?;
    w.write_i32::<LittleEndian>(tile.header.layer)?;
    write_aabb(w, &tile.header.bounds)?;
    w.write_u64::<LittleEndian>(tile.header.data_size as u64)?;

    w.write_u32::<LittleEndian>(tile.verts.len() as u32)?;
    for &v in &tile.verts {
        write_vec3(w, v)?;
    }

    w.write_u32::<LittleEndian>(tile.polys.len() as u32)?;
    for poly in &tile.polys {
        write_poly(w, poly)?;
    }

    w.write_u32::<LittleEndian>(tile.clusters.len() as u32)?;
    for cluster in &tile.clusters {
        write_cluster(w, cluster)?;
    }
    Ok(())
}

fn read_tile<R: Read>(r: &mut R) -> Result<TileData> {
    let header = TileHeader {
        x: r.read_i32::<LittleEndian>()?,
        y: r.read_i32::<LittleEndian>()?,
        layer: r.read_i32::<LittleEndian>()?,
        bounds: read_aabb(r)?,
        data_size: r.read_u64::<LittleEndian>()? as usize,
    };

    let vert_count = r.read_u32::<LittleEndian>()? as usize;
    let mut verts = Vec::with_capacity(vert_count);
    for _ in 0..vert_count {
        verts.push(read_vec3(r)?);
    }

    let poly_count = r.read_u32::<LittleEndian>()? as usize;
    let mut polys = Vec::with_capacity(poly_count);
    for _ in 0..poly_count {
        let poly = read_poly(r)?;
        for &v in &poly.verts[..poly.vert_count as usize] {
            if v as usize >= verts.len() {
                return Err(Error::Corrupted(format!(
                    "polygon vertex index {v} out of range"
                )));
            }
        }
        polys.push(poly);
    }

    let cluster_count = r.read_u32::<LittleEndian>()? as usize;
    let mut clusters = Vec::with_capacity(cluster_count);
    for _ in 0..cluster_count {
        clusters.push(read_cluster(r)?);
    }

    Ok(TileData {
        header,
        verts,
        polys,
        clusters,
    })
}

fn write_poly<W: Write>(w: &mut W, poly: &NavPoly) -> Result<()> {
    w.write_u8(poly.vert_count)?;
    for &v in &poly.verts {
        w.write_u16::<LittleEndian>(v)?;
    }
    for &edge in &poly.neighbors {
        match edge {
            PortalEdge::Border => w.write_u8(0)?,
            PortalEdge::Internal(poly) => {
                w.write_u8(1)?;
                w.write_u16::<LittleEndian>(poly)?;
            }
            PortalEdge::External { slot, poly } => {
                w.write_u8(2)?;
                w.write_u32::<LittleEndian>(slot)?;
                w.write_u16::<LittleEndian>(poly)?;
            }
        }
    }
    w.write_u16::<LittleEndian>(poly.flags.bits())?;
    w.write_u8(poly.area)?;
    w.write_u16::<LittleEndian>(poly.cluster)?;
    Ok(())
}

fn read_poly<R: Read>(r: &mut R) -> Result<NavPoly> {
    let vert_count = r.read_u8()?;
    if vert_count < 3 || vert_count as usize > MAX_VERTS_PER_POLY {
        return Err(Error::Corrupted(format!(
            "polygon vertex count {vert_count} out of range"
        )));
    }
    let mut verts = [0u16; MAX_VERTS_PER_POLY];
    for v in &mut verts {
        *v = r.read_u16::<LittleEndian>()?;
    }
    let mut neighbors = [PortalEdge::Border; MAX_VERTS_PER_POLY];
    for edge in &mut neighbors {
        *edge = match r.read_u8()? {
            0 => PortalEdge::Border,
            1 => PortalEdge::Internal(r.read_u16::<LittleEndian>()?),
            2 => PortalEdge::External {
                slot: r.read_u32::<LittleEndian>()?,
                poly: r.read_u16::<LittleEndian>()?,
            },
            other => {
                return Err(Error::Corrupted(format!("bad portal edge tag {other}")));
            }
        };
    }
    Ok(NavPoly {
        verts,
        vert_count,
        neighbors,
        flags: PolyFlags(r.read_u16::<LittleEndian>()?),
        area: r.read_u8()?,
        cluster: r.read_u16::<LittleEndian>()?,
    })
}

fn write_cluster<W: Write>(w: &mut W, cluster: &Cluster) -> Result<()> {
    write_vec3(w, cluster.center)?;
    w.write_u16::<LittleEndian>(cluster.center_poly)?;
    write_aabb(w, &cluster.bounds)?;
    w.write_u32::<LittleEndian>(cluster.polys.len() as u32)?;
    for &p in &cluster.polys {
        w.write_u16::<LittleEndian>(p)?;
    }
    w.write_u32::<LittleEndian>(cluster.links.len() as u32)?;
    for link in &cluster.links {
        w.write_u32::<LittleEndian>(link.target_slot)?;
        w.write_u16::<LittleEndian>(link.target_cluster)?;
        w.write_f32::<LittleEndian>(link.cost)?;
    }
    Ok(())
}

fn read_cluster<R: Read>(r: &mut R) -> Result<Cluster> {
    let center = read_vec3(r)?;
    let center_poly = r.read_u16::<LittleEndian>()?;
    let bounds = read_aabb(r)?;
    let poly_count = r.read_u32::<LittleEndian>()? as usize;
    let mut polys = Vec::with_capacity(poly_count);
    for _ in 0..poly_count {
        polys.push(r.read_u16::<LittleEndian>()?);
    }
    let link_count = r.read_u32::<LittleEndian>()? as usize;
    let mut links = Vec::with_capacity(link_count);
    for _ in 0..link_count {
        links.push(ClusterLink {
            target_slot: r.read_u32::<LittleEndian>()?,
            target_cluster: r.read_u16::<LittleEndian>()?,
            cost: r.read_f32::<LittleEndian>()?,
        });
    }
    Ok(Cluster {
        center,
        center_poly,
        bounds,
        polys,
        links,
    })
}
