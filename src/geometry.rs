//! Geometry helpers shared by the spatial and pathfinding queries.
//!
//! All polygon math is 2D in the XZ plane with Y up; heights are interpolated
//! separately. Polygon vertices are wound counter-clockwise around +Y, which
//! the portal and raycast clipping code relies on.

use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that unions as the identity.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Aabb {
        Aabb { min, max }
    }

    /// Smallest box containing every point; [`Aabb::EMPTY`] for no points.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Aabb {
        let mut out = Aabb::EMPTY;
        for p in points {
            out.min = out.min.min(p);
            out.max = out.max.max(p);
        }
        out
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Box of the given half extents centered on `p`.
    pub fn around(p: Vec3, half_extents: Vec3) -> Aabb {
        Aabb {
            min: p - half_extents,
            max: p + half_extents,
        }
    }
}

/// Signed area of the XZ-projected triangle; positive for CCW winding.
#[inline]
pub(crate) fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    acx * abz - abx * acz
}

/// XZ perp-dot of two direction vectors.
#[inline]
fn perp_2d(u: Vec3, v: Vec3) -> f32 {
    u.z * v.x - u.x * v.z
}

#[inline]
pub(crate) fn dist_2d_sqr(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Even-odd point-in-polygon test on the XZ projection.
pub(crate) fn point_in_poly_2d(p: Vec3, verts: &[Vec3]) -> bool {
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Closest point on segment `ab` to `p`, measured in XZ; Y is lerped.
pub(crate) fn closest_point_on_segment_2d(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    let len_sq = dx * dx + dz * dz;
    if len_sq < 1e-12 {
        return a;
    }
    let t = (((p.x - a.x) * dx + (p.z - a.z) * dz) / len_sq).clamp(0.0, 1.0);
    a + (b - a) * t
}

/// Closest point on the polygon's boundary to `p` (XZ metric).
pub(crate) fn closest_point_on_poly_boundary(p: Vec3, verts: &[Vec3]) -> Vec3 {
    let mut best = verts[0];
    let mut best_d = f32::MAX;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let c = closest_point_on_segment_2d(p, verts[j], verts[i]);
        let d = dist_2d_sqr(p, c);
        if d < best_d {
            best_d = d;
            best = c;
        }
        j = i;
    }
    best
}

/// Surface height of the polygon at `p`, interpolated over its triangle fan.
///
/// `None` when `p` falls outside every fan triangle in XZ.
pub(crate) fn poly_height_at(p: Vec3, verts: &[Vec3]) -> Option<f32> {
    let a = verts[0];
    for i in 1..verts.len() - 1 {
        let b = verts[i];
        let c = verts[i + 1];
        let denom = (c.z - b.z) * (a.x - c.x) + (b.x - c.x) * (a.z - c.z);
        if denom.abs() < 1e-12 {
            continue;
        }
        let u = ((c.z - b.z) * (p.x - c.x) + (b.x - c.x) * (p.z - c.z)) / denom;
        let v = ((a.z - c.z) * (p.x - c.x) + (c.x - a.x) * (p.z - c.z)) / denom;
        let w = 1.0 - u - v;
        const TOL: f32 = -1e-4;
        if u >= TOL && v >= TOL && w >= TOL {
            return Some(a.y * u + b.y * v + c.y * w);
        }
    }
    None
}

/// Unsigned XZ area of a convex polygon (triangle fan).
pub(crate) fn poly_surface_area(verts: &[Vec3]) -> f32 {
    let mut area = 0.0;
    for i in 1..verts.len() - 1 {
        area += tri_area_2d(verts[0], verts[i], verts[i + 1]).abs() * 0.5;
    }
    area
}

/// Uniform random point in a triangle from two unit samples.
pub(crate) fn random_point_in_triangle(a: Vec3, b: Vec3, c: Vec3, r1: f32, r2: f32) -> Vec3 {
    let s = r1.sqrt();
    let u = 1.0 - s;
    let v = r2 * s;
    let w = 1.0 - u - v;
    a * u + b * v + c * w
}

/// Clips segment `p..q` against a convex CCW polygon in XZ.
///
/// Returns the entry/exit parameters along the segment and the edge index
/// crossed at each, `-1` when the endpoint lies inside the polygon. `None`
/// when the segment misses the polygon entirely.
pub(crate) fn intersect_segment_poly_2d(
    p: Vec3,
    q: Vec3,
    verts: &[Vec3],
) -> Option<(f32, f32, i32, i32)> {
    const EPS: f32 = 1e-5;

    let mut tmin = 0.0_f32;
    let mut tmax = 1.0_f32;
    let mut seg_min = -1_i32;
    let mut seg_max = -1_i32;

    let dir = q - p;
    let n = verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let edge = verts[i] - verts[j];
        let diff = p - verts[j];
        let side = perp_2d(edge, diff);
        let d = perp_2d(dir, edge);
        if d.abs() < EPS {
            // Segment runs parallel to this edge.
            if side < -EPS {
                return None;
            }
            j = i;
            continue;
        }
        let t = side / d;
        if d < 0.0 {
            // Entering across this edge.
            if t > tmin {
                tmin = t;
                seg_min = j as i32;
                if tmin > tmax {
                    return None;
                }
            }
        } else {
            // Exiting across this edge.
            if t < tmax {
                tmax = t;
                seg_max = j as i32;
                if tmax < tmin {
                    return None;
                }
            }
        }
        j = i;
    }

    Some((tmin, tmax, seg_min, seg_max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Vec3> {
        // CCW around +Y.
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn point_in_poly_detects_interior_and_exterior() {
        let sq = unit_square();
        assert!(point_in_poly_2d(Vec3::new(0.5, 0.0, 0.5), &sq));
        assert!(!point_in_poly_2d(Vec3::new(1.5, 0.0, 0.5), &sq));
    }

    #[test]
    fn winding_is_ccw() {
        let sq = unit_square();
        assert!(tri_area_2d(sq[0], sq[1], sq[2]) > 0.0);
    }

    #[test]
    fn segment_clip_crosses_square() {
        let sq = unit_square();
        let p = Vec3::new(-0.5, 0.0, 0.5);
        let q = Vec3::new(1.5, 0.0, 0.5);
        let (tmin, tmax, seg_min, seg_max) =
            intersect_segment_poly_2d(p, q, &sq).expect("segment crosses");
        assert!((tmin - 0.25).abs() < 1e-5);
        assert!((tmax - 0.75).abs() < 1e-5);
        assert!(seg_min >= 0);
        assert!(seg_max >= 0);
    }

    #[test]
    fn segment_clip_from_inside_has_no_entry_edge() {
        let sq = unit_square();
        let p = Vec3::new(0.5, 0.0, 0.5);
        let q = Vec3::new(2.0, 0.0, 0.5);
        let (tmin, _tmax, seg_min, seg_max) =
            intersect_segment_poly_2d(p, q, &sq).expect("starts inside");
        assert_eq!(tmin, 0.0);
        assert_eq!(seg_min, -1);
        assert!(seg_max >= 0);
    }

    #[test]
    fn height_interpolation_follows_slope() {
        let ramp = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        let h = poly_height_at(Vec3::new(0.5, 0.0, 0.5), &ramp).expect("inside");
        assert!((h - 0.5).abs() < 1e-4);
    }

    #[test]
    fn poly_area_of_unit_square_is_one() {
        assert!((poly_surface_area(&unit_square()) - 1.0).abs() < 1e-5);
    }
}
