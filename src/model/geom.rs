//! Minimal geometry types backing the relation predicates.
//!
//! Everything here is plain `f64` data in a shared world frame. Boxes are
//! axis-aligned; orientation is carried on the node but relation tests
//! treat the OBB as axis-aligned (see the topology kit).

use serde::{Deserialize, Serialize};

/// A point or displacement in the shared scene frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Full 3D Euclidean distance.
    pub fn dist(&self, other: &Vec3) -> f64 {
        let d = self.sub(other);
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    /// Distance in the ground (XY) plane.
    pub fn dist_xy(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

/// Orientation quaternion (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Returns the unit-length version of this quaternion, or `None` for a
    /// degenerate (zero / non-finite) input.
    pub fn normalized(&self) -> Option<Quat> {
        let n = self.norm();
        if !n.is_finite() || n < 1e-9 {
            return None;
        }
        Some(Quat::new(self.x / n, self.y / n, self.z / n, self.w / n))
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl From<[f64; 4]> for Quat {
    fn from(v: [f64; 4]) -> Self {
        Quat::new(v[0], v[1], v[2], v[3])
    }
}

/// Axis-aligned bounding box in world coordinates.
///
/// Invariant: `min` components never exceed their `max` counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Builds a box centered at `center` with full extents `size` (w, d, h).
    pub fn from_center_size(center: &Vec3, size: &Vec3) -> Self {
        let half = Vec3::new(size.x / 2.0, size.y / 2.0, size.z / 2.0);
        Self {
            min: center.sub(&half),
            max: center.add(&half),
        }
    }

    pub fn contains(&self, p: &Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Inclusive overlap test — touching faces count as overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.max.x < other.min.x
            || self.min.x > other.max.x
            || self.max.y < other.min.y
            || self.min.y > other.max.y
            || self.max.z < other.min.z
            || self.min.z > other.max.z)
    }

    /// Area of the XY-projection overlap between two boxes.
    pub fn overlap_area_xy(&self, other: &Aabb) -> f64 {
        let w = (self.max.x.min(other.max.x) - self.min.x.max(other.min.x)).max(0.0);
        let d = (self.max.y.min(other.max.y) - self.min.y.max(other.min.y)).max(0.0);
        w * d
    }

    /// Footprint area of the XY-projection.
    pub fn area_xy(&self) -> f64 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    /// True if the XY-projections of the two boxes overlap at all.
    pub fn overlaps_xy(&self, other: &Aabb) -> bool {
        self.overlap_area_xy(other) > 0.0
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// True if the segment `from → to`, projected to the XY plane, crosses
    /// this box's XY footprint.
    pub fn intersects_segment_xy(&self, from: &Vec3, to: &Vec3) -> bool {
        // Slab test in 2D.
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let mut tmin: f64 = 0.0;
        let mut tmax: f64 = 1.0;

        for (origin, dir, lo, hi) in [
            (from.x, dx, self.min.x, self.max.x),
            (from.y, dy, self.min.y, self.max.y),
        ] {
            if dir.abs() < 1e-12 {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let mut t0 = (lo - origin) / dir;
            let mut t1 = (hi - origin) / dir;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return false;
            }
        }
        true
    }
}
