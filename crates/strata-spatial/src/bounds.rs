//! Bounding volumes used for distance estimation and frustum culling.

use glam::DVec3;

/// Spatial extent of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundingVolume {
    /// Axis-aligned box given by its minimum and maximum corners.
    Aabb {
        /// Minimum corner.
        min: DVec3,
        /// Maximum corner.
        max: DVec3,
    },
    /// Sphere given by center and radius.
    Sphere {
        /// Sphere center.
        center: DVec3,
        /// Sphere radius.
        radius: f64,
    },
}

impl BoundingVolume {
    /// Create an AABB from two corners.
    #[must_use]
    pub fn aabb(min: DVec3, max: DVec3) -> Self {
        BoundingVolume::Aabb {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Create a bounding sphere.
    #[must_use]
    pub fn sphere(center: DVec3, radius: f64) -> Self {
        BoundingVolume::Sphere {
            center,
            radius: radius.abs(),
        }
    }

    /// Center of the volume.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        match *self {
            BoundingVolume::Aabb { min, max } => (min + max) * 0.5,
            BoundingVolume::Sphere { center, .. } => center,
        }
    }

    /// Distance from `point` to the nearest point of the volume (0 when inside).
    #[must_use]
    pub fn distance_to(&self, point: DVec3) -> f64 {
        match *self {
            BoundingVolume::Aabb { min, max } => {
                let closest = point.clamp(min, max);
                closest.distance(point)
            }
            BoundingVolume::Sphere { center, radius } => (center.distance(point) - radius).max(0.0),
        }
    }

    /// The sub-volume of quadrant `index` (bit 0 = x half, bit 1 = y half).
    ///
    /// Spheres are split through their bounding box.
    #[must_use]
    pub fn quadrant(&self, index: u8) -> Self {
        let (min, max) = self.corners();
        let mid = (min + max) * 0.5;
        let (x0, x1) = if index & 1 == 0 { (min.x, mid.x) } else { (mid.x, max.x) };
        let (y0, y1) = if index & 2 == 0 { (min.y, mid.y) } else { (mid.y, max.y) };
        BoundingVolume::aabb(DVec3::new(x0, y0, min.z), DVec3::new(x1, y1, max.z))
    }

    /// The sub-volume of octant `index` (bit 0 = x, bit 1 = y, bit 2 = z half).
    #[must_use]
    pub fn octant(&self, index: u8) -> Self {
        let (min, max) = self.corners();
        let mid = (min + max) * 0.5;
        let pick = |bit: u8, lo: f64, mid: f64, hi: f64| {
            if index & bit == 0 { (lo, mid) } else { (mid, hi) }
        };
        let (x0, x1) = pick(1, min.x, mid.x, max.x);
        let (y0, y1) = pick(2, min.y, mid.y, max.y);
        let (z0, z1) = pick(4, min.z, mid.z, max.z);
        BoundingVolume::aabb(DVec3::new(x0, y0, z0), DVec3::new(x1, y1, z1))
    }

    /// Minimum and maximum corners of the volume's bounding box.
    #[must_use]
    pub fn corners(&self) -> (DVec3, DVec3) {
        match *self {
            BoundingVolume::Aabb { min, max } => (min, max),
            BoundingVolume::Sphere { center, radius } => {
                (center - DVec3::splat(radius), center + DVec3::splat(radius))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points inside a volume are at distance zero.
    #[test]
    fn test_inside_point_has_zero_distance() {
        let aabb = BoundingVolume::aabb(DVec3::ZERO, DVec3::splat(10.0));
        assert_eq!(aabb.distance_to(DVec3::splat(5.0)), 0.0);
        let sphere = BoundingVolume::sphere(DVec3::ZERO, 3.0);
        assert_eq!(sphere.distance_to(DVec3::new(1.0, 1.0, 0.0)), 0.0);
    }

    /// Distances are measured to the nearest surface point.
    #[test]
    fn test_outside_distance() {
        let aabb = BoundingVolume::aabb(DVec3::ZERO, DVec3::splat(10.0));
        assert!((aabb.distance_to(DVec3::new(13.0, 14.0, 5.0)) - 5.0).abs() < 1e-12);
        let sphere = BoundingVolume::sphere(DVec3::ZERO, 3.0);
        assert!((sphere.distance_to(DVec3::new(0.0, 0.0, 10.0)) - 7.0).abs() < 1e-12);
    }

    /// Octants partition the parent box.
    #[test]
    fn test_octants_partition_parent() {
        let parent = BoundingVolume::aabb(DVec3::ZERO, DVec3::splat(8.0));
        let volume: f64 = (0..8)
            .map(|i| {
                let (min, max) = parent.octant(i).corners();
                let size = max - min;
                size.x * size.y * size.z
            })
            .sum();
        assert!((volume - 512.0).abs() < 1e-9);
        assert_eq!(parent.octant(7).corners(), (DVec3::splat(4.0), DVec3::splat(8.0)));
    }

    /// Quadrants keep the full depth of the parent.
    #[test]
    fn test_quadrant_keeps_depth() {
        let parent = BoundingVolume::aabb(DVec3::ZERO, DVec3::new(4.0, 4.0, 1.0));
        let (min, max) = parent.quadrant(3).corners();
        assert_eq!(min, DVec3::new(2.0, 2.0, 0.0));
        assert_eq!(max, DVec3::new(4.0, 4.0, 1.0));
    }
}
