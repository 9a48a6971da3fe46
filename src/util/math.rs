//! Math type re-exports and scene-specific math utilities.
//!
//! This module re-exports the `glam` types the crate uses and provides
//! bounding boxes and rays in double precision.

pub use glam::{DMat3, DMat4, DVec3};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create from two `[x, y, z]` corners.
    #[inline]
    pub fn from_corners(min: [f64; 3], max: [f64; 3]) -> Self {
        Self::new(DVec3::from_array(min), DVec3::from_array(max))
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Box moved by `offset`. Empty boxes stay empty.
    #[inline]
    pub fn translated(&self, offset: DVec3) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(self.min + offset, self.max + offset)
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// Ray in a node's local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Create a ray. The direction is not normalized.
    #[inline]
    pub const fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray.
    #[inline]
    pub fn point_at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Slab test against a box. Returns the entry parameter on hit.
    pub fn intersect_box(&self, bbox: &BBox3d) -> Option<f64> {
        if bbox.is_empty() {
            return None;
        }
        let inv = self.direction.recip();
        let t0 = (bbox.min - self.origin) * inv;
        let t1 = (bbox.max - self.origin) * inv;
        let t_near = t0.min(t1).max_element();
        let t_far = t0.max(t1).min_element();
        if t_near <= t_far && t_far >= 0.0 {
            Some(t_near.max(0.0))
        } else {
            None
        }
    }
}

/// Result of a closest-point query: position and surface normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub point: DVec3,
    pub normal: DVec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_expand() {
        let mut bbox = BBox3d::EMPTY;
        assert!(bbox.is_empty());

        bbox.expand_by_point(DVec3::new(1.0, 2.0, 3.0));
        bbox.expand_by_point(DVec3::new(-1.0, 0.0, 5.0));

        assert_eq!(bbox.min, DVec3::new(-1.0, 0.0, 3.0));
        assert_eq!(bbox.max, DVec3::new(1.0, 2.0, 5.0));
        assert_eq!(bbox.center(), DVec3::new(0.0, 1.0, 4.0));
    }

    #[test]
    fn test_empty_box_ignored_on_merge() {
        let mut bbox = BBox3d::from_corners([0.0; 3], [1.0; 3]);
        bbox.expand_by_box(&BBox3d::EMPTY);
        assert_eq!(bbox, BBox3d::from_corners([0.0; 3], [1.0; 3]));
        assert!(BBox3d::EMPTY.translated(DVec3::ONE).is_empty());
    }

    #[test]
    fn test_ray_box_hit_and_miss() {
        let bbox = BBox3d::from_corners([-1.0; 3], [1.0; 3]);
        let ray = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::new(0.0, 0.0, -1.0));
        let t = ray.intersect_box(&bbox).unwrap();
        assert!((t - 4.0).abs() < 1e-12);
        assert_eq!(ray.point_at(t), DVec3::new(0.0, 0.0, 1.0));

        let away = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::new(0.0, 0.0, 1.0));
        assert!(away.intersect_box(&bbox).is_none());
    }
}
