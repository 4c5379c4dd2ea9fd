// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Provides geometric primitives for visibility culling.
//!
//! An [`Aabb`] bounds geometry, a [`Frustum`] bounds what a camera can see,
//! and [`CullingVolume`] is the seam between them: anything that can say
//! whether a world-space box may be visible can drive culling.

use super::{Mat4, Vec3, Vec4};

/// Represents an Axis-Aligned Bounding Box (AABB).
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An invalid `Aabb` where `min` components are positive infinity and `max` are
    /// negative infinity.
    ///
    /// Merging any valid `Aabb` with `INVALID` yields that valid `Aabb`.
    pub const INVALID: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    /// Creates a new `Aabb` from two corner points, in any order.
    #[inline]
    pub fn from_min_max(min_pt: Vec3, max_pt: Vec3) -> Self {
        Self {
            min: min_pt.min(max_pt),
            max: min_pt.max(max_pt),
        }
    }

    /// Creates an `Aabb` that tightly encloses a given set of points.
    ///
    /// # Returns
    ///
    /// Returns `Some(Aabb)` if the input slice is not empty, otherwise `None`.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self {
            min: *first,
            max: *first,
        };
        for point in rest {
            aabb.min = aabb.min.min(*point);
            aabb.max = aabb.max.max(*point);
        }
        Some(aabb)
    }

    /// Checks if the `Aabb` is valid (i.e., `min` <= `max` on all axes).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Creates a new `Aabb` that encompasses both this `Aabb` and another one.
    #[inline]
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Transforms the box's corners by `transform` and returns the box enclosing them.
    ///
    /// The result is conservative: under rotation it is larger than the
    /// transformed geometry, never smaller.
    pub fn transformed_by(&self, transform: &Mat4) -> Self {
        let corners = self.corners().map(|corner| transform.transform_point(corner));
        let mut aabb = Self {
            min: corners[0],
            max: corners[0],
        };
        for corner in &corners[1..] {
            aabb.min = aabb.min.min(*corner);
            aabb.max = aabb.max.max(*corner);
        }
        aabb
    }
}

/// A plane in Hessian normal form: a point `p` lies on its positive side when
/// `normal.dot(p) + distance >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the kept half-space.
    pub normal: Vec3,
    /// Signed distance term of the plane equation.
    pub distance: f32,
}

impl Plane {
    /// Builds a plane from raw `(a, b, c, d)` coefficients, normalizing them.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length > 0.0 {
            Self {
                normal: normal * (1.0 / length),
                distance: coefficients.w / length,
            }
        } else {
            Self {
                normal,
                distance: coefficients.w,
            }
        }
    }

    /// Returns the signed distance from `point` to the plane.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Something that can decide whether a world-space box may be visible.
pub trait CullingVolume {
    /// Returns `true` unless the box lies entirely outside the volume.
    fn intersects_aabb(&self, aabb: &Aabb) -> bool;
}

/// A camera view volume bounded by six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near and far planes, in that order.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum planes from a `projection * view` matrix.
    ///
    /// Expects a zero-to-one depth range, as produced by
    /// [`Mat4::perspective_rh_zo`] and [`Mat4::orthographic_rh_zo`].
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.get_row(0);
        let r1 = view_projection.get_row(1);
        let r2 = view_projection.get_row(2);
        let r3 = view_projection.get_row(3);

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }
}

impl CullingVolume for Frustum {
    fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal.
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.signed_distance(positive) >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{approx_eq, FRAC_PI_2};

    fn camera_frustum() -> Frustum {
        let projection = Mat4::perspective_rh_zo(FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
            .expect("valid camera");
        Frustum::from_view_projection(&(projection * view))
    }

    #[test]
    fn test_aabb_from_min_max_orders_corners() {
        let aabb = Aabb::from_min_max(Vec3::new(1.0, -1.0, 3.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 3.0));
        assert!(aabb.is_valid());
        assert!(!Aabb::INVALID.is_valid());
    }

    #[test]
    fn test_aabb_from_points() {
        assert!(Aabb::from_points(&[]).is_none());
        let aabb = Aabb::from_points(&[
            Vec3::new(0.0, 5.0, -1.0),
            Vec3::new(2.0, -3.0, 4.0),
            Vec3::new(1.0, 1.0, 1.0),
        ])
        .expect("non-empty");
        assert_eq!(aabb.min, Vec3::new(0.0, -3.0, -1.0));
        assert_eq!(aabb.max, Vec3::new(2.0, 5.0, 4.0));
    }

    #[test]
    fn test_merge_with_invalid_is_identity() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert_eq!(Aabb::INVALID.merge(&aabb), aabb);
    }

    #[test]
    fn test_corners_are_distinct() {
        let corners = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE).corners();
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_transformed_by_rotation_grows_box() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = aabb.transformed_by(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let sqrt2 = std::f32::consts::SQRT_2;
        assert!(approx_eq(rotated.max.x, sqrt2));
        assert!(approx_eq(rotated.max.z, sqrt2));
        assert!(approx_eq(rotated.max.y, 1.0));
    }

    #[test]
    fn test_transformed_by_translation_and_scale() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Mat4::from_scale(Vec3::splat(2.0));
        let world = aabb.transformed_by(&m);
        assert_eq!(world.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(world.max, Vec3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn test_plane_from_coefficients_normalizes() {
        let plane = Plane::from_coefficients(Vec4::new(0.0, 2.0, 0.0, 4.0));
        assert_eq!(plane.normal, Vec3::Y);
        assert!(approx_eq(plane.distance, 2.0));
        assert!(approx_eq(plane.signed_distance(Vec3::ZERO), 2.0));
    }

    #[test]
    fn test_frustum_accepts_box_in_front_of_camera() {
        let frustum = camera_frustum();
        let aabb = Aabb::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_frustum_rejects_box_behind_camera() {
        let frustum = camera_frustum();
        let aabb = Aabb::from_min_max(Vec3::new(-0.5, -0.5, 10.0), Vec3::new(0.5, 0.5, 11.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_frustum_rejects_box_far_to_the_side() {
        let frustum = camera_frustum();
        let aabb = Aabb::from_min_max(Vec3::new(50.0, -0.5, -0.5), Vec3::new(51.0, 0.5, 0.5));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_frustum_accepts_box_straddling_a_plane() {
        let frustum = camera_frustum();
        // Camera at z = 5 with a 90 degree fov sees x in [-5, 5] at the origin.
        let aabb = Aabb::from_min_max(Vec3::new(4.5, -0.5, -0.5), Vec3::new(6.0, 0.5, 0.5));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_frustum_rejects_box_beyond_far_plane() {
        let frustum = camera_frustum();
        let aabb = Aabb::from_min_max(Vec3::new(-1.0, -1.0, -400.0), Vec3::new(1.0, 1.0, -300.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }
}
