// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Shared 3D math: planes, rays, lines and bounding boxes over `f64`.

use std::cmp::Ordering;

use cgmath::{InnerSpace, Vector3};

/// Near-equality tolerance for geometric comparisons.
pub const EPSILON: f64 = 1e-6;

/// Tolerance below which two vertex positions are considered the same point.
pub const SNAP_EPSILON: f64 = 1e-3;

pub fn eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

pub fn zero(a: f64) -> bool {
    a.abs() <= EPSILON
}

pub fn vec_eq(a: Vector3<f64>, b: Vector3<f64>, epsilon: f64) -> bool {
    (a.x - b.x).abs() <= epsilon && (a.y - b.y).abs() <= epsilon && (a.z - b.z).abs() <= epsilon
}

/// Total lexicographic order on positions, used to key handle maps and to
/// break picking ties deterministically.
pub fn lexicographic_cmp(a: Vector3<f64>, b: Vector3<f64>) -> Ordering {
    for i in 0..3 {
        match a[i].partial_cmp(&b[i]) {
            Some(Ordering::Equal) | None => continue,
            Some(order) => return order,
        }
    }
    Ordering::Equal
}

/// Returns the index of the component of `v` with the largest magnitude.
pub fn dominant_axis(v: Vector3<f64>) -> usize {
    let (mut axis, mut max) = (0, v.x.abs());
    if v.y.abs() > max {
        axis = 1;
        max = v.y.abs();
    }
    if v.z.abs() > max {
        axis = 2;
    }
    axis
}

/// Determines if the given points are collinear within `EPSILON`.
pub fn collinear(p1: Vector3<f64>, p2: Vector3<f64>, p3: Vector3<f64>) -> bool {
    (p3 - p1).cross(p2 - p1).magnitude2() <= EPSILON * EPSILON
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    Back,
    On,
}

/// A plane in normal/distance form: points `p` with `normal · p == distance`
/// lie on the plane, points in front lie along the normal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, distance: f64) -> Plane {
        Plane { normal, distance }
    }

    /// Derives the plane containing the three given points.
    ///
    /// The winding follows the Quake map format: the points are listed
    /// clockwise when viewed from the front, so the normal is
    /// `(p3 - p1) × (p2 - p1)`, normalized. Returns `None` if the points
    /// are collinear.
    pub fn from_points(p1: Vector3<f64>, p2: Vector3<f64>, p3: Vector3<f64>) -> Option<Plane> {
        let cross = (p3 - p1).cross(p2 - p1);
        if cross.magnitude2() <= EPSILON * EPSILON {
            return None;
        }

        let normal = cross.normalize();
        Some(Plane {
            normal,
            distance: normal.dot(p1),
        })
    }

    /// Signed distance from the plane to the given point, positive in front.
    pub fn point_dist(&self, point: Vector3<f64>) -> f64 {
        self.normal.dot(point) - self.distance
    }

    /// Classifies a point with an `EPSILON` band around the plane.
    pub fn point_side(&self, point: Vector3<f64>) -> PlaneSide {
        let dist = self.point_dist(point);
        if dist > EPSILON {
            PlaneSide::Front
        } else if dist < -EPSILON {
            PlaneSide::Back
        } else {
            PlaneSide::On
        }
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project(&self, point: Vector3<f64>) -> Vector3<f64> {
        point - self.normal * self.point_dist(point)
    }

    pub fn translate(&self, delta: Vector3<f64>) -> Plane {
        Plane {
            normal: self.normal,
            distance: self.distance + self.normal.dot(delta),
        }
    }

    /// Solves for the x coordinate of the plane point with the given y and z.
    pub fn x_at(&self, y: f64, z: f64) -> f64 {
        (self.distance - self.normal.y * y - self.normal.z * z) / self.normal.x
    }

    pub fn y_at(&self, x: f64, z: f64) -> f64 {
        (self.distance - self.normal.x * x - self.normal.z * z) / self.normal.y
    }

    pub fn z_at(&self, x: f64, y: f64) -> f64 {
        (self.distance - self.normal.x * x - self.normal.y * y) / self.normal.z
    }

    /// Distance along `ray` to the intersection with this plane, if the ray
    /// hits it at a non-negative distance.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f64> {
        let denom = self.normal.dot(ray.direction);
        if zero(denom) {
            return None;
        }

        let dist = (self.distance - self.normal.dot(ray.origin)) / denom;
        if dist < 0.0 {
            None
        } else {
            Some(dist)
        }
    }

    /// Intersects the segment from `start` to `end` with the plane.
    ///
    /// Returns the crossover ratio along the segment and the crossover point.
    /// Segments entirely on one side (or within the plane) yield `None`.
    pub fn intersect_segment(
        &self,
        start: Vector3<f64>,
        end: Vector3<f64>,
    ) -> Option<(f64, Vector3<f64>)> {
        let start_dist = self.point_dist(start);
        let end_dist = self.point_dist(end);
        if start_dist.signum() == end_dist.signum() || eq(start_dist, end_dist) {
            return None;
        }

        let ratio = start_dist / (start_dist - end_dist);
        Some((ratio, start + (end - start) * ratio))
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Creates a ray with the given origin and direction. The direction is
    /// normalized so that intersection results are distances in world units.
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Ray {
        Ray {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at_distance(&self, distance: f64) -> Vector3<f64> {
        self.origin + self.direction * distance
    }

    /// Distance to the nearest intersection with the sphere at `center` with
    /// the given radius, or `None` if the ray misses or the sphere lies
    /// behind the origin.
    pub fn intersect_sphere(&self, center: Vector3<f64>, radius: f64) -> Option<f64> {
        let diff = self.origin - center;
        let b = 2.0 * self.direction.dot(diff);
        let c = diff.magnitude2() - radius * radius;

        let discriminant = b * b - 4.0 * c;
        if discriminant < 0.0 {
            return None;
        }

        let root = discriminant.sqrt();
        let near = (-b - root) / 2.0;
        if near >= 0.0 {
            return Some(near);
        }

        let far = (-b + root) / 2.0;
        if far >= 0.0 {
            Some(far)
        } else {
            None
        }
    }
}

/// An infinite line, for snapping drag handles along an axis of movement.
#[derive(Copy, Clone, Debug)]
pub struct Line {
    pub point: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl Line {
    pub fn new(point: Vector3<f64>, direction: Vector3<f64>) -> Line {
        Line {
            point,
            direction: direction.normalize(),
        }
    }

    pub fn point_at_distance(&self, distance: f64) -> Vector3<f64> {
        self.point + self.direction * distance
    }

    /// Orthogonal projection of `p` onto the line.
    pub fn project(&self, p: Vector3<f64>) -> Vector3<f64> {
        self.point_at_distance(self.distance_to(p))
    }

    /// Signed distance along the line of the projection of `p`.
    pub fn distance_to(&self, p: Vector3<f64>) -> f64 {
        self.direction.dot(p - self.point)
    }
}

/// An axis-aligned bounding box. `min[i] <= max[i]` holds for all axes of a
/// well-formed box; boxes produced by `empty()` invert that so that merging
/// the first point initializes them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BBox {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BBox {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> BBox {
        debug_assert!(min.x <= max.x && min.y <= max.y && min.z <= max.z);
        BBox { min, max }
    }

    /// A degenerate box that any merged point will overwrite.
    pub fn empty() -> BBox {
        BBox {
            min: Vector3::new(::std::f64::MAX, ::std::f64::MAX, ::std::f64::MAX),
            max: Vector3::new(::std::f64::MIN, ::std::f64::MIN, ::std::f64::MIN),
        }
    }

    pub fn merge_point(&mut self, point: Vector3<f64>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) / 2.0
    }

    pub fn contains_point(&self, point: Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] - EPSILON && point[i] <= self.max[i] + EPSILON)
    }

    /// The eight corners, in lexicographic order of (x, y, z) selection.
    pub fn vertices(&self) -> [Vector3<f64>; 8] {
        let (n, x) = (self.min, self.max);
        [
            Vector3::new(n.x, n.y, n.z),
            Vector3::new(n.x, n.y, x.z),
            Vector3::new(n.x, x.y, n.z),
            Vector3::new(n.x, x.y, x.z),
            Vector3::new(x.x, n.y, n.z),
            Vector3::new(x.x, n.y, x.z),
            Vector3::new(x.x, x.y, n.z),
            Vector3::new(x.x, x.y, x.z),
        ]
    }

    /// The six bounding planes with outward-facing normals.
    pub fn planes(&self) -> [Plane; 6] {
        [
            Plane::new(Vector3::new(1.0, 0.0, 0.0), self.max.x),
            Plane::new(Vector3::new(-1.0, 0.0, 0.0), -self.min.x),
            Plane::new(Vector3::new(0.0, 1.0, 0.0), self.max.y),
            Plane::new(Vector3::new(0.0, -1.0, 0.0), -self.min.y),
            Plane::new(Vector3::new(0.0, 0.0, 1.0), self.max.z),
            Plane::new(Vector3::new(0.0, 0.0, -1.0), -self.min.z),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::Zero;

    #[test]
    fn test_plane_from_points_axis() {
        // floor plane of a worldspawn brush, clockwise seen from above
        let plane = Plane::from_points(
            Vector3::zero(),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(plane.normal, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(plane.distance, 0.0);
    }

    #[test]
    fn test_plane_from_points_collinear() {
        assert!(Plane::from_points(
            Vector3::zero(),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(2.0, 2.0, 2.0),
        )
        .is_none());
    }

    #[test]
    fn test_plane_point_side() {
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), 1.0);
        assert_eq!(plane.point_side(Vector3::new(2.0, 0.0, 0.0)), PlaneSide::Front);
        assert_eq!(plane.point_side(Vector3::new(-2.0, 0.0, 0.0)), PlaneSide::Back);
        assert_eq!(plane.point_side(Vector3::new(1.0, 5.0, -3.0)), PlaneSide::On);
    }

    #[test]
    fn test_plane_segment_intersection() {
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), 1.0);
        let (ratio, point) = plane
            .intersect_segment(Vector3::new(0.0, 0.5, 0.5), Vector3::new(2.0, 0.5, 0.5))
            .unwrap();
        assert_eq!(ratio, 0.5);
        assert_eq!(point, Vector3::new(1.0, 0.5, 0.5));

        assert!(plane
            .intersect_segment(Vector3::new(2.0, 0.0, 0.0), Vector3::new(3.0, 0.0, 0.0))
            .is_none());
    }

    #[test]
    fn test_ray_sphere() {
        let ray = Ray::new(Vector3::new(-10.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let dist = ray.intersect_sphere(Vector3::zero(), 1.0).unwrap();
        assert!(eq(dist, 9.0));

        // origin inside the sphere hits the far side
        let inside = Ray::new(Vector3::zero(), Vector3::new(1.0, 0.0, 0.0));
        assert!(eq(inside.intersect_sphere(Vector3::zero(), 1.0).unwrap(), 1.0));

        let miss = Ray::new(Vector3::new(-10.0, 5.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(miss.intersect_sphere(Vector3::zero(), 1.0).is_none());
    }

    #[test]
    fn test_bbox_planes_face_outward() {
        let bounds = BBox::new(Vector3::new(-8.0, -8.0, -8.0), Vector3::new(8.0, 8.0, 8.0));
        for plane in bounds.planes().iter() {
            assert_eq!(plane.point_side(Vector3::zero()), PlaneSide::Back);
            assert_eq!(
                plane.point_side(plane.normal * 16.0),
                PlaneSide::Front,
            );
        }
    }

    #[test]
    fn test_lexicographic_cmp() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(1.0, 2.0, 4.0);
        assert_eq!(lexicographic_cmp(a, b), Ordering::Less);
        assert_eq!(lexicographic_cmp(b, a), Ordering::Greater);
        assert_eq!(lexicographic_cmp(a, a), Ordering::Equal);
    }

    #[test]
    fn test_line_project() {
        let line = Line::new(Vector3::zero(), Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(line.project(Vector3::new(3.0, 7.0, -2.0)), Vector3::new(0.0, 7.0, 0.0));
        assert!(eq(line.distance_to(Vector3::new(3.0, 7.0, -2.0)), 7.0));
    }
}
