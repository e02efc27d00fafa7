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

//! The editing grid: power-of-two cell size and snapping.

use crate::edit::notify::Notifier;
use crate::math::{self, BBox, Line, Plane, Ray};
use crate::prefs::PreferenceStore;

use cgmath::{InnerSpace, Vector3};

pub const MIN_SIZE: i32 = -3;
pub const MAX_SIZE: i32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SnapDir {
    Nearest,
    Ceil,
    Floor,
}

pub struct Grid {
    /// Log2 of the cell size.
    size: i32,
    snap: bool,
    visible: bool,
    pub grid_did_change: Notifier<()>,
}

impl Default for Grid {
    fn default() -> Grid {
        Grid::new(4)
    }
}

impl Grid {
    pub fn new(size: i32) -> Grid {
        assert!(size >= MIN_SIZE && size <= MAX_SIZE);
        Grid {
            size,
            snap: true,
            visible: true,
            grid_did_change: Notifier::new(),
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn set_size(&mut self, size: i32) {
        assert!(size >= MIN_SIZE && size <= MAX_SIZE);
        self.size = size;
        self.grid_did_change.notify(());
    }

    pub fn inc_size(&mut self) {
        if self.size < MAX_SIZE {
            self.size += 1;
            self.grid_did_change.notify(());
        }
    }

    pub fn dec_size(&mut self) {
        if self.size > MIN_SIZE {
            self.size -= 1;
            self.grid_did_change.notify(());
        }
    }

    /// The grid cell size in world units, or 1 when snapping is off.
    pub fn actual_size(&self) -> f64 {
        if self.snap {
            (self.size as f64).exp2()
        } else {
            1.0
        }
    }

    /// Rotation snap increment (15 degrees), in radians.
    pub fn angle(&self) -> f64 {
        15f64.to_radians()
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn toggle_visible(&mut self) {
        self.visible = !self.visible;
        self.grid_did_change.notify(());
    }

    pub fn snap_enabled(&self) -> bool {
        self.snap
    }

    pub fn toggle_snap(&mut self) {
        self.snap = !self.snap;
        self.grid_did_change.notify(());
    }

    pub fn snap_angle(&self, a: f64) -> f64 {
        if !self.snap {
            return a;
        }
        self.angle() * (a / self.angle() + 0.5).floor()
    }

    fn snap_dir(&self, f: f64, dir: SnapDir, skip: bool) -> f64 {
        if !self.snap {
            return f;
        }

        let size = self.actual_size();
        match dir {
            // ties snap toward positive infinity
            SnapDir::Nearest => size * (f / size + 0.5).floor(),
            SnapDir::Ceil => {
                let s = size * (f / size).ceil();
                if skip && math::eq(s, f) {
                    s + size
                } else {
                    s
                }
            }
            SnapDir::Floor => {
                let s = size * (f / size).floor();
                if skip && math::eq(s, f) {
                    s - size
                } else {
                    s
                }
            }
        }
    }

    /// Snaps to the nearest grid multiple, ties toward positive infinity.
    pub fn snap(&self, f: f64) -> f64 {
        self.snap_dir(f, SnapDir::Nearest, false)
    }

    /// Distance from the value to its snapped position.
    pub fn offset(&self, f: f64) -> f64 {
        if !self.snap {
            return 0.0;
        }
        f - self.snap(f)
    }

    /// Snaps away from zero, optionally skipping a value already on the
    /// grid.
    pub fn snap_up(&self, f: f64, skip: bool) -> f64 {
        if f >= 0.0 {
            self.snap_dir(f, SnapDir::Ceil, skip)
        } else {
            self.snap_dir(f, SnapDir::Floor, skip)
        }
    }

    /// Snaps toward zero, optionally skipping a value already on the grid.
    pub fn snap_down(&self, f: f64, skip: bool) -> f64 {
        if f >= 0.0 {
            self.snap_dir(f, SnapDir::Floor, skip)
        } else {
            self.snap_dir(f, SnapDir::Ceil, skip)
        }
    }

    pub fn snap_vec(&self, p: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(self.snap(p.x), self.snap(p.y), self.snap(p.z))
    }

    pub fn offset_vec(&self, p: Vector3<f64>) -> Vector3<f64> {
        if !self.snap {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        p - self.snap_vec(p)
    }

    /// Snaps each component along the sign of the corresponding component
    /// of the drag direction `d`.
    pub fn snap_towards(&self, p: Vector3<f64>, d: Vector3<f64>, skip: bool) -> Vector3<f64> {
        let mut result = p;
        for i in 0..3 {
            result[i] = if d[i] > 0.0 {
                self.snap_dir(p[i], SnapDir::Ceil, skip)
            } else if d[i] < 0.0 {
                self.snap_dir(p[i], SnapDir::Floor, skip)
            } else {
                self.snap(p[i])
            };
        }
        result
    }

    fn snap_on_plane_dirs(
        &self,
        p: Vector3<f64>,
        plane: &Plane,
        dirs: [SnapDir; 3],
        skip: bool,
    ) -> Vector3<f64> {
        if !self.snap {
            return p;
        }

        let mut result = p;
        match math::dominant_axis(plane.normal) {
            0 => {
                result.y = self.snap_dir(p.y, dirs[1], skip);
                result.z = self.snap_dir(p.z, dirs[2], skip);
                result.x = plane.x_at(result.y, result.z);
            }
            1 => {
                result.x = self.snap_dir(p.x, dirs[0], skip);
                result.z = self.snap_dir(p.z, dirs[2], skip);
                result.y = plane.y_at(result.x, result.z);
            }
            _ => {
                result.x = self.snap_dir(p.x, dirs[0], skip);
                result.y = self.snap_dir(p.y, dirs[1], skip);
                result.z = plane.z_at(result.x, result.y);
            }
        }
        result
    }

    /// Snaps the two grid-friendly axes and projects the third back onto
    /// the plane.
    pub fn snap_on_plane(&self, p: Vector3<f64>, plane: &Plane) -> Vector3<f64> {
        self.snap_on_plane_dirs(
            p,
            plane,
            [SnapDir::Nearest, SnapDir::Nearest, SnapDir::Nearest],
            false,
        )
    }

    pub fn snap_towards_on_plane(
        &self,
        p: Vector3<f64>,
        plane: &Plane,
        d: Vector3<f64>,
        skip: bool,
    ) -> Vector3<f64> {
        let dir = |v: f64| {
            if v > 0.0 {
                SnapDir::Ceil
            } else if v < 0.0 {
                SnapDir::Floor
            } else {
                SnapDir::Nearest
            }
        };
        self.snap_on_plane_dirs(p, plane, [dir(d.x), dir(d.y), dir(d.z)], skip)
    }

    /// Finds the line point closest to `p` with at least one coordinate on
    /// the grid.
    pub fn snap_on_line(&self, p: Vector3<f64>, line: &Line) -> Vector3<f64> {
        if !self.snap {
            return p;
        }

        let projected = line.project(p);
        let projected_dist = line.distance_to(projected);

        let mut result = projected;
        let mut best_diff = ::std::f64::MAX;
        for i in 0..3 {
            if line.direction[i] != 0.0 {
                let candidates = [
                    self.snap_dir(projected[i], SnapDir::Floor, false) - line.point[i],
                    self.snap_dir(projected[i], SnapDir::Ceil, false) - line.point[i],
                ];
                for &candidate in candidates.iter() {
                    let dist = candidate / line.direction[i];
                    let diff = (dist - projected_dist).abs();
                    if diff < best_diff {
                        result = line.point_at_distance(dist);
                        best_diff = diff;
                    }
                }
            }
        }
        result
    }

    /// Snaps onto the segment between `start` and `end`, or `None` when the
    /// snapped point falls outside it.
    pub fn snap_on_edge(
        &self,
        p: Vector3<f64>,
        start: Vector3<f64>,
        end: Vector3<f64>,
    ) -> Option<Vector3<f64>> {
        let vec = end - start;
        let length = vec.magnitude();
        if length <= math::EPSILON {
            return None;
        }

        let line = Line::new(start, vec / length);
        let snapped = self.snap_on_line(p, &line);
        let dist = line.distance_to(snapped);
        if dist < 0.0 || dist > length {
            None
        } else {
            Some(snapped)
        }
    }

    /// Distance along the ray to the nearest grid plane, skipping the
    /// given number of grid lines ahead.
    pub fn intersect_with_ray(&self, ray: &Ray, skip: usize) -> Option<f64> {
        let mut anchor = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            anchor[i] = if ray.direction[i] > 0.0 {
                self.snap_dir(ray.origin[i], SnapDir::Ceil, true) + skip as f64 * self.actual_size()
            } else {
                self.snap_dir(ray.origin[i], SnapDir::Floor, true)
                    - skip as f64 * self.actual_size()
            };
        }

        let mut best: Option<f64> = None;
        let axes = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        for axis in axes.iter() {
            let plane = Plane::new(*axis, anchor.dot(*axis));
            if let Some(dist) = plane.intersect_ray(ray) {
                if best.map_or(true, |b| dist.abs() < b.abs()) {
                    best = Some(dist);
                }
            }
        }
        best
    }

    /// Constrains a point drag so the result lands on the grid without
    /// overshooting the requested delta.
    pub fn move_delta_point(&self, point: Vector3<f64>, delta: Vector3<f64>) -> Vector3<f64> {
        let snapped = self.snap_vec(point + delta);
        let mut actual = snapped - point;
        for i in 0..3 {
            if (actual[i] > 0.0) != (delta[i] > 0.0) {
                actual[i] = 0.0;
            }
        }
        actual
    }

    /// Constrains a bounds drag so that either the min or max face of each
    /// axis lands on the grid, whichever moves less.
    pub fn move_delta_bounds(&self, bounds: &BBox, delta: Vector3<f64>) -> Vector3<f64> {
        let mut actual = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            if math::zero(delta[i]) {
                continue;
            }
            let low = self.snap(bounds.min[i] + delta[i]) - bounds.min[i];
            let high = self.snap(bounds.max[i] + delta[i]) - bounds.max[i];
            actual[i] = if low != 0.0 && high != 0.0 {
                if high.abs() < low.abs() {
                    high
                } else {
                    low
                }
            } else if low != 0.0 {
                low
            } else {
                high
            };
        }

        if delta.magnitude2() < (delta - actual).magnitude2() {
            actual = Vector3::new(0.0, 0.0, 0.0);
        }
        actual
    }

    /// Snaps a raw drag delta component-wise.
    pub fn move_delta(&self, delta: Vector3<f64>) -> Vector3<f64> {
        let mut actual = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            if !math::zero(delta[i]) {
                actual[i] = self.snap(delta[i]);
            }
        }

        if delta.magnitude2() < (delta - actual).magnitude2() {
            actual = Vector3::new(0.0, 0.0, 0.0);
        }
        actual
    }

    pub fn combine_deltas(&self, delta1: Vector3<f64>, delta2: Vector3<f64>) -> Vector3<f64> {
        if delta1.magnitude2() < delta2.magnitude2() {
            delta1
        } else {
            delta2
        }
    }

    pub fn reference_point(&self, bounds: &BBox) -> Vector3<f64> {
        self.snap_vec(bounds.center())
    }

    pub fn load(store: &dyn PreferenceStore) -> Grid {
        let mut grid = Grid::default();
        if let Some(size) = store.load_i32("Editor/Grid/Size") {
            if size >= MIN_SIZE && size <= MAX_SIZE {
                grid.size = size;
            }
        }
        if let Some(snap) = store.load_bool("Editor/Grid/Snap") {
            grid.snap = snap;
        }
        if let Some(visible) = store.load_bool("Editor/Grid/Visible") {
            grid.visible = visible;
        }
        grid
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) {
        store.save_i32("Editor/Grid/Size", self.size);
        store.save_bool("Editor/Grid/Snap", self.snap);
        store.save_bool("Editor/Grid/Visible", self.visible);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::prefs::MemoryPreferenceStore;

    use cgmath::vec3;

    #[test]
    fn test_scalar_snap_ties_up() {
        let grid = Grid::new(4); // cell 16
        assert_eq!(grid.snap(7.0), 0.0);
        assert_eq!(grid.snap(9.0), 16.0);
        assert_eq!(grid.snap(8.0), 16.0);
        assert_eq!(grid.snap(-8.0), 0.0);
        assert_eq!(grid.snap(-9.0), -16.0);
    }

    #[test]
    fn test_snap_idempotent() {
        let grid = Grid::new(4);
        for &x in [-100.0, -17.5, -8.0, 0.0, 3.0, 8.0, 23.9, 512.3].iter() {
            let once = grid.snap(x);
            assert_eq!(grid.snap(once), once);
        }
    }

    #[test]
    fn test_directional_snap() {
        let grid = Grid::new(4);
        // away from zero
        assert_eq!(grid.snap_up(9.0, false), 16.0);
        assert_eq!(grid.snap_up(-9.0, false), -16.0);
        // toward zero
        assert_eq!(grid.snap_down(9.0, false), 0.0);
        assert_eq!(grid.snap_down(-9.0, false), 0.0);
        // skipping a value already on a grid line
        assert_eq!(grid.snap_up(16.0, true), 32.0);
        assert_eq!(grid.snap_down(16.0, true), 0.0);
        assert_eq!(grid.snap_up(-16.0, true), -32.0);
        assert_eq!(grid.snap_down(-16.0, true), 0.0);
    }

    #[test]
    fn test_snap_towards() {
        let grid = Grid::new(4);
        assert_eq!(
            grid.snap_towards(vec3(7.0, 7.0, 7.0), vec3(1.0, -1.0, 0.0), false),
            vec3(16.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_snap_disabled_is_identity() {
        let mut grid = Grid::new(4);
        grid.toggle_snap();
        assert_eq!(grid.snap(7.3), 7.3);
        assert_eq!(grid.snap_vec(vec3(1.1, 2.2, 3.3)), vec3(1.1, 2.2, 3.3));
        assert_eq!(grid.actual_size(), 1.0);
    }

    #[test]
    fn test_snap_on_plane() {
        let grid = Grid::new(4);
        let floor = Plane::new(vec3(0.0, 0.0, 1.0), 0.0);
        assert_eq!(
            grid.snap_on_plane(vec3(7.0, -9.0, 3.0), &floor),
            vec3(0.0, -16.0, 0.0)
        );

        // a sloped plane solves the dominant axis from the snapped pair
        let slope = Plane::new(vec3(0.0, 0.0, 1.0), 8.0);
        assert_eq!(
            grid.snap_on_plane(vec3(9.0, 9.0, 0.0), &slope),
            vec3(16.0, 16.0, 8.0)
        );
    }

    #[test]
    fn test_snap_on_line() {
        let grid = Grid::new(4);
        let diagonal = Line::new(vec3(0.0, 0.0, 0.0), vec3(1.0, 1.0, 0.0));
        let snapped = grid.snap_on_line(vec3(10.0, 10.0, 0.0), &diagonal);
        assert!(math::vec_eq(snapped, vec3(16.0, 16.0, 0.0), math::EPSILON));
    }

    #[test]
    fn test_snap_on_edge_range() {
        let grid = Grid::new(4);
        let start = vec3(0.0, 0.0, 0.0);
        let end = vec3(8.0, 8.0, 0.0);
        let hit = grid.snap_on_edge(vec3(7.0, 7.0, 0.0), start, end).unwrap();
        assert!(math::vec_eq(hit, vec3(0.0, 0.0, 0.0), math::EPSILON));
        // for a point past the end, the best crossing at (16, 16) lies
        // beyond the segment
        assert!(grid.snap_on_edge(vec3(20.0, 20.0, 0.0), start, end).is_none());
    }

    #[test]
    fn test_intersect_with_ray() {
        let grid = Grid::new(4);
        let ray = Ray::new(vec3(0.5, 0.5, 0.5), vec3(1.0, 0.0, 0.0));
        let dist = grid.intersect_with_ray(&ray, 0).unwrap();
        assert!(math::eq(dist, 15.5));
    }

    #[test]
    fn test_move_delta_point() {
        let grid = Grid::new(4);
        // too small a drag does not move the point at all
        assert_eq!(
            grid.move_delta_point(vec3(0.0, 0.0, 0.0), vec3(7.0, 0.0, 0.0)),
            vec3(0.0, 0.0, 0.0)
        );
        assert_eq!(
            grid.move_delta_point(vec3(0.0, 0.0, 0.0), vec3(9.0, 0.0, 0.0)),
            vec3(16.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_move_delta_bounds() {
        let grid = Grid::new(4);
        let bounds = BBox::new(vec3(0.0, 0.0, 0.0), vec3(24.0, 24.0, 24.0));
        // min face snaps from 12 to 16, max face from 36 to 32: max wins
        let delta = grid.move_delta_bounds(&bounds, vec3(12.0, 0.0, 0.0));
        assert_eq!(delta, vec3(8.0, 0.0, 0.0));
    }

    #[test]
    fn test_angle_snap() {
        let grid = Grid::new(4);
        let snapped = grid.snap_angle(20f64.to_radians());
        assert!(math::eq(snapped, 15f64.to_radians()));
    }

    #[test]
    fn test_persistence() {
        let mut store = MemoryPreferenceStore::new();
        let mut grid = Grid::new(6);
        grid.toggle_snap();
        grid.save(&mut store);

        let loaded = Grid::load(&store);
        assert_eq!(loaded.size(), 6);
        assert!(!loaded.snap_enabled());
        assert!(loaded.visible());
    }

    #[test]
    fn test_change_notification() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut grid = Grid::new(4);
        let count = Rc::new(Cell::new(0));
        let sink = count.clone();
        grid.grid_did_change.register(move |&()| sink.set(sink.get() + 1));

        grid.inc_size();
        grid.toggle_visible();
        grid.dec_size();
        assert_eq!(count.get(), 3);
    }
}
