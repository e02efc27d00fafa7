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

//! Brushes and their faces.
//!
//! A brush is the intersection of the half-spaces behind its face planes,
//! clipped to the world bounds. Faces carry the texture mapping state from
//! the map file; the polyhedron itself lives in [`geometry`].

pub mod geometry;

use std::rc::Rc;

use crate::math::{self, BBox, Plane, Ray};
use crate::texture::Texture;

use self::geometry::{BrushGeometry, ClipOutcome, GeometryError, SideHit};

use cgmath::{Deg, InnerSpace, Matrix3, Quaternion, Rotation, Vector3};

#[derive(Clone, Debug, Fail)]
pub enum BrushError {
    /// The face planes do not enclose a volume.
    #[fail(display = "brush creation failed: plane set yields no volume")]
    CreationFailed,
    /// A vertex, edge or face edit would break the brush.
    #[fail(display = "brush edit rejected: {}", reason)]
    EditRejected { reason: String },
    /// Internal bug detector; see [`geometry::GeometryError`].
    #[fail(display = "geometry invariant violated: {}", detail)]
    InvariantViolated { detail: String },
}

impl From<GeometryError> for BrushError {
    fn from(err: GeometryError) -> BrushError {
        match err {
            GeometryError::Null => BrushError::CreationFailed,
            GeometryError::Invariant { detail } => BrushError::InvariantViolated { detail },
        }
    }
}

fn rejected(reason: impl ToString) -> BrushError {
    BrushError::EditRejected {
        reason: reason.to_string(),
    }
}

// The canonical texture projection table for the Standard map format: for
// each of the six dominant directions, the projection plane normal followed
// by the U and V axes.
lazy_static! {
    static ref BASE_AXES: [Vector3<f64>; 18] = [
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(-1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ];
}

/// How a face maps its texture onto its plane.
#[derive(Clone, Debug, PartialEq)]
pub enum TexAlignment {
    /// Axes derived from the face normal by the canonical projection.
    Standard,
    /// Explicit texture-space axes, stored verbatim (Valve 220 format).
    Valve {
        x_axis: Vector3<f64>,
        y_axis: Vector3<f64>,
    },
}

/// A brush face: a plane derived from three defining points, plus texture
/// mapping state.
#[derive(Clone, Debug)]
pub struct Face {
    points: [Vector3<f64>; 3],
    plane: Plane,
    pub texture_name: String,
    pub texture: Option<Rc<Texture>>,
    pub x_offset: f32,
    pub y_offset: f32,
    pub rotation: f32,
    pub x_scale: f32,
    pub y_scale: f32,
    pub alignment: TexAlignment,
    /// Source line in the map file, if the face was parsed from one.
    pub file_line: Option<usize>,
}

impl Face {
    /// Creates a face from its three defining points. Returns `None` if the
    /// points are collinear.
    pub fn new<S>(
        p1: Vector3<f64>,
        p2: Vector3<f64>,
        p3: Vector3<f64>,
        texture_name: S,
    ) -> Option<Face>
    where
        S: AsRef<str>,
    {
        let plane = Plane::from_points(p1, p2, p3)?;
        Some(Face {
            points: [p1, p2, p3],
            plane,
            texture_name: texture_name.as_ref().to_owned(),
            texture: None,
            x_offset: 0.0,
            y_offset: 0.0,
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
            alignment: TexAlignment::Standard,
            file_line: None,
        })
    }

    pub fn points(&self) -> &[Vector3<f64>; 3] {
        &self.points
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Replaces the defining points, rotating Valve-format texture axes
    /// along with the change in face orientation.
    pub fn set_points(&mut self, p1: Vector3<f64>, p2: Vector3<f64>, p3: Vector3<f64>) -> bool {
        let plane = match Plane::from_points(p1, p2, p3) {
            Some(p) => p,
            None => return false,
        };

        if let TexAlignment::Valve {
            ref mut x_axis,
            ref mut y_axis,
        } = self.alignment
        {
            if !math::vec_eq(self.plane.normal, plane.normal, math::EPSILON) {
                let rot = Quaternion::from_arc(self.plane.normal, plane.normal, None);
                *x_axis = rot.rotate_vector(*x_axis);
                *y_axis = rot.rotate_vector(*y_axis);
            }
        }

        self.points = [p1, p2, p3];
        self.plane = plane;
        true
    }

    /// The texture-space axes for this face, before scaling.
    ///
    /// Standard faces derive them from the projection table entry whose
    /// normal best matches the face normal, rotated by the face rotation
    /// around the projection normal. Valve faces return their stored axes.
    pub fn texture_axes(&self) -> (Vector3<f64>, Vector3<f64>) {
        match self.alignment {
            TexAlignment::Valve { x_axis, y_axis } => (x_axis, y_axis),
            TexAlignment::Standard => {
                let mut best = 0;
                let mut best_dot = ::std::f64::MIN;
                for i in 0..6 {
                    let dot = self.plane.normal.dot(BASE_AXES[i * 3]);
                    if dot > best_dot {
                        best_dot = dot;
                        best = i;
                    }
                }

                let u = BASE_AXES[best * 3 + 1];
                let v = BASE_AXES[best * 3 + 2];
                if self.rotation == 0.0 {
                    return (u, v);
                }

                let rot: Matrix3<f64> =
                    Matrix3::from_axis_angle(BASE_AXES[best * 3], Deg(f64::from(self.rotation)));
                (rot * u, rot * v)
            }
        }
    }

    /// Texture coordinates of a world-space point on this face.
    pub fn uv_at(&self, point: Vector3<f64>) -> (f64, f64) {
        let (u_axis, v_axis) = self.texture_axes();
        let x_scale = if self.x_scale == 0.0 { 1.0 } else { self.x_scale };
        let y_scale = if self.y_scale == 0.0 { 1.0 } else { self.y_scale };
        (
            point.dot(u_axis) / f64::from(x_scale) + f64::from(self.x_offset),
            point.dot(v_axis) / f64::from(y_scale) + f64::from(self.y_offset),
        )
    }
}

/// Summary of one numeric texture attribute across a face selection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AttribSummary {
    /// The first face's value.
    pub value: f32,
    /// True when the selection holds more than one distinct value.
    pub multiple: bool,
}

/// Texture state of a multi-face selection, for attribute editors.
#[derive(Clone, Debug)]
pub struct FaceAttribSummary {
    /// Common texture name, or `None` when the faces disagree.
    pub texture_name: Option<String>,
    pub x_offset: AttribSummary,
    pub y_offset: AttribSummary,
    pub rotation: AttribSummary,
    pub x_scale: AttribSummary,
    pub y_scale: AttribSummary,
}

/// Folds the texture attributes of a face selection, flagging attributes
/// that differ between faces.
pub fn summarize_faces<'a, I>(faces: I) -> Option<FaceAttribSummary>
where
    I: IntoIterator<Item = &'a Face>,
{
    let mut iter = faces.into_iter();
    let first = iter.next()?;

    let mut summary = FaceAttribSummary {
        texture_name: Some(first.texture_name.clone()),
        x_offset: AttribSummary {
            value: first.x_offset,
            multiple: false,
        },
        y_offset: AttribSummary {
            value: first.y_offset,
            multiple: false,
        },
        rotation: AttribSummary {
            value: first.rotation,
            multiple: false,
        },
        x_scale: AttribSummary {
            value: first.x_scale,
            multiple: false,
        },
        y_scale: AttribSummary {
            value: first.y_scale,
            multiple: false,
        },
    };

    for face in iter {
        if summary
            .texture_name
            .as_ref()
            .map_or(false, |name| *name != face.texture_name)
        {
            summary.texture_name = None;
        }
        summary.x_offset.multiple |= summary.x_offset.value != face.x_offset;
        summary.y_offset.multiple |= summary.y_offset.value != face.y_offset;
        summary.rotation.multiple |= summary.rotation.value != face.rotation;
        summary.x_scale.multiple |= summary.x_scale.value != face.x_scale;
        summary.y_scale.multiple |= summary.y_scale.value != face.y_scale;
    }

    Some(summary)
}

/// A convex solid bounded by its faces.
#[derive(Clone, Debug)]
pub struct Brush {
    faces: Vec<Face>,
    geometry: BrushGeometry,
    world_bounds: BBox,
    /// Source line in the map file, if the brush was parsed from one.
    pub file_line: Option<usize>,
}

impl Brush {
    /// Builds a brush by clipping the world-bounds cuboid against the given
    /// faces in order.
    ///
    /// Redundant faces (planes that remove no volume) and faces whose
    /// polygon is clipped away entirely by later planes are dropped with a
    /// warning. Fails with [`BrushError::CreationFailed`] if the planes do
    /// not enclose a volume or fewer than four faces survive.
    pub fn from_faces(world_bounds: BBox, faces: Vec<Face>) -> Result<Brush, BrushError> {
        if faces.len() < 4 {
            return Err(BrushError::CreationFailed);
        }

        let (geometry, kept) = Self::build_geometry(&world_bounds, &faces)?;
        let faces = kept.into_iter().map(|i| faces[i].clone()).collect();

        let brush = Brush {
            faces,
            geometry,
            world_bounds,
            file_line: None,
        };
        brush.geometry.check()?;
        Ok(brush)
    }

    /// Clips the world cuboid by each face plane, returning the geometry and
    /// the indices of the faces that survive, with side-face links pointing
    /// at positions in that survivor list.
    fn build_geometry(
        world_bounds: &BBox,
        faces: &[Face],
    ) -> Result<(BrushGeometry, Vec<usize>), BrushError> {
        let mut geometry = BrushGeometry::cuboid(world_bounds);

        // indices of faces that produced a cut, in clip order
        let mut cut_faces = Vec::with_capacity(faces.len());
        for (i, face) in faces.iter().enumerate() {
            match geometry.clip(face.plane())? {
                ClipOutcome::Clipped(sid) => {
                    geometry.set_side_face(sid, cut_faces.len());
                    cut_faces.push(i);
                }
                ClipOutcome::Redundant => {
                    warn!(
                        "Skipping redundant face \"{}\" ({} of {})",
                        face.texture_name,
                        i + 1,
                        faces.len()
                    );
                }
            }
        }

        if geometry.volume() <= math::EPSILON {
            return Err(BrushError::CreationFailed);
        }

        // a later plane may have clipped an earlier face's polygon away
        // entirely; prune those faces and renumber the survivors
        let mut kept = Vec::with_capacity(cut_faces.len());
        for (pos, &face_index) in cut_faces.iter().enumerate() {
            match geometry.side_for_face(pos) {
                Some(_) => kept.push((pos, face_index)),
                None => warn!(
                    "Skipping face \"{}\" clipped away by later planes",
                    faces[face_index].texture_name
                ),
            }
        }
        if kept.len() < 4 {
            return Err(BrushError::CreationFailed);
        }

        for (new_index, &(old_pos, _)) in kept.iter().enumerate() {
            let sid = geometry.side_for_face(old_pos).unwrap();
            geometry.set_side_face(sid, new_index);
        }

        Ok((geometry, kept.into_iter().map(|(_, i)| i).collect()))
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn face(&self, index: usize) -> &Face {
        &self.faces[index]
    }

    pub fn face_mut(&mut self, index: usize) -> &mut Face {
        &mut self.faces[index]
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Replaces the face list wholesale, rebuilding the polyhedron. Used by
    /// snapshot restoration.
    pub fn replace_faces(&mut self, faces: Vec<Face>) -> Result<(), BrushError> {
        let rebuilt = Brush::from_faces(self.world_bounds, faces)?;
        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(())
    }

    pub fn world_bounds(&self) -> &BBox {
        &self.world_bounds
    }

    pub fn bounds(&self) -> &BBox {
        self.geometry.bounds()
    }

    pub fn volume(&self) -> f64 {
        self.geometry.volume()
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.geometry.edge_count()
    }

    pub fn vertex_positions(&self) -> Vec<Vector3<f64>> {
        self.geometry.vertex_positions()
    }

    pub fn edge_endpoints(&self) -> Vec<(Vector3<f64>, Vector3<f64>)> {
        self.geometry.edge_endpoints()
    }

    /// The vertex loop of a face's polygon, CCW seen from outside.
    pub fn face_loop(&self, face: usize) -> Vec<Vector3<f64>> {
        match self.geometry.side_for_face(face) {
            Some(sid) => self.geometry.side_positions(sid),
            None => Vec::new(),
        }
    }

    /// The centroid of a face's polygon.
    pub fn face_center(&self, face: usize) -> Option<Vector3<f64>> {
        self.geometry.side_for_face(face).map(|sid| self.geometry.side_center(sid))
    }

    pub fn contains_point(&self, point: Vector3<f64>) -> bool {
        self.geometry.contains_point(point)
    }

    pub fn pick(&self, ray: &Ray) -> Option<SideHit> {
        self.geometry.pick(ray)
    }

    /// Resolves this brush's texture references against loaded textures.
    pub fn resolve_textures<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<Rc<Texture>>,
    {
        for face in &mut self.faces {
            face.texture = lookup(&face.texture_name);
        }
    }

    /// Whether moving the given vertices by `delta` would leave a valid
    /// brush without displacing any other vertex.
    pub fn can_move_vertices(&self, positions: &[Vector3<f64>], delta: Vector3<f64>) -> bool {
        self.rebuild_with_targets(&Self::move_targets(positions, delta))
            .is_ok()
    }

    /// Moves the given vertices by `delta`.
    ///
    /// Returns the new positions of the moved vertices, which may be fewer
    /// than requested when the move merges vertices. The brush is unchanged
    /// on error.
    pub fn move_vertices(
        &mut self,
        positions: &[Vector3<f64>],
        delta: Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, BrushError> {
        let targets = Self::move_targets(positions, delta);
        let rebuilt = self.rebuild_with_targets(&targets)?;

        let mut moved = Vec::new();
        for &(_, to) in &targets {
            if !moved
                .iter()
                .any(|m| math::vec_eq(*m, to, math::SNAP_EPSILON))
            {
                moved.push(to);
            }
        }

        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(moved)
    }

    /// Moves the endpoints of the given edges by `delta`.
    pub fn move_edges(
        &mut self,
        edges: &[(Vector3<f64>, Vector3<f64>)],
        delta: Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, BrushError> {
        let mut positions = Vec::new();
        for &(start, end) in edges {
            for p in [start, end].iter() {
                if !positions
                    .iter()
                    .any(|q| math::vec_eq(*q, *p, math::SNAP_EPSILON))
                {
                    positions.push(*p);
                }
            }
        }
        self.move_vertices(&positions, delta)
    }

    /// Moves the polygons of the given faces by `delta`.
    pub fn move_faces(
        &mut self,
        face_indices: &[usize],
        delta: Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, BrushError> {
        let mut positions = Vec::new();
        for &face in face_indices {
            for p in self.face_loop(face) {
                if !positions
                    .iter()
                    .any(|q| math::vec_eq(*q, p, math::SNAP_EPSILON))
                {
                    positions.push(p);
                }
            }
        }
        if positions.is_empty() {
            return Err(rejected("no such face"));
        }
        self.move_vertices(&positions, delta)
    }

    /// Snaps every vertex to the given grid size.
    pub fn snap_vertices(&mut self, grid_size: f64) -> Result<(), BrushError> {
        let snap = |x: f64| grid_size * (x / grid_size + 0.5).floor();
        let targets: Vec<(Vector3<f64>, Vector3<f64>)> = self
            .vertex_positions()
            .into_iter()
            .map(|p| (p, Vector3::new(snap(p.x), snap(p.y), snap(p.z))))
            .collect();

        let rebuilt = self.rebuild_with_targets(&targets)?;
        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(())
    }

    /// Translates the whole brush by `delta`.
    pub fn translate(&mut self, delta: Vector3<f64>) -> Result<(), BrushError> {
        let targets: Vec<(Vector3<f64>, Vector3<f64>)> = self
            .vertex_positions()
            .into_iter()
            .map(|p| (p, p + delta))
            .collect();
        let rebuilt = self.rebuild_with_targets(&targets)?;
        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(())
    }

    fn move_targets(
        positions: &[Vector3<f64>],
        delta: Vector3<f64>,
    ) -> Vec<(Vector3<f64>, Vector3<f64>)> {
        positions.iter().map(|&p| (p, p + delta)).collect()
    }

    /// The editing substrate: retargets vertices, re-derives face planes
    /// (triangulating faces whose retargeted loops go non-planar), rebuilds
    /// by clipping and verifies that the result has exactly the expected
    /// vertex set.
    fn rebuild_with_targets(
        &self,
        targets: &[(Vector3<f64>, Vector3<f64>)],
    ) -> Result<Brush, BrushError> {
        let current = self.vertex_positions();

        // every source position must name an existing vertex
        for &(from, _) in targets {
            if !current
                .iter()
                .any(|p| math::vec_eq(*p, from, math::SNAP_EPSILON))
            {
                return Err(rejected(format!("no vertex at {:?}", from)));
            }
        }

        let retarget = |p: Vector3<f64>| -> Vector3<f64> {
            for &(from, to) in targets {
                if math::vec_eq(p, from, math::SNAP_EPSILON) {
                    return to;
                }
            }
            p
        };
        let is_moved = |p: Vector3<f64>| -> bool {
            targets.iter().any(|&(from, to)| {
                math::vec_eq(p, from, math::SNAP_EPSILON)
                    && !math::vec_eq(from, to, math::SNAP_EPSILON)
            })
        };

        // expected result positions, merged within snap distance
        let mut expected: Vec<Vector3<f64>> = Vec::with_capacity(current.len());
        for &p in &current {
            let t = retarget(p);
            if !expected
                .iter()
                .any(|q| math::vec_eq(*q, t, math::SNAP_EPSILON))
            {
                expected.push(t);
            }
        }

        let mut candidates = Vec::with_capacity(self.faces.len());
        for (index, face) in self.faces.iter().enumerate() {
            let mut positions: Vec<Vector3<f64>> = self
                .face_loop(index)
                .into_iter()
                .map(&retarget)
                .collect();
            positions.dedup_by(|a, b| math::vec_eq(*a, *b, math::SNAP_EPSILON));
            if positions.len() >= 2
                && math::vec_eq(positions[0], *positions.last().unwrap(), math::SNAP_EPSILON)
            {
                positions.pop();
            }
            if positions.len() < 3 {
                // the face collapsed; neighboring faces close the solid
                continue;
            }

            match loop_plane(&positions) {
                Some(_) => {
                    // defining points run clockwise seen from the front, so
                    // the CCW loop is sampled in reverse
                    let mut updated = face.clone();
                    if !updated.set_points(positions[0], positions[2], positions[1]) {
                        continue;
                    }
                    candidates.push(updated);
                }
                None => {
                    // non-planar after the move: fan into triangles around
                    // the first moved vertex of the loop
                    let apex = positions
                        .iter()
                        .position(|p| is_moved(*p))
                        .unwrap_or(0);
                    let n = positions.len();
                    for k in 1..n - 1 {
                        let a = positions[apex];
                        let b = positions[(apex + k) % n];
                        let c = positions[(apex + k + 1) % n];
                        let mut tri = face.clone();
                        if tri.set_points(a, c, b) {
                            candidates.push(tri);
                        }
                    }
                }
            }
        }

        self.build_and_verify(candidates, &expected)
    }

    /// Rebuilds from candidate faces and verifies that the result has
    /// exactly the expected vertex set: a missing vertex was clipped away,
    /// an extra one means a vertex was displaced that should not move.
    fn build_and_verify(
        &self,
        candidates: Vec<Face>,
        expected: &[Vector3<f64>],
    ) -> Result<Brush, BrushError> {
        if candidates.len() < 4 {
            return Err(rejected("edit leaves too few faces"));
        }

        let (geometry, kept) = match Self::build_geometry(&self.world_bounds, &candidates) {
            Ok(result) => result,
            Err(BrushError::InvariantViolated { detail }) => {
                return Err(BrushError::InvariantViolated { detail });
            }
            Err(_) => return Err(rejected("edit collapses the brush")),
        };

        let actual = geometry.vertex_positions();
        if actual.len() != expected.len() {
            return Err(rejected("edit would displace unselected vertices"));
        }
        for want in expected {
            if !actual
                .iter()
                .any(|got| math::vec_eq(*got, *want, math::SNAP_EPSILON))
            {
                return Err(rejected("edit would displace unselected vertices"));
            }
        }

        geometry.check()?;

        Ok(Brush {
            faces: kept.into_iter().map(|i| candidates[i].clone()).collect(),
            geometry,
            world_bounds: self.world_bounds,
            file_line: self.file_line,
        })
    }

    /// Splits the edge with the given endpoints by dragging a new vertex
    /// out of its center by `delta`. Returns the new vertex position.
    ///
    /// The two faces sharing the edge are fanned into triangles around the
    /// new vertex; the drag must actually pull the vertex off the edge or
    /// the operation is rejected.
    pub fn split_edge(
        &mut self,
        start: Vector3<f64>,
        end: Vector3<f64>,
        delta: Vector3<f64>,
    ) -> Result<Vector3<f64>, BrushError> {
        let target = (start + end) / 2.0 + delta;
        for p in self.vertex_positions() {
            if math::vec_eq(p, target, math::SNAP_EPSILON) {
                return Err(rejected("split vertex lands on an existing vertex"));
            }
        }

        let mut candidates = Vec::with_capacity(self.faces.len() + 4);
        let mut touched = 0;
        for (index, face) in self.faces.iter().enumerate() {
            let positions = self.face_loop(index);
            let n = positions.len();

            let split_at = (0..n).find(|&i| {
                let a = positions[i];
                let b = positions[(i + 1) % n];
                (math::vec_eq(a, start, math::SNAP_EPSILON)
                    && math::vec_eq(b, end, math::SNAP_EPSILON))
                    || (math::vec_eq(a, end, math::SNAP_EPSILON)
                        && math::vec_eq(b, start, math::SNAP_EPSILON))
            });

            match split_at {
                Some(i) => {
                    touched += 1;
                    let mut with_target = positions.clone();
                    with_target.insert(i + 1, target);
                    let apex = i + 1;
                    let m = with_target.len();
                    for k in 1..m - 1 {
                        let a = with_target[apex];
                        let b = with_target[(apex + k) % m];
                        let c = with_target[(apex + k + 1) % m];
                        let mut tri = face.clone();
                        if tri.set_points(a, c, b) {
                            candidates.push(tri);
                        }
                    }
                }
                None => candidates.push(face.clone()),
            }
        }
        if touched != 2 {
            return Err(rejected("no such edge"));
        }

        let mut expected = self.vertex_positions();
        expected.push(target);

        let rebuilt = self.build_and_verify(candidates, &expected)?;
        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(target)
    }

    /// Splits a face by dragging a new vertex out of its centroid by
    /// `delta`, fanning the face into triangles around it. Returns the new
    /// vertex position.
    pub fn split_face(
        &mut self,
        face_index: usize,
        delta: Vector3<f64>,
    ) -> Result<Vector3<f64>, BrushError> {
        let positions = self.face_loop(face_index);
        if positions.is_empty() {
            return Err(rejected("no such face"));
        }
        let center = match self.face_center(face_index) {
            Some(center) => center,
            None => return Err(rejected("no such face")),
        };
        let target = center + delta;
        for p in self.vertex_positions() {
            if math::vec_eq(p, target, math::SNAP_EPSILON) {
                return Err(rejected("split vertex lands on an existing vertex"));
            }
        }

        let mut candidates = Vec::with_capacity(self.faces.len() + positions.len());
        for (index, face) in self.faces.iter().enumerate() {
            if index != face_index {
                candidates.push(face.clone());
                continue;
            }
            let n = positions.len();
            for i in 0..n {
                let a = positions[i];
                let b = positions[(i + 1) % n];
                let mut tri = face.clone();
                if tri.set_points(target, b, a) {
                    candidates.push(tri);
                }
            }
        }

        let mut expected = self.vertex_positions();
        expected.push(target);

        let rebuilt = self.build_and_verify(candidates, &expected)?;
        self.faces = rebuilt.faces;
        self.geometry = rebuilt.geometry;
        Ok(target)
    }
}

/// The common plane of a vertex loop, or `None` if the loop is non-planar
/// or degenerate.
fn loop_plane(positions: &[Vector3<f64>]) -> Option<Plane> {
    if positions.len() < 3 {
        return None;
    }

    let mut plane = None;
    for i in 2..positions.len() {
        if let Some(p) = Plane::from_points(positions[0], positions[i], positions[i - 1]) {
            plane = Some(p);
            break;
        }
    }

    let plane = plane?;
    for p in positions {
        if plane.point_dist(*p).abs() > math::SNAP_EPSILON {
            return None;
        }
    }
    Some(plane)
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::vec3;

    fn world_bounds() -> BBox {
        BBox::new(vec3(-4096.0, -4096.0, -4096.0), vec3(4096.0, 4096.0, 4096.0))
    }

    /// A face on the plane through `center` with outward normal `u x v`,
    /// using `center`, `center + v`, `center + u` as defining points.
    fn face(center: Vector3<f64>, u: Vector3<f64>, v: Vector3<f64>) -> Face {
        Face::new(center, center + v, center + u, "__TB_empty").unwrap()
    }

    fn cube_faces(extent: f64) -> Vec<Face> {
        let e = extent;
        vec![
            face(vec3(e, 0.0, 0.0), vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, 1.0)),
            face(vec3(-e, 0.0, 0.0), vec3(0.0, 0.0, 1.0), vec3(0.0, 1.0, 0.0)),
            face(vec3(0.0, e, 0.0), vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0)),
            face(vec3(0.0, -e, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0)),
            face(vec3(0.0, 0.0, e), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)),
            face(vec3(0.0, 0.0, -e), vec3(0.0, 1.0, 0.0), vec3(1.0, 0.0, 0.0)),
        ]
    }

    fn cube(extent: f64) -> Brush {
        Brush::from_faces(world_bounds(), cube_faces(extent)).unwrap()
    }

    fn sorted_positions(brush: &Brush) -> Vec<Vector3<f64>> {
        let mut positions = brush.vertex_positions();
        positions.sort_by(|a, b| math::lexicographic_cmp(*a, *b));
        positions
    }

    #[test]
    fn test_cube_from_faces() {
        let brush = cube(64.0);
        assert_eq!(brush.face_count(), 6);
        assert_eq!(brush.vertex_count(), 8);
        assert_eq!(brush.edge_count(), 12);
        assert_eq!(
            *brush.bounds(),
            BBox::new(vec3(-64.0, -64.0, -64.0), vec3(64.0, 64.0, 64.0))
        );
        assert!(math::eq(brush.volume(), 2_097_152.0));
        for i in 0..6 {
            assert_eq!(brush.face_loop(i).len(), 4);
        }
    }

    #[test]
    fn test_creation_failure() {
        // two opposing planes with no volume between them
        let mut faces = cube_faces(64.0);
        faces[1] = face(
            vec3(65.0, 0.0, 0.0),
            vec3(0.0, 0.0, 1.0),
            vec3(0.0, 1.0, 0.0),
        );
        match Brush::from_faces(world_bounds(), faces) {
            Err(BrushError::CreationFailed) => {}
            other => panic!("expected creation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_move_zero_is_identity() {
        let mut brush = cube(64.0);
        let before = sorted_positions(&brush);
        let moved = brush
            .move_vertices(&[vec3(64.0, 64.0, 64.0)], vec3(0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(moved, vec![vec3(64.0, 64.0, 64.0)]);
        assert_eq!(sorted_positions(&brush), before);
        assert_eq!(brush.face_count(), 6);
    }

    #[test]
    fn test_move_single_vertex() {
        let mut brush = cube(64.0);
        let moved = brush
            .move_vertices(&[vec3(64.0, 64.0, 64.0)], vec3(-16.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(moved, vec![vec3(48.0, 64.0, 64.0)]);
        assert_eq!(brush.vertex_count(), 8);
        // three adjacent quads split into triangle pairs
        assert_eq!(brush.face_count(), 9);
        assert!(brush
            .vertex_positions()
            .iter()
            .any(|p| math::vec_eq(*p, vec3(48.0, 64.0, 64.0), math::SNAP_EPSILON)));
    }

    #[test]
    fn test_move_rejected_leaves_brush_unchanged() {
        let mut brush = cube(64.0);
        let before = sorted_positions(&brush);

        assert!(!brush.can_move_vertices(&[vec3(64.0, 64.0, 64.0)], vec3(-200.0, 0.0, 0.0)));
        match brush.move_vertices(&[vec3(64.0, 64.0, 64.0)], vec3(-200.0, 0.0, 0.0)) {
            Err(BrushError::EditRejected { .. }) => {}
            other => panic!("expected rejection, got {:?}", other),
        }

        assert_eq!(sorted_positions(&brush), before);
        assert_eq!(brush.face_count(), 6);
    }

    #[test]
    fn test_move_whole_face() {
        let mut brush = cube(64.0);
        // the +z face is face index 4 in cube_faces order
        brush.move_faces(&[4], vec3(0.0, 0.0, 32.0)).unwrap();
        assert_eq!(brush.vertex_count(), 8);
        assert_eq!(brush.face_count(), 6);
        assert_eq!(brush.bounds().max.z, 96.0);
        assert!(math::eq(brush.volume(), 128.0 * 128.0 * 160.0));
    }

    #[test]
    fn test_move_merges_vertices() {
        let mut brush = cube(64.0);
        // collapse the +z+y edge onto the +z-y edge: the top face degenerates
        // and the cube becomes a wedge
        let moved = brush
            .move_edges(
                &[(vec3(-64.0, 64.0, 64.0), vec3(64.0, 64.0, 64.0))],
                vec3(0.0, -128.0, 0.0),
            )
            .unwrap();
        assert_eq!(moved.len(), 2);
        assert_eq!(brush.vertex_count(), 6);
        assert_eq!(brush.face_count(), 5);
        assert!(math::eq(brush.volume(), 2_097_152.0 / 2.0));
    }

    #[test]
    fn test_split_edge() {
        let mut brush = cube(64.0);
        let target = brush
            .split_edge(
                vec3(-64.0, 64.0, 64.0),
                vec3(64.0, 64.0, 64.0),
                vec3(0.0, 0.0, 16.0),
            )
            .unwrap();
        assert_eq!(target, vec3(0.0, 64.0, 80.0));
        assert_eq!(brush.vertex_count(), 9);
        // the top face fans into three triangles; the +y side keeps its
        // plane and grows into a pentagon, shedding the coplanar fan
        // triangles as redundant
        assert_eq!(brush.face_count(), 8);
        assert!(math::eq(
            brush.volume(),
            2_097_152.0 + 128.0 * 128.0 * 16.0 / 3.0
        ));
    }

    #[test]
    fn test_split_edge_requires_a_real_drag() {
        let mut brush = cube(64.0);
        let before = sorted_positions(&brush);
        // the new vertex must leave the edge; the center is inside the hull
        match brush.split_edge(
            vec3(-64.0, 64.0, 64.0),
            vec3(64.0, 64.0, 64.0),
            vec3(0.0, 0.0, 0.0),
        ) {
            Err(BrushError::EditRejected { .. }) => {}
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(sorted_positions(&brush), before);

        match brush.split_edge(vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, 16.0)) {
            Err(BrushError::EditRejected { .. }) => {}
            other => panic!("expected rejection for a missing edge, got {:?}", other),
        }
    }

    #[test]
    fn test_split_face() {
        let mut brush = cube(64.0);
        // the +z face is face index 4 in cube_faces order
        let target = brush.split_face(4, vec3(0.0, 0.0, 16.0)).unwrap();
        assert_eq!(target, vec3(0.0, 0.0, 80.0));
        assert_eq!(brush.vertex_count(), 9);
        assert_eq!(brush.face_count(), 9);
        assert!(math::eq(
            brush.volume(),
            2_097_152.0 + 128.0 * 128.0 * 16.0 / 3.0
        ));
    }

    #[test]
    fn test_snap_vertices() {
        let mut brush = Brush::from_faces(world_bounds(), cube_faces(63.7)).unwrap();
        brush.snap_vertices(8.0).unwrap();
        for p in brush.vertex_positions() {
            assert!(p.x.abs() == 64.0 && p.y.abs() == 64.0 && p.z.abs() == 64.0);
        }
    }

    #[test]
    fn test_translate() {
        let mut brush = cube(64.0);
        brush.translate(vec3(32.0, 0.0, 0.0)).unwrap();
        assert_eq!(
            *brush.bounds(),
            BBox::new(vec3(-32.0, -64.0, -64.0), vec3(96.0, 64.0, 64.0))
        );
        assert_eq!(brush.face_count(), 6);
        // face planes moved with the geometry
        assert!(brush.faces().iter().any(|f| {
            f.plane().normal == vec3(1.0, 0.0, 0.0) && math::eq(f.plane().distance, 96.0)
        }));
    }

    #[test]
    fn test_standard_texture_axes() {
        let floor = face(
            vec3(0.0, 0.0, 64.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        );
        assert_eq!(
            floor.texture_axes(),
            (vec3(1.0, 0.0, 0.0), vec3(0.0, -1.0, 0.0))
        );

        let west_wall = face(
            vec3(64.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(0.0, 0.0, 1.0),
        );
        assert_eq!(
            west_wall.texture_axes(),
            (vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, -1.0))
        );
    }

    #[test]
    fn test_valve_axes_rotate_with_plane() {
        let mut f = face(
            vec3(0.0, 0.0, 64.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        );
        f.alignment = TexAlignment::Valve {
            x_axis: vec3(1.0, 0.0, 0.0),
            y_axis: vec3(0.0, -1.0, 0.0),
        };

        // re-point the face from +z to +x
        assert!(f.set_points(
            vec3(64.0, 0.0, 0.0),
            vec3(64.0, 0.0, 1.0),
            vec3(64.0, 1.0, 0.0),
        ));
        match f.alignment {
            TexAlignment::Valve { x_axis, y_axis } => {
                // the axes followed the 90° rotation about the y axis
                assert!(math::vec_eq(x_axis, vec3(0.0, 0.0, -1.0), math::EPSILON));
                assert!(math::vec_eq(y_axis, vec3(0.0, -1.0, 0.0), math::EPSILON));
            }
            ref other => panic!("alignment changed: {:?}", other),
        }
    }

    #[test]
    fn test_summary_detects_multiple_values() {
        let mut a = face(
            vec3(0.0, 0.0, 64.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        );
        let mut b = a.clone();
        a.x_offset = 0.0;
        b.x_offset = 16.0;
        b.texture_name = "metal1_1".to_owned();

        let summary = summarize_faces(vec![&a, &b]).unwrap();
        assert!(summary.x_offset.multiple);
        assert!(summary.texture_name.is_none());

        // identical faces must not report multiple values
        let summary = summarize_faces(vec![&a, &a]).unwrap();
        assert!(!summary.x_offset.multiple);
        assert!(!summary.y_offset.multiple);
        assert!(!summary.rotation.multiple);
        assert_eq!(summary.texture_name.as_deref(), Some("__TB_empty"));
    }
}
