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

//! The brush polyhedron kernel.
//!
//! A brush is stored as an arena of vertices, edges and sides (polygon
//! loops) with small integer handles for cross-references. The polyhedron
//! starts out as the world-bounds cuboid and is carved down by clipping it
//! against one face plane at a time; each clip leaves a closed, convex,
//! consistently wound 2-manifold or fails.
//!
//! Winding convention: every side is counter-clockwise when viewed from
//! outside along its plane normal. An edge is shared by exactly two sides;
//! the side traversing it start-to-end is its `right` side, the side
//! traversing it end-to-start is its `left` side.

use std::fmt;

use crate::math::{self, BBox, Plane, Ray};

use cgmath::{InnerSpace, Vector3, Zero};
use slab::Slab;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EdgeId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SideId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VertexMark {
    Keep,
    Drop,
    Undecided,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EdgeMark {
    Undecided,
    Keep,
    Drop,
    Split,
}

#[derive(Clone, Debug)]
struct Vertex {
    position: Vector3<f64>,
    mark: VertexMark,
}

#[derive(Clone, Debug)]
struct Edge {
    start: VertexId,
    end: VertexId,
    left: Option<SideId>,
    right: Option<SideId>,
    mark: EdgeMark,
}

impl Edge {
    fn vector(&self, vertices: &Slab<Vertex>) -> Vector3<f64> {
        vertices[self.end.0].position - vertices[self.start.0].position
    }
}

/// One step of a side's edge loop. `forward` is true when the loop
/// traverses the edge start-to-end.
#[derive(Copy, Clone, Debug, PartialEq)]
struct SideEdge {
    edge: EdgeId,
    forward: bool,
}

#[derive(Clone, Debug)]
struct Side {
    edges: Vec<SideEdge>,
    plane: Plane,
    /// Index of the brush face this side realizes, if any.
    face: Option<usize>,
}

#[derive(Clone, Debug, Fail)]
pub enum GeometryError {
    /// Clipping removed the entire polyhedron or left it without 3D extent.
    #[fail(display = "plane set yields an empty or degenerate polyhedron")]
    Null,
    /// An internal consistency check failed; the geometry is unusable.
    #[fail(display = "geometry invariant violated: {}", detail)]
    Invariant { detail: String },
}

fn invariant(detail: impl fmt::Display) -> GeometryError {
    GeometryError::Invariant {
        detail: detail.to_string(),
    }
}

#[derive(Debug, PartialEq)]
pub enum ClipOutcome {
    /// The plane carved the polyhedron; the new cut side is returned.
    Clipped(SideId),
    /// The plane does not remove any volume and was ignored.
    Redundant,
}

/// A face hit by a picking ray.
#[derive(Copy, Clone, Debug)]
pub struct SideHit {
    pub face: usize,
    pub distance: f64,
    pub point: Vector3<f64>,
}

#[derive(Clone, Debug)]
pub struct BrushGeometry {
    vertices: Slab<Vertex>,
    edges: Slab<Edge>,
    sides: Slab<Side>,
    bounds: BBox,
}

impl BrushGeometry {
    /// Creates the axis-aligned cuboid filling `bounds`: 8 vertices, 12
    /// edges and 6 quad sides, wound counter-clockwise seen from outside.
    pub fn cuboid(bounds: &BBox) -> BrushGeometry {
        let mut geo = BrushGeometry {
            vertices: Slab::new(),
            edges: Slab::new(),
            sides: Slab::new(),
            bounds: *bounds,
        };

        let corners = bounds.vertices();
        let vids: Vec<VertexId> = corners
            .iter()
            .map(|&position| {
                VertexId(geo.vertices.insert(Vertex {
                    position,
                    mark: VertexMark::Undecided,
                }))
            })
            .collect();

        // corner indices are (x << 2) | (y << 1) | z with 0 = min, 1 = max
        let planes = bounds.planes();
        let loops: [([usize; 4], Plane); 6] = [
            ([4, 6, 7, 5], planes[0]), // +x
            ([0, 1, 3, 2], planes[1]), // -x
            ([2, 3, 7, 6], planes[2]), // +y
            ([0, 4, 5, 1], planes[3]), // -y
            ([1, 5, 7, 3], planes[4]), // +z
            ([0, 2, 6, 4], planes[5]), // -z
        ];

        for &(ref corner_loop, plane) in loops.iter() {
            let loop_vids: Vec<VertexId> = corner_loop.iter().map(|&i| vids[i]).collect();
            geo.add_side_from_loop(&loop_vids, plane);
        }

        geo
    }

    /// Adds a side given its CCW vertex loop, creating or reusing edges.
    fn add_side_from_loop(&mut self, loop_vids: &[VertexId], plane: Plane) -> SideId {
        let sid = SideId(self.sides.insert(Side {
            edges: Vec::with_capacity(loop_vids.len()),
            plane,
            face: None,
        }));

        for i in 0..loop_vids.len() {
            let a = loop_vids[i];
            let b = loop_vids[(i + 1) % loop_vids.len()];

            let existing = self
                .edges
                .iter()
                .find(|&(_, e)| e.start == b && e.end == a)
                .map(|(k, _)| EdgeId(k));

            let side_edge = match existing {
                Some(eid) => {
                    // the neighbor walked b -> a, we walk a -> b
                    debug_assert!(self.edges[eid.0].left.is_none());
                    self.edges[eid.0].left = Some(sid);
                    SideEdge {
                        edge: eid,
                        forward: false,
                    }
                }
                None => {
                    let eid = EdgeId(self.edges.insert(Edge {
                        start: a,
                        end: b,
                        left: None,
                        right: Some(sid),
                        mark: EdgeMark::Undecided,
                    }));
                    SideEdge {
                        edge: eid,
                        forward: true,
                    }
                }
            };
            self.sides[sid.0].edges.push(side_edge);
        }

        sid
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn side_count(&self) -> usize {
        self.sides.len()
    }

    pub fn bounds(&self) -> &BBox {
        &self.bounds
    }

    pub fn vertex_positions(&self) -> Vec<Vector3<f64>> {
        self.vertices.iter().map(|(_, v)| v.position).collect()
    }

    pub fn edge_endpoints(&self) -> Vec<(Vector3<f64>, Vector3<f64>)> {
        self.edges
            .iter()
            .map(|(_, e)| {
                (
                    self.vertices[e.start.0].position,
                    self.vertices[e.end.0].position,
                )
            })
            .collect()
    }

    pub fn side_ids(&self) -> Vec<SideId> {
        self.sides.iter().map(|(k, _)| SideId(k)).collect()
    }

    pub fn side_plane(&self, sid: SideId) -> &Plane {
        &self.sides[sid.0].plane
    }

    pub fn side_face(&self, sid: SideId) -> Option<usize> {
        self.sides[sid.0].face
    }

    pub fn set_side_face(&mut self, sid: SideId, face: usize) {
        self.sides[sid.0].face = Some(face);
    }

    pub fn side_for_face(&self, face: usize) -> Option<SideId> {
        self.sides
            .iter()
            .find(|&(_, s)| s.face == Some(face))
            .map(|(k, _)| SideId(k))
    }

    /// The side's vertex positions in loop order (CCW from outside).
    pub fn side_positions(&self, sid: SideId) -> Vec<Vector3<f64>> {
        self.sides[sid.0]
            .edges
            .iter()
            .map(|se| self.vertices[self.traversal_start(*se).0].position)
            .collect()
    }

    /// The centroid of a side's vertex loop.
    pub fn side_center(&self, sid: SideId) -> Vector3<f64> {
        let positions = self.side_positions(sid);
        let mut center = Vector3::zero();
        for p in &positions {
            center += *p;
        }
        center / positions.len() as f64
    }

    fn traversal_start(&self, se: SideEdge) -> VertexId {
        let e = &self.edges[se.edge.0];
        if se.forward {
            e.start
        } else {
            e.end
        }
    }

    fn traversal_end(&self, se: SideEdge) -> VertexId {
        let e = &self.edges[se.edge.0];
        if se.forward {
            e.end
        } else {
            e.start
        }
    }

    /// Signed volume of the polyhedron via tetrahedra against the origin.
    /// Positive for a closed surface wound CCW from outside.
    pub fn volume(&self) -> f64 {
        let mut total = 0.0;
        for (_, side) in self.sides.iter() {
            let positions: Vec<Vector3<f64>> = side
                .edges
                .iter()
                .map(|se| self.vertices[self.traversal_start(*se).0].position)
                .collect();
            for i in 1..positions.len() - 1 {
                total += positions[0].dot(positions[i].cross(positions[i + 1])) / 6.0;
            }
        }
        total
    }

    pub fn contains_point(&self, point: Vector3<f64>) -> bool {
        self.sides
            .iter()
            .all(|(_, s)| s.plane.point_dist(point) <= math::EPSILON)
    }

    /// Nearest face hit by the ray, if any.
    pub fn pick(&self, ray: &Ray) -> Option<SideHit> {
        let mut best: Option<SideHit> = None;
        for (k, side) in self.sides.iter() {
            // only front faces can be hit from outside
            if side.plane.normal.dot(ray.direction) >= 0.0 {
                continue;
            }
            let distance = match side.plane.intersect_ray(ray) {
                Some(d) => d,
                None => continue,
            };
            let point = ray.point_at_distance(distance);
            if !self.contains_point(point) {
                continue;
            }
            let face = match side.face {
                Some(f) => f,
                None => k,
            };
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(SideHit {
                    face,
                    distance,
                    point,
                });
            }
        }
        best
    }

    /// Clips the polyhedron against `plane`, keeping the material behind it.
    ///
    /// On success the geometry is the clipped polyhedron and the returned
    /// outcome names the cut side (or reports the plane as redundant). On
    /// error the geometry is in an indeterminate state and must be
    /// discarded; callers build into a scratch copy and swap on success.
    pub fn clip(&mut self, plane: &Plane) -> Result<ClipOutcome, GeometryError> {
        // mark vertices by signed distance
        let mut keep_count = 0;
        let mut drop_count = 0;
        let vertex_keys: Vec<usize> = self.vertices.iter().map(|(k, _)| k).collect();
        for &vk in &vertex_keys {
            let dist = plane.point_dist(self.vertices[vk].position);
            let mark = if dist > math::EPSILON {
                drop_count += 1;
                VertexMark::Drop
            } else if dist < -math::EPSILON {
                keep_count += 1;
                VertexMark::Keep
            } else {
                VertexMark::Undecided
            };
            self.vertices[vk].mark = mark;
        }

        if drop_count == 0 {
            self.reset_marks();
            return Ok(ClipOutcome::Redundant);
        }
        if keep_count == 0 {
            return Err(GeometryError::Null);
        }

        // derive edge marks from endpoint marks
        let edge_keys: Vec<usize> = self.edges.iter().map(|(k, _)| k).collect();
        for &ek in &edge_keys {
            let (sm, em) = {
                let e = &self.edges[ek];
                (self.vertices[e.start.0].mark, self.vertices[e.end.0].mark)
            };
            use self::VertexMark::*;
            self.edges[ek].mark = match (sm, em) {
                (Drop, Drop) | (Drop, Undecided) | (Undecided, Drop) => EdgeMark::Drop,
                (Keep, Keep) | (Keep, Undecided) | (Undecided, Keep) => EdgeMark::Keep,
                (Undecided, Undecided) => EdgeMark::Undecided,
                (Keep, Drop) | (Drop, Keep) => EdgeMark::Split,
            };
        }

        // split crossing edges at their plane intersection: the original
        // edge id keeps the surviving half, a new edge carries the dropped
        // half so the affected sides still see the removed material
        for &ek in &edge_keys {
            if self.edges[ek].mark != EdgeMark::Split {
                continue;
            }
            let (start, end, left, right) = {
                let e = &self.edges[ek];
                (e.start, e.end, e.left, e.right)
            };
            let start_pos = self.vertices[start.0].position;
            let end_pos = self.vertices[end.0].position;
            let start_dist = plane.point_dist(start_pos);
            let end_dist = plane.point_dist(end_pos);
            let ratio = start_dist / (start_dist - end_dist);
            let point = start_pos + (end_pos - start_pos) * ratio;

            let new_vid = VertexId(self.vertices.insert(Vertex {
                position: point,
                mark: VertexMark::Undecided,
            }));

            let start_dropped = self.vertices[start.0].mark == VertexMark::Drop;
            let drop_half = if start_dropped {
                self.edges[ek].start = new_vid;
                Edge {
                    start,
                    end: new_vid,
                    left,
                    right,
                    mark: EdgeMark::Drop,
                }
            } else {
                self.edges[ek].end = new_vid;
                Edge {
                    start: new_vid,
                    end,
                    left,
                    right,
                    mark: EdgeMark::Drop,
                }
            };
            self.edges[ek].mark = EdgeMark::Keep;
            let drop_eid = EdgeId(self.edges.insert(drop_half));

            // splice the dropped half into both adjacent side loops so that
            // traversal order is preserved
            for &(side, forward) in [(right, true), (left, false)].iter() {
                let sid = match side {
                    Some(sid) => sid,
                    None => continue,
                };
                let side_edges = &mut self.sides[sid.0].edges;
                let pos = side_edges
                    .iter()
                    .position(|se| se.edge == EdgeId(ek) && se.forward == forward)
                    .expect("split edge missing from an adjacent side");
                let splice = SideEdge {
                    edge: drop_eid,
                    forward,
                };
                if forward == start_dropped {
                    side_edges.insert(pos, splice);
                } else {
                    side_edges.insert(pos + 1, splice);
                }
            }
        }

        // rewind or drop each affected side
        let side_keys: Vec<usize> = self.sides.iter().map(|(k, _)| k).collect();
        let mut dropped_sides = Vec::new();
        for &sk in &side_keys {
            let mut kept_edges = 0;
            let mut dropped_edges = 0;
            for se in &self.sides[sk].edges {
                match self.edges[se.edge.0].mark {
                    EdgeMark::Keep => kept_edges += 1,
                    EdgeMark::Drop => dropped_edges += 1,
                    _ => {}
                }
            }
            if dropped_edges == 0 {
                continue;
            }
            if kept_edges == 0 {
                dropped_sides.push(SideId(sk));
                continue;
            }
            self.rewind_side(SideId(sk))?;
        }

        // detach dropped sides; their surviving edges join the cut loop
        for sid in dropped_sides {
            let side = self.sides.remove(sid.0);
            for se in side.edges {
                let e = &mut self.edges[se.edge.0];
                if e.left == Some(sid) {
                    e.left = None;
                }
                if e.right == Some(sid) {
                    e.right = None;
                }
            }
        }

        // thread every half-open edge into the cut side
        let cut = self.thread_cut_side(plane)?;

        // delete dropped geometry
        let dropped_edge_keys: Vec<usize> = self
            .edges
            .iter()
            .filter(|&(_, e)| e.mark == EdgeMark::Drop)
            .map(|(k, _)| k)
            .collect();
        for ek in dropped_edge_keys {
            self.edges.remove(ek);
        }
        let dropped_vertex_keys: Vec<usize> = self
            .vertices
            .iter()
            .filter(|&(_, v)| v.mark == VertexMark::Drop)
            .map(|(k, _)| k)
            .collect();
        for vk in dropped_vertex_keys {
            self.vertices.remove(vk);
        }

        self.reset_marks();
        self.recompute_bounds();

        // the clip must leave a closed solid with 3D extent
        let size = self.bounds.size();
        if self.vertices.len() < 4
            || self.sides.len() < 4
            || size.x <= math::EPSILON
            || size.y <= math::EPSILON
            || size.z <= math::EPSILON
        {
            return Err(GeometryError::Null);
        }

        Ok(ClipOutcome::Clipped(cut))
    }

    /// Rewinds a side that contains both kept and dropped edges: removes the
    /// dropped run and bridges the gap with a single new edge whose left
    /// side is left open for the cut side.
    fn rewind_side(&mut self, sid: SideId) -> Result<(), GeometryError> {
        let side_loop = self.sides[sid.0].edges.clone();
        let n = side_loop.len();

        // rotate so the kept arc comes first
        let mut start = 0;
        for i in 0..n {
            let prev = (i + n - 1) % n;
            if self.edges[side_loop[i].edge.0].mark != EdgeMark::Drop
                && self.edges[side_loop[prev].edge.0].mark == EdgeMark::Drop
            {
                start = i;
                break;
            }
        }

        let mut kept: Vec<SideEdge> = Vec::with_capacity(n);
        for i in 0..n {
            let se = side_loop[(start + i) % n];
            if self.edges[se.edge.0].mark != EdgeMark::Drop {
                kept.push(se);
            }
        }
        if kept.is_empty() {
            return Err(invariant("rewound side lost all of its edges"));
        }

        // the dropped run is contiguous in a convex polygon, so the gap runs
        // from the end of the kept arc back to its start
        let gap_start = self.traversal_end(*kept.last().unwrap());
        let gap_end = self.traversal_start(kept[0]);
        if gap_start == gap_end {
            return Err(invariant("degenerate bridge in side rewind"));
        }

        let eid = EdgeId(self.edges.insert(Edge {
            start: gap_start,
            end: gap_end,
            left: None,
            right: Some(sid),
            mark: EdgeMark::Keep,
        }));
        kept.push(SideEdge {
            edge: eid,
            forward: true,
        });
        self.sides[sid.0].edges = kept;
        Ok(())
    }

    /// Collects all edges missing one adjacent side and threads them into
    /// the polygon loop of the cut side.
    fn thread_cut_side(&mut self, plane: &Plane) -> Result<SideId, GeometryError> {
        let mut open: Vec<SideEdge> = Vec::new();
        for (k, e) in self.edges.iter() {
            if e.mark == EdgeMark::Drop {
                continue;
            }
            match (e.left, e.right) {
                (None, Some(_)) => open.push(SideEdge {
                    edge: EdgeId(k),
                    forward: false,
                }),
                (Some(_), None) => open.push(SideEdge {
                    edge: EdgeId(k),
                    forward: true,
                }),
                (None, None) => return Err(invariant("edge detached from both sides")),
                (Some(_), Some(_)) => {}
            }
        }
        if open.len() < 3 {
            return Err(invariant(format_args!(
                "cut loop has only {} edges",
                open.len()
            )));
        }

        let first = open.swap_remove(0);
        let loop_start = self.traversal_start(first);
        let mut cut_loop = vec![first];

        while !open.is_empty() {
            let cur = *cut_loop.last().unwrap();
            let cur_end = self.traversal_end(cur);
            let cur_end_pos = self.vertices[cur_end.0].position;

            let candidates: Vec<usize> = open
                .iter()
                .enumerate()
                .filter(|&(_, se)| {
                    let start = self.traversal_start(*se);
                    start == cur_end
                        || math::vec_eq(
                            self.vertices[start.0].position,
                            cur_end_pos,
                            math::SNAP_EPSILON,
                        )
                })
                .map(|(i, _)| i)
                .collect();

            let chosen = match candidates.len() {
                0 => return Err(invariant("cut loop does not close")),
                1 => candidates[0],
                // coincident endpoints: turn as sharply left around the cut
                // plane normal as possible
                _ => {
                    let prev_dir = self.traversal_vector(cur);
                    *candidates
                        .iter()
                        .max_by(|&&a, &&b| {
                            let ta = self.left_turn(prev_dir, open[a], plane.normal);
                            let tb = self.left_turn(prev_dir, open[b], plane.normal);
                            ta.partial_cmp(&tb).unwrap_or(::std::cmp::Ordering::Equal)
                        })
                        .unwrap()
                }
            };
            cut_loop.push(open.swap_remove(chosen));
        }

        let closing_end = self.traversal_end(*cut_loop.last().unwrap());
        if closing_end != loop_start
            && !math::vec_eq(
                self.vertices[closing_end.0].position,
                self.vertices[loop_start.0].position,
                math::SNAP_EPSILON,
            )
        {
            return Err(invariant("cut loop does not return to its start"));
        }

        let sid = SideId(self.sides.insert(Side {
            edges: cut_loop.clone(),
            plane: *plane,
            face: None,
        }));
        for se in &cut_loop {
            let e = &mut self.edges[se.edge.0];
            if se.forward {
                e.right = Some(sid);
            } else {
                e.left = Some(sid);
            }
        }

        debug_assert!(
            self.newell_normal(sid).dot(plane.normal) > 0.0,
            "cut side wound against its plane normal"
        );

        Ok(sid)
    }

    fn traversal_vector(&self, se: SideEdge) -> Vector3<f64> {
        let v = self.edges[se.edge.0].vector(&self.vertices);
        if se.forward {
            v
        } else {
            -v
        }
    }

    /// Signed left-turn angle from `prev_dir` onto the candidate edge,
    /// measured around `normal`. Larger is a sharper left turn.
    fn left_turn(&self, prev_dir: Vector3<f64>, se: SideEdge, normal: Vector3<f64>) -> f64 {
        let dir = self.traversal_vector(se);
        prev_dir.cross(dir).dot(normal).atan2(prev_dir.dot(dir))
    }

    /// Newell normal of a side's vertex loop, unnormalized.
    fn newell_normal(&self, sid: SideId) -> Vector3<f64> {
        let positions = self.side_positions(sid);
        let mut normal = Vector3::zero();
        for i in 0..positions.len() {
            let a = positions[i];
            let b = positions[(i + 1) % positions.len()];
            normal += a.cross(b);
        }
        normal
    }

    fn reset_marks(&mut self) {
        for (_, v) in self.vertices.iter_mut() {
            v.mark = VertexMark::Undecided;
        }
        for (_, e) in self.edges.iter_mut() {
            e.mark = EdgeMark::Undecided;
        }
    }

    fn recompute_bounds(&mut self) {
        let mut bounds = BBox::empty();
        for (_, v) in self.vertices.iter() {
            bounds.merge_point(v.position);
        }
        self.bounds = bounds;
    }

    /// Verifies the structural invariants of the polyhedron.
    ///
    /// Failures indicate a kernel bug: fatal in debug builds, reported as
    /// [`GeometryError::Invariant`] in release builds so the surrounding
    /// command can abort.
    pub fn check(&self) -> Result<(), GeometryError> {
        let result = self.check_inner();
        debug_assert!(result.is_ok(), "{:?}", result);
        if let Err(ref e) = result {
            error!("{}", e);
        }
        result
    }

    fn check_inner(&self) -> Result<(), GeometryError> {
        for (k, e) in self.edges.iter() {
            let left = e
                .left
                .ok_or_else(|| invariant(format_args!("edge {} has no left side", k)))?;
            let right = e
                .right
                .ok_or_else(|| invariant(format_args!("edge {} has no right side", k)))?;
            if left == right {
                return Err(invariant(format_args!(
                    "edge {} has the same side twice",
                    k
                )));
            }
            let forward_in = |sid: SideId, forward: bool| {
                self.sides[sid.0]
                    .edges
                    .iter()
                    .any(|se| se.edge == EdgeId(k) && se.forward == forward)
            };
            if !forward_in(right, true) || !forward_in(left, false) {
                return Err(invariant(format_args!(
                    "edge {} winds the same way on both sides",
                    k
                )));
            }
            let start = self.vertices[e.start.0].position;
            let end = self.vertices[e.end.0].position;
            if math::vec_eq(start, end, math::SNAP_EPSILON) {
                return Err(invariant(format_args!("edge {} has zero length", k)));
            }
        }

        for (k, side) in self.sides.iter() {
            if side.edges.len() < 3 {
                return Err(invariant(format_args!(
                    "side {} has fewer than 3 edges",
                    k
                )));
            }
            for i in 0..side.edges.len() {
                let next = (i + 1) % side.edges.len();
                if self.traversal_end(side.edges[i]) != self.traversal_start(side.edges[next]) {
                    return Err(invariant(format_args!("side {} loop is broken", k)));
                }
            }
            for se in &side.edges {
                let pos = self.vertices[self.traversal_start(*se).0].position;
                if side.plane.point_dist(pos).abs() > math::SNAP_EPSILON {
                    return Err(invariant(format_args!(
                        "side {} has a vertex off its plane",
                        k
                    )));
                }
            }
            if self.newell_normal(SideId(k)).dot(side.plane.normal) <= 0.0 {
                return Err(invariant(format_args!(
                    "side {} is wound against its normal",
                    k
                )));
            }
        }

        let positions = self.vertex_positions();
        for i in 0..positions.len() {
            for j in i + 1..positions.len() {
                if math::vec_eq(positions[i], positions[j], math::SNAP_EPSILON) {
                    return Err(invariant("duplicate vertex positions"));
                }
            }
        }

        let mut tight = BBox::empty();
        for p in &positions {
            tight.merge_point(*p);
        }
        if !math::vec_eq(tight.min, self.bounds.min, math::EPSILON)
            || !math::vec_eq(tight.max, self.bounds.max, math::EPSILON)
        {
            return Err(invariant("cached bounds are not tight"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::vec3;

    fn world_bounds() -> BBox {
        BBox::new(vec3(-4096.0, -4096.0, -4096.0), vec3(4096.0, 4096.0, 4096.0))
    }

    fn cube_planes(extent: f64) -> Vec<Plane> {
        vec![
            Plane::new(vec3(1.0, 0.0, 0.0), extent),
            Plane::new(vec3(-1.0, 0.0, 0.0), extent),
            Plane::new(vec3(0.0, 1.0, 0.0), extent),
            Plane::new(vec3(0.0, -1.0, 0.0), extent),
            Plane::new(vec3(0.0, 0.0, 1.0), extent),
            Plane::new(vec3(0.0, 0.0, -1.0), extent),
        ]
    }

    fn clipped(planes: &[Plane]) -> BrushGeometry {
        let mut geo = BrushGeometry::cuboid(&world_bounds());
        for plane in planes {
            match geo.clip(plane).unwrap() {
                ClipOutcome::Clipped(_) => {}
                ClipOutcome::Redundant => panic!("redundant plane in test set"),
            }
        }
        geo.check().unwrap();
        geo
    }

    #[test]
    fn test_cuboid_counts() {
        let geo = BrushGeometry::cuboid(&world_bounds());
        assert_eq!(geo.vertex_count(), 8);
        assert_eq!(geo.edge_count(), 12);
        assert_eq!(geo.side_count(), 6);
        geo.check().unwrap();
    }

    #[test]
    fn test_cube_construction() {
        let geo = clipped(&cube_planes(64.0));
        assert_eq!(geo.vertex_count(), 8);
        assert_eq!(geo.edge_count(), 12);
        assert_eq!(geo.side_count(), 6);
        assert_eq!(
            *geo.bounds(),
            BBox::new(vec3(-64.0, -64.0, -64.0), vec3(64.0, 64.0, 64.0))
        );
        assert!(math::eq(geo.volume(), 2_097_152.0));

        let mut positions = geo.vertex_positions();
        positions.sort_by(|a, b| math::lexicographic_cmp(*a, *b));
        for p in positions {
            assert!(p.x.abs() == 64.0 && p.y.abs() == 64.0 && p.z.abs() == 64.0);
        }
    }

    #[test]
    fn test_diagonal_clip() {
        let mut planes = cube_planes(64.0);
        let inv_sqrt2 = 1.0 / 2f64.sqrt();
        planes.push(Plane::new(vec3(inv_sqrt2, inv_sqrt2, 0.0), 0.0));

        let mut geo = BrushGeometry::cuboid(&world_bounds());
        let mut cut = None;
        for plane in &planes {
            if let ClipOutcome::Clipped(sid) = geo.clip(plane).unwrap() {
                cut = Some(sid);
            }
        }
        geo.check().unwrap();

        assert_eq!(geo.vertex_count(), 6);
        assert_eq!(geo.edge_count(), 9);
        assert_eq!(geo.side_count(), 5);

        // the cut face is the quad of the four on-plane cube vertices
        let cut = cut.unwrap();
        let mut cut_positions = geo.side_positions(cut);
        assert_eq!(cut_positions.len(), 4);
        for p in &cut_positions {
            assert!(math::zero(p.x + p.y), "cut vertex off the plane: {:?}", p);
        }
        cut_positions.sort_by(|a, b| math::lexicographic_cmp(*a, *b));
        let expected = [
            vec3(-64.0, 64.0, -64.0),
            vec3(-64.0, 64.0, 64.0),
            vec3(64.0, -64.0, -64.0),
            vec3(64.0, -64.0, 64.0),
        ];
        for (got, want) in cut_positions.iter().zip(expected.iter()) {
            assert!(math::vec_eq(*got, *want, math::SNAP_EPSILON));
        }

        // cut side winds CCW around its outward normal
        assert!(geo
            .newell_normal(cut)
            .dot(vec3(inv_sqrt2, inv_sqrt2, 0.0))
            > 0.0);
    }

    #[test]
    fn test_corner_clip() {
        // slicing off a corner produces a triangular face
        let mut planes = cube_planes(64.0);
        let n = vec3(1.0, 1.0, 1.0).normalize();
        planes.push(Plane::new(n, 96.0));

        let geo = clipped(&planes);
        assert_eq!(geo.vertex_count(), 10);
        assert_eq!(geo.side_count(), 7);
        assert_eq!(geo.edge_count(), 15);
    }

    #[test]
    fn test_redundant_plane() {
        let mut geo = clipped(&cube_planes(64.0));
        let before = geo.vertex_positions();
        let outcome = geo.clip(&Plane::new(vec3(1.0, 0.0, 0.0), 128.0)).unwrap();
        assert_eq!(outcome, ClipOutcome::Redundant);
        assert_eq!(geo.vertex_positions(), before);
    }

    #[test]
    fn test_null_clip() {
        let mut geo = clipped(&cube_planes(64.0));
        match geo.clip(&Plane::new(vec3(1.0, 0.0, 0.0), -128.0)) {
            Err(GeometryError::Null) => {}
            other => panic!("expected null clip, got {:?}", other),
        }
    }

    #[test]
    fn test_contains_point() {
        let geo = clipped(&cube_planes(64.0));
        assert!(geo.contains_point(vec3(0.0, 0.0, 0.0)));
        assert!(geo.contains_point(vec3(64.0, 64.0, 64.0)));
        assert!(!geo.contains_point(vec3(65.0, 0.0, 0.0)));
    }

    #[test]
    fn test_pick() {
        let geo = clipped(&cube_planes(64.0));
        let ray = Ray::new(vec3(200.0, 0.0, 0.0), vec3(-1.0, 0.0, 0.0));
        let hit = geo.pick(&ray).unwrap();
        assert!(math::eq(hit.distance, 136.0));
        assert!(math::vec_eq(hit.point, vec3(64.0, 0.0, 0.0), math::EPSILON));

        let miss = Ray::new(vec3(200.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0));
        assert!(geo.pick(&miss).is_none());
    }
}
