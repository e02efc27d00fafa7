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

//! Selectable handles over a working set of brushes.
//!
//! The manager indexes vertex positions, edge centers and face centers of
//! the brushes being vertex-edited, split into unselected and selected
//! maps per kind. Positions are quantized to snap-epsilon buckets and
//! ordered lexicographically, so handles of different brushes sharing a
//! corner collapse into one.

use std::collections::BTreeMap;

use crate::brush::Brush;
use crate::map::BrushId;
use crate::math::{self, Ray};
use crate::prefs::PreferenceStore;
use crate::vbo::{BlockId, Vbo, VboError};

use cgmath::{InnerSpace, Vector3};

/// A position key: coordinates bucketed at [`math::SNAP_EPSILON`],
/// compared lexicographically.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleKey([i64; 3]);

impl HandleKey {
    pub fn new(position: Vector3<f64>) -> HandleKey {
        HandleKey([
            (position.x / math::SNAP_EPSILON).round() as i64,
            (position.y / math::SNAP_EPSILON).round() as i64,
            (position.z / math::SNAP_EPSILON).round() as i64,
        ])
    }
}

/// An edge of a specific brush, by index into its edge list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    pub brush: BrushId,
    pub edge: usize,
}

/// A face of a specific brush, by index into its face list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaceRef {
    pub brush: BrushId,
    pub face: usize,
}

struct HandleEntry<T> {
    position: Vector3<f64>,
    items: Vec<T>,
}

type HandleMap<T> = BTreeMap<HandleKey, HandleEntry<T>>;

/// Picking options, persisted as editor preferences.
#[derive(Copy, Clone, Debug)]
pub struct HandleOptions {
    /// Base handle radius in world units.
    pub radius: f64,
    /// The on-screen size stays constant: the pick sphere radius is
    /// `radius * scaling_factor * distance`.
    pub scaling_factor: f64,
    /// Handles farther from the camera than this are not pickable.
    pub max_distance: f64,
}

impl Default for HandleOptions {
    fn default() -> HandleOptions {
        HandleOptions {
            radius: 3.0,
            scaling_factor: 1.0 / 300.0,
            max_distance: 2048.0,
        }
    }
}

impl HandleOptions {
    pub fn load(store: &dyn PreferenceStore) -> HandleOptions {
        let defaults = HandleOptions::default();
        HandleOptions {
            radius: store
                .load_f32("Editor/Handles/Radius")
                .map_or(defaults.radius, f64::from),
            scaling_factor: store
                .load_f32("Editor/Handles/ScalingFactor")
                .map_or(defaults.scaling_factor, f64::from),
            max_distance: store
                .load_f32("Editor/Handles/MaximumDistance")
                .map_or(defaults.max_distance, f64::from),
        }
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) {
        store.save_f32("Editor/Handles/Radius", self.radius as f32);
        store.save_f32("Editor/Handles/ScalingFactor", self.scaling_factor as f32);
        store.save_f32("Editor/Handles/MaximumDistance", self.max_distance as f32);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Vertex,
    Edge,
    Face,
}

#[derive(Copy, Clone, Debug)]
pub struct HandleHit {
    pub kind: HandleKind,
    pub selected: bool,
    /// The handle position that was hit.
    pub position: Vector3<f64>,
    /// Distance along the pick ray to the hit point on the handle sphere.
    pub distance: f64,
    pub hit_point: Vector3<f64>,
}

/// Per-state point batches for the handle renderer, rebuilt lazily.
#[derive(Clone, Debug, Default)]
pub struct HandleBatches {
    pub unselected_vertices: Vec<Vector3<f32>>,
    pub selected_vertices: Vec<Vector3<f32>>,
    pub unselected_edges: Vec<Vector3<f32>>,
    pub selected_edges: Vec<Vector3<f32>>,
    pub unselected_faces: Vec<Vector3<f32>>,
    pub selected_faces: Vec<Vector3<f32>>,
}

/// A batch uploaded into vertex-buffer blocks, one block per non-empty
/// point list with its point count.
#[derive(Clone, Debug, Default)]
pub struct HandleBlocks {
    pub unselected_vertices: Option<(BlockId, usize)>,
    pub selected_vertices: Option<(BlockId, usize)>,
    pub unselected_edges: Option<(BlockId, usize)>,
    pub selected_edges: Option<(BlockId, usize)>,
    pub unselected_faces: Option<(BlockId, usize)>,
    pub selected_faces: Option<(BlockId, usize)>,
}

#[derive(Default)]
pub struct HandleManager {
    unselected_vertex_handles: HandleMap<BrushId>,
    selected_vertex_handles: HandleMap<BrushId>,
    unselected_edge_handles: HandleMap<EdgeRef>,
    selected_edge_handles: HandleMap<EdgeRef>,
    unselected_face_handles: HandleMap<FaceRef>,
    selected_face_handles: HandleMap<FaceRef>,
    saved_vertex_selection: Vec<Vector3<f64>>,
    saved_edge_selection: Vec<Vector3<f64>>,
    saved_face_selection: Vec<Vector3<f64>>,
    options: HandleOptions,
    render_state_valid: bool,
    batches: HandleBatches,
}

impl<T> Default for HandleEntry<T> {
    fn default() -> HandleEntry<T> {
        HandleEntry {
            position: Vector3::new(0.0, 0.0, 0.0),
            items: Vec::new(),
        }
    }
}

fn add_handle<T>(
    selected: &mut HandleMap<T>,
    unselected: &mut HandleMap<T>,
    position: Vector3<f64>,
    item: T,
) {
    let key = HandleKey::new(position);
    // handles already selected at this position absorb new brushes
    let target = if selected.contains_key(&key) {
        selected
    } else {
        unselected
    };
    let entry = target.entry(key).or_insert_with(HandleEntry::default);
    if entry.items.is_empty() {
        entry.position = position;
    }
    entry.items.push(item);
}

fn remove_handle<T, F>(map: &mut HandleMap<T>, position: Vector3<f64>, matches: F) -> bool
where
    F: Fn(&T) -> bool,
{
    let key = HandleKey::new(position);
    let (removed, emptied) = match map.get_mut(&key) {
        Some(entry) => {
            let before = entry.items.len();
            entry.items.retain(|item| !matches(item));
            (entry.items.len() != before, entry.items.is_empty())
        }
        None => return false,
    };
    if removed && emptied {
        map.remove(&key);
    }
    removed
}

fn move_handle<T>(from: &mut HandleMap<T>, to: &mut HandleMap<T>, position: Vector3<f64>) -> bool {
    let key = HandleKey::new(position);
    match from.remove(&key) {
        Some(entry) => {
            let target = to.entry(key).or_insert_with(HandleEntry::default);
            if target.items.is_empty() {
                target.position = entry.position;
            }
            target.items.extend(entry.items);
            true
        }
        None => false,
    }
}

impl HandleManager {
    pub fn new() -> HandleManager {
        HandleManager::with_options(HandleOptions::default())
    }

    pub fn with_options(options: HandleOptions) -> HandleManager {
        HandleManager {
            options,
            render_state_valid: false,
            ..HandleManager::default()
        }
    }

    pub fn options(&self) -> &HandleOptions {
        &self.options
    }

    /// Indexes a brush's vertices, edge centers and face centers.
    pub fn add(&mut self, id: BrushId, brush: &Brush) {
        for position in brush.vertex_positions() {
            add_handle(
                &mut self.selected_vertex_handles,
                &mut self.unselected_vertex_handles,
                position,
                id,
            );
        }
        for (edge, (start, end)) in brush.edge_endpoints().into_iter().enumerate() {
            add_handle(
                &mut self.selected_edge_handles,
                &mut self.unselected_edge_handles,
                (start + end) / 2.0,
                EdgeRef { brush: id, edge },
            );
        }
        for face in 0..brush.face_count() {
            if let Some(center) = brush.face_center(face) {
                add_handle(
                    &mut self.selected_face_handles,
                    &mut self.unselected_face_handles,
                    center,
                    FaceRef { brush: id, face },
                );
            }
        }
        self.render_state_valid = false;
    }

    /// Removes a brush's handles; the inverse of [`add`](Self::add).
    pub fn remove(&mut self, id: BrushId, brush: &Brush) {
        for position in brush.vertex_positions() {
            if !remove_handle(&mut self.selected_vertex_handles, position, |b| *b == id) {
                remove_handle(&mut self.unselected_vertex_handles, position, |b| *b == id);
            }
        }
        for (start, end) in brush.edge_endpoints() {
            let center = (start + end) / 2.0;
            if !remove_handle(&mut self.selected_edge_handles, center, |e| e.brush == id) {
                remove_handle(&mut self.unselected_edge_handles, center, |e| e.brush == id);
            }
        }
        for face in 0..brush.face_count() {
            if let Some(center) = brush.face_center(face) {
                if !remove_handle(&mut self.selected_face_handles, center, |f| f.brush == id) {
                    remove_handle(&mut self.unselected_face_handles, center, |f| f.brush == id);
                }
            }
        }
        self.render_state_valid = false;
    }

    pub fn clear(&mut self) {
        *self = HandleManager::with_options(self.options);
    }

    /// The brushes sharing the vertex handle at `position`.
    pub fn brushes(&self, position: Vector3<f64>) -> &[BrushId] {
        let key = HandleKey::new(position);
        match self
            .selected_vertex_handles
            .get(&key)
            .or_else(|| self.unselected_vertex_handles.get(&key))
        {
            Some(entry) => &entry.items,
            None => &[],
        }
    }

    /// The edges sharing the edge handle at `position`.
    pub fn edges(&self, position: Vector3<f64>) -> &[EdgeRef] {
        let key = HandleKey::new(position);
        match self
            .selected_edge_handles
            .get(&key)
            .or_else(|| self.unselected_edge_handles.get(&key))
        {
            Some(entry) => &entry.items,
            None => &[],
        }
    }

    /// The faces sharing the face handle at `position`.
    pub fn faces(&self, position: Vector3<f64>) -> &[FaceRef] {
        let key = HandleKey::new(position);
        match self
            .selected_face_handles
            .get(&key)
            .or_else(|| self.unselected_face_handles.get(&key))
        {
            Some(entry) => &entry.items,
            None => &[],
        }
    }

    pub fn select_vertex_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.unselected_vertex_handles,
            &mut self.selected_vertex_handles,
            position,
        )
    }

    pub fn deselect_vertex_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.selected_vertex_handles,
            &mut self.unselected_vertex_handles,
            position,
        )
    }

    pub fn select_edge_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.unselected_edge_handles,
            &mut self.selected_edge_handles,
            position,
        )
    }

    pub fn deselect_edge_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.selected_edge_handles,
            &mut self.unselected_edge_handles,
            position,
        )
    }

    pub fn select_face_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.unselected_face_handles,
            &mut self.selected_face_handles,
            position,
        )
    }

    pub fn deselect_face_handle(&mut self, position: Vector3<f64>) -> bool {
        self.render_state_valid = false;
        move_handle(
            &mut self.selected_face_handles,
            &mut self.unselected_face_handles,
            position,
        )
    }

    pub fn select_vertex_handles<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        for position in positions {
            self.select_vertex_handle(position);
        }
    }

    pub fn deselect_all(&mut self) {
        fn drain<T>(from: &mut HandleMap<T>, to: &mut HandleMap<T>) {
            let selected = ::std::mem::replace(from, BTreeMap::new());
            for (key, entry) in selected {
                let target = to.entry(key).or_insert_with(HandleEntry::default);
                if target.items.is_empty() {
                    target.position = entry.position;
                }
                target.items.extend(entry.items);
            }
        }
        drain(
            &mut self.selected_vertex_handles,
            &mut self.unselected_vertex_handles,
        );
        drain(
            &mut self.selected_edge_handles,
            &mut self.unselected_edge_handles,
        );
        drain(
            &mut self.selected_face_handles,
            &mut self.unselected_face_handles,
        );
        self.render_state_valid = false;
    }

    pub fn selected_vertex_positions(&self) -> Vec<Vector3<f64>> {
        self.selected_vertex_handles
            .values()
            .map(|e| e.position)
            .collect()
    }

    pub fn selected_edge_positions(&self) -> Vec<Vector3<f64>> {
        self.selected_edge_handles
            .values()
            .map(|e| e.position)
            .collect()
    }

    pub fn selected_face_positions(&self) -> Vec<Vector3<f64>> {
        self.selected_face_handles
            .values()
            .map(|e| e.position)
            .collect()
    }

    /// Captures the selected handle positions for later restoration.
    pub fn save_selection(&mut self) {
        self.saved_vertex_selection = self.selected_vertex_positions();
        self.saved_edge_selection = self.selected_edge_positions();
        self.saved_face_selection = self.selected_face_positions();
    }

    pub fn clear_saved_selection(&mut self) {
        self.saved_vertex_selection.clear();
        self.saved_edge_selection.clear();
        self.saved_face_selection.clear();
    }

    /// Reselects the saved positions, clearing the current selection first.
    /// Positions that no longer exist after a topology change are skipped
    /// silently.
    pub fn restore_selection(&mut self) {
        self.deselect_all();

        let vertices = ::std::mem::replace(&mut self.saved_vertex_selection, Vec::new());
        for position in vertices {
            self.select_vertex_handle(position);
        }
        let edges = ::std::mem::replace(&mut self.saved_edge_selection, Vec::new());
        for position in edges {
            self.select_edge_handle(position);
        }
        let faces = ::std::mem::replace(&mut self.saved_face_selection, Vec::new());
        for position in faces {
            self.select_face_handle(position);
        }
        self.clear_saved_selection();
        self.render_state_valid = false;
    }

    /// Picks the handle nearest to the ray origin.
    ///
    /// Handles beyond the maximum pick distance are ignored; the pick
    /// sphere radius grows linearly with camera distance so handles keep a
    /// constant on-screen size. Ties resolve to the smaller ray distance,
    /// then to the lexicographically smaller position.
    pub fn pick(&self, ray: &Ray) -> Option<HandleHit> {
        let mut best: Option<HandleHit> = None;

        self.pick_map(&self.unselected_vertex_handles, ray, HandleKind::Vertex, false, &mut best);
        self.pick_map(&self.selected_vertex_handles, ray, HandleKind::Vertex, true, &mut best);
        self.pick_map(&self.unselected_edge_handles, ray, HandleKind::Edge, false, &mut best);
        self.pick_map(&self.selected_edge_handles, ray, HandleKind::Edge, true, &mut best);
        self.pick_map(&self.unselected_face_handles, ray, HandleKind::Face, false, &mut best);
        self.pick_map(&self.selected_face_handles, ray, HandleKind::Face, true, &mut best);

        best
    }

    fn pick_map<T>(
        &self,
        map: &HandleMap<T>,
        ray: &Ray,
        kind: HandleKind,
        selected: bool,
        best: &mut Option<HandleHit>,
    ) {
        for entry in map.values() {
            let position = entry.position;
            let camera_distance = (position - ray.origin).magnitude();
            if camera_distance > self.options.max_distance {
                continue;
            }

            let radius = self.options.radius * self.options.scaling_factor * camera_distance;
            let distance = match ray.intersect_sphere(position, radius) {
                Some(d) => d,
                None => continue,
            };

            let closer = match *best {
                None => true,
                Some(ref b) => {
                    distance < b.distance - math::EPSILON
                        || ((distance - b.distance).abs() <= math::EPSILON
                            && math::lexicographic_cmp(position, b.position)
                                == ::std::cmp::Ordering::Less)
                }
            };
            if closer {
                *best = Some(HandleHit {
                    kind,
                    selected,
                    position,
                    distance,
                    hit_point: ray.point_at_distance(distance),
                });
            }
        }
    }

    /// The per-state point batches, rebuilt when handles changed since the
    /// last call.
    pub fn batches(&mut self) -> &HandleBatches {
        if !self.render_state_valid {
            fn collect<T>(map: &HandleMap<T>) -> Vec<Vector3<f32>> {
                map.values()
                    .map(|e| {
                        Vector3::new(e.position.x as f32, e.position.y as f32, e.position.z as f32)
                    })
                    .collect()
            }
            self.batches = HandleBatches {
                unselected_vertices: collect(&self.unselected_vertex_handles),
                selected_vertices: collect(&self.selected_vertex_handles),
                unselected_edges: collect(&self.unselected_edge_handles),
                selected_edges: collect(&self.selected_edge_handles),
                unselected_faces: collect(&self.unselected_face_handles),
                selected_faces: collect(&self.selected_face_handles),
            };
            self.render_state_valid = true;
        }
        &self.batches
    }

    /// Uploads the point batches as vertex data, one block per non-empty
    /// list. The buffer must be mapped.
    pub fn upload(&mut self, vbo: &mut Vbo) -> Result<HandleBlocks, VboError> {
        fn upload_points(
            vbo: &mut Vbo,
            points: &[Vector3<f32>],
        ) -> Result<Option<(BlockId, usize)>, VboError> {
            if points.is_empty() {
                return Ok(None);
            }
            let block = vbo.alloc(points.len() * 12)?;
            let mut offset = 0;
            for point in points {
                offset = vbo.write_vec3(block, offset, *point);
            }
            Ok(Some((block, points.len())))
        }

        let batches = self.batches().clone();
        Ok(HandleBlocks {
            unselected_vertices: upload_points(vbo, &batches.unselected_vertices)?,
            selected_vertices: upload_points(vbo, &batches.selected_vertices)?,
            unselected_edges: upload_points(vbo, &batches.unselected_edges)?,
            selected_edges: upload_points(vbo, &batches.selected_edges)?,
            unselected_faces: upload_points(vbo, &batches.unselected_faces)?,
            selected_faces: upload_points(vbo, &batches.selected_faces)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::brush::Face;
    use crate::math::BBox;

    use cgmath::vec3;

    fn cube() -> Brush {
        let world = BBox::new(vec3(-4096.0, -4096.0, -4096.0), vec3(4096.0, 4096.0, 4096.0));
        let e = 64.0;
        let face = |center: Vector3<f64>, u: Vector3<f64>, v: Vector3<f64>| {
            Face::new(center, center + v, center + u, "__TB_empty").unwrap()
        };
        Brush::from_faces(
            world,
            vec![
                face(vec3(e, 0.0, 0.0), vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, 1.0)),
                face(vec3(-e, 0.0, 0.0), vec3(0.0, 0.0, 1.0), vec3(0.0, 1.0, 0.0)),
                face(vec3(0.0, e, 0.0), vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0)),
                face(vec3(0.0, -e, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0)),
                face(vec3(0.0, 0.0, e), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)),
                face(vec3(0.0, 0.0, -e), vec3(0.0, 1.0, 0.0), vec3(1.0, 0.0, 0.0)),
            ],
        )
        .unwrap()
    }

    fn id(brush: usize) -> BrushId {
        BrushId { entity: 0, brush }
    }

    #[test]
    fn test_add_indexes_all_handle_kinds() {
        let mut manager = HandleManager::new();
        let brush = cube();
        manager.add(id(0), &brush);

        assert_eq!(manager.unselected_vertex_handles.len(), 8);
        assert_eq!(manager.unselected_edge_handles.len(), 12);
        assert_eq!(manager.unselected_face_handles.len(), 6);

        // a second brush sharing a corner lands in the same buckets
        let mut other = cube();
        other.translate(vec3(128.0, 128.0, 128.0)).unwrap();
        manager.add(id(1), &other);
        assert_eq!(manager.unselected_vertex_handles.len(), 15);
        assert_eq!(manager.brushes(vec3(64.0, 64.0, 64.0)).len(), 2);
    }

    #[test]
    fn test_remove_is_symmetric() {
        let mut manager = HandleManager::new();
        let brush = cube();
        manager.add(id(0), &brush);
        manager.remove(id(0), &brush);

        assert!(manager.unselected_vertex_handles.is_empty());
        assert!(manager.unselected_edge_handles.is_empty());
        assert!(manager.unselected_face_handles.is_empty());
    }

    #[test]
    fn test_selection_migrates_entries() {
        let mut manager = HandleManager::new();
        manager.add(id(0), &cube());

        let corner = vec3(64.0, 64.0, 64.0);
        assert!(manager.select_vertex_handle(corner));
        assert_eq!(manager.selected_vertex_handles.len(), 1);
        assert_eq!(manager.unselected_vertex_handles.len(), 7);

        // selecting again fails; the handle already moved
        assert!(!manager.select_vertex_handle(corner));

        assert!(manager.deselect_vertex_handle(corner));
        assert_eq!(manager.unselected_vertex_handles.len(), 8);
    }

    #[test]
    fn test_save_and_restore_selection() {
        let mut manager = HandleManager::new();
        manager.add(id(0), &cube());

        let kept = vec3(64.0, 64.0, 64.0);
        let gone = vec3(-64.0, -64.0, -64.0);
        manager.select_vertex_handle(kept);
        manager.select_vertex_handle(gone);
        manager.save_selection();
        manager.deselect_all();

        // simulate a topology change that removed one handle
        let key = HandleKey::new(gone);
        manager.unselected_vertex_handles.remove(&key);

        manager.restore_selection();
        assert_eq!(manager.selected_vertex_positions(), vec![kept]);
    }

    #[test]
    fn test_pick_closest_handle() {
        let mut manager = HandleManager::new();
        manager.add(id(0), &cube());

        let ray = Ray::new(vec3(200.0, 64.0, 64.0), vec3(-1.0, 0.0, 0.0));
        let hit = manager.pick(&ray).unwrap();
        assert_eq!(hit.kind, HandleKind::Vertex);
        assert_eq!(hit.position, vec3(64.0, 64.0, 64.0));
        assert!(!hit.selected);
        // the hit lands on the near surface of the scaled sphere
        assert!(hit.distance < 136.0);
    }

    #[test]
    fn test_pick_respects_max_distance() {
        let mut manager = HandleManager::with_options(HandleOptions {
            max_distance: 10.0,
            ..HandleOptions::default()
        });
        manager.add(id(0), &cube());

        let ray = Ray::new(vec3(200.0, 64.0, 64.0), vec3(-1.0, 0.0, 0.0));
        assert!(manager.pick(&ray).is_none());
    }

    #[test]
    fn test_pick_tie_breaks_lexicographically() {
        // the ray runs exactly between the edge handle at (64, 0, 64) and
        // the vertex handle at (64, 64, 64); both spheres are hit at the
        // same distance, so the lexicographically smaller position wins
        let mut manager = HandleManager::with_options(HandleOptions {
            radius: 3.0,
            scaling_factor: 0.05,
            max_distance: 2048.0,
        });
        manager.add(id(0), &cube());

        let ray = Ray::new(vec3(400.0, 32.0, 64.0), vec3(-1.0, 0.0, 0.0));
        let hit = manager.pick(&ray).unwrap();
        assert_eq!(hit.position, vec3(64.0, 0.0, 64.0));
        assert_eq!(hit.kind, HandleKind::Edge);
    }

    #[test]
    fn test_batches_rebuild_on_change() {
        let mut manager = HandleManager::new();
        manager.add(id(0), &cube());

        assert_eq!(manager.batches().unselected_vertices.len(), 8);
        assert_eq!(manager.batches().selected_vertices.len(), 0);

        manager.select_vertex_handle(vec3(64.0, 64.0, 64.0));
        assert_eq!(manager.batches().unselected_vertices.len(), 7);
        assert_eq!(manager.batches().selected_vertices.len(), 1);
    }

    #[test]
    fn test_upload_writes_point_blocks() {
        let mut manager = HandleManager::new();
        manager.add(id(0), &cube());

        let mut vbo = Vbo::new(4096);
        vbo.activate().unwrap();
        vbo.map().unwrap();

        let blocks = manager.upload(&mut vbo).unwrap();
        let (block, count) = blocks.unselected_vertices.unwrap();
        assert_eq!(count, 8);
        assert_eq!(vbo.block_capacity(block), 8 * 12);
        assert!(blocks.selected_vertices.is_none());
    }
}
