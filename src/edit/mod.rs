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

//! Editing commands with undo.
//!
//! A [`Command`] is a tagged variant carrying everything its `perform` and
//! `undo` need; commands touching brushes capture a [`Snapshot`] of each
//! brush's face list before mutating and restore it on undo. Every command
//! is transactional: a failed precondition leaves the document untouched.
//!
//! Consecutive commands describing one continuous drag collate into a
//! single undo step when they fall within a short time window.

pub mod notify;

use crate::brush::{Brush, BrushError, Face};
use crate::map::{BrushId, Map};
use crate::math::{self, SNAP_EPSILON};

use self::notify::Notifier;

use cgmath::Vector3;
use chrono::{DateTime, Duration, Utc};

/// Commands submitted within this window of each other are candidates for
/// collation.
fn collation_window() -> Duration {
    Duration::milliseconds(500)
}

#[derive(Clone, Debug, Fail)]
pub enum CommandError {
    /// A precondition failed; the document is unchanged. The caller
    /// surfaces the reason in the status line.
    #[fail(display = "operation rejected: {}", reason)]
    Rejected { reason: String },
    /// Internal bug detector; the failing command was aborted.
    #[fail(display = "geometry invariant violated: {}", detail)]
    InvariantViolated { detail: String },
    #[fail(display = "nothing to undo")]
    NothingToUndo,
    #[fail(display = "nothing to redo")]
    NothingToRedo,
}

impl From<BrushError> for CommandError {
    fn from(err: BrushError) -> CommandError {
        match err {
            BrushError::InvariantViolated { detail } => CommandError::InvariantViolated { detail },
            other => CommandError::Rejected {
                reason: other.to_string(),
            },
        }
    }
}

fn rejected(reason: impl ToString) -> CommandError {
    CommandError::Rejected {
        reason: reason.to_string(),
    }
}

/// Notifications published strictly around document mutations: `will`
/// before, `did` after, including on failure paths once `will` has fired.
#[derive(Clone, Debug, PartialEq)]
pub enum DocEvent {
    BrushesWillChange(Vec<BrushId>),
    BrushesDidChange(Vec<BrushId>),
    EntitiesWillChange(Vec<usize>),
    EntitiesDidChange(Vec<usize>),
}

/// Vertex positions to edit, grouped per brush.
pub type BrushVertices = Vec<(BrushId, Vec<Vector3<f64>>)>;

/// A deep copy of the mutable state of a set of brushes, opaque to
/// everything but the command that captured it.
#[derive(Clone, Debug)]
pub struct Snapshot {
    brushes: Vec<(BrushId, Vec<Face>)>,
}

impl Snapshot {
    fn capture(map: &Map, ids: &[BrushId]) -> Snapshot {
        let brushes = ids
            .iter()
            .filter_map(|&id| map.brush(id).map(|b| (id, b.faces().to_vec())))
            .collect();
        Snapshot { brushes }
    }

    fn restore(&self, map: &mut Map) -> Result<(), CommandError> {
        for &(id, ref faces) in &self.brushes {
            let brush = map
                .brush_mut(id)
                .ok_or_else(|| rejected("snapshotted brush no longer exists"))?;
            brush.replace_faces(faces.clone())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum Command {
    MoveVertices {
        vertices: BrushVertices,
        delta: Vector3<f64>,
        new_positions: Vec<Vector3<f64>>,
        snapshot: Option<Snapshot>,
        created: DateTime<Utc>,
    },
    SnapVertices {
        brushes: Vec<BrushId>,
        grid_size: f64,
        snapshot: Option<Snapshot>,
    },
    TranslateBrushes {
        brushes: Vec<BrushId>,
        delta: Vector3<f64>,
        snapshot: Option<Snapshot>,
        created: DateTime<Utc>,
    },
    SetEntityProperty {
        entity: usize,
        key: String,
        value: String,
        previous: Option<Option<String>>,
        created: DateTime<Utc>,
    },
    RemoveEntityProperty {
        entity: usize,
        key: String,
        previous: Option<String>,
    },
}

impl Command {
    pub fn move_vertices(vertices: BrushVertices, delta: Vector3<f64>) -> Command {
        Command::move_vertices_at(vertices, delta, Utc::now())
    }

    /// As [`move_vertices`](Self::move_vertices) with an explicit
    /// submission time, for deterministic collation.
    pub fn move_vertices_at(
        vertices: BrushVertices,
        delta: Vector3<f64>,
        created: DateTime<Utc>,
    ) -> Command {
        assert!(!vertices.is_empty());
        Command::MoveVertices {
            vertices,
            delta,
            new_positions: Vec::new(),
            snapshot: None,
            created,
        }
    }

    pub fn snap_vertices(brushes: Vec<BrushId>, grid_size: f64) -> Command {
        Command::SnapVertices {
            brushes,
            grid_size,
            snapshot: None,
        }
    }

    pub fn translate_brushes(brushes: Vec<BrushId>, delta: Vector3<f64>) -> Command {
        Command::TranslateBrushes {
            brushes,
            delta,
            snapshot: None,
            created: Utc::now(),
        }
    }

    pub fn set_entity_property<K, V>(entity: usize, key: K, value: V) -> Command
    where
        K: Into<String>,
        V: Into<String>,
    {
        Command::SetEntityProperty {
            entity,
            key: key.into(),
            value: value.into(),
            previous: None,
            created: Utc::now(),
        }
    }

    pub fn remove_entity_property<K>(entity: usize, key: K) -> Command
    where
        K: Into<String>,
    {
        Command::RemoveEntityProperty {
            entity,
            key: key.into(),
            previous: None,
        }
    }

    pub fn name(&self) -> String {
        match *self {
            Command::MoveVertices { ref vertices, .. } => {
                let count: usize = vertices.iter().map(|&(_, ref v)| v.len()).sum();
                if count == 1 {
                    "Move Vertex".to_owned()
                } else {
                    "Move Vertices".to_owned()
                }
            }
            Command::SnapVertices { .. } => "Snap Vertices".to_owned(),
            Command::TranslateBrushes { ref brushes, .. } => {
                if brushes.len() == 1 {
                    "Move Brush".to_owned()
                } else {
                    "Move Brushes".to_owned()
                }
            }
            Command::SetEntityProperty { ref key, .. } => format!("Set Property '{}'", key),
            Command::RemoveEntityProperty { ref key, .. } => format!("Remove Property '{}'", key),
        }
    }

    /// The positions the moved vertices ended up at, valid after a
    /// successful perform. Fewer than requested when the move merged
    /// vertices.
    pub fn new_positions(&self) -> &[Vector3<f64>] {
        match *self {
            Command::MoveVertices {
                ref new_positions, ..
            } => new_positions,
            _ => &[],
        }
    }

    fn perform(&mut self, map: &mut Map, notifier: &Notifier<DocEvent>) -> Result<(), CommandError> {
        match *self {
            Command::MoveVertices {
                ref vertices,
                delta,
                ref mut new_positions,
                ref mut snapshot,
                ..
            } => {
                let ids: Vec<BrushId> = vertices.iter().map(|&(id, _)| id).collect();

                // the whole command fails if any brush rejects the move
                for &(id, ref positions) in vertices.iter() {
                    let brush = map.brush(id).ok_or_else(|| rejected("no such brush"))?;
                    if !brush.can_move_vertices(positions, delta) {
                        return Err(rejected("vertices cannot be moved there"));
                    }
                }

                let taken = Snapshot::capture(map, &ids);
                notifier.notify(DocEvent::BrushesWillChange(ids.clone()));

                let mut moved = Vec::new();
                for &(id, ref positions) in vertices.iter() {
                    let result = match map.brush_mut(id) {
                        Some(brush) => brush.move_vertices(positions, delta),
                        None => Err(BrushError::EditRejected {
                            reason: "no such brush".to_owned(),
                        }),
                    };
                    match result {
                        Ok(positions) => moved.extend(positions),
                        Err(err) => {
                            // the precondition passed but the commit did
                            // not; put everything back
                            taken.restore(map)?;
                            notifier.notify(DocEvent::BrushesDidChange(ids));
                            return Err(err.into());
                        }
                    }
                }

                *new_positions = moved;
                *snapshot = Some(taken);
                notifier.notify(DocEvent::BrushesDidChange(ids));
                Ok(())
            }

            Command::SnapVertices {
                ref brushes,
                grid_size,
                ref mut snapshot,
            } => {
                for &id in brushes.iter() {
                    let brush = map.brush(id).ok_or_else(|| rejected("no such brush"))?;
                    let mut scratch = brush.clone();
                    scratch.snap_vertices(grid_size)?;
                }

                let taken = Snapshot::capture(map, brushes);
                notifier.notify(DocEvent::BrushesWillChange(brushes.clone()));
                for &id in brushes.iter() {
                    if let Some(brush) = map.brush_mut(id) {
                        if let Err(err) = brush.snap_vertices(grid_size) {
                            taken.restore(map)?;
                            notifier.notify(DocEvent::BrushesDidChange(brushes.clone()));
                            return Err(err.into());
                        }
                    }
                }
                *snapshot = Some(taken);
                notifier.notify(DocEvent::BrushesDidChange(brushes.clone()));
                Ok(())
            }

            Command::TranslateBrushes {
                ref brushes,
                delta,
                ref mut snapshot,
                ..
            } => {
                for &id in brushes.iter() {
                    let brush = map.brush(id).ok_or_else(|| rejected("no such brush"))?;
                    let mut scratch = brush.clone();
                    scratch.translate(delta)?;
                }

                let taken = Snapshot::capture(map, brushes);
                notifier.notify(DocEvent::BrushesWillChange(brushes.clone()));
                for &id in brushes.iter() {
                    if let Some(brush) = map.brush_mut(id) {
                        if let Err(err) = brush.translate(delta) {
                            taken.restore(map)?;
                            notifier.notify(DocEvent::BrushesDidChange(brushes.clone()));
                            return Err(err.into());
                        }
                    }
                }
                *snapshot = Some(taken);
                notifier.notify(DocEvent::BrushesDidChange(brushes.clone()));
                Ok(())
            }

            Command::SetEntityProperty {
                entity,
                ref key,
                ref value,
                ref mut previous,
                ..
            } => {
                if entity >= map.entities().len() {
                    return Err(rejected("no such entity"));
                }
                notifier.notify(DocEvent::EntitiesWillChange(vec![entity]));
                {
                    let e = &mut map.entities_mut()[entity];
                    *previous = Some(e.property(key).map(str::to_owned));
                    e.set_property(key, value);
                }
                notifier.notify(DocEvent::EntitiesDidChange(vec![entity]));
                Ok(())
            }

            Command::RemoveEntityProperty {
                entity,
                ref key,
                ref mut previous,
            } => {
                if entity >= map.entities().len() {
                    return Err(rejected("no such entity"));
                }
                if map.entities()[entity].property(key).is_none() {
                    return Err(rejected(format!("entity has no property '{}'", key)));
                }
                notifier.notify(DocEvent::EntitiesWillChange(vec![entity]));
                *previous = map.entities_mut()[entity].remove_property(key);
                notifier.notify(DocEvent::EntitiesDidChange(vec![entity]));
                Ok(())
            }
        }
    }

    fn undo(&mut self, map: &mut Map, notifier: &Notifier<DocEvent>) -> Result<(), CommandError> {
        match *self {
            Command::MoveVertices {
                ref vertices,
                ref snapshot,
                ..
            } => {
                let ids: Vec<BrushId> = vertices.iter().map(|&(id, _)| id).collect();
                let snapshot = snapshot
                    .as_ref()
                    .ok_or_else(|| rejected("command was never performed"))?;
                notifier.notify(DocEvent::BrushesWillChange(ids.clone()));
                let result = snapshot.restore(map);
                notifier.notify(DocEvent::BrushesDidChange(ids));
                result
            }

            Command::SnapVertices {
                ref brushes,
                ref snapshot,
                ..
            }
            | Command::TranslateBrushes {
                ref brushes,
                ref snapshot,
                ..
            } => {
                let snapshot = snapshot
                    .as_ref()
                    .ok_or_else(|| rejected("command was never performed"))?;
                notifier.notify(DocEvent::BrushesWillChange(brushes.clone()));
                let result = snapshot.restore(map);
                notifier.notify(DocEvent::BrushesDidChange(brushes.clone()));
                result
            }

            Command::SetEntityProperty {
                entity,
                ref key,
                ref previous,
                ..
            } => {
                let previous = previous
                    .as_ref()
                    .ok_or_else(|| rejected("command was never performed"))?;
                notifier.notify(DocEvent::EntitiesWillChange(vec![entity]));
                {
                    let e = &mut map.entities_mut()[entity];
                    match *previous {
                        Some(ref value) => e.set_property(key, value),
                        None => {
                            e.remove_property(key);
                        }
                    }
                }
                notifier.notify(DocEvent::EntitiesDidChange(vec![entity]));
                Ok(())
            }

            Command::RemoveEntityProperty {
                entity,
                ref key,
                ref previous,
            } => {
                let value = previous
                    .as_ref()
                    .ok_or_else(|| rejected("command was never performed"))?;
                notifier.notify(DocEvent::EntitiesWillChange(vec![entity]));
                map.entities_mut()[entity].set_property(key, value);
                notifier.notify(DocEvent::EntitiesDidChange(vec![entity]));
                Ok(())
            }
        }
    }

    /// Merges a newly performed command into this one when both describe
    /// one continuous edit. Returns true if `other` was absorbed.
    fn collate(&mut self, other: &Command) -> bool {
        match (self, other) {
            (
                &mut Command::MoveVertices {
                    vertices: ref self_vertices,
                    delta: ref mut self_delta,
                    new_positions: ref mut self_new,
                    created: ref mut self_created,
                    ..
                },
                &Command::MoveVertices {
                    vertices: ref other_vertices,
                    delta: other_delta,
                    new_positions: ref other_new,
                    created: other_created,
                    ..
                },
            ) => {
                if !within_window(*self_created, other_created) {
                    return false;
                }
                if !same_brush_set(self_vertices, other_vertices) {
                    return false;
                }
                // the drag continues where the last one ended
                let sources: Vec<Vector3<f64>> = other_vertices
                    .iter()
                    .flat_map(|&(_, ref positions)| positions.iter().cloned())
                    .collect();
                if !same_position_set(&sources, self_new) {
                    return false;
                }

                *self_delta += other_delta;
                *self_new = other_new.clone();
                *self_created = other_created;
                true
            }

            (
                &mut Command::TranslateBrushes {
                    brushes: ref self_brushes,
                    delta: ref mut self_delta,
                    created: ref mut self_created,
                    ..
                },
                &Command::TranslateBrushes {
                    brushes: ref other_brushes,
                    delta: other_delta,
                    created: other_created,
                    ..
                },
            ) => {
                let mut a = self_brushes.clone();
                let mut b = other_brushes.clone();
                a.sort();
                b.sort();
                if a != b || !within_window(*self_created, other_created) {
                    return false;
                }
                *self_delta += other_delta;
                *self_created = other_created;
                true
            }

            (
                &mut Command::SetEntityProperty {
                    entity: self_entity,
                    key: ref self_key,
                    value: ref mut self_value,
                    created: ref mut self_created,
                    ..
                },
                &Command::SetEntityProperty {
                    entity: other_entity,
                    key: ref other_key,
                    value: ref other_value,
                    created: other_created,
                    ..
                },
            ) => {
                if self_entity != other_entity
                    || self_key != other_key
                    || !within_window(*self_created, other_created)
                {
                    return false;
                }
                // keep the first command's previous value so undo restores
                // the state before the whole edit
                *self_value = other_value.clone();
                *self_created = other_created;
                true
            }

            _ => false,
        }
    }
}

fn within_window(earlier: DateTime<Utc>, later: DateTime<Utc>) -> bool {
    let elapsed = later.signed_duration_since(earlier);
    elapsed >= Duration::zero() && elapsed <= collation_window()
}

fn same_brush_set(a: &BrushVertices, b: &BrushVertices) -> bool {
    let mut a_ids: Vec<BrushId> = a.iter().map(|&(id, _)| id).collect();
    let mut b_ids: Vec<BrushId> = b.iter().map(|&(id, _)| id).collect();
    a_ids.sort();
    b_ids.sort();
    a_ids == b_ids
}

fn same_position_set(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| math::lexicographic_cmp(*x, *y));
    b.sort_by(|x, y| math::lexicographic_cmp(*x, *y));
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| math::vec_eq(*x, *y, SNAP_EPSILON))
}

enum StackEntry {
    Single(Command),
    Group(Vec<Command>),
}

/// Submission-ordered command history with undo, redo and groups.
#[derive(Default)]
pub struct CommandStack {
    undo_stack: Vec<StackEntry>,
    redo_stack: Vec<StackEntry>,
    open_groups: Vec<Vec<Command>>,
}

impl CommandStack {
    pub fn new() -> CommandStack {
        CommandStack {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open_groups: Vec::new(),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() && self.open_groups.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty() && self.open_groups.is_empty()
    }

    /// Name of the command the next undo would revert.
    pub fn undo_name(&self) -> Option<String> {
        match self.undo_stack.last() {
            Some(&StackEntry::Single(ref cmd)) => Some(cmd.name()),
            Some(&StackEntry::Group(ref cmds)) => cmds.first().map(Command::name),
            None => None,
        }
    }

    /// Performs a command and records it for undo. A failed command leaves
    /// both the document and the history untouched.
    pub fn exec(
        &mut self,
        map: &mut Map,
        notifier: &Notifier<DocEvent>,
        mut command: Command,
    ) -> Result<(), CommandError> {
        command.perform(map, notifier)?;
        self.redo_stack.clear();

        if let Some(group) = self.open_groups.last_mut() {
            if let Some(last) = group.last_mut() {
                if last.collate(&command) {
                    return Ok(());
                }
            }
            group.push(command);
            return Ok(());
        }

        if let Some(&mut StackEntry::Single(ref mut last)) = self.undo_stack.last_mut() {
            if last.collate(&command) {
                return Ok(());
            }
        }
        self.undo_stack.push(StackEntry::Single(command));
        Ok(())
    }

    /// Opens a scope whose commands form a single undo step.
    pub fn begin_group(&mut self) {
        self.open_groups.push(Vec::new());
    }

    /// Closes the innermost group. Nested groups flatten into their parent.
    pub fn end_group(&mut self) {
        let group = match self.open_groups.pop() {
            Some(group) => group,
            None => return,
        };
        if group.is_empty() {
            return;
        }
        if let Some(parent) = self.open_groups.last_mut() {
            parent.extend(group);
        } else {
            self.undo_stack.push(StackEntry::Group(group));
        }
    }

    /// Abandons the innermost group, undoing its commands in reverse order.
    pub fn rollback_group(
        &mut self,
        map: &mut Map,
        notifier: &Notifier<DocEvent>,
    ) -> Result<(), CommandError> {
        let mut group = match self.open_groups.pop() {
            Some(group) => group,
            None => return Ok(()),
        };
        for command in group.iter_mut().rev() {
            command.undo(map, notifier)?;
        }
        Ok(())
    }

    /// Runs a closure inside a group; any failure rolls the group back and
    /// the error is returned.
    pub fn group<F>(
        &mut self,
        map: &mut Map,
        notifier: &Notifier<DocEvent>,
        f: F,
    ) -> Result<(), CommandError>
    where
        F: FnOnce(&mut CommandStack, &mut Map, &Notifier<DocEvent>) -> Result<(), CommandError>,
    {
        self.begin_group();
        match f(self, map, notifier) {
            Ok(()) => {
                self.end_group();
                Ok(())
            }
            Err(err) => {
                self.rollback_group(map, notifier)?;
                Err(err)
            }
        }
    }

    pub fn undo(
        &mut self,
        map: &mut Map,
        notifier: &Notifier<DocEvent>,
    ) -> Result<(), CommandError> {
        if !self.open_groups.is_empty() {
            return Err(rejected("a command group is still open"));
        }
        let mut entry = self.undo_stack.pop().ok_or(CommandError::NothingToUndo)?;
        match entry {
            StackEntry::Single(ref mut command) => command.undo(map, notifier)?,
            StackEntry::Group(ref mut commands) => {
                for command in commands.iter_mut().rev() {
                    command.undo(map, notifier)?;
                }
            }
        }
        self.redo_stack.push(entry);
        Ok(())
    }

    pub fn redo(
        &mut self,
        map: &mut Map,
        notifier: &Notifier<DocEvent>,
    ) -> Result<(), CommandError> {
        if !self.open_groups.is_empty() {
            return Err(rejected("a command group is still open"));
        }
        let mut entry = self.redo_stack.pop().ok_or(CommandError::NothingToRedo)?;
        let result = match entry {
            StackEntry::Single(ref mut command) => command.perform(map, notifier),
            StackEntry::Group(ref mut commands) => {
                let mut failed = None;
                for (index, command) in commands.iter_mut().enumerate() {
                    if let Err(err) = command.perform(map, notifier) {
                        failed = Some((index, err));
                        break;
                    }
                }
                match failed {
                    None => Ok(()),
                    Some((index, err)) => {
                        // roll the partial redo back
                        for command in commands[..index].iter_mut().rev() {
                            command.undo(map, notifier)?;
                        }
                        Err(err)
                    }
                }
            }
        };
        match result {
            Ok(()) => {
                self.undo_stack.push(entry);
                Ok(())
            }
            Err(err) => {
                self.redo_stack.push(entry);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::brush::Face;
    use crate::map::Entity;
    use crate::math::BBox;

    use cgmath::vec3;

    fn world_bounds() -> BBox {
        BBox::new(vec3(-4096.0, -4096.0, -4096.0), vec3(4096.0, 4096.0, 4096.0))
    }

    fn cube(extent: f64) -> Brush {
        let face = |center: Vector3<f64>, u: Vector3<f64>, v: Vector3<f64>| {
            Face::new(center, center + v, center + u, "__TB_empty").unwrap()
        };
        let e = extent;
        Brush::from_faces(
            world_bounds(),
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

    fn test_map() -> (Map, Notifier<DocEvent>, BrushId) {
        let mut map = Map::new(world_bounds());
        let mut world = Entity::new();
        world.set_property("classname", "worldspawn");
        world.add_brush(cube(64.0));
        map.add_entity(world);
        (map, Notifier::new(), BrushId { entity: 0, brush: 0 })
    }

    fn sorted_positions(brush: &Brush) -> Vec<Vector3<f64>> {
        let mut positions = brush.vertex_positions();
        positions.sort_by(|a, b| math::lexicographic_cmp(*a, *b));
        positions
    }

    #[test]
    fn test_move_vertices_do_undo_redo() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();
        let before = sorted_positions(map.brush(id).unwrap());

        let command = Command::move_vertices(
            vec![(id, vec![vec3(64.0, 64.0, 64.0)])],
            vec3(-16.0, 0.0, 0.0),
        );
        stack.exec(&mut map, &notifier, command).unwrap();
        assert!(map
            .brush(id)
            .unwrap()
            .vertex_positions()
            .iter()
            .any(|p| math::vec_eq(*p, vec3(48.0, 64.0, 64.0), SNAP_EPSILON)));

        stack.undo(&mut map, &notifier).unwrap();
        assert_eq!(sorted_positions(map.brush(id).unwrap()), before);

        stack.redo(&mut map, &notifier).unwrap();
        assert!(map
            .brush(id)
            .unwrap()
            .vertex_positions()
            .iter()
            .any(|p| math::vec_eq(*p, vec3(48.0, 64.0, 64.0), SNAP_EPSILON)));
    }

    #[test]
    fn test_rejected_move_leaves_document_untouched() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();
        let before = sorted_positions(map.brush(id).unwrap());

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        notifier.register(move |e: &DocEvent| sink.borrow_mut().push(e.clone()));

        let command = Command::move_vertices(
            vec![(id, vec![vec3(64.0, 64.0, 64.0)])],
            vec3(-200.0, 0.0, 0.0),
        );
        match stack.exec(&mut map, &notifier, command) {
            Err(CommandError::Rejected { .. }) => {}
            other => panic!("expected rejection, got {:?}", other),
        }

        assert_eq!(sorted_positions(map.brush(id).unwrap()), before);
        assert!(!stack.can_undo());
        // the precondition failed before any notification fired
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_notifications_bracket_the_mutation() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        notifier.register(move |e: &DocEvent| sink.borrow_mut().push(e.clone()));

        let command = Command::move_vertices(
            vec![(id, vec![vec3(64.0, 64.0, 64.0)])],
            vec3(-16.0, 0.0, 0.0),
        );
        stack.exec(&mut map, &notifier, command).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                DocEvent::BrushesWillChange(vec![id]),
                DocEvent::BrushesDidChange(vec![id]),
            ]
        );
    }

    #[test]
    fn test_collation_merges_continuous_drag() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();
        let before = sorted_positions(map.brush(id).unwrap());

        let t0 = Utc::now();
        let first = Command::move_vertices_at(
            vec![(id, vec![vec3(64.0, 64.0, 64.0)])],
            vec3(0.0, 0.0, 16.0),
            t0,
        );
        stack.exec(&mut map, &notifier, first).unwrap();

        // continues from the moved position, shortly after
        let second = Command::move_vertices_at(
            vec![(id, vec![vec3(64.0, 64.0, 80.0)])],
            vec3(0.0, 0.0, 16.0),
            t0 + Duration::milliseconds(100),
        );
        stack.exec(&mut map, &notifier, second).unwrap();

        assert_eq!(stack.undo_stack.len(), 1);
        match stack.undo_stack[0] {
            StackEntry::Single(Command::MoveVertices { delta, .. }) => {
                assert_eq!(delta, vec3(0.0, 0.0, 32.0));
            }
            _ => panic!("expected a single collated move command"),
        }

        // one undo reverts the whole drag
        stack.undo(&mut map, &notifier).unwrap();
        assert_eq!(sorted_positions(map.brush(id).unwrap()), before);
    }

    #[test]
    fn test_collation_respects_window_and_positions() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();

        let t0 = Utc::now();
        let first = Command::move_vertices_at(
            vec![(id, vec![vec3(64.0, 64.0, 64.0)])],
            vec3(0.0, 0.0, 16.0),
            t0,
        );
        stack.exec(&mut map, &notifier, first).unwrap();

        // outside the coalesce window
        let late = Command::move_vertices_at(
            vec![(id, vec![vec3(64.0, 64.0, 80.0)])],
            vec3(0.0, 0.0, 16.0),
            t0 + Duration::seconds(10),
        );
        stack.exec(&mut map, &notifier, late).unwrap();
        assert_eq!(stack.undo_stack.len(), 2);

        // a different handle set does not collate either
        let other_vertex = Command::move_vertices_at(
            vec![(id, vec![vec3(-64.0, -64.0, -64.0)])],
            vec3(0.0, 0.0, 16.0),
            t0 + Duration::seconds(10),
        );
        stack.exec(&mut map, &notifier, other_vertex).unwrap();
        assert_eq!(stack.undo_stack.len(), 3);
    }

    #[test]
    fn test_group_is_one_undo_step() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();
        let before = sorted_positions(map.brush(id).unwrap());

        stack
            .group(&mut map, &notifier, |stack, map, notifier| {
                stack.exec(
                    map,
                    notifier,
                    Command::translate_brushes(vec![id], vec3(16.0, 0.0, 0.0)),
                )?;
                stack.exec(
                    map,
                    notifier,
                    Command::set_entity_property(0, "message", "moved"),
                )
            })
            .unwrap();

        assert_eq!(map.entities()[0].property("message"), Some("moved"));
        assert_eq!(map.brush(id).unwrap().bounds().max.x, 80.0);

        stack.undo(&mut map, &notifier).unwrap();
        assert_eq!(sorted_positions(map.brush(id).unwrap()), before);
        assert_eq!(map.entities()[0].property("message"), None);
    }

    #[test]
    fn test_group_rollback_on_failure() {
        let (mut map, notifier, id) = test_map();
        let mut stack = CommandStack::new();
        let before = sorted_positions(map.brush(id).unwrap());

        let result = stack.group(&mut map, &notifier, |stack, map, notifier| {
            stack.exec(
                map,
                notifier,
                Command::translate_brushes(vec![id], vec3(16.0, 0.0, 0.0)),
            )?;
            // fails: the vertex does not exist
            stack.exec(
                map,
                notifier,
                Command::move_vertices(
                    vec![(id, vec![vec3(999.0, 999.0, 999.0)])],
                    vec3(1.0, 0.0, 0.0),
                ),
            )
        });

        assert!(result.is_err());
        assert_eq!(sorted_positions(map.brush(id).unwrap()), before);
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_entity_property_commands() {
        let (mut map, notifier, _) = test_map();
        let mut stack = CommandStack::new();

        stack
            .exec(
                &mut map,
                &notifier,
                Command::set_entity_property(0, "wad", "quake.wad"),
            )
            .unwrap();
        assert_eq!(map.entities()[0].property("wad"), Some("quake.wad"));

        stack
            .exec(&mut map, &notifier, Command::remove_entity_property(0, "wad"))
            .unwrap();
        assert_eq!(map.entities()[0].property("wad"), None);

        stack.undo(&mut map, &notifier).unwrap();
        assert_eq!(map.entities()[0].property("wad"), Some("quake.wad"));
        stack.undo(&mut map, &notifier).unwrap();
        assert_eq!(map.entities()[0].property("wad"), None);

        match stack.undo(&mut map, &notifier) {
            Err(CommandError::NothingToUndo) => {}
            other => panic!("expected empty undo stack, got {:?}", other),
        }
    }

    #[test]
    fn test_snap_vertices_command() {
        let (mut map, notifier, id) = test_map();
        // shift the cube off-grid first
        map.brush_mut(id)
            .unwrap()
            .translate(vec3(0.3, 0.0, 0.0))
            .unwrap();

        let mut stack = CommandStack::new();
        stack
            .exec(&mut map, &notifier, Command::snap_vertices(vec![id], 8.0))
            .unwrap();
        for p in map.brush(id).unwrap().vertex_positions() {
            assert!(p.x.abs() == 64.0 && p.y.abs() == 64.0 && p.z.abs() == 64.0);
        }

        stack.undo(&mut map, &notifier).unwrap();
        assert!(math::eq(map.brush(id).unwrap().bounds().min.x, -63.7));
    }
}
