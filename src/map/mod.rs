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

//! The map document: entities holding properties and brushes.

use crate::brush::Brush;
use crate::math::BBox;
use crate::texture::TextureManager;

/// A map entity: ordered key/value properties, optionally containing
/// brushes (worldspawn, doors, triggers...).
#[derive(Clone, Debug, Default)]
pub struct Entity {
    properties: Vec<(String, String)>,
    pub brushes: Vec<Brush>,
    /// Source line in the map file, if the entity was parsed from one.
    pub file_line: Option<usize>,
}

impl Entity {
    pub fn new() -> Entity {
        Entity::default()
    }

    pub fn classname(&self) -> Option<&str> {
        self.property("classname")
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v.as_str())
    }

    /// Sets a property, replacing an existing value in place so that the
    /// original file order survives a round trip.
    pub fn set_property<K, V>(&mut self, key: K, value: V)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let key = key.as_ref();
        match self.properties.iter_mut().find(|&&mut (ref k, _)| k == key) {
            Some(&mut (_, ref mut v)) => *v = value.as_ref().to_owned(),
            None => self
                .properties
                .push((key.to_owned(), value.as_ref().to_owned())),
        }
    }

    /// Removes a property, returning its previous value if it was present.
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        let index = self.properties.iter().position(|&(ref k, _)| k == key)?;
        Some(self.properties.remove(index).1)
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn add_brush(&mut self, brush: Brush) {
        self.brushes.push(brush);
    }
}

/// Addresses a brush within a map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BrushId {
    pub entity: usize,
    pub brush: usize,
}

/// The document: the world bounds every brush is clipped to, plus the
/// entity list.
#[derive(Clone, Debug)]
pub struct Map {
    world_bounds: BBox,
    entities: Vec<Entity>,
}

impl Map {
    pub fn new(world_bounds: BBox) -> Map {
        Map {
            world_bounds,
            entities: Vec::new(),
        }
    }

    pub fn world_bounds(&self) -> &BBox {
        &self.world_bounds
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.entities
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.classname() == Some("worldspawn"))
    }

    pub fn brush(&self, id: BrushId) -> Option<&Brush> {
        self.entities.get(id.entity)?.brushes.get(id.brush)
    }

    pub fn brush_mut(&mut self, id: BrushId) -> Option<&mut Brush> {
        self.entities.get_mut(id.entity)?.brushes.get_mut(id.brush)
    }

    pub fn brush_ids(&self) -> Vec<BrushId> {
        let mut ids = Vec::new();
        for (entity, e) in self.entities.iter().enumerate() {
            for brush in 0..e.brushes.len() {
                ids.push(BrushId { entity, brush });
            }
        }
        ids
    }

    /// Resolves every face's texture reference against loaded textures.
    pub fn resolve_textures(&mut self, textures: &TextureManager) {
        for entity in &mut self.entities {
            for brush in &mut entity.brushes {
                brush.resolve_textures(|name| textures.get(name));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::vec3;

    #[test]
    fn test_property_order_preserved() {
        let mut entity = Entity::new();
        entity.set_property("classname", "worldspawn");
        entity.set_property("wad", "quake.wad");
        entity.set_property("message", "the Slipgate Complex");
        entity.set_property("wad", "base.wad");

        let keys: Vec<&str> = entity.properties().iter().map(|&(ref k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["classname", "wad", "message"]);
        assert_eq!(entity.property("wad"), Some("base.wad"));

        assert_eq!(entity.remove_property("wad"), Some("base.wad".to_owned()));
        assert_eq!(entity.property("wad"), None);
        assert_eq!(entity.remove_property("wad"), None);
    }

    #[test]
    fn test_brush_lookup() {
        let mut map = Map::new(BBox::new(
            vec3(-4096.0, -4096.0, -4096.0),
            vec3(4096.0, 4096.0, 4096.0),
        ));
        let mut world = Entity::new();
        world.set_property("classname", "worldspawn");
        map.add_entity(world);

        assert!(map.worldspawn().is_some());
        assert!(map.brush(BrushId { entity: 0, brush: 0 }).is_none());
        assert!(map.brush_ids().is_empty());
    }
}
