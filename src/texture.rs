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

//! Decoded textures, keyed by name.
//!
//! WAD and BSP loaders live outside this crate; they populate a
//! [`TextureManager`] which faces then resolve their names against.

use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
pub struct TextureManager {
    textures: HashMap<String, Rc<Texture>>,
}

impl TextureManager {
    pub fn new() -> TextureManager {
        TextureManager {
            textures: HashMap::new(),
        }
    }

    /// Registers a texture, replacing any previous texture with the same name.
    pub fn add(&mut self, texture: Texture) -> Rc<Texture> {
        let rc = Rc::new(texture);
        self.textures.insert(rc.name.clone(), rc.clone());
        rc
    }

    pub fn get<S>(&self, name: S) -> Option<Rc<Texture>>
    where
        S: AsRef<str>,
    {
        self.textures.get(name.as_ref()).cloned()
    }

    pub fn remove<S>(&mut self, name: S) -> Option<Rc<Texture>>
    where
        S: AsRef<str>,
    {
        self.textures.remove(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut manager = TextureManager::new();
        manager.add(Texture {
            name: "metal1_1".to_owned(),
            width: 64,
            height: 64,
        });

        assert_eq!(manager.get("metal1_1").unwrap().width, 64);
        assert!(manager.get("missing").is_none());
    }
}
