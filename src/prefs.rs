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

//! Persisted editor settings.
//!
//! The surrounding application provides the actual storage (registry,
//! config file, ...); the core only sees typed load/save calls keyed by a
//! hierarchical path string such as `"Editor/Grid/Size"`.

use std::collections::HashMap;

pub trait PreferenceStore {
    fn load_bool(&self, path: &str) -> Option<bool>;
    fn load_i32(&self, path: &str) -> Option<i32>;
    fn load_f32(&self, path: &str) -> Option<f32>;
    fn load_string(&self, path: &str) -> Option<String>;

    fn save_bool(&mut self, path: &str, value: bool);
    fn save_i32(&mut self, path: &str, value: i32);
    fn save_f32(&mut self, path: &str, value: f32);
    fn save_string(&mut self, path: &str, value: &str);
}

#[derive(Clone, Debug, PartialEq)]
enum PrefValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

/// An in-memory store backing tests and headless use.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: HashMap<String, PrefValue>,
}

impl MemoryPreferenceStore {
    pub fn new() -> MemoryPreferenceStore {
        MemoryPreferenceStore {
            values: HashMap::new(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load_bool(&self, path: &str) -> Option<bool> {
        match self.values.get(path) {
            Some(&PrefValue::Bool(b)) => Some(b),
            _ => None,
        }
    }

    fn load_i32(&self, path: &str) -> Option<i32> {
        match self.values.get(path) {
            Some(&PrefValue::Int(i)) => Some(i),
            _ => None,
        }
    }

    fn load_f32(&self, path: &str) -> Option<f32> {
        match self.values.get(path) {
            Some(&PrefValue::Float(f)) => Some(f),
            _ => None,
        }
    }

    fn load_string(&self, path: &str) -> Option<String> {
        match self.values.get(path) {
            Some(&PrefValue::Str(ref s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn save_bool(&mut self, path: &str, value: bool) {
        self.values.insert(path.to_owned(), PrefValue::Bool(value));
    }

    fn save_i32(&mut self, path: &str, value: i32) {
        self.values.insert(path.to_owned(), PrefValue::Int(value));
    }

    fn save_f32(&mut self, path: &str, value: f32) {
        self.values.insert(path.to_owned(), PrefValue::Float(value));
    }

    fn save_string(&mut self, path: &str, value: &str) {
        self.values
            .insert(path.to_owned(), PrefValue::Str(value.to_owned()));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut store = MemoryPreferenceStore::new();
        store.save_i32("Editor/Grid/Size", 4);
        store.save_bool("Editor/Grid/Snap", true);
        store.save_f32("Editor/Handles/Radius", 3.0);

        assert_eq!(store.load_i32("Editor/Grid/Size"), Some(4));
        assert_eq!(store.load_bool("Editor/Grid/Snap"), Some(true));
        assert_eq!(store.load_f32("Editor/Handles/Radius"), Some(3.0));
        assert_eq!(store.load_i32("Editor/Missing"), None);
        // type mismatches read as missing
        assert_eq!(store.load_bool("Editor/Grid/Size"), None);
    }
}
