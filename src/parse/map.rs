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

//! The ASCII map format.
//!
//! ```text
//! map      := entity*
//! entity   := "{" property* brush* "}"
//! property := string string
//! brush    := "{" face+ "}"
//! face     := "(" v ")" "(" v ")" "(" v ")" texture params
//! params   := xoff yoff rot xs ys                        -- Standard
//!           | "[" v off "]" "[" v off "]" rot xs ys      -- Valve 220
//! ```
//!
//! Parsing produces [`ParsedEntity`] records that preserve the file
//! contents verbatim; [`ParsedMap::into_map`] realizes them as document
//! entities, skipping degenerate brushes with a warning.

use std::io::{self, Write};

use crate::brush::{Brush, Face, TexAlignment};
use crate::map::{Entity, Map};
use crate::math::BBox;
use crate::parse::{report_progress, ParseError, Progress};

use cgmath::Vector3;

bitflags! {
    /// Token kinds, one bit each so that "expected" sets are unions.
    pub struct MapTokenKind: u32 {
        const FRAC          = 1 << 0;
        const DEC           = 1 << 1;
        const STR           = 1 << 2;
        const PAREN_OPEN    = 1 << 3;
        const PAREN_CLOSE   = 1 << 4;
        const BRACE_OPEN    = 1 << 5;
        const BRACE_CLOSE   = 1 << 6;
        const BRACKET_OPEN  = 1 << 7;
        const BRACKET_CLOSE = 1 << 8;
        const COMMENT       = 1 << 9;
    }
}

const NUMBER: MapTokenKind = MapTokenKind {
    bits: MapTokenKind::DEC.bits | MapTokenKind::FRAC.bits,
};

#[derive(Clone, Debug)]
pub struct MapToken {
    pub kind: MapTokenKind,
    pub data: String,
    pub line: usize,
    pub column: usize,
    /// Bytes consumed when this token was produced, for progress reporting.
    pub bytes_read: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Default,
    QuotedString,
    BareString,
    Dec,
    Frac,
    Comment,
}

/// Single-pass tokenizer over a byte slice, tracking 1-based line and
/// column positions.
pub struct MapTokenizer<'a> {
    input: &'a [u8],
    index: usize,
    line: usize,
    column: usize,
    state: State,
    buffer: String,
    start_line: usize,
    start_column: usize,
}

impl<'a> MapTokenizer<'a> {
    pub fn new(input: &'a [u8]) -> MapTokenizer<'a> {
        MapTokenizer {
            input,
            index: 0,
            line: 1,
            column: 1,
            state: State::Default,
            buffer: String::new(),
            start_line: 1,
            start_column: 1,
        }
    }

    pub fn size(&self) -> usize {
        self.input.len()
    }

    pub fn bytes_read(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    fn next_char(&mut self) -> Option<u8> {
        let c = *self.input.get(self.index)?;
        self.index += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek_char(&self) -> Option<u8> {
        self.input.get(self.index).copied()
    }

    fn begin(&mut self, state: State, line: usize, column: usize) {
        self.state = state;
        self.buffer.clear();
        self.start_line = line;
        self.start_column = column;
    }

    fn punct(&mut self, kind: MapTokenKind, line: usize, column: usize) -> MapToken {
        MapToken {
            kind,
            data: String::new(),
            line,
            column,
            bytes_read: self.index,
        }
    }

    fn emit(&mut self, kind: MapTokenKind) -> MapToken {
        let token = MapToken {
            kind,
            data: self.buffer.clone(),
            line: self.start_line,
            column: self.start_column,
            bytes_read: self.index,
        };
        self.buffer.clear();
        self.state = State::Default;
        token
    }

    fn number_kind(&self) -> MapTokenKind {
        if self.state == State::Dec {
            MapTokenKind::DEC
        } else {
            MapTokenKind::FRAC
        }
    }

    pub fn next(&mut self) -> Option<MapToken> {
        loop {
            let (line, column) = (self.line, self.column);
            let c = match self.next_char() {
                Some(c) => c,
                None => {
                    // flush a token cut off by end of input
                    return match self.state {
                        State::Default => None,
                        State::QuotedString | State::BareString => Some(self.emit(MapTokenKind::STR)),
                        State::Dec | State::Frac => {
                            let kind = self.number_kind();
                            Some(self.emit(kind))
                        }
                        State::Comment => Some(self.emit(MapTokenKind::COMMENT)),
                    };
                }
            };

            match self.state {
                State::Default => match c {
                    b'/' if self.peek_char() == Some(b'/') => {
                        self.next_char();
                        self.begin(State::Comment, line, column);
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => {}
                    b'{' => return Some(self.punct(MapTokenKind::BRACE_OPEN, line, column)),
                    b'}' => return Some(self.punct(MapTokenKind::BRACE_CLOSE, line, column)),
                    b'(' => return Some(self.punct(MapTokenKind::PAREN_OPEN, line, column)),
                    b')' => return Some(self.punct(MapTokenKind::PAREN_CLOSE, line, column)),
                    b'[' => return Some(self.punct(MapTokenKind::BRACKET_OPEN, line, column)),
                    b']' => return Some(self.punct(MapTokenKind::BRACKET_CLOSE, line, column)),
                    b'"' => self.begin(State::QuotedString, line, column),
                    b'-' | b'0'..=b'9' => {
                        self.begin(State::Dec, line, column);
                        self.buffer.push(c as char);
                    }
                    _ => {
                        self.begin(State::BareString, line, column);
                        self.buffer.push(c as char);
                    }
                },
                State::QuotedString => match c {
                    b'"' => return Some(self.emit(MapTokenKind::STR)),
                    _ => self.buffer.push(c as char),
                },
                State::BareString => match c {
                    b'/' if self.peek_char() == Some(b'/') => {
                        self.next_char();
                        let token = self.emit(MapTokenKind::STR);
                        self.begin(State::Comment, line, column);
                        return Some(token);
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => return Some(self.emit(MapTokenKind::STR)),
                    _ => self.buffer.push(c as char),
                },
                State::Dec | State::Frac => match c {
                    b'/' if self.peek_char() == Some(b'/') => {
                        self.next_char();
                        let kind = self.number_kind();
                        let token = self.emit(kind);
                        self.begin(State::Comment, line, column);
                        return Some(token);
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        let kind = self.number_kind();
                        return Some(self.emit(kind));
                    }
                    b'0'..=b'9' => self.buffer.push(c as char),
                    b'.' => {
                        self.state = State::Frac;
                        self.buffer.push(c as char);
                    }
                    _ => {
                        // not a number after all
                        self.state = State::BareString;
                        self.buffer.push(c as char);
                    }
                },
                State::Comment => match c {
                    b'\r' | b'\n' => return Some(self.emit(MapTokenKind::COMMENT)),
                    _ => self.buffer.push(c as char),
                },
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MapFormat {
    Standard,
    Valve,
}

/// A brush as read from the file: its face list, before geometry
/// validation.
#[derive(Clone, Debug)]
pub struct ParsedBrush {
    pub faces: Vec<Face>,
    pub file_line: usize,
}

/// An entity as read from the file, preserving property order and
/// duplicates for round-tripping.
#[derive(Clone, Debug)]
pub struct ParsedEntity {
    pub properties: Vec<(String, String)>,
    pub brushes: Vec<ParsedBrush>,
    pub file_line: usize,
}

#[derive(Clone, Debug)]
pub struct ParsedMap {
    pub entities: Vec<ParsedEntity>,
    pub format: Option<MapFormat>,
}

impl ParsedMap {
    /// Realizes the parsed records as a document, skipping brushes that do
    /// not form a valid solid.
    pub fn into_map(self, world_bounds: BBox) -> Map {
        let mut map = Map::new(world_bounds);
        for parsed_entity in self.entities {
            let mut entity = Entity::new();
            entity.file_line = Some(parsed_entity.file_line);
            for (key, value) in parsed_entity.properties {
                entity.set_property(key, value);
            }
            for parsed_brush in parsed_entity.brushes {
                if parsed_brush.faces.len() < 4 {
                    warn!(
                        "Skipping brush with fewer than 4 faces in line {}",
                        parsed_brush.file_line
                    );
                    continue;
                }
                match Brush::from_faces(world_bounds, parsed_brush.faces) {
                    Ok(mut brush) => {
                        brush.file_line = Some(parsed_brush.file_line);
                        entity.add_brush(brush);
                    }
                    Err(err) => {
                        warn!(
                            "Skipping degenerate brush in line {}: {}",
                            parsed_brush.file_line, err
                        );
                    }
                }
            }
            map.add_entity(entity);
        }
        map
    }

    /// Captures a document back into writable records.
    pub fn from_map(map: &Map) -> ParsedMap {
        let mut format = None;
        let entities = map
            .entities()
            .iter()
            .map(|entity| ParsedEntity {
                properties: entity
                    .properties()
                    .iter()
                    .map(|&(ref k, ref v)| (k.clone(), v.clone()))
                    .collect(),
                brushes: entity
                    .brushes
                    .iter()
                    .map(|brush| {
                        for face in brush.faces() {
                            format = Some(match face.alignment {
                                TexAlignment::Standard => MapFormat::Standard,
                                TexAlignment::Valve { .. } => MapFormat::Valve,
                            });
                        }
                        ParsedBrush {
                            faces: brush.faces().to_vec(),
                            file_line: brush.file_line.unwrap_or(0),
                        }
                    })
                    .collect(),
                file_line: entity.file_line.unwrap_or(0),
            })
            .collect();
        ParsedMap { entities, format }
    }
}

/// Recursive-descent parser over [`MapTokenizer`] with one token of
/// push-back.
pub struct MapParser<'a> {
    tokenizer: MapTokenizer<'a>,
    pushback: Vec<MapToken>,
    format: Option<MapFormat>,
    errors: Vec<ParseError>,
    depth: usize,
}

impl<'a> MapParser<'a> {
    pub fn new(input: &'a [u8]) -> MapParser<'a> {
        MapParser {
            tokenizer: MapTokenizer::new(input),
            pushback: Vec::new(),
            format: None,
            errors: Vec::new(),
            depth: 0,
        }
    }

    /// Recoverable errors collected during `parse`: each one aborted an
    /// entity, with parsing resuming at the next top-level `{`.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn format(&self) -> Option<MapFormat> {
        self.format
    }

    /// Parses the whole input. Entities that fail to parse are skipped (the
    /// error is recorded); the only hard failure is cancellation through the
    /// progress callback.
    pub fn parse(&mut self, mut progress: Progress) -> Result<ParsedMap, ParseError> {
        let mut entities = Vec::new();
        loop {
            match self.parse_entity() {
                Ok(Some(entity)) => {
                    entities.push(entity);
                    if !report_progress(&mut progress, self.tokenizer.bytes_read()) {
                        return Err(ParseError::Cancelled);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("{}", err);
                    self.errors.push(err);
                    if !self.recover() {
                        break;
                    }
                }
            }
        }
        report_progress(&mut progress, self.tokenizer.size());
        Ok(ParsedMap {
            entities,
            format: self.format,
        })
    }

    /// Skips forward to the next top-level `{` after a syntax error.
    fn recover(&mut self) -> bool {
        self.pushback.clear();
        while let Some(token) = self.next_token() {
            if token.kind == MapTokenKind::BRACE_OPEN && self.depth == 1 {
                self.push_token(token);
                return true;
            }
        }
        false
    }

    fn next_token(&mut self) -> Option<MapToken> {
        if let Some(token) = self.pushback.pop() {
            return Some(token);
        }
        loop {
            let token = self.tokenizer.next()?;
            match token.kind {
                MapTokenKind::COMMENT => continue,
                MapTokenKind::BRACE_OPEN => {
                    self.depth += 1;
                    return Some(token);
                }
                MapTokenKind::BRACE_CLOSE => {
                    self.depth = self.depth.saturating_sub(1);
                    return Some(token);
                }
                _ => return Some(token),
            }
        }
    }

    fn push_token(&mut self, token: MapToken) {
        debug_assert!(self.pushback.is_empty());
        self.pushback.push(token);
    }

    fn unexpected(&self, expected: MapTokenKind, token: &MapToken) -> ParseError {
        ParseError::UnexpectedToken {
            line: token.line,
            column: token.column,
            expected: format!("{:?}", expected),
            got: format!("{:?}", token.kind),
        }
    }

    fn expect(&self, expected: MapTokenKind, token: &MapToken) -> Result<(), ParseError> {
        if expected.intersects(token.kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected, token))
        }
    }

    fn expect_next(&mut self, expected: MapTokenKind) -> Result<MapToken, ParseError> {
        match self.next_token() {
            Some(token) => {
                self.expect(expected, &token)?;
                Ok(token)
            }
            None => {
                let (line, column) = self.tokenizer.position();
                Err(ParseError::Eof { line, column })
            }
        }
    }

    fn number(&self, token: &MapToken) -> Result<f64, ParseError> {
        token
            .data
            .parse()
            .map_err(|_| self.unexpected(NUMBER, token))
    }

    fn parse_entity(&mut self) -> Result<Option<ParsedEntity>, ParseError> {
        let token = match self.next_token() {
            Some(token) => token,
            None => return Ok(None),
        };
        self.expect(MapTokenKind::BRACE_OPEN | MapTokenKind::BRACE_CLOSE, &token)?;
        if token.kind == MapTokenKind::BRACE_CLOSE {
            return Ok(None);
        }

        let mut entity = ParsedEntity {
            properties: Vec::new(),
            brushes: Vec::new(),
            file_line: token.line,
        };

        loop {
            let token = match self.next_token() {
                Some(token) => token,
                None => {
                    warn!("Unterminated entity at end of input");
                    return Ok(Some(entity));
                }
            };
            match token.kind {
                MapTokenKind::STR => {
                    let value = self.expect_next(MapTokenKind::STR)?;
                    entity.properties.push((token.data, value.data));
                }
                MapTokenKind::BRACE_OPEN => {
                    self.push_token(token);
                    while let Some(brush) = self.parse_brush()? {
                        entity.brushes.push(brush);
                    }
                    // the brush loop consumed the entity's closing brace
                    return Ok(Some(entity));
                }
                MapTokenKind::BRACE_CLOSE => return Ok(Some(entity)),
                _ => {
                    return Err(self.unexpected(
                        MapTokenKind::STR | MapTokenKind::BRACE_OPEN | MapTokenKind::BRACE_CLOSE,
                        &token,
                    ));
                }
            }
        }
    }

    fn parse_brush(&mut self) -> Result<Option<ParsedBrush>, ParseError> {
        let token = self.expect_next(MapTokenKind::BRACE_OPEN | MapTokenKind::BRACE_CLOSE)?;
        if token.kind == MapTokenKind::BRACE_CLOSE {
            return Ok(None);
        }

        let mut brush = ParsedBrush {
            faces: Vec::new(),
            file_line: token.line,
        };
        loop {
            let token = self.expect_next(MapTokenKind::PAREN_OPEN | MapTokenKind::BRACE_CLOSE)?;
            if token.kind == MapTokenKind::BRACE_CLOSE {
                return Ok(Some(brush));
            }
            self.push_token(token);
            if let Some(face) = self.parse_face()? {
                brush.faces.push(face);
            }
        }
    }

    fn parse_point(&mut self) -> Result<Vector3<f64>, ParseError> {
        self.expect_next(MapTokenKind::PAREN_OPEN)?;
        let x = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        let y = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        let z = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        self.expect_next(MapTokenKind::PAREN_CLOSE)?;
        Ok(Vector3::new(x, y, z))
    }

    /// Reads a texture offset, rounding fractional values with a warning.
    fn parse_offset(&mut self, token: &MapToken) -> Result<f32, ParseError> {
        let value = self.number(token)?;
        if token.kind == MapTokenKind::FRAC {
            warn!("Rounding fractional texture offset in line {}", token.line);
        }
        Ok(value.round() as f32)
    }

    fn parse_face(&mut self) -> Result<Option<Face>, ParseError> {
        let first = self.expect_next(MapTokenKind::PAREN_OPEN)?;
        let face_line = first.line;
        self.push_token(first);

        let p1 = self.parse_point()?;
        let p2 = self.parse_point()?;
        let p3 = self.parse_point()?;

        let name = self.expect_next(MapTokenKind::STR)?;

        let token = self.expect_next(NUMBER | MapTokenKind::BRACKET_OPEN)?;
        let valve = token.kind == MapTokenKind::BRACKET_OPEN;
        match self.format {
            None => {
                self.format = Some(if valve {
                    MapFormat::Valve
                } else {
                    MapFormat::Standard
                });
            }
            Some(MapFormat::Standard) if valve => {
                return Err(ParseError::MixedFormats { line: token.line });
            }
            Some(MapFormat::Valve) if !valve => {
                return Err(ParseError::MixedFormats { line: token.line });
            }
            _ => {}
        }

        let x_offset;
        let y_offset;
        let mut alignment = TexAlignment::Standard;
        if valve {
            // token was the opening bracket of the X axis
            let ax = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let ay = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let az = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let off = self.expect_next(NUMBER)?;
            x_offset = self.parse_offset(&off)?;
            self.expect_next(MapTokenKind::BRACKET_CLOSE)?;

            self.expect_next(MapTokenKind::BRACKET_OPEN)?;
            let bx = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let by = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let bz = {
                let t = self.expect_next(NUMBER)?;
                self.number(&t)?
            };
            let off = self.expect_next(NUMBER)?;
            y_offset = self.parse_offset(&off)?;
            self.expect_next(MapTokenKind::BRACKET_CLOSE)?;

            alignment = TexAlignment::Valve {
                x_axis: Vector3::new(ax, ay, az),
                y_axis: Vector3::new(bx, by, bz),
            };
        } else {
            x_offset = self.parse_offset(&token)?;
            let off = self.expect_next(NUMBER)?;
            y_offset = self.parse_offset(&off)?;
        }

        let rotation = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)? as f32
        };
        let x_scale = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)? as f32
        };
        let y_scale = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)? as f32
        };

        let mut face = match Face::new(p1, p2, p3, &name.data) {
            Some(face) => face,
            None => {
                warn!("Skipping invalid face in line {}", face_line);
                return Ok(None);
            }
        };
        face.x_offset = x_offset;
        face.y_offset = y_offset;
        face.rotation = rotation;
        face.x_scale = x_scale;
        face.y_scale = y_scale;
        face.alignment = alignment;
        face.file_line = Some(face_line);
        Ok(Some(face))
    }
}

/// Parses a map file and realizes it as a document.
///
/// Returns the document together with the recoverable errors encountered;
/// entities parsed before (and after) an error are retained. Cancellation
/// through the progress callback is the only hard failure.
pub fn load_map(
    input: &[u8],
    world_bounds: BBox,
    progress: Progress,
) -> Result<(Map, Vec<ParseError>), ParseError> {
    let mut parser = MapParser::new(input);
    let parsed = parser.parse(progress)?;
    let errors = parser.errors().to_vec();
    Ok((parsed.into_map(world_bounds), errors))
}

fn fmt_f64(value: f64) -> String {
    format!("{}", value)
}

fn fmt_f32(value: f32) -> String {
    format!("{}", value)
}

fn write_face<W: Write>(face: &Face, w: &mut W) -> io::Result<()> {
    let p = face.points();
    for point in p.iter() {
        write!(
            w,
            "( {} {} {} ) ",
            fmt_f64(point.x),
            fmt_f64(point.y),
            fmt_f64(point.z)
        )?;
    }
    write!(w, "{}", face.texture_name)?;

    match face.alignment {
        TexAlignment::Standard => {
            write!(w, " {} {}", fmt_f32(face.x_offset), fmt_f32(face.y_offset))?;
        }
        TexAlignment::Valve { x_axis, y_axis } => {
            write!(
                w,
                " [ {} {} {} {} ] [ {} {} {} {} ]",
                fmt_f64(x_axis.x),
                fmt_f64(x_axis.y),
                fmt_f64(x_axis.z),
                fmt_f32(face.x_offset),
                fmt_f64(y_axis.x),
                fmt_f64(y_axis.y),
                fmt_f64(y_axis.z),
                fmt_f32(face.y_offset),
            )?;
        }
    }

    writeln!(
        w,
        " {} {} {}",
        fmt_f32(face.rotation),
        fmt_f32(face.x_scale),
        fmt_f32(face.y_scale)
    )
}

/// Serializes a map in canonical form: one property or face per line,
/// numbers in their shortest decimal representation.
///
/// `parse(write(map))` reproduces `map`, and writing an already canonical
/// file is byte-identical.
pub fn write_map<W: Write>(map: &ParsedMap, w: &mut W) -> io::Result<()> {
    for entity in &map.entities {
        writeln!(w, "{{")?;
        for &(ref key, ref value) in &entity.properties {
            writeln!(w, "\"{}\" \"{}\"", key, value)?;
        }
        for brush in &entity.brushes {
            writeln!(w, "{{")?;
            for face in &brush.faces {
                write_face(face, w)?;
            }
            writeln!(w, "}}")?;
        }
        writeln!(w, "}}")?;
    }
    Ok(())
}

/// Convenience wrapper serializing into a `String`.
pub fn write_map_string(map: &ParsedMap) -> String {
    let mut out = Vec::new();
    write_map(map, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::vec3;

    fn world_bounds() -> BBox {
        BBox::new(vec3(-4096.0, -4096.0, -4096.0), vec3(4096.0, 4096.0, 4096.0))
    }

    fn kinds(input: &str) -> Vec<MapTokenKind> {
        let mut tokenizer = MapTokenizer::new(input.as_bytes());
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next() {
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_tokenizer_punctuation() {
        assert_eq!(
            kinds("{ } ( ) [ ]"),
            vec![
                MapTokenKind::BRACE_OPEN,
                MapTokenKind::BRACE_CLOSE,
                MapTokenKind::PAREN_OPEN,
                MapTokenKind::PAREN_CLOSE,
                MapTokenKind::BRACKET_OPEN,
                MapTokenKind::BRACKET_CLOSE,
            ]
        );
    }

    // the old tokenizer emitted a closing curly brace for `]`
    #[test]
    fn test_bracket_close_token_kind() {
        let mut tokenizer = MapTokenizer::new(b"]");
        let token = tokenizer.next().unwrap();
        assert_eq!(token.kind, MapTokenKind::BRACKET_CLOSE);
        assert_ne!(token.kind, MapTokenKind::BRACE_CLOSE);
    }

    #[test]
    fn test_tokenizer_numbers_and_strings() {
        let mut tokenizer = MapTokenizer::new(b"-64 0.5 metal1_1 \"two words\" -x");
        let token = tokenizer.next().unwrap();
        assert_eq!((token.kind, token.data.as_str()), (MapTokenKind::DEC, "-64"));
        let token = tokenizer.next().unwrap();
        assert_eq!((token.kind, token.data.as_str()), (MapTokenKind::FRAC, "0.5"));
        let token = tokenizer.next().unwrap();
        assert_eq!(
            (token.kind, token.data.as_str()),
            (MapTokenKind::STR, "metal1_1")
        );
        let token = tokenizer.next().unwrap();
        assert_eq!(
            (token.kind, token.data.as_str()),
            (MapTokenKind::STR, "two words")
        );
        // a sign followed by a letter is a bare string
        let token = tokenizer.next().unwrap();
        assert_eq!((token.kind, token.data.as_str()), (MapTokenKind::STR, "-x"));
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn test_tokenizer_comments_and_positions() {
        let mut tokenizer = MapTokenizer::new(b"// worldspawn\n{");
        let comment = tokenizer.next().unwrap();
        assert_eq!(comment.kind, MapTokenKind::COMMENT);
        assert_eq!(comment.data, " worldspawn");
        assert_eq!((comment.line, comment.column), (1, 1));

        let brace = tokenizer.next().unwrap();
        assert_eq!(brace.kind, MapTokenKind::BRACE_OPEN);
        assert_eq!((brace.line, brace.column), (2, 1));
    }

    const WORLDSPAWN: &str =
        "{ \"classname\" \"worldspawn\" { ( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) __TB_empty 0 0 0 1 1 } }";

    const WORLDSPAWN_CANONICAL: &str = "{\n\
                                        \"classname\" \"worldspawn\"\n\
                                        {\n\
                                        ( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) __TB_empty 0 0 0 1 1\n\
                                        }\n\
                                        }\n";

    #[test]
    fn test_parse_worldspawn() {
        let mut parser = MapParser::new(WORLDSPAWN.as_bytes());
        let parsed = parser.parse(None).unwrap();
        assert!(parser.errors().is_empty());
        assert_eq!(parsed.format, Some(MapFormat::Standard));
        assert_eq!(parsed.entities.len(), 1);

        let entity = &parsed.entities[0];
        assert_eq!(
            entity.properties,
            vec![("classname".to_owned(), "worldspawn".to_owned())]
        );
        assert_eq!(entity.brushes.len(), 1);
        assert_eq!(entity.brushes[0].faces.len(), 1);

        let face = &entity.brushes[0].faces[0];
        assert_eq!(face.texture_name, "__TB_empty");
        assert_eq!(*face.points(), [
            vec3(0.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
        ]);
        assert_eq!(face.x_scale, 1.0);
    }

    #[test]
    fn test_write_round_trip() {
        let mut parser = MapParser::new(WORLDSPAWN.as_bytes());
        let parsed = parser.parse(None).unwrap();

        let written = write_map_string(&parsed);
        assert_eq!(written, WORLDSPAWN_CANONICAL);

        // writing a canonical file again is byte-identical
        let mut parser = MapParser::new(written.as_bytes());
        let reparsed = parser.parse(None).unwrap();
        assert_eq!(write_map_string(&reparsed), WORLDSPAWN_CANONICAL);
    }

    fn cube_map(extent: i32) -> String {
        let e = extent;
        let faces = [
            ((e, 0, 0), (0, 1, 0), (0, 0, 1)),
            ((-e, 0, 0), (0, 0, 1), (0, 1, 0)),
            ((0, e, 0), (0, 0, 1), (1, 0, 0)),
            ((0, -e, 0), (1, 0, 0), (0, 0, 1)),
            ((0, 0, e), (1, 0, 0), (0, 1, 0)),
            ((0, 0, -e), (0, 1, 0), (1, 0, 0)),
        ];
        let mut out = String::from("{\n\"classname\" \"worldspawn\"\n{\n");
        for &((cx, cy, cz), (ux, uy, uz), (vx, vy, vz)) in faces.iter() {
            // defining points center, center + v, center + u give the
            // outward normal u x v
            out.push_str(&format!(
                "( {} {} {} ) ( {} {} {} ) ( {} {} {} ) __TB_empty 0 0 0 1 1\n",
                cx,
                cy,
                cz,
                cx + vx,
                cy + vy,
                cz + vz,
                cx + ux,
                cy + uy,
                cz + uz,
            ));
        }
        out.push_str("}\n}\n");
        out
    }

    #[test]
    fn test_load_cube_map() {
        let source = cube_map(64);
        let (map, errors) = load_map(source.as_bytes(), world_bounds(), None).unwrap();
        assert!(errors.is_empty());

        let world = map.worldspawn().unwrap();
        assert_eq!(world.brushes.len(), 1);
        let brush = &world.brushes[0];
        assert_eq!(brush.face_count(), 6);
        assert_eq!(brush.vertex_count(), 8);
        assert_eq!(
            *brush.bounds(),
            BBox::new(vec3(-64.0, -64.0, -64.0), vec3(64.0, 64.0, 64.0))
        );
    }

    #[test]
    fn test_single_face_brush_skipped_in_document() {
        let _ = env_logger::try_init();
        let (map, errors) = load_map(WORLDSPAWN.as_bytes(), world_bounds(), None).unwrap();
        assert!(errors.is_empty());
        // the record survives parsing but does not make a valid solid
        assert_eq!(map.worldspawn().unwrap().brushes.len(), 0);
    }

    #[test]
    fn test_valve_format() {
        let source = "{\n{\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) city2_5 \
                      [ 1 0 0 16 ] [ 0 -1 0 -32 ] 0 1 1\n}\n}\n";
        let mut parser = MapParser::new(source.as_bytes());
        let parsed = parser.parse(None).unwrap();
        assert!(parser.errors().is_empty());
        assert_eq!(parsed.format, Some(MapFormat::Valve));

        let face = &parsed.entities[0].brushes[0].faces[0];
        assert_eq!(face.x_offset, 16.0);
        assert_eq!(face.y_offset, -32.0);
        match face.alignment {
            TexAlignment::Valve { x_axis, y_axis } => {
                assert_eq!(x_axis, vec3(1.0, 0.0, 0.0));
                assert_eq!(y_axis, vec3(0.0, -1.0, 0.0));
            }
            ref other => panic!("wrong alignment: {:?}", other),
        }

        // round-trips through the writer
        let written = write_map_string(&parsed);
        let mut parser = MapParser::new(written.as_bytes());
        let reparsed = parser.parse(None).unwrap();
        assert_eq!(write_map_string(&reparsed), written);
    }

    #[test]
    fn test_mixed_formats_rejected() {
        let source = "{\n{\n\
                      ( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) a 0 0 0 1 1\n\
                      ( 0 0 8 ) ( 1 0 8 ) ( 0 1 8 ) b [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1\n\
                      }\n}\n";
        let mut parser = MapParser::new(source.as_bytes());
        let parsed = parser.parse(None).unwrap();
        assert_eq!(parsed.entities.len(), 0);
        match parser.errors() {
            [ParseError::MixedFormats { line: 4 }] => {}
            other => panic!("expected mixed-format error, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_at_next_entity() {
        let source = "{ \"classname\" ( }\n\
                      { \"classname\" \"info_player_start\" \"origin\" \"0 0 24\" }\n";
        let mut parser = MapParser::new(source.as_bytes());
        let parsed = parser.parse(None).unwrap();

        assert_eq!(parser.errors().len(), 1);
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(
            parsed.entities[0].properties[0],
            ("classname".to_owned(), "info_player_start".to_owned())
        );
    }

    #[test]
    fn test_fractional_offset_rounded() {
        let source = "{ { ( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) a 0.5 -3.5 0 1 1 } }";
        let mut parser = MapParser::new(source.as_bytes());
        let parsed = parser.parse(None).unwrap();
        let face = &parsed.entities[0].brushes[0].faces[0];
        assert_eq!(face.x_offset, 1.0);
        assert_eq!(face.y_offset, -4.0);
    }

    #[test]
    fn test_collinear_face_skipped() {
        let _ = env_logger::try_init();
        let source = "{ { ( 0 0 0 ) ( 1 1 1 ) ( 2 2 2 ) a 0 0 0 1 1 } }";
        let mut parser = MapParser::new(source.as_bytes());
        let parsed = parser.parse(None).unwrap();
        assert!(parser.errors().is_empty());
        assert_eq!(parsed.entities[0].brushes[0].faces.len(), 0);
    }

    #[test]
    fn test_cancellation() {
        let source = cube_map(64);
        let mut calls = 0;
        let mut cancel = |_bytes: usize| {
            calls += 1;
            false
        };
        match load_map(source.as_bytes(), world_bounds(), Some(&mut cancel)) {
            Err(ParseError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_progress_reports_bytes() {
        let source = cube_map(64);
        let total = source.len();
        let mut reports = Vec::new();
        {
            let mut progress = |bytes: usize| {
                reports.push(bytes);
                true
            };
            load_map(source.as_bytes(), world_bounds(), Some(&mut progress)).unwrap();
        }
        assert!(!reports.is_empty());
        assert_eq!(*reports.last().unwrap(), total);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }
}
