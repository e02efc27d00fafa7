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

//! The entity-definition file format.
//!
//! Definitions live between `/*` and `*/`; everything outside is ignored
//! (including `//` comments). Inside a definition, newlines are
//! significant: the header line carries the name, color, bounds and spawn
//! flags, the following braced block carries properties, and the free-form
//! text before `*/` is the description.

use crate::math::BBox;
use crate::parse::{report_progress, ParseError, Progress};

use cgmath::Vector3;

bitflags! {
    pub struct DefTokenKind: u32 {
        const DEF_OPEN    = 1 << 0;
        const DEF_CLOSE   = 1 << 1;
        const PAREN_OPEN  = 1 << 2;
        const PAREN_CLOSE = 1 << 3;
        const BRACE_OPEN  = 1 << 4;
        const BRACE_CLOSE = 1 << 5;
        const SEMICOLON   = 1 << 6;
        const QUESTION    = 1 << 7;
        const NEWLINE     = 1 << 8;
        const COMMA       = 1 << 9;
        const WORD        = 1 << 10;
        const STR         = 1 << 11;
        const DEC         = 1 << 12;
        const FRAC        = 1 << 13;
    }
}

const NUMBER: DefTokenKind = DefTokenKind {
    bits: DefTokenKind::DEC.bits | DefTokenKind::FRAC.bits,
};

#[derive(Clone, Debug)]
pub struct DefToken {
    pub kind: DefTokenKind,
    pub data: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Outside,
    Inside,
    Comment,
    Word,
    QuotedString,
    Dec,
    Frac,
}

/// Two-state tokenizer: outside definitions it only looks for `/*`, inside
/// it emits punctuation, words, strings and numbers, with significant
/// newlines.
pub struct DefTokenizer<'a> {
    input: &'a [u8],
    index: usize,
    line: usize,
    column: usize,
    state: State,
    buffer: String,
    start_line: usize,
    start_column: usize,
    // position before the most recent `next_char`, for one-char push-back
    prev: (usize, usize, usize),
}

impl<'a> DefTokenizer<'a> {
    pub fn new(input: &'a [u8]) -> DefTokenizer<'a> {
        DefTokenizer {
            input,
            index: 0,
            line: 1,
            column: 1,
            state: State::Outside,
            buffer: String::new(),
            start_line: 1,
            start_column: 1,
            prev: (0, 1, 1),
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    fn next_char(&mut self) -> Option<u8> {
        let c = *self.input.get(self.index)?;
        self.prev = (self.index, self.line, self.column);
        self.index += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push_char(&mut self) {
        let (index, line, column) = self.prev;
        self.index = index;
        self.line = line;
        self.column = column;
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

    fn punct(&self, kind: DefTokenKind, line: usize, column: usize) -> DefToken {
        DefToken {
            kind,
            data: String::new(),
            line,
            column,
        }
    }

    fn emit(&mut self, kind: DefTokenKind, next_state: State) -> DefToken {
        let token = DefToken {
            kind,
            data: self.buffer.clone(),
            line: self.start_line,
            column: self.start_column,
        };
        self.buffer.clear();
        self.state = next_state;
        token
    }

    fn number_kind(&self) -> DefTokenKind {
        if self.state == State::Dec {
            DefTokenKind::DEC
        } else {
            DefTokenKind::FRAC
        }
    }

    pub fn next(&mut self) -> Option<DefToken> {
        loop {
            let (line, column) = (self.line, self.column);
            let c = match self.next_char() {
                Some(c) => c,
                None => {
                    return match self.state {
                        State::Word => Some(self.emit(DefTokenKind::WORD, State::Inside)),
                        State::QuotedString => Some(self.emit(DefTokenKind::STR, State::Inside)),
                        State::Dec | State::Frac => {
                            let kind = self.number_kind();
                            Some(self.emit(kind, State::Inside))
                        }
                        _ => None,
                    };
                }
            };

            match self.state {
                State::Outside => {
                    if c == b'/' {
                        match self.peek_char() {
                            Some(b'*') => {
                                // consume the marker glued to the opener
                                // (e.g. "/*QUAKED") up to the first space
                                while let Some(p) = self.peek_char() {
                                    if p == b' ' || p == b'\t' || p == b'\n' || p == b'\r' {
                                        break;
                                    }
                                    self.next_char();
                                }
                                self.state = State::Inside;
                                return Some(self.punct(DefTokenKind::DEF_OPEN, line, column));
                            }
                            Some(b'/') => {
                                self.next_char();
                                self.state = State::Comment;
                            }
                            _ => {}
                        }
                    }
                }
                State::Comment => {
                    if c == b'\n' {
                        self.state = State::Outside;
                    }
                }
                State::Inside => match c {
                    b'*' if self.peek_char() == Some(b'/') => {
                        self.next_char();
                        self.state = State::Outside;
                        return Some(self.punct(DefTokenKind::DEF_CLOSE, line, column));
                    }
                    b'(' => return Some(self.punct(DefTokenKind::PAREN_OPEN, line, column)),
                    b')' => return Some(self.punct(DefTokenKind::PAREN_CLOSE, line, column)),
                    b'{' => return Some(self.punct(DefTokenKind::BRACE_OPEN, line, column)),
                    b'}' => return Some(self.punct(DefTokenKind::BRACE_CLOSE, line, column)),
                    b';' => return Some(self.punct(DefTokenKind::SEMICOLON, line, column)),
                    b'?' => return Some(self.punct(DefTokenKind::QUESTION, line, column)),
                    b',' => return Some(self.punct(DefTokenKind::COMMA, line, column)),
                    b'\n' => return Some(self.punct(DefTokenKind::NEWLINE, line, column)),
                    b' ' | b'\t' | b'\r' => {}
                    b'-' | b'0'..=b'9' => {
                        self.begin(State::Dec, line, column);
                        self.buffer.push(c as char);
                    }
                    b'.' => {
                        self.begin(State::Frac, line, column);
                        self.buffer.push(c as char);
                    }
                    b'"' => self.begin(State::QuotedString, line, column),
                    _ => {
                        self.begin(State::Word, line, column);
                        self.buffer.push(c as char);
                    }
                },
                State::Word => match c {
                    b'*' if self.peek_char() == Some(b'/') => {
                        self.push_char();
                        return Some(self.emit(DefTokenKind::WORD, State::Inside));
                    }
                    b'(' | b' ' | b'\t' | b'\r' | b'\n' => {
                        self.push_char();
                        return Some(self.emit(DefTokenKind::WORD, State::Inside));
                    }
                    _ => self.buffer.push(c as char),
                },
                State::QuotedString => match c {
                    b'"' => return Some(self.emit(DefTokenKind::STR, State::Inside)),
                    _ => self.buffer.push(c as char),
                },
                State::Dec | State::Frac => match c {
                    b'0'..=b'9' => self.buffer.push(c as char),
                    b'.' => {
                        self.state = State::Frac;
                        self.buffer.push(c as char);
                    }
                    b')' | b'\t' | b',' | b' ' | b'\r' | b'\n' => {
                        self.push_char();
                        let kind = self.number_kind();
                        return Some(self.emit(kind, State::Inside));
                    }
                    _ => {
                        self.state = State::Word;
                        self.buffer.push(c as char);
                    }
                },
            }
        }
    }

    /// Reads the next token without consuming it.
    pub fn peek(&mut self) -> Option<DefToken> {
        let saved = (self.index, self.line, self.column, self.state, self.prev);
        let token = self.next();
        let (index, line, column, state, prev) = saved;
        self.index = index;
        self.line = line;
        self.column = column;
        self.state = state;
        self.prev = prev;
        token
    }

    /// Consumes free-form text up to (but not including) the closing `*/`.
    pub fn remainder(&mut self) -> String {
        debug_assert_eq!(self.state, State::Inside);

        let mut out = String::new();
        loop {
            match self.peek_char() {
                None => break,
                Some(b'*') if self.input.get(self.index + 1) == Some(&b'/') => break,
                Some(c) => {
                    self.next_char();
                    out.push(c as char);
                }
            }
        }
        out.trim().to_owned()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnFlag {
    pub name: String,
    /// Bit value: 1 shifted by the flag's position in the list.
    pub value: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DefProperty {
    Choice {
        name: String,
        options: Vec<(i64, String)>,
    },
    Model {
        path: String,
        skin: u32,
        flag: Option<String>,
    },
    Default {
        key: String,
        value: String,
    },
    Base {
        name: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DefinitionKind {
    /// No color: inherited by name from other definitions.
    Base,
    /// Color and bounds: rendered as a fixed-size box or model.
    Point {
        color: Vector3<f64>,
        bounds: BBox,
    },
    /// Color but no bounds: takes its shape from its brushes.
    Brush {
        color: Vector3<f64>,
    },
}

#[derive(Clone, Debug)]
pub struct EntityDefinition {
    pub name: String,
    pub kind: DefinitionKind,
    pub flags: Vec<SpawnFlag>,
    pub properties: Vec<DefProperty>,
    pub description: String,
}

pub struct DefParser<'a> {
    tokenizer: DefTokenizer<'a>,
}

impl<'a> DefParser<'a> {
    pub fn new(input: &'a [u8]) -> DefParser<'a> {
        DefParser {
            tokenizer: DefTokenizer::new(input),
        }
    }

    fn unexpected(&self, expected: DefTokenKind, token: &DefToken) -> ParseError {
        ParseError::UnexpectedToken {
            line: token.line,
            column: token.column,
            expected: format!("{:?}", expected),
            got: format!("{:?}", token.kind),
        }
    }

    fn expect(&self, expected: DefTokenKind, token: &DefToken) -> Result<(), ParseError> {
        if expected.intersects(token.kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected, token))
        }
    }

    fn next_token(&mut self) -> Result<DefToken, ParseError> {
        match self.tokenizer.next() {
            Some(token) => Ok(token),
            None => {
                let (line, column) = self.tokenizer.position();
                Err(ParseError::Eof { line, column })
            }
        }
    }

    fn expect_next(&mut self, expected: DefTokenKind) -> Result<DefToken, ParseError> {
        let token = self.next_token()?;
        self.expect(expected, &token)?;
        Ok(token)
    }

    fn next_ignoring_newlines(&mut self) -> Result<DefToken, ParseError> {
        loop {
            let token = self.next_token()?;
            if token.kind != DefTokenKind::NEWLINE {
                return Ok(token);
            }
        }
    }

    fn number(&self, token: &DefToken) -> Result<f64, ParseError> {
        token
            .data
            .parse()
            .map_err(|_| self.unexpected(NUMBER, token))
    }

    fn parse_color(&mut self) -> Result<Vector3<f64>, ParseError> {
        self.expect_next(DefTokenKind::PAREN_OPEN)?;
        let r = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        let g = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        let b = {
            let t = self.expect_next(NUMBER)?;
            self.number(&t)?
        };
        self.expect_next(DefTokenKind::PAREN_CLOSE)?;
        Ok(Vector3::new(r, g, b))
    }

    fn parse_bounds(&mut self) -> Result<BBox, ParseError> {
        let a = self.parse_color()?;
        let b = self.parse_color()?;
        let mut min = a;
        let mut max = b;
        for i in 0..3 {
            if min[i] > max[i] {
                ::std::mem::swap(&mut min[i], &mut max[i]);
            }
        }
        Ok(BBox::new(min, max))
    }

    fn parse_flags(&mut self) -> Result<Vec<SpawnFlag>, ParseError> {
        let mut flags = Vec::new();
        while let Some(token) = self.tokenizer.peek() {
            if token.kind != DefTokenKind::WORD {
                break;
            }
            let token = self.next_token()?;
            let value = 1u32 << flags.len();
            flags.push(SpawnFlag {
                name: token.data,
                value,
            });
        }
        Ok(flags)
    }

    fn parse_properties(&mut self) -> Result<Vec<DefProperty>, ParseError> {
        let mut properties = Vec::new();
        match self.tokenizer.peek() {
            Some(ref token) if token.kind == DefTokenKind::BRACE_OPEN => {
                self.next_token()?;
            }
            _ => return Ok(properties),
        }

        loop {
            let token = self.next_ignoring_newlines()?;
            match token.kind {
                DefTokenKind::BRACE_CLOSE => return Ok(properties),
                DefTokenKind::WORD => {
                    if let Some(property) = self.parse_property(&token.data)? {
                        properties.push(property);
                    }
                }
                _ => {
                    return Err(self.unexpected(
                        DefTokenKind::WORD | DefTokenKind::BRACE_CLOSE,
                        &token,
                    ));
                }
            }
        }
    }

    fn parse_property(&mut self, kind: &str) -> Result<Option<DefProperty>, ParseError> {
        let property = match kind {
            "choice" => {
                let name = self.expect_next(DefTokenKind::STR)?.data;
                let open = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_OPEN, &open)?;

                let mut options = Vec::new();
                let mut token = self.next_ignoring_newlines()?;
                while token.kind == DefTokenKind::PAREN_OPEN {
                    let key = {
                        let t = self.next_ignoring_newlines()?;
                        self.expect(DefTokenKind::DEC, &t)?;
                        self.number(&t)? as i64
                    };
                    let comma = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::COMMA, &comma)?;
                    let value = {
                        let t = self.next_ignoring_newlines()?;
                        self.expect(DefTokenKind::STR, &t)?;
                        t.data
                    };
                    let close = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::PAREN_CLOSE, &close)?;
                    options.push((key, value));
                    token = self.next_ignoring_newlines()?;
                }
                self.expect(DefTokenKind::PAREN_CLOSE, &token)?;
                Some(DefProperty::Choice { name, options })
            }
            "model" => {
                let open = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_OPEN, &open)?;
                let path_token = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::STR, &path_token)?;
                let (path, skin) = split_skin_index(&path_token.data);

                let token = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::COMMA | DefTokenKind::PAREN_CLOSE, &token)?;
                let flag = if token.kind == DefTokenKind::COMMA {
                    let t = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::STR, &t)?;
                    let close = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::PAREN_CLOSE, &close)?;
                    Some(t.data)
                } else {
                    None
                };
                Some(DefProperty::Model { path, skin, flag })
            }
            "default" => {
                let open = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_OPEN, &open)?;
                let key = {
                    let t = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::STR, &t)?;
                    t.data
                };
                let comma = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::COMMA, &comma)?;
                let value = {
                    let t = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::STR, &t)?;
                    t.data
                };
                let close = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_CLOSE, &close)?;
                Some(DefProperty::Default { key, value })
            }
            "base" => {
                let open = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_OPEN, &open)?;
                let name = {
                    let t = self.next_ignoring_newlines()?;
                    self.expect(DefTokenKind::STR, &t)?;
                    t.data
                };
                let close = self.next_ignoring_newlines()?;
                self.expect(DefTokenKind::PAREN_CLOSE, &close)?;
                Some(DefProperty::Base { name })
            }
            other => {
                warn!("Skipping unknown entity property type \"{}\"", other);
                loop {
                    let token = self.next_token()?;
                    if token.kind == DefTokenKind::SEMICOLON {
                        return Ok(None);
                    }
                }
            }
        };

        let semicolon = self.next_ignoring_newlines()?;
        self.expect(DefTokenKind::SEMICOLON, &semicolon)?;
        Ok(property)
    }

    fn parse_description(&mut self) -> String {
        match self.tokenizer.peek() {
            Some(ref token) if token.kind == DefTokenKind::DEF_CLOSE => String::new(),
            _ => self.tokenizer.remainder(),
        }
    }

    /// Parses the next definition, or `None` at end of input.
    pub fn next_definition(&mut self) -> Result<Option<EntityDefinition>, ParseError> {
        let token = match self.tokenizer.next() {
            Some(token) => token,
            None => return Ok(None),
        };
        self.expect(DefTokenKind::DEF_OPEN, &token)?;

        let name = self.expect_next(DefTokenKind::WORD)?.data;

        let mut color = None;
        let mut bounds = None;
        let mut flags = Vec::new();

        let peeked = self.tokenizer.peek();
        if peeked.as_ref().map(|t| t.kind) == Some(DefTokenKind::PAREN_OPEN) {
            color = Some(self.parse_color()?);

            let token = match self.tokenizer.peek() {
                Some(token) => token,
                None => {
                    let (line, column) = self.tokenizer.position();
                    return Err(ParseError::Eof { line, column });
                }
            };
            self.expect(DefTokenKind::PAREN_OPEN | DefTokenKind::QUESTION, &token)?;
            if token.kind == DefTokenKind::PAREN_OPEN {
                bounds = Some(self.parse_bounds()?);
            } else {
                // a question mark stands in for the bounds of brush entities
                self.next_token()?;
            }

            if self.tokenizer.peek().map(|t| t.kind) == Some(DefTokenKind::WORD) {
                flags = self.parse_flags()?;
            }
        }

        self.expect_next(DefTokenKind::NEWLINE)?;
        let properties = self.parse_properties()?;
        let description = self.parse_description();
        self.expect_next(DefTokenKind::DEF_CLOSE)?;

        let kind = match (color, bounds) {
            (None, _) => DefinitionKind::Base,
            (Some(color), Some(bounds)) => DefinitionKind::Point { color, bounds },
            (Some(color), None) => DefinitionKind::Brush { color },
        };

        Ok(Some(EntityDefinition {
            name,
            kind,
            flags,
            properties,
            description,
        }))
    }

    /// Parses every definition in the input.
    pub fn parse_definitions(
        &mut self,
        mut progress: Progress,
    ) -> Result<Vec<EntityDefinition>, ParseError> {
        let mut definitions = Vec::new();
        while let Some(definition) = self.next_definition()? {
            definitions.push(definition);
            if !report_progress(&mut progress, self.tokenizer.bytes_read()) {
                return Err(ParseError::Cancelled);
            }
        }
        Ok(definitions)
    }
}

/// Splits a trailing `:N` skin index off a model path.
fn split_skin_index(path: &str) -> (String, u32) {
    if let Some(colon) = path.rfind(':') {
        if colon > 0 {
            if let Ok(skin) = path[colon + 1..].parse() {
                return (path[..colon].to_owned(), skin);
            }
        }
    }
    (path.to_owned(), 0)
}

#[cfg(test)]
mod test {
    use super::*;

    use cgmath::vec3;

    const LIGHT_DEF: &str = "\
// lights
/*QUAKED light (0 1 0) (-8 -8 -8) (8 8 8) START_OFF BIG
{
choice \"style\" (
 (0,\"normal\")
 (1,\"flicker\")
);
default (\"light\",\"300\");
model (\"progs/light.mdl:2\");
base (\"Light\");
}
Non-displayed light.
*/
";

    #[test]
    fn test_tokenizer_states() {
        let mut tokenizer = DefTokenizer::new(b"ignored words\n/* name (0 0.5 .5)\n*/");
        let kinds: Vec<DefTokenKind> = ::std::iter::from_fn(|| tokenizer.next())
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                DefTokenKind::DEF_OPEN,
                DefTokenKind::WORD,
                DefTokenKind::PAREN_OPEN,
                DefTokenKind::DEC,
                DefTokenKind::FRAC,
                DefTokenKind::FRAC,
                DefTokenKind::PAREN_CLOSE,
                DefTokenKind::NEWLINE,
                DefTokenKind::DEF_CLOSE,
            ]
        );
    }

    #[test]
    fn test_comments_outside_definitions() {
        let mut parser = DefParser::new(b"// just a comment\n// /* not a def */\n");
        assert!(parser.next_definition().unwrap().is_none());
    }

    #[test]
    fn test_point_definition() {
        let mut parser = DefParser::new(LIGHT_DEF.as_bytes());
        let def = parser.next_definition().unwrap().unwrap();
        assert!(parser.next_definition().unwrap().is_none());

        assert_eq!(def.name, "light");
        match def.kind {
            DefinitionKind::Point { color, bounds } => {
                assert_eq!(color, vec3(0.0, 1.0, 0.0));
                assert_eq!(bounds.min, vec3(-8.0, -8.0, -8.0));
                assert_eq!(bounds.max, vec3(8.0, 8.0, 8.0));
            }
            other => panic!("expected point definition, got {:?}", other),
        }

        assert_eq!(
            def.flags,
            vec![
                SpawnFlag {
                    name: "START_OFF".to_owned(),
                    value: 1,
                },
                SpawnFlag {
                    name: "BIG".to_owned(),
                    value: 2,
                },
            ]
        );

        assert_eq!(def.properties.len(), 4);
        assert_eq!(
            def.properties[0],
            DefProperty::Choice {
                name: "style".to_owned(),
                options: vec![(0, "normal".to_owned()), (1, "flicker".to_owned())],
            }
        );
        assert_eq!(
            def.properties[1],
            DefProperty::Default {
                key: "light".to_owned(),
                value: "300".to_owned(),
            }
        );
        assert_eq!(
            def.properties[2],
            DefProperty::Model {
                path: "progs/light.mdl".to_owned(),
                skin: 2,
                flag: None,
            }
        );
        assert_eq!(
            def.properties[3],
            DefProperty::Base {
                name: "Light".to_owned(),
            }
        );

        assert_eq!(def.description, "Non-displayed light.");
    }

    #[test]
    fn test_brush_definition_with_question_mark() {
        let source = "/* func_door (0 .5 .8) ? START_OPEN\nA sliding door.\n*/";
        let mut parser = DefParser::new(source.as_bytes());
        let def = parser.next_definition().unwrap().unwrap();

        assert_eq!(def.name, "func_door");
        match def.kind {
            DefinitionKind::Brush { color } => {
                assert_eq!(color, vec3(0.0, 0.5, 0.8));
            }
            other => panic!("expected brush definition, got {:?}", other),
        }
        assert_eq!(def.flags.len(), 1);
        assert_eq!(def.description, "A sliding door.");
    }

    #[test]
    fn test_base_definition() {
        let source = "/* Appearflags\n{\ndefault (\"spawnflags\",\"0\");\n}\n*/";
        let mut parser = DefParser::new(source.as_bytes());
        let def = parser.next_definition().unwrap().unwrap();

        assert_eq!(def.name, "Appearflags");
        assert_eq!(def.kind, DefinitionKind::Base);
        assert_eq!(def.properties.len(), 1);
        assert_eq!(def.description, "");
    }

    #[test]
    fn test_model_with_flag_variant() {
        let source = "/* item_armor (0 .5 .8) (0 0 0) (32 32 56)\n\
                      {\nmodel (\"progs/armor.mdl\",\"ARMOR2\");\n}\n*/";
        let mut parser = DefParser::new(source.as_bytes());
        let def = parser.next_definition().unwrap().unwrap();
        assert_eq!(
            def.properties[0],
            DefProperty::Model {
                path: "progs/armor.mdl".to_owned(),
                skin: 0,
                flag: Some("ARMOR2".to_owned()),
            }
        );
    }

    #[test]
    fn test_split_skin_index() {
        assert_eq!(
            split_skin_index("progs/light.mdl:2"),
            ("progs/light.mdl".to_owned(), 2)
        );
        assert_eq!(
            split_skin_index("progs/light.mdl"),
            ("progs/light.mdl".to_owned(), 0)
        );
        // a leading colon is not a skin separator
        assert_eq!(split_skin_index(":odd"), (":odd".to_owned(), 0));
    }

    #[test]
    fn test_multiple_definitions_and_cancellation() {
        let source = "/* a (0 0 0) (0 0 0) (8 8 8)\n*/\n/* b (0 0 0) (0 0 0) (8 8 8)\n*/";
        let mut parser = DefParser::new(source.as_bytes());
        let defs = parser.parse_definitions(None).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].name, "b");

        let mut parser = DefParser::new(source.as_bytes());
        let mut cancel = |_| false;
        match parser.parse_definitions(Some(&mut cancel)) {
            Err(ParseError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other.map(|d| d.len())),
        }
    }
}
