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

//! Text parsers for the two editor file formats.
//!
//! [`map`] handles the ASCII map format (Standard and Valve 220 texture
//! variants), [`entdef`] the entity-definition format. Both are built as a
//! hand-written tokenizer with line/column tracking and a one-token
//! push-back stack, driven by a recursive-descent parser.

pub mod entdef;
pub mod map;

/// Parse errors never propagate beyond the load operation that produced
/// them; the parsers recover at the next top-level construct.
#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ParseError {
    #[fail(
        display = "expected {} but got {} at line {}, column {}",
        expected, got, line, column
    )]
    UnexpectedToken {
        line: usize,
        column: usize,
        expected: String,
        got: String,
    },
    #[fail(display = "unexpected end of input at line {}, column {}", line, column)]
    Eof { line: usize, column: usize },
    #[fail(
        display = "mixed Standard and Valve 220 texture formats at line {}",
        line
    )]
    MixedFormats { line: usize },
    #[fail(display = "load cancelled")]
    Cancelled,
}

/// Progress callback: invoked with bytes read so far; returning `false`
/// cancels the load cooperatively at the next chunk boundary.
pub type Progress<'a> = Option<&'a mut dyn FnMut(usize) -> bool>;

pub(crate) fn report_progress(progress: &mut Progress, bytes_read: usize) -> bool {
    match progress {
        Some(callback) => callback(bytes_read),
        None => true,
    }
}
