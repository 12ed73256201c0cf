//! Maps byte offsets to (line, column) positions and back (§4.1).
//!
//! Built once per source text; line starts are indexed so `offset_to_position`
//! is a binary search and `position_to_offset` is an array index — both cheap
//! enough to call once per diagnostic without the analyzer or parser needing
//! to thread position tracking through every production themselves.

/// A zero-based (line, column) position, both counted in UTF-8 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A half-open byte-offset range, as every token and syntax-tree node carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest range covering both `self` and `other` — used to merge a
    /// start token and an end token into the range of the construct they
    /// delimit (e.g. a function call's `(` through its `)`).
    pub fn cover(self, other: Range) -> Range {
        Range::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// An index of line-start offsets for one source text, recognizing both LF
/// and CRLF line endings.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
    len: usize,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        let bytes = source.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    line_starts.push(i + 1);
                    i += 1;
                }
                b'\r' => {
                    let consumed = if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                    line_starts.push(i + consumed);
                    i += consumed;
                }
                _ => i += 1,
            }
        }
        Self { line_starts, len: source.len() }
    }

    /// O(log L) in the number of lines `L`.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insertion) => insertion - 1,
        };
        let column = offset - self.line_starts[line];
        Position { line: line as u32, column: column as u32 }
    }

    /// O(1): the line start is a direct array index.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let start = *self.line_starts.get(position.line as usize)?;
        Some(start + position.column as usize)
    }

    pub fn range_to_positions(&self, range: Range) -> (Position, Position) {
        (self.offset_to_position(range.start), self.offset_to_position(range.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_positions_across_lf_and_crlf() {
        let map = SourceMap::new("a\nbb\r\nccc");
        assert_eq!(map.offset_to_position(0), Position { line: 0, column: 0 });
        assert_eq!(map.offset_to_position(2), Position { line: 1, column: 0 });
        assert_eq!(map.offset_to_position(7), Position { line: 2, column: 0 });
        assert_eq!(map.position_to_offset(Position { line: 2, column: 1 }), Some(8));
    }

    #[test]
    fn cover_merges_ranges() {
        let a = Range::new(2, 5);
        let b = Range::new(10, 12);
        assert_eq!(a.cover(b), Range::new(2, 12));
    }
}
