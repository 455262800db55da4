//! Source positions and the line tables used to render them.
//!
//! Tokens and AST nodes carry a [`Span`] of byte offsets into the owning
//! import's source buffer. Line/column pairs are only materialized when a
//! diagnostic is rendered, via the per-import [`LineOffsets`] table.

use std::fmt;

/// Half-open byte range into an import's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span covering both operands, used when a parent node is synthesized
    /// from two children.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// 1-based line/column pair, computed on demand for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Byte offsets of line starts for one source buffer.
///
/// Built once when the import's source is registered; lookups binary-search
/// the offset table.
#[derive(Debug, Clone, Default)]
pub struct LineOffsets {
    starts: Vec<u32>,
}

impl LineOffsets {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(idx as u32 + 1);
            }
        }
        Self { starts }
    }

    /// Resolves a byte offset to a 1-based line/column. Columns count
    /// bytes, not display width.
    pub fn locate(&self, offset: u32) -> CodeLoc {
        let line_idx = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        CodeLoc {
            line: line_idx as u32 + 1,
            column: offset - self.starts[line_idx] + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_lines_and_columns() {
        let offsets = LineOffsets::new("ab\ncd\n\nef");
        assert_eq!(offsets.locate(0), CodeLoc { line: 1, column: 1 });
        assert_eq!(offsets.locate(1), CodeLoc { line: 1, column: 2 });
        assert_eq!(offsets.locate(3), CodeLoc { line: 2, column: 1 });
        assert_eq!(offsets.locate(6), CodeLoc { line: 3, column: 1 });
        assert_eq!(offsets.locate(8), CodeLoc { line: 4, column: 2 });
    }

    #[test]
    fn span_join() {
        let a = Span::new(4, 7);
        let b = Span::new(10, 12);
        assert_eq!(a.to(b), Span::new(4, 12));
        assert_eq!(b.to(a), Span::new(4, 12));
    }
}
