//! Byte offset to line/column mapping.

use crate::ast::Span;
use memchr::memchr_iter;

/// 1-based line and column (column counted in bytes, like `go/token`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Start offset of every line in a source file.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut starts = Vec::with_capacity(src.len() / 32 + 1);
        starts.push(0);
        // `\r\n` and lone `\n` both end a line; lone `\r` does not, as in gofmt.
        starts.extend(memchr_iter(b'\n', src.as_bytes()).map(|i| (i + 1) as u32));
        Self { starts }
    }

    /// Line containing `offset`, 1-based.
    #[inline]
    pub fn line(&self, offset: u32) -> u32 {
        self.starts.partition_point(|&s| s <= offset) as u32
    }

    #[inline]
    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = self.line(offset);
        let start = self.starts[(line - 1) as usize];
        LineCol {
            line,
            col: offset - start + 1,
        }
    }

    #[inline]
    pub fn span_lines(&self, span: Span) -> (u32, u32) {
        let end = if span.end > span.start {
            span.end - 1
        } else {
            span.end
        };
        (self.line(span.start), self.line(end))
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_one_based() {
        let idx = LineIndex::new("ab\ncd\r\n\nx");
        assert_eq!(idx.line_col(0), LineCol { line: 1, col: 1 });
        assert_eq!(idx.line_col(2), LineCol { line: 1, col: 3 });
        assert_eq!(idx.line_col(3), LineCol { line: 2, col: 1 });
        assert_eq!(idx.line(7), 3);
        assert_eq!(idx.line(8), 4);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn span_lines_uses_last_byte() {
        let idx = LineIndex::new("// a\n// b\nx");
        assert_eq!(idx.span_lines(Span::new(0, 4)), (1, 1));
        assert_eq!(idx.span_lines(Span::new(0, 9)), (1, 2));
    }
}
