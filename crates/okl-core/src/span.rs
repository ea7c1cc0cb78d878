use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range `[lo, hi)` into one source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub lo: usize,
    pub hi: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}-{})", self.lo, self.hi)
    }
}

impl Span {
    pub fn new(lo: usize, hi: usize) -> Span {
        Span { lo, hi }
    }

    pub fn empty_at(offset: usize) -> Span {
        Span { lo: offset, hi: offset }
    }

    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    pub fn to(self, other: Span) -> Span {
        Span {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    pub fn contains(&self, other: Span) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.lo..self.hi).unwrap_or("")
    }
}

/// 1-based line and column (column counted in bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Offsets of every line start, for offset <-> line/column conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(idx, _)| idx + 1),
        );
        Self {
            starts,
            len: source.len(),
        }
    }

    pub fn line_col(&self, offset: usize) -> LineCol {
        let offset = offset.min(self.len);
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        LineCol {
            line: line as u32 + 1,
            col: (offset - self.starts[line]) as u32 + 1,
        }
    }

    pub fn offset(&self, loc: LineCol) -> Option<usize> {
        if loc.line == 0 || loc.col == 0 {
            return None;
        }
        let start = *self.starts.get(loc.line as usize - 1)?;
        let offset = start + loc.col as usize - 1;
        let line_end = self
            .starts
            .get(loc.line as usize)
            .copied()
            .unwrap_or(self.len + 1);
        (offset < line_end && offset <= self.len).then_some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_offsets_both_ways() {
        let src = "ab\ncd\n\nx";
        let index = LineIndex::new(src);
        assert_eq!(index.line_col(0), LineCol { line: 1, col: 1 });
        assert_eq!(index.line_col(4), LineCol { line: 2, col: 2 });
        assert_eq!(index.line_col(7), LineCol { line: 4, col: 1 });
        for offset in 0..=src.len() {
            assert_eq!(index.offset(index.line_col(offset)), Some(offset));
        }
        assert_eq!(index.offset(LineCol { line: 1, col: 9 }), None);
    }
}
