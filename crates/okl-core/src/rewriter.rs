//! Offset-stable text rewriting: every edit is expressed against the
//! original text and all edits are applied in one pass.

use crate::error::{Error, ErrorCode, Result};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditKind {
    InsertBefore,
    InsertAfter,
    Replace,
}

#[derive(Debug, Clone)]
struct Edit {
    kind: EditKind,
    range: Span,
    text: String,
    seq: usize,
}

#[derive(Debug, Clone)]
pub struct Rewriter<'a> {
    source: &'a str,
    edits: Vec<Edit>,
}

impl<'a> Rewriter<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn push(&mut self, kind: EditKind, range: Span, text: impl Into<String>) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            kind,
            range,
            text: text.into(),
            seq,
        });
    }

    /// Insert in front of anything already inserted at `offset`.
    pub fn insert_before(&mut self, offset: usize, text: impl Into<String>) {
        self.push(EditKind::InsertBefore, Span::empty_at(offset), text);
    }

    /// Insert behind anything already inserted at `offset`.
    pub fn insert_after(&mut self, offset: usize, text: impl Into<String>) {
        self.push(EditKind::InsertAfter, Span::empty_at(offset), text);
    }

    pub fn replace(&mut self, range: Span, text: impl Into<String>) {
        if range.is_empty() {
            self.insert_after(range.lo, text);
        } else {
            self.push(EditKind::Replace, range, text);
        }
    }

    pub fn remove(&mut self, range: Span) {
        if !range.is_empty() {
            self.push(EditKind::Replace, range, String::new());
        }
    }

    /// Output position of the original `offset`, before anything inserted
    /// at that offset. Offsets inside a replaced range map to the start of
    /// its replacement.
    pub fn map_offset(&self, offset: usize) -> usize {
        let mut mapped = offset as isize;
        for edit in &self.edits {
            match edit.kind {
                EditKind::InsertBefore | EditKind::InsertAfter => {
                    if edit.range.lo < offset {
                        mapped += edit.text.len() as isize;
                    }
                }
                EditKind::Replace => {
                    if edit.range.hi <= offset {
                        mapped += edit.text.len() as isize - edit.range.len() as isize;
                    } else if edit.range.lo < offset {
                        mapped -= (offset - edit.range.lo) as isize;
                    }
                }
            }
        }
        mapped.max(0) as usize
    }

    fn ordered(&self) -> Vec<&Edit> {
        let mut edits: Vec<&Edit> = self.edits.iter().collect();
        edits.sort_by(|a, b| {
            a.range.lo.cmp(&b.range.lo).then_with(|| {
                let rank = |edit: &Edit| match edit.kind {
                    EditKind::InsertBefore => 0,
                    EditKind::InsertAfter => 1,
                    EditKind::Replace => 2,
                };
                rank(a).cmp(&rank(b)).then_with(|| match a.kind {
                    EditKind::InsertBefore => b.seq.cmp(&a.seq),
                    _ => a.seq.cmp(&b.seq),
                })
            })
        });
        edits
    }

    /// Produce the rewritten text. Overlapping replacements, or an insertion
    /// strictly inside a replaced range, are reported as conflicts.
    pub fn apply(&self) -> Result<String> {
        let extra: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(self.source.len() + extra);
        let mut cursor = 0usize;
        let mut last: Option<&Edit> = None;
        for edit in self.ordered() {
            if edit.range.hi > self.source.len() {
                return Err(Error::new(
                    ErrorCode::RewriteConflict,
                    format!("edit {} is past the end of the text", edit.range),
                )
                .with_span(edit.range));
            }
            if edit.range.lo < cursor {
                let previous = last.map(|e| e.range).unwrap_or_default();
                return Err(Error::new(
                    ErrorCode::RewriteConflict,
                    format!("edit {} overlaps edit {}", edit.range, previous),
                )
                .with_span(edit.range));
            }
            let chunk = self.source.get(cursor..edit.range.lo).ok_or_else(|| {
                Error::new(ErrorCode::RewriteConflict, "edit splits a character")
                    .with_span(edit.range)
            })?;
            out.push_str(chunk);
            out.push_str(&edit.text);
            cursor = edit.range.hi;
            last = Some(edit);
        }
        out.push_str(self.source.get(cursor..).unwrap_or(""));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn applies_edits_against_original_offsets() {
        let src = "for (x) { y; }";
        let mut rw = Rewriter::new(src);
        rw.replace(Span::new(0, 8), "{int x = 0;");
        rw.insert_after(14, "}");
        rw.insert_after(14, "}");
        rw.remove(Span::new(10, 12));
        assert_eq!(rw.apply().expect("apply"), "{int x = 0;{  }}}");
    }

    #[test]
    fn insert_before_and_after_order() {
        let mut rw = Rewriter::new("ab");
        rw.insert_after(1, "1");
        rw.insert_after(1, "2");
        rw.insert_before(1, "3");
        rw.insert_before(1, "4");
        assert_eq!(rw.apply().expect("apply"), "a4312b");
    }

    #[test]
    fn insertion_precedes_replacement_at_same_offset() {
        let mut rw = Rewriter::new("abc");
        rw.replace(Span::new(1, 2), "X");
        rw.insert_after(1, "[");
        rw.insert_after(2, "]");
        assert_eq!(rw.apply().expect("apply"), "a[X]c");
    }

    #[test]
    fn detects_overlaps() {
        let mut rw = Rewriter::new("abcdef");
        rw.replace(Span::new(1, 4), "x");
        rw.replace(Span::new(3, 5), "y");
        assert_eq!(rw.apply().unwrap_err().code, ErrorCode::RewriteConflict);

        let mut rw = Rewriter::new("abcdef");
        rw.replace(Span::new(1, 4), "x");
        rw.insert_after(2, "y");
        assert!(rw.apply().is_err());
    }

    #[test]
    fn maps_offsets_through_edits() {
        let mut rw = Rewriter::new("a @x b");
        rw.replace(Span::new(2, 4), "[[okl_x(\"\")]]");
        rw.insert_after(0, ">>");
        assert_eq!(rw.map_offset(2), 4);
        let out = rw.apply().expect("apply");
        assert_eq!(&out[rw.map_offset(2)..rw.map_offset(2) + 2], "[[");
        assert_eq!(&out[rw.map_offset(5)..], "b");
        assert_eq!(rw.map_offset(3), 4);
    }
}
