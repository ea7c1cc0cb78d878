//! OKL attribute records and the two host-language spellings they are
//! lowered into.
//!
//! A marker `@tile(16, @outer)` is carried through the parser as an
//! attribute named `okl_tile` whose single string argument holds the raw
//! parameter text `(16, @outer)`.

use crate::span::{LineCol, Span};
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const OKL_ATTR_PREFIX: &str = "okl_";

/// One `@name(params)` occurrence found by the token scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Parameter text including the surrounding parentheses, or empty.
    pub raw_params: String,
    /// Indices of the tokens making up the marker, never empty.
    pub token_span: Range<usize>,
    /// Byte range of the marker in the scanned source.
    pub span: Span,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        raw_params: impl Into<String>,
        token_span: Range<usize>,
        span: Span,
    ) -> Option<Self> {
        if token_span.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            raw_params: raw_params.into(),
            token_span,
            span,
        })
    }
}

/// Where a lowered attribute landed in the rewritten text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMarker {
    pub attribute: Attribute,
    pub loc: LineCol,
}

impl AttributeMarker {
    pub fn record(&self) -> MarkerRecord {
        MarkerRecord {
            attribute_name: self.attribute.name.clone(),
            raw_params: self.attribute.raw_params.clone(),
            line: self.loc.line,
            column: self.loc.col,
        }
    }
}

/// Persisted marker form, independent of token indices: what the marker
/// lowering hands to the tree-level pass, which must find an attribute of
/// the same name and parameters at the same place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub attribute_name: String,
    pub raw_params: String,
    pub line: u32,
    pub column: u32,
}

impl MarkerRecord {
    pub fn new(payload: OklPayload, loc: LineCol) -> Self {
        Self {
            attribute_name: payload.name,
            raw_params: payload.raw_params,
            line: loc.line,
            column: loc.col,
        }
    }

    pub fn loc(&self) -> LineCol {
        LineCol {
            line: self.line,
            col: self.column,
        }
    }
}

/// Attribute identity recovered from a carrier: name without prefix plus
/// the original parameter text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OklPayload {
    pub name: String,
    pub raw_params: String,
}

impl OklPayload {
    /// Read an OKL payload back from an attribute name such as `okl_tile`
    /// and its argument text `"(16)"`.
    pub fn from_parts(attr_name: &str, args: Option<&str>) -> Option<Self> {
        let name = attr_name.strip_prefix(OKL_ATTR_PREFIX)?;
        if name.is_empty() {
            return None;
        }
        let raw_params = match args.map(str::trim) {
            None | Some("") => String::new(),
            Some(literal) => unquote(literal)?,
        };
        Some(Self {
            name: name.to_string(),
            raw_params,
        })
    }

    pub fn to_cxx(&self) -> String {
        wrap_as_cxx_attr(&self.name, &self.raw_params)
    }
}

/// `[[okl_name("params")]]`
pub fn wrap_as_cxx_attr(name: &str, raw_params: &str) -> String {
    format!(
        "[[{OKL_ATTR_PREFIX}{name}(\"{}\")]]",
        escape(raw_params)
    )
}

/// `__attribute__((okl_name("params")))`
pub fn wrap_as_gnu_attr(name: &str, raw_params: &str) -> String {
    format!(
        "__attribute__(({OKL_ATTR_PREFIX}{name}(\"{}\")))",
        escape(raw_params)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Decode a single C string literal produced by [`escape`].
pub fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other),
        }
    }
    Some(out)
}
