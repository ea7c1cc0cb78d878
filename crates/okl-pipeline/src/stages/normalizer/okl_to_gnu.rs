use crate::error::{PipelineDiagnostics, PipelineError};
use crate::pipeline::PipelineStage;
use crate::stages::UnitContext;
use okl_core::attr::{
    wrap_as_cxx_attr, wrap_as_gnu_attr, Attribute, AttributeMarker, MarkerRecord,
};
use okl_core::lexer::{lex, Token, TokenKind};
use okl_core::rewriter::Rewriter;
use okl_core::{Error, ErrorCode, LineIndex, Span};
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, info, trace};

/// Markers that may not stay mid-statement; they move to the start of the
/// statement instead of taking the GNU spelling.
const HOISTED_ATTRS: [&str; 2] = ["atomic", "shared"];

/// Result of lowering marker syntax.
#[derive(Debug, Clone, Default)]
pub struct OklNormalized {
    /// Rewritten source, empty when the input had no markers.
    pub text: String,
    pub attributes: Vec<Attribute>,
    /// Attributes left in GNU spelling, to be moved by the next stage.
    pub gnu_markers: Vec<AttributeMarker>,
    /// Attributes moved out of a `for` header.
    pub recovery_markers: Vec<AttributeMarker>,
}

fn is_boundary(token: Option<&Token>) -> bool {
    match token {
        None => true,
        Some(tok) if tok.kind == TokenKind::Directive => true,
        Some(tok) => tok.is_punct(";") || tok.is_punct("{") || tok.is_punct("}"),
    }
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, tok) in tokens.iter().enumerate().skip(open) {
        if tok.is_punct("(") {
            depth += 1;
        } else if tok.is_punct(")") {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

fn matching_brace_back(tokens: &[Token], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for idx in (0..=close).rev() {
        if tokens[idx].is_punct("}") {
            depth += 1;
        } else if tokens[idx].is_punct("{") {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

/// Offset where the statement holding token `at` begins, and whether the
/// hoisted text there follows a line of its own (a directive). Brace
/// initializers such as `= {0, 0}` are stepped over.
fn statement_start(tokens: &[Token], at: usize) -> (usize, bool) {
    let mut idx = at;
    while idx > 0 {
        idx -= 1;
        let tok = &tokens[idx];
        if tok.kind == TokenKind::Directive {
            return (tokens[idx + 1].span.lo, true);
        }
        if tok.is_punct("}") {
            let open = matching_brace_back(tokens, idx);
            if let Some(open) = open.filter(|open| *open > 0 && tokens[open - 1].is_punct("=")) {
                idx = open;
                continue;
            }
            return (tok.span.hi, false);
        }
        if tok.is_punct(";") || tok.is_punct("{") {
            return (tok.span.hi, false);
        }
    }
    (0, false)
}

/// Runs of adjacent markers written as a fourth `for` header clause, as
/// ranges of indices into `attributes`: `; ++i; @inner @nobarrier)`.
fn for_header_runs(attributes: &[Attribute], tokens: &[Token]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut first = 0;
    while first < attributes.len() {
        let mut last = first;
        while attributes
            .get(last + 1)
            .is_some_and(|next| next.token_span.start == attributes[last].token_span.end)
        {
            last += 1;
        }
        let left = attributes[first]
            .token_span
            .start
            .checked_sub(1)
            .map(|k| &tokens[k]);
        let right = tokens.get(attributes[last].token_span.end);
        if left.is_some_and(|tok| tok.is_punct(";")) && right.is_some_and(|tok| tok.is_punct(")")) {
            runs.push(first..last + 1);
        }
        first = last + 1;
    }
    runs
}

/// Every `@name` / `@name(params)` occurrence. A parameter list must follow
/// the name without whitespace; nested markers inside it stay part of the
/// parameter text.
pub fn scan_markers(source: &str, tokens: &[Token]) -> okl_core::Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        if tokens[idx].kind != TokenKind::At {
            idx += 1;
            continue;
        }
        let at = &tokens[idx];
        let name = tokens
            .get(idx + 1)
            .filter(|tok| tok.kind == TokenKind::Ident)
            .ok_or_else(|| {
                Error::new(ErrorCode::ParseFailure, "expected an attribute name after `@`")
                    .with_span(at.span)
            })?;
        let mut end = idx + 2;
        let mut raw_params = "";
        if let Some(open) = tokens
            .get(end)
            .filter(|tok| tok.is_punct("(") && tok.span.lo == name.span.hi)
        {
            let close = matching_paren(tokens, end).ok_or_else(|| {
                Error::new(
                    ErrorCode::ParseFailure,
                    format!("unterminated argument list for [@{}]", name.lexeme),
                )
                .with_span(open.span)
            })?;
            raw_params = Span::new(open.span.lo, tokens[close].span.hi).text(source);
            end = close + 1;
        }
        let span = Span::new(at.span.lo, tokens[end - 1].span.hi);
        let attribute = Attribute::new(name.lexeme.clone(), raw_params, idx..end, span)
            .ok_or_else(|| Error::internal("marker without tokens"))?;
        trace!(name = %attribute.name, params = %attribute.raw_params, "found marker");
        attributes.push(attribute);
        idx = end;
    }
    Ok(attributes)
}

/// Lower every marker of `source` into attribute syntax the parser accepts.
pub fn normalize_okl(source: &str) -> okl_core::Result<OklNormalized> {
    if source.trim().is_empty() {
        return Err(Error::new(ErrorCode::EmptySourceString, "empty source string"));
    }
    let tokens = lex(source).map_err(|err| {
        Error::new(ErrorCode::LexerFailure, err.to_string()).with_span(Span::empty_at(err.offset()))
    })?;
    if tokens.is_empty() {
        return Err(Error::new(
            ErrorCode::EmptySourceString,
            "source has no tokens",
        ));
    }

    let attributes = scan_markers(source, &tokens)?;
    if attributes.is_empty() {
        return Ok(OklNormalized::default());
    }

    let mut rewriter = Rewriter::new(source);
    let mut gnu = Vec::new();
    let mut recovery = Vec::new();
    // Token index just past each marker written in place, so that a run of
    // markers at a statement start stays in place as a whole.
    let mut in_place_ends = HashSet::new();

    let header_runs = for_header_runs(&attributes, &tokens);

    for (pos, attribute) in attributes.iter().enumerate() {
        let start = attribute.token_span.start;
        let end = attribute.token_span.end;
        let left = start.checked_sub(1).map(|k| &tokens[k]);
        let right = tokens.get(end);
        let at_boundary = is_boundary(left) || in_place_ends.contains(&start);
        let cxx = wrap_as_cxx_attr(&attribute.name, &attribute.raw_params);
        let gnu_text = wrap_as_gnu_attr(&attribute.name, &attribute.raw_params);

        // `for (init; cond; inc; @tile(16))`
        if let Some(run) = header_runs.iter().find(|run| run.contains(&pos)) {
            debug!(name = %attribute.name, "moving marker out of for header");
            if pos == run.start {
                if let Some(semi) = left {
                    rewriter.replace(semi.span, ")");
                }
            }
            rewriter.replace(attribute.span, gnu_text);
            if pos + 1 == run.end {
                if let Some(close) = right {
                    rewriter.replace(close.span, " ");
                }
            }
            recovery.push(attribute.clone());
            continue;
        }

        let hoisted = HOISTED_ATTRS.contains(&attribute.name.as_str());
        if hoisted && (!at_boundary || right.is_some_and(|tok| tok.is_punct(";"))) {
            let (anchor, own_line) = statement_start(&tokens, start);
            debug!(name = %attribute.name, anchor, "hoisting marker to statement start");
            if own_line {
                rewriter.insert_before(anchor, format!("{cxx} "));
            } else {
                rewriter.insert_after(anchor, format!(" {cxx} "));
            }
            rewriter.remove(attribute.span);
        } else if at_boundary {
            rewriter.replace(attribute.span, cxx);
            in_place_ends.insert(end);
        } else {
            rewriter.replace(attribute.span, gnu_text);
            gnu.push(attribute.clone());
        }
    }

    let text = rewriter.apply()?;
    let index = LineIndex::new(&text);
    let place = |attribute: Attribute| AttributeMarker {
        loc: index.line_col(rewriter.map_offset(attribute.span.lo)),
        attribute,
    };
    let gnu_markers: Vec<_> = gnu.into_iter().map(place).collect();
    let recovery_markers: Vec<_> = recovery.into_iter().map(place).collect();
    info!(
        markers = attributes.len(),
        gnu = gnu_markers.len(),
        recovered = recovery_markers.len(),
        "lowered marker syntax"
    );
    Ok(OklNormalized {
        text,
        attributes,
        gnu_markers,
        recovery_markers,
    })
}

pub struct OklToGnuStage;

impl OklToGnuStage {
    pub const NAME: &'static str = "okl-to-gnu";
}

impl PipelineStage for OklToGnuStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(
        &self,
        mut context: UnitContext,
        _diagnostics: &mut PipelineDiagnostics,
    ) -> Result<UnitContext, PipelineError> {
        let normalized = normalize_okl(&context.source)
            .map_err(|err| PipelineError::single(Self::NAME, err))?;
        let records = |markers: &[AttributeMarker]| -> Vec<MarkerRecord> {
            markers.iter().map(AttributeMarker::record).collect()
        };
        context.session.set_markers(
            records(&normalized.gnu_markers),
            records(&normalized.recovery_markers),
        );
        context.update_source(normalized.text);
        Ok(context)
    }
}
