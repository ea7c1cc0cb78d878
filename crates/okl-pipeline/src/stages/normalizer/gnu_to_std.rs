use crate::error::{PipelineDiagnostics, PipelineError};
use crate::pipeline::PipelineStage;
use crate::stages::UnitContext;
use okl_core::attr::MarkerRecord;
use okl_core::diagnostics::Diagnostic;
use okl_core::rewriter::Rewriter;
use okl_core::syntax::{parse, walk, AttrSyntax, NodeRef, Visitor};
use okl_core::{Error, ErrorCode, LineIndex, Span};
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct GnuNormalized {
    /// Rewritten source, empty when nothing was GNU-spelled.
    pub text: String,
    pub moved: usize,
    pub warnings: Vec<Diagnostic>,
}

struct GnuCollector<'a> {
    index: &'a LineIndex,
    rewriter: Rewriter<'a>,
    processed: HashSet<Span>,
    found: Vec<MarkerRecord>,
}

impl<'ast> Visitor<'ast> for GnuCollector<'_> {
    fn pre(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        let anchor = node.span().lo;
        for attr in node.attrs().iter().filter(|a| a.syntax == AttrSyntax::Gnu) {
            let Some(payload) = attr.okl_payload() else {
                continue;
            };
            if !self.processed.insert(attr.span) {
                continue;
            }
            debug!(name = %payload.name, node = node.id(), "moving GNU attribute to standard spelling");
            self.rewriter.remove(attr.removal_span);
            self.rewriter.insert_after(anchor, format!("{} ", payload.to_cxx()));
            let loc = self.index.line_col(attr.removal_span.lo);
            self.found.push(MarkerRecord::new(payload, loc));
        }
        ControlFlow::Continue(())
    }
}

/// Move every GNU-spelled OKL attribute of `source` to the standard
/// position in front of its node. `recovery` markers must all be found
/// again; unmatched `gnu` markers only warn.
pub fn normalize_gnu(
    source: &str,
    gnu: &[MarkerRecord],
    recovery: &[MarkerRecord],
) -> okl_core::Result<GnuNormalized> {
    if source.trim().is_empty() {
        return Err(Error::new(ErrorCode::EmptySourceString, "empty source string"));
    }
    let tu = parse(source)?;
    let index = LineIndex::new(source);
    let mut collector = GnuCollector {
        index: &index,
        rewriter: Rewriter::new(source),
        processed: HashSet::new(),
        found: Vec::new(),
    };
    let _ = walk(&tu, &mut collector);

    let matches = |marker: &MarkerRecord| collector.found.contains(marker);
    if let Some(lost) = recovery.iter().find(|marker| !matches(marker)) {
        let span = index
            .offset(lost.loc())
            .map(Span::empty_at)
            .unwrap_or_default();
        return Err(Error::new(
            ErrorCode::MarkerLost,
            format!(
                "[@{}] moved out of a for header was not found at {}",
                lost.attribute_name,
                lost.loc()
            ),
        )
        .with_span(span));
    }
    let warnings: Vec<Diagnostic> = gnu
        .iter()
        .filter(|marker| !matches(marker))
        .map(|marker| {
            warn!(name = %marker.attribute_name, loc = %marker.loc(), "GNU attribute marker not matched");
            Diagnostic::warning(format!(
                "[@{}] expected at {} was not attached to any node",
                marker.attribute_name,
                marker.loc()
            ))
            .with_code(ErrorCode::MarkerLost.to_string())
        })
        .collect();

    let moved = collector.found.len();
    let text = if collector.rewriter.is_empty() {
        String::new()
    } else {
        collector.rewriter.apply()?
    };
    info!(moved, "normalized GNU attributes");
    Ok(GnuNormalized {
        text,
        moved,
        warnings,
    })
}

pub struct GnuToStdStage;

impl GnuToStdStage {
    pub const NAME: &'static str = "gnu-to-std";
}

impl PipelineStage for GnuToStdStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(
        &self,
        mut context: UnitContext,
        diagnostics: &mut PipelineDiagnostics,
    ) -> Result<UnitContext, PipelineError> {
        let normalized = normalize_gnu(
            &context.source,
            context.session.gnu_markers(),
            context.session.recovery_markers(),
        )
        .map_err(|err| PipelineError::single(Self::NAME, err))?;
        diagnostics.set_source(&context.source);
        diagnostics.extend(normalized.warnings);
        context.update_source(normalized.text);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::normalizer::normalize_okl;
    use okl_core::attr::AttributeMarker;
    use pretty_assertions::assert_eq;

    fn records(markers: &[AttributeMarker]) -> Vec<MarkerRecord> {
        markers.iter().map(AttributeMarker::record).collect()
    }

    #[test]
    fn trailing_loop_attribute_moves_in_front_of_for() {
        let lowered =
            normalize_okl("void f() { for (int i = 0; i < N; ++i; @tile(16)) { g(i); } }")
                .expect("lower");
        let out = normalize_gnu(
            &lowered.text,
            &records(&lowered.gnu_markers),
            &records(&lowered.recovery_markers),
        )
        .expect("normalize");
        assert_eq!(
            out.text,
            r#"void f() { [[okl_tile("(16)")]] for (int i = 0; i < N; ++i)   { g(i); } }"#
        );
        assert_eq!(out.moved, 1);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn parameter_attribute_moves_to_parameter_start() {
        let src = r#"void f(float *a __attribute__((okl_restrict(""))), int n) {}"#;
        let out = normalize_gnu(src, &[], &[]).expect("normalize");
        assert_eq!(out.text, r#"void f([[okl_restrict("")]] float *a , int n) {}"#);
    }

    #[test]
    fn standard_spelling_is_left_alone() {
        let src = r#"[[okl_kernel("")]] void f() {}"#;
        let out = normalize_gnu(src, &[], &[]).expect("normalize");
        assert!(out.text.is_empty());
        assert_eq!(out.moved, 0);
    }

    #[test]
    fn lost_recovery_marker_is_fatal() {
        let lowered =
            normalize_okl("void f() { for (int i = 0; i < N; ++i; @inner) {} }").expect("lower");
        let err =
            normalize_gnu("void f() {}", &[], &records(&lowered.recovery_markers)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MarkerLost);
    }

    #[test]
    fn marker_with_other_parameters_is_not_a_match() {
        let lowered = normalize_okl("void f() { for (int i = 0; i < N; ++i; @tile(16)) {} }")
            .expect("lower");
        let mut recovery = records(&lowered.recovery_markers);
        recovery[0].raw_params = "(32)".to_string();
        let err = normalize_gnu(&lowered.text, &[], &recovery).unwrap_err();
        assert_eq!(err.code, ErrorCode::MarkerLost);
    }

    #[test]
    fn several_header_markers_are_all_recovered() {
        let lowered =
            normalize_okl("void f() { for (int j = 0; j < N; ++j; @inner @nobarrier) { g(j); } }")
                .expect("lower");
        let out = normalize_gnu(
            &lowered.text,
            &records(&lowered.gnu_markers),
            &records(&lowered.recovery_markers),
        )
        .expect("normalize");
        assert_eq!(
            out.text,
            r#"void f() { [[okl_inner("")]] [[okl_nobarrier("")]] for (int j = 0; j < N; ++j)    { g(j); } }"#
        );
        assert_eq!(out.moved, 2);
        assert!(out.warnings.is_empty());
    }
}
