//! Error reporting through miette.

use crate::{CliError, Result};
use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use okl_core::Error as OklError;
use okl_pipeline::PipelineError;
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Install miette as the global report handler.
pub fn setup_error_reporting() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .map_err(|e| CliError::Config(format!("Failed to setup error reporting: {}", e)))?;
    Ok(())
}

/// One transpiler error with the stage input it points into.
#[derive(Error, Debug)]
#[error("[{stage}] {message}")]
pub struct StageFailure {
    pub stage: &'static str,
    pub message: String,
    pub code: String,
    pub src: Option<NamedSource<String>>,
    pub span: Option<SourceSpan>,
    pub help: String,
}

impl Diagnostic for StageFailure {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(format!("okl::{}", self.code)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(&self.help))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.src.as_ref().map(|src| src as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("here".to_string()),
            span,
        ))))
    }
}

fn help_for(error: &OklError) -> String {
    if error.code.is_fatal() {
        "the pipeline stops at this error".to_string()
    } else {
        "fix the attribute usage and run again".to_string()
    }
}

/// Miette reports for every error of `failure`. Spans are only labelled
/// when the stage input is known, since later stages see rewritten text.
pub fn stage_failures(path: &Path, failure: &PipelineError) -> Vec<StageFailure> {
    failure
        .errors
        .iter()
        .map(|error| {
            let src = failure
                .text
                .as_ref()
                .map(|text| NamedSource::new(path.display().to_string(), text.clone()));
            let span = error
                .span
                .filter(|_| src.is_some())
                .map(|span| SourceSpan::from((span.lo, span.len())));
            StageFailure {
                stage: failure.stage,
                message: error.message.clone(),
                code: error.code.to_string(),
                src,
                span,
                help: help_for(error),
            }
        })
        .collect()
}

/// Print `error` through miette when it carries transpiler errors.
/// Returns `false` when the caller should report it another way.
pub fn render_cli_error(error: &CliError) -> bool {
    let CliError::Pipeline { path, error } = error else {
        return false;
    };
    for failure in stage_failures(path, error) {
        eprintln!("{:?}", miette::Report::new(failure));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::{ErrorCode, Span};

    #[test]
    fn failures_point_into_stage_text() {
        let failure = PipelineError::single(
            "transpile",
            OklError::new(ErrorCode::LoopNesting, "bad nesting").with_span(Span::new(4, 9)),
        )
        .with_text("abc\nfor (;;) {}");
        let reports = stage_failures(Path::new("k.okl"), &failure);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].code, "LOOP_NESTING");
        assert_eq!(reports[0].span, Some(SourceSpan::from((4, 5))));
        assert_eq!(reports[0].to_string(), "[transpile] bad nesting");
    }

    #[test]
    fn spans_without_text_are_dropped() {
        let failure = PipelineError::single(
            "okl-to-gnu",
            OklError::new(ErrorCode::ParseFailure, "oops").with_span(Span::new(0, 1)),
        );
        let reports = stage_failures(Path::new("k.okl"), &failure);
        assert!(reports[0].span.is_none());
        assert!(reports[0].src.is_none());
    }
}
