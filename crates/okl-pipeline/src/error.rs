use crate::config::PipelineOptions;
use okl_core::diagnostics::{Diagnostic, DiagnosticDisplayOptions, DiagnosticManager};
use okl_core::{Error as OklError, LineIndex};
use std::error::Error;
use std::fmt;

/// Diagnostics gathered while a stage runs, flushed once it succeeds.
#[derive(Debug, Default, Clone)]
pub struct PipelineDiagnostics {
    pub items: Vec<Diagnostic>,
    reported: Vec<Diagnostic>,
    index: Option<LineIndex>,
}

impl PipelineDiagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.items.extend(diagnostics);
    }

    /// Source the pending diagnostics' spans point into.
    pub fn set_source(&mut self, source: &str) {
        self.index = Some(LineIndex::new(source));
    }

    pub fn emit_stage(&mut self, stage: &'static str, options: &PipelineOptions) {
        if self.items.is_empty() {
            return;
        }
        if options.debug.print_diagnostics {
            let opts = DiagnosticDisplayOptions::new(options.debug.verbose);
            DiagnosticManager::emit(&self.items, Some(stage), self.index.as_ref(), &opts);
        }
        self.reported.append(&mut self.items);
    }

    /// Everything flushed by completed stages, oldest first.
    pub fn take_reported(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.reported)
    }
}

#[derive(Debug)]
pub struct PipelineError {
    pub stage: &'static str,
    pub errors: Vec<OklError>,
    /// Input text of the failing stage; error spans point into it.
    pub text: Option<String>,
}

impl PipelineError {
    pub fn new(stage: &'static str, errors: Vec<OklError>) -> Self {
        Self {
            stage,
            errors,
            text: None,
        }
    }

    pub fn single(stage: &'static str, error: OklError) -> Self {
        Self::new(stage, vec![error])
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Attribute the error to `stage`, keeping any text already attached.
    pub fn in_stage(mut self, stage: &'static str, input: &str) -> Self {
        self.stage = stage;
        if self.text.is_none() {
            self.text = Some(input.to_string());
        }
        self
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "[{}] failed", self.stage),
            [only] => write!(f, "[{}] {}", self.stage, only),
            [first, rest @ ..] => write!(
                f,
                "[{}] {} (and {} more error(s))",
                self.stage,
                first,
                rest.len()
            ),
        }
    }
}

impl Error for PipelineError {}
