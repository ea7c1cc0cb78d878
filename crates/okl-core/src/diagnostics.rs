use crate::span::{LineIndex, Span};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub span: Option<Span>,
    pub suggestions: Vec<String>,
    pub source_context: Option<String>,
    pub code: Option<String>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            span: None,
            suggestions: Vec::new(),
            source_context: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = Some(context.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        if !self.suggestions.is_empty() {
            let hints = self.suggestions.join("; ");
            write!(f, " (hints: {})", hints)?;
        }

        Ok(())
    }
}

/// Pluggable destination for diagnostics produced while walking a unit.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Forwards every diagnostic to `tracing` instead of storing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Error => tracing::error!("{}", diagnostic),
            DiagnosticLevel::Warning => tracing::warn!("{}", diagnostic),
            DiagnosticLevel::Info => tracing::info!("{}", diagnostic),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticTemplate {
    #[default]
    Pretty,
    Plain,
}

/// Runtime configuration for rendering diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticDisplayOptions {
    pub template: DiagnosticTemplate,
    pub verbose_info: bool,
}

impl DiagnosticDisplayOptions {
    pub fn new(verbose_info: bool) -> Self {
        Self {
            template: DiagnosticTemplate::Pretty,
            verbose_info,
        }
    }

    pub fn plain(verbose_info: bool) -> Self {
        Self {
            template: DiagnosticTemplate::Plain,
            verbose_info,
        }
    }
}

pub struct DiagnosticManager;

impl DiagnosticManager {
    /// Render diagnostics into printable lines. `context` is used when a
    /// diagnostic carries no source context of its own; `index` turns spans
    /// into line/column positions.
    pub fn render(
        diagnostics: &[Diagnostic],
        context: Option<&str>,
        index: Option<&LineIndex>,
        options: &DiagnosticDisplayOptions,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        for diagnostic in diagnostics {
            if diagnostic.level == DiagnosticLevel::Info && !options.verbose_info {
                continue;
            }
            let context = diagnostic
                .source_context
                .as_deref()
                .or(context)
                .unwrap_or("pipeline");
            let header = match options.template {
                DiagnosticTemplate::Pretty => {
                    let prefix = match diagnostic.level {
                        DiagnosticLevel::Error => "error",
                        DiagnosticLevel::Warning => "warning",
                        DiagnosticLevel::Info => "info",
                    };
                    format!("{prefix}[{context}]: {}", diagnostic.message)
                }
                DiagnosticTemplate::Plain => {
                    let level = match diagnostic.level {
                        DiagnosticLevel::Error => "ERROR",
                        DiagnosticLevel::Warning => "WARNING",
                        DiagnosticLevel::Info => "INFO",
                    };
                    format!("[{context}] {level}: {}", diagnostic.message)
                }
            };
            lines.push(match &diagnostic.code {
                Some(code) => format!("{header} ({code})"),
                None => header,
            });
            if let Some(span) = diagnostic.span {
                match index {
                    Some(index) => lines.push(format!("   at {}", index.line_col(span.lo))),
                    None => lines.push(format!("   at {}", span)),
                }
            }
            for suggestion in &diagnostic.suggestions {
                lines.push(format!("   suggestion: {}", suggestion));
            }
        }
        lines
    }

    pub fn emit(
        diagnostics: &[Diagnostic],
        context: Option<&str>,
        index: Option<&LineIndex>,
        options: &DiagnosticDisplayOptions,
    ) {
        for line in Self::render(diagnostics, context, index, options) {
            eprintln!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_line_positions() {
        let index = LineIndex::new("int a;\n@bad x;\n");
        let diags = vec![
            Diagnostic::warning("[@bad] does not apply")
                .with_code("ATTRIBUTE_NOT_APPLICABLE")
                .with_span(Span::new(7, 11)),
            Diagnostic::info("hidden"),
        ];
        let lines = DiagnosticManager::render(
            &diags,
            Some("transpile"),
            Some(&index),
            &DiagnosticDisplayOptions::plain(false),
        );
        assert_eq!(
            lines,
            vec![
                "[transpile] WARNING: [@bad] does not apply (ATTRIBUTE_NOT_APPLICABLE)".to_string(),
                "   at 2:1".to_string(),
            ]
        );
    }
}
