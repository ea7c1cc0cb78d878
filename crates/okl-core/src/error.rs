use crate::diagnostics::Diagnostic;
use crate::span::Span;
use serde::Serialize;
use std::result;
use thiserror::Error;

/// Machine-checkable error identity carried by every transpiler error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmptySourceString,
    LexerFailure,
    ParseFailure,
    MarkerLost,
    RewriteConflict,
    AttributeArguments,
    InvalidLoop,
    MissingLoopInfo,
    NullParams,
    LoopNesting,
    UnresolvedAxis,
    NoHandler,
    AttributeNotApplicable,
    UnknownBackend,
    Internal,
}

impl ErrorCode {
    /// Soft codes are reported but never abort a stage.
    pub fn is_soft(self) -> bool {
        matches!(
            self,
            ErrorCode::NoHandler | ErrorCode::AttributeNotApplicable | ErrorCode::UnknownBackend
        )
    }

    /// Fatal codes stop the stage at the first occurrence.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::EmptySourceString
                | ErrorCode::LexerFailure
                | ErrorCode::ParseFailure
                | ErrorCode::MissingLoopInfo
                | ErrorCode::NullParams
                | ErrorCode::RewriteConflict
                | ErrorCode::MarkerLost
                | ErrorCode::Internal
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} [{code}]")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub span: Option<Span>,
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = if self.code.is_soft() {
            Diagnostic::warning(self.message.clone())
        } else {
            Diagnostic::error(self.message.clone())
        };
        let diagnostic = diagnostic.with_code(self.code.to_string());
        match self.span {
            Some(span) => diagnostic.with_span(span),
            None => diagnostic,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_display_in_screaming_snake_case() {
        assert_eq!(ErrorCode::EmptySourceString.to_string(), "EMPTY_SOURCE_STRING");
        assert_eq!(ErrorCode::MissingLoopInfo.to_string(), "MISSING_LOOP_INFO");
        let err = Error::new(ErrorCode::NullParams, "@tile params missing");
        assert_eq!(err.to_string(), "@tile params missing [NULL_PARAMS]");
    }

    #[test]
    fn soft_errors_become_warnings() {
        let diag = Error::new(ErrorCode::NoHandler, "no handler").to_diagnostic();
        assert_eq!(diag.level, crate::diagnostics::DiagnosticLevel::Warning);
        assert_eq!(diag.code.as_deref(), Some("NO_HANDLER"));
    }
}
