use crate::metadata::ProgramMetadata;
use crate::sema::{AttributedTypeMap, SemanticLoopContext};
use okl_core::attr::MarkerRecord;
use okl_core::diagnostics::{Diagnostic, DiagnosticSink};
use okl_core::{Error, LineCol, LineIndex, TargetBackend};
use std::collections::BTreeMap;
use tracing::warn;

/// Header name to contents, carried unchanged through every stage.
pub type IncludeFileMap = BTreeMap<String, String>;

/// State shared by every stage of one pipeline run.
#[derive(Debug)]
pub struct TranspilerSession {
    backend: TargetBackend,
    diagnostics: Vec<Diagnostic>,
    gnu_markers: Vec<MarkerRecord>,
    recovery_markers: Vec<MarkerRecord>,
    metadata: Option<ProgramMetadata>,
}

impl TranspilerSession {
    pub fn new(backend: TargetBackend) -> Self {
        Self {
            backend,
            diagnostics: Vec::new(),
            gnu_markers: Vec::new(),
            recovery_markers: Vec::new(),
            metadata: None,
        }
    }

    pub fn backend(&self) -> TargetBackend {
        self.backend
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Markers left by the token normalizer for attributes spelled the GNU way.
    pub fn gnu_markers(&self) -> &[MarkerRecord] {
        &self.gnu_markers
    }

    /// Markers of attributes moved out of a `for` header.
    pub fn recovery_markers(&self) -> &[MarkerRecord] {
        &self.recovery_markers
    }

    pub fn set_markers(&mut self, gnu: Vec<MarkerRecord>, recovery: Vec<MarkerRecord>) {
        self.gnu_markers = gnu;
        self.recovery_markers = recovery;
    }

    pub fn metadata(&self) -> Option<&ProgramMetadata> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: ProgramMetadata) {
        self.metadata = Some(metadata);
    }

    pub fn take_metadata(&mut self) -> Option<ProgramMetadata> {
        self.metadata.take()
    }
}

impl DiagnosticSink for TranspilerSession {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// One translation unit inside one pipeline stage.
///
/// Owns the errors seen so far and the per-stage analysis state, each built
/// on first use and dropped with the stage.
pub struct SessionStage<'a> {
    session: &'a mut TranspilerSession,
    source: &'a str,
    line_index: LineIndex,
    errors: Vec<Error>,
    sema: Option<SemanticLoopContext>,
    attributed_types: Option<AttributedTypeMap>,
    kernel_meta: Option<ProgramMetadata>,
}

impl<'a> SessionStage<'a> {
    pub fn new(session: &'a mut TranspilerSession, source: &'a str) -> Self {
        Self {
            session,
            source,
            line_index: LineIndex::new(source),
            errors: Vec::new(),
            sema: None,
            attributed_types: None,
            kernel_meta: None,
        }
    }

    pub fn backend(&self) -> TargetBackend {
        self.session.backend()
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn session(&self) -> &TranspilerSession {
        &*self.session
    }

    pub fn session_mut(&mut self) -> &mut TranspilerSession {
        &mut *self.session
    }

    pub fn line_col(&self, offset: usize) -> LineCol {
        self.line_index.line_col(offset)
    }

    /// Record an error that fails the stage once traversal ends.
    pub fn push_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Report a soft error; traversal and output are unaffected.
    pub fn push_warning(&mut self, error: Error) {
        let location = error.span.map(|span| self.line_col(span.lo));
        match location {
            Some(loc) => warn!(code = %error.code, %loc, "{}", error.message),
            None => warn!(code = %error.code, "{}", error.message),
        }
        self.session.emit(error.to_diagnostic());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    pub fn sema(&self) -> Option<&SemanticLoopContext> {
        self.sema.as_ref()
    }

    pub fn sema_mut(&mut self) -> &mut SemanticLoopContext {
        self.sema.get_or_insert_with(SemanticLoopContext::new)
    }

    pub fn attributed_types(&self) -> Option<&AttributedTypeMap> {
        self.attributed_types.as_ref()
    }

    pub fn attributed_types_mut(&mut self) -> &mut AttributedTypeMap {
        self.attributed_types
            .get_or_insert_with(AttributedTypeMap::new)
    }

    pub fn kernel_meta_mut(&mut self) -> &mut ProgramMetadata {
        let backend = self.backend();
        self.kernel_meta
            .get_or_insert_with(|| ProgramMetadata::new(backend))
    }

    pub fn take_kernel_meta(&mut self) -> Option<ProgramMetadata> {
        self.kernel_meta.take()
    }
}
