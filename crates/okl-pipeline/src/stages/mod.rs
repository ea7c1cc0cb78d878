//! The three stages every translation unit goes through, in order.

pub mod normalizer;
pub mod transpile;

pub use normalizer::{GnuToStdStage, OklToGnuStage};
pub use transpile::TranspileStage;

use okl_transpiler::{IncludeFileMap, TranspilerSession};

/// What flows between stages: the current text of the unit, the include
/// files it may reference, and the session shared by all stages.
#[derive(Debug)]
pub struct UnitContext {
    pub source: String,
    pub includes: IncludeFileMap,
    pub session: TranspilerSession,
}

impl UnitContext {
    pub fn new(source: impl Into<String>, includes: IncludeFileMap, session: TranspilerSession) -> Self {
        Self {
            source: source.into(),
            includes,
            session,
        }
    }

    /// Adopt a stage result; empty text means the stage changed nothing.
    pub fn update_source(&mut self, text: String) {
        if !text.is_empty() {
            self.source = text;
        }
    }
}
