//! Stage pipeline of the OKL transpiler: marker lowering, attribute
//! normalization and backend transpilation, chained through
//! [`PipelineBuilder`].

pub mod config;
pub mod error;
pub mod pipeline;
pub mod stages;

pub use config::{DebugOptions, PipelineOptions};
pub use error::{PipelineDiagnostics, PipelineError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStage, StageReport};
pub use stages::UnitContext;

use okl_core::diagnostics::Diagnostic;
use okl_transpiler::{IncludeFileMap, ProgramMetadata, TranspilerSession};
use stages::{GnuToStdStage, OklToGnuStage, TranspileStage};
use tracing::debug;

/// Final text of one unit plus what the stages learned about it.
#[derive(Debug, Clone)]
pub struct TranspileOutput {
    pub source: String,
    pub includes: IncludeFileMap,
    pub metadata: Option<ProgramMetadata>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The two normalizer stages, optionally followed by the transpile stage.
pub fn build_pipeline(options: &PipelineOptions) -> Pipeline {
    let builder = PipelineBuilder::new()
        .add_stage(OklToGnuStage)
        .add_stage(GnuToStdStage);
    if options.normalize_only {
        return builder.build();
    }
    builder
        .add_stage(TranspileStage::new(options.emit_metadata))
        .build()
}

/// Run the configured pipeline over `source`.
pub fn transpile(
    source: &str,
    includes: IncludeFileMap,
    options: &PipelineOptions,
) -> Result<TranspileOutput, PipelineError> {
    let session = TranspilerSession::new(options.backend);
    let context = UnitContext::new(source, includes, session);
    let mut diagnostics = PipelineDiagnostics::default();
    let pipeline = build_pipeline(options);
    debug!(stages = ?pipeline.stage_names(), backend = %options.backend, "running pipeline");
    let mut context = pipeline.run(context, &mut diagnostics, options)?;
    Ok(TranspileOutput {
        metadata: context.session.take_metadata(),
        diagnostics: diagnostics.take_reported(),
        source: context.source,
        includes: context.includes,
    })
}

/// Lower marker syntax to standard attributes without transpiling.
pub fn normalize(source: &str, options: &PipelineOptions) -> Result<String, PipelineError> {
    let options = PipelineOptions {
        normalize_only: true,
        ..options.clone()
    };
    transpile(source, IncludeFileMap::new(), &options).map(|output| output.source)
}
