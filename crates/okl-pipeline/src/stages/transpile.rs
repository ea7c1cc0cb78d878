use crate::error::{PipelineDiagnostics, PipelineError};
use crate::pipeline::PipelineStage;
use crate::stages::UnitContext;
use okl_core::syntax::parse;
use okl_transpiler::{transpile_unit, SessionStage};
use tracing::info;

/// Lowers every standard-spelled OKL attribute for the session's backend.
pub struct TranspileStage {
    emit_metadata: bool,
}

impl TranspileStage {
    pub const NAME: &'static str = "transpile";

    pub fn new(emit_metadata: bool) -> Self {
        Self { emit_metadata }
    }
}

impl PipelineStage for TranspileStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(
        &self,
        mut context: UnitContext,
        diagnostics: &mut PipelineDiagnostics,
    ) -> Result<UnitContext, PipelineError> {
        let tu = parse(&context.source)
            .map_err(|err| PipelineError::single(Self::NAME, err))?;
        let result = {
            let mut stage = SessionStage::new(&mut context.session, &context.source);
            transpile_unit(&mut stage, &tu)
        };
        diagnostics.set_source(&context.source);
        diagnostics.extend(context.session.take_diagnostics());
        let text = result
            .map_err(|errors| PipelineError::new(Self::NAME, errors))?;

        if !self.emit_metadata {
            context.session.take_metadata();
        }
        info!(
            backend = %context.session.backend(),
            kernels = context.session.metadata().map_or(0, |m| m.kernels.len()),
            "transpiled unit"
        );
        context.update_source(text);
        Ok(context)
    }
}
