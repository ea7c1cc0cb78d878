//! Ordered passes over one translation unit. Each stage takes the unit,
//! rewrites its text or session, and hands it to the next; diagnostics a
//! stage raises are only reported once that stage has succeeded.

use crate::config::PipelineOptions;
use crate::error::{PipelineDiagnostics, PipelineError};
use crate::stages::UnitContext;
use tracing::{debug, debug_span, warn};

pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        unit: UnitContext,
        diagnostics: &mut PipelineDiagnostics,
    ) -> Result<UnitContext, PipelineError>;
}

/// What one completed stage did to the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    /// The stage produced different text.
    pub changed: bool,
    /// Length of the text the stage handed on.
    pub bytes: usize,
    pub diagnostics: usize,
}

pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(
        &self,
        unit: UnitContext,
        diagnostics: &mut PipelineDiagnostics,
        options: &PipelineOptions,
    ) -> Result<UnitContext, PipelineError> {
        self.run_traced(unit, diagnostics, options)
            .map(|(unit, _)| unit)
    }

    /// Run every stage in order, returning the final unit and a report per
    /// stage. A failure names the stage it happened in and carries that
    /// stage's input text, which the error spans point into.
    pub fn run_traced(
        &self,
        mut unit: UnitContext,
        diagnostics: &mut PipelineDiagnostics,
        options: &PipelineOptions,
    ) -> Result<(UnitContext, Vec<StageReport>), PipelineError> {
        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let name = stage.name();
            let _span = debug_span!("stage", name).entered();
            let input = unit.source.clone();
            let pending = diagnostics.items.len();

            unit = match stage.run(unit, diagnostics) {
                Ok(next) => next,
                Err(err) => {
                    warn!(errors = err.errors.len(), "stage failed");
                    return Err(err.in_stage(name, &input));
                }
            };

            let report = StageReport {
                stage: name,
                changed: unit.source != input,
                bytes: unit.source.len(),
                diagnostics: diagnostics.items.len().saturating_sub(pending),
            };
            debug!(
                changed = report.changed,
                bytes = report.bytes,
                diagnostics = report.diagnostics,
                "stage finished"
            );
            diagnostics.emit_stage(name, options);
            reports.push(report);
        }
        Ok((unit, reports))
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::diagnostics::Diagnostic;
    use okl_core::{Error, TargetBackend};
    use okl_transpiler::{IncludeFileMap, TranspilerSession};
    use pretty_assertions::assert_eq;

    struct Rename {
        name: &'static str,
        from: &'static str,
        to: &'static str,
    }

    impl PipelineStage for Rename {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(
            &self,
            mut unit: UnitContext,
            diagnostics: &mut PipelineDiagnostics,
        ) -> Result<UnitContext, PipelineError> {
            if unit.source.contains(self.from) {
                diagnostics.push(Diagnostic::warning(format!("renamed {}", self.from)));
            }
            let text = unit.source.replace(self.from, self.to);
            unit.update_source(text);
            Ok(unit)
        }
    }

    /// Fails with an error attributed to some other stage.
    struct Broken;

    impl PipelineStage for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn run(
            &self,
            _unit: UnitContext,
            _diagnostics: &mut PipelineDiagnostics,
        ) -> Result<UnitContext, PipelineError> {
            Err(PipelineError::single("helper", Error::internal("no luck")))
        }
    }

    fn unit(source: &str) -> UnitContext {
        UnitContext::new(
            source,
            IncludeFileMap::new(),
            TranspilerSession::new(TargetBackend::Serial),
        )
    }

    fn quiet() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.debug.print_diagnostics = false;
        options
    }

    #[test]
    fn stages_run_in_order_and_report() {
        let pipeline = PipelineBuilder::new()
            .add_stage(Rename {
                name: "first",
                from: "a",
                to: "b",
            })
            .add_stage(Rename {
                name: "second",
                from: "x",
                to: "y",
            })
            .add_stage(Rename {
                name: "third",
                from: "b",
                to: "c",
            })
            .build();
        assert_eq!(pipeline.stage_names(), vec!["first", "second", "third"]);

        let mut diagnostics = PipelineDiagnostics::default();
        let (out, reports) = pipeline
            .run_traced(unit("aa"), &mut diagnostics, &quiet())
            .expect("run");
        assert_eq!(out.source, "cc");
        let changed: Vec<_> = reports.iter().map(|r| (r.stage, r.changed)).collect();
        assert_eq!(changed, vec![("first", true), ("second", false), ("third", true)]);
        assert_eq!(reports[0].diagnostics, 1);
        assert_eq!(reports[1].diagnostics, 0);
        assert_eq!(diagnostics.take_reported().len(), 2);
    }

    #[test]
    fn failure_names_the_stage_and_keeps_its_input() {
        let pipeline = PipelineBuilder::new()
            .add_stage(Rename {
                name: "first",
                from: "a",
                to: "b",
            })
            .add_stage(Broken)
            .build();
        let mut diagnostics = PipelineDiagnostics::default();
        let err = pipeline
            .run(unit("abc"), &mut diagnostics, &quiet())
            .err()
            .expect("failure");
        assert_eq!(err.stage, "broken");
        assert_eq!(err.text.as_deref(), Some("bbc"));
        assert_eq!(diagnostics.take_reported().len(), 1);
    }
}
