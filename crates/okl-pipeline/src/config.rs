use okl_core::TargetBackend;
use serde::Deserialize;

/// Options for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub backend: TargetBackend,
    /// Stop after the two normalizer stages.
    pub normalize_only: bool,
    /// Collect kernel signatures during the transpile stage.
    pub emit_metadata: bool,
    pub debug: DebugOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            backend: TargetBackend::Serial,
            normalize_only: false,
            emit_metadata: true,
            debug: DebugOptions::default(),
        }
    }
}

impl PipelineOptions {
    pub fn for_backend(backend: TargetBackend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Include info-level diagnostics in stage reports.
    pub verbose: bool,
    /// Print stage diagnostics to stderr as they are flushed.
    pub print_diagnostics: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            print_diagnostics: true,
        }
    }
}
