//! `okl transpile`: run the full pipeline for one backend.

use super::common::{pipeline_error, read_source, write_output};
use crate::cli::CliConfig;
use crate::{CliError, Result};
use clap::Args;
use eyre::WrapErr;
use okl_core::TargetBackend;
use okl_transpiler::{IncludeFileMap, ProgramMetadata};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct TranspileArgs {
    /// OKL source file
    pub input: PathBuf,

    /// Target backend (serial, openmp, cuda, hip, dpcpp)
    #[arg(short, long)]
    pub backend: Option<TargetBackend>,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write kernel metadata as JSON to this file
    #[arg(long)]
    pub metadata: Option<PathBuf>,
}

pub fn transpile_command(args: TranspileArgs, config: &CliConfig) -> Result<()> {
    let mut options = config.pipeline.clone();
    options.normalize_only = false;
    if let Some(backend) = args.backend {
        options.backend = backend;
    }
    if args.metadata.is_some() {
        options.emit_metadata = true;
    }

    let source = read_source(&args.input)?;
    let output = okl_pipeline::transpile(&source, IncludeFileMap::new(), &options)
        .map_err(pipeline_error(&args.input))?;
    write_output(args.output.as_deref(), &output.source)?;

    if let Some(path) = &args.metadata {
        let metadata = output
            .metadata
            .unwrap_or_else(|| ProgramMetadata::new(options.backend));
        let json = metadata
            .to_json()
            .map_err(|e| CliError::InvalidInput(format!("Failed to encode metadata: {}", e)))?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write metadata to {}", path.display()))?;
        info!(path = %path.display(), kernels = metadata.kernels.len(), "wrote kernel metadata");
    }
    info!(
        input = %args.input.display(),
        backend = %options.backend,
        warnings = output.diagnostics.len(),
        "transpiled"
    );
    Ok(())
}
