//! `okl normalize`: rewrite `@attr` markers into standard attributes only.

use super::common::{pipeline_error, read_source, write_output};
use crate::cli::CliConfig;
use crate::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Clone, Args)]
pub struct NormalizeArgs {
    /// OKL source file
    pub input: PathBuf,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn normalize_command(args: NormalizeArgs, config: &CliConfig) -> Result<()> {
    let source = read_source(&args.input)?;
    let text = okl_pipeline::normalize(&source, &config.pipeline)
        .map_err(pipeline_error(&args.input))?;
    write_output(args.output.as_deref(), &text)
}
