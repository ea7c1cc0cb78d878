//! Command-line front end of the OKL transpiler.

pub mod cli;
pub mod commands;
pub mod diagnostics;

pub mod error {
    use okl_pipeline::PipelineError;
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CliError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Invalid input: {0}")]
        InvalidInput(String),

        #[error("{}: {error}", path.display())]
        Pipeline { path: PathBuf, error: PipelineError },

        #[error(transparent)]
        Other(#[from] eyre::Report),
    }

    pub type Result<T> = std::result::Result<T, CliError>;
}

pub use error::{CliError, Result};
