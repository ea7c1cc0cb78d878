use crate::{CliError, Result};
use eyre::WrapErr;
use okl_pipeline::PipelineError;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Write `text` to `output`, or to stdout when no path was given.
pub fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, text)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn pipeline_error(path: &Path) -> impl FnOnce(PipelineError) -> CliError {
    let path = PathBuf::from(path);
    move |error| CliError::Pipeline { path, error }
}
