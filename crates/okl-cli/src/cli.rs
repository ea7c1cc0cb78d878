//! `okl.toml` handling.

use crate::{CliError, Result};
use okl_pipeline::PipelineOptions;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "okl.toml";

/// Settings read from `okl.toml`; command-line flags win over them.
///
/// ```toml
/// [pipeline]
/// backend = "cuda"
/// emit_metadata = false
///
/// [pipeline.debug]
/// verbose = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub pipeline: PipelineOptions,
}

impl CliConfig {
    /// Load `path`, or `okl.toml` in the working directory when present.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load_from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::TargetBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config() {
        let config = CliConfig::default();
        assert_eq!(config.pipeline.backend, TargetBackend::Serial);
        assert!(config.pipeline.emit_metadata);
        assert!(!config.pipeline.normalize_only);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbackend = \"hip\"\n\n[pipeline.debug]\nverbose = true").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.backend, TargetBackend::Hip);
        assert!(config.pipeline.debug.verbose);
        assert!(config.pipeline.debug.print_diagnostics);
        assert!(config.pipeline.emit_metadata);
    }

    #[test]
    fn bad_files_are_config_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbackend = \"metal\"").unwrap();
        assert!(matches!(
            CliConfig::load(Some(file.path())),
            Err(CliError::Config(_))
        ));

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            CliConfig::load(Some(&missing)),
            Err(CliError::Config(_))
        ));
    }
}
