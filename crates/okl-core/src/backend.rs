use serde::{Deserialize, Serialize};

/// Closed set of code-generation targets; every registry lookup is keyed by it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TargetBackend {
    #[strum(serialize = "serial")]
    Serial,
    #[strum(serialize = "openmp")]
    OpenMp,
    #[strum(serialize = "cuda")]
    Cuda,
    #[strum(serialize = "hip")]
    Hip,
    #[strum(serialize = "dpcpp")]
    Dpcpp,
}

impl TargetBackend {
    pub fn all() -> impl Iterator<Item = TargetBackend> {
        <TargetBackend as strum::IntoEnumIterator>::iter()
    }

    /// SIMT-style targets expose block/thread indices and a thread barrier.
    pub fn is_simt(self) -> bool {
        matches!(self, TargetBackend::Cuda | TargetBackend::Hip)
    }

    /// Host targets run every loop sequentially (optionally under OpenMP).
    pub fn is_host(self) -> bool {
        matches!(self, TargetBackend::Serial | TargetBackend::OpenMp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_backend_names_case_insensitively() {
        assert_eq!(TargetBackend::from_str("CUDA").ok(), Some(TargetBackend::Cuda));
        assert_eq!(TargetBackend::from_str("OpenMP").ok(), Some(TargetBackend::OpenMp));
        assert!(TargetBackend::from_str("metal").is_err());
        assert_eq!(TargetBackend::Dpcpp.to_string(), "dpcpp");
        assert_eq!(TargetBackend::all().count(), 5);
    }
}
