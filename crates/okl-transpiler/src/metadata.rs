use okl_core::syntax::{FunctionDecl, Param};
use okl_core::{Result, TargetBackend};
use serde::{Deserialize, Serialize};

/// Kernel signatures of one translation unit, as a launcher needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub backend: TargetBackend,
    pub kernels: Vec<KernelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    pub name: String,
    /// Name after backend mangling, e.g. `_occa_add_0`.
    pub emitted_name: String,
    pub args: Vec<ArgInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_text: String,
    pub is_const: bool,
    pub is_pointer: bool,
}

impl From<&Param> for ArgInfo {
    fn from(param: &Param) -> Self {
        Self {
            name: param.name.clone().unwrap_or_default(),
            type_text: param.type_text.clone(),
            is_const: param.is_const,
            is_pointer: param.is_pointer,
        }
    }
}

impl KernelInfo {
    pub fn new(func: &FunctionDecl, emitted_name: impl Into<String>) -> Self {
        Self {
            name: func.name.clone(),
            emitted_name: emitted_name.into(),
            args: func.params.iter().map(ArgInfo::from).collect(),
        }
    }
}

impl ProgramMetadata {
    pub fn new(backend: TargetBackend) -> Self {
        Self {
            backend,
            kernels: Vec::new(),
        }
    }

    pub fn kernel(&self, name: &str) -> Option<&KernelInfo> {
        self.kernels.iter().find(|k| k.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
