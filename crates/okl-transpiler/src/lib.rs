//! OKL attribute lowering: argument parsing, loop-nest analysis and the
//! per-backend handlers that rewrite an attributed translation unit into
//! plain backend source.

pub mod backend;
pub mod frontend;
pub mod metadata;
pub mod params;
pub mod processor;
pub mod registry;
pub mod sema;
pub mod session;

pub use metadata::{ArgInfo, KernelInfo, ProgramMetadata};
pub use processor::{transpile_unit, transpile_with};
pub use registry::{bootstrap, AttributeRegistry};
pub use session::{IncludeFileMap, SessionStage, TranspilerSession};
