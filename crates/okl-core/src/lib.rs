//! Core building blocks shared by every stage of the OKL transpiler: source
//! spans, diagnostics, the C++ tokenizer and syntax subset, attribute
//! spellings, the text rewriter and the `Transpilation` builder.

pub mod attr;
pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod rewriter;
pub mod span;
pub mod syntax;
pub mod transpilation;

pub use backend::TargetBackend;
pub use error::{Error, ErrorCode, Result};
pub use span::{LineCol, LineIndex, Span};
