//! Loop-nest analysis: header metadata, axis binding and barrier placement,
//! plus the attributes carried by type aliases.

mod attributed_types;
mod context;
mod loop_info;

pub use attributed_types::AttributedTypeMap;
pub use context::{child_loops, ChildLoop, SemanticLoopContext};
pub use loop_info::{
    parse_loop_header, role_of, CmpOp, IncOp, LoopHeader, LoopIncrement, LoopInfo, LoopRange,
    LoopVar,
};
