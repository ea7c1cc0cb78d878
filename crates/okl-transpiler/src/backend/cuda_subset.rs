//! Handlers common to CUDA and HIP, which share kernel qualifiers, memory
//! spaces and atomics and differ only in index spelling.

use super::atomic::{atomic_update, AtomicUpdate};
use super::common::{
    as_function, as_var, handle_nobarrier, is_global_constant, is_plain_global_function,
    qualify_decl, remove_attr, replace_attr, restrict_param,
};
use super::simt::{handle_barrier, handle_loop, handle_tile, SimtDialect};
use crate::frontend::{
    ATOMIC_ATTR_NAME, BARRIER_ATTR_NAME, EXCLUSIVE_ATTR_NAME, INNER_ATTR_NAME, KERNEL_ATTR_NAME,
    NOBARRIER_ATTR_NAME, OUTER_ATTR_NAME, RESTRICT_ATTR_NAME, SHARED_ATTR_NAME, TILE_ATTR_NAME,
};
use crate::params::ParsedParams;
use crate::registry::AttributeRegistry;
use crate::session::SessionStage;
use okl_core::syntax::{AttrNode, NodeKind, NodeRef};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder};
use okl_core::{Error, ErrorCode, Result, TargetBackend};
use tracing::debug;

pub const CUDA_KERNEL_DEFINITION: &str = "extern \"C\" __global__";
pub const SYNC_THREADS_BARRIER: &str = "__syncthreads();";
pub const SHARED_MODIFIER: &str = "__shared__";
pub const RESTRICT_MODIFIER: &str = "__restrict__";
pub const CONSTANT_QUALIFIER: &str = "__constant__";
pub const DEVICE_QUALIFIER: &str = "__device__";

pub fn kernel_name(name: &str) -> String {
    format!("_occa_{name}_0")
}

pub fn handle_kernel(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let (_, func) = as_function(node, KERNEL_ATTR_NAME)?;
    debug!(kernel = %func.name, "handle [@kernel] attribute");
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, attr.removal_span, CUDA_KERNEL_DEFINITION)
        .add_replacement(SlotName::Name, func.name_span, kernel_name(&func.name))
        .build())
}

pub fn handle_shared(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    as_var(node, SHARED_ATTR_NAME)?;
    Ok(replace_attr(attr, node, SHARED_MODIFIER))
}

pub fn handle_exclusive(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    Ok(remove_attr(attr, node))
}

pub fn handle_restrict(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    restrict_param(attr, node, RESTRICT_MODIFIER)
}

/// `x += v;` becomes `atomicAdd(&(x), v);`.
pub fn handle_atomic(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let AtomicUpdate { target, op, value } = atomic_update(stage.source(), node)?;
    let func = match op.as_str() {
        "+=" | "++" => "atomicAdd",
        "-=" | "--" => "atomicSub",
        "&=" => "atomicAnd",
        "|=" => "atomicOr",
        "^=" => "atomicXor",
        other => {
            return Err(Error::new(
                ErrorCode::AttributeNotApplicable,
                format!("[@atomic] operator `{other}` has no CUDA atomic"),
            )
            .with_span(node.span()))
        }
    };
    Ok(TranspilationBuilder::new(node)
        .add_replacement(
            SlotName::Attr,
            node.full_span(),
            format!("{func}(&({target}), {value});"),
        )
        .build())
}

pub fn handle_global_constant(
    node: NodeRef<'_>,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    match node.as_decl() {
        Some(decl) if is_global_constant(node) => {
            Ok(qualify_decl(node, decl, CONSTANT_QUALIFIER))
        }
        _ => Ok(TranspilationBuilder::new(node).build()),
    }
}

pub fn handle_global_function(
    node: NodeRef<'_>,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    match node.as_decl() {
        Some(decl) if is_plain_global_function(node) => {
            Ok(qualify_decl(node, decl, DEVICE_QUALIFIER))
        }
        _ => Ok(TranspilationBuilder::new(node).build()),
    }
}

/// Register every CUDA-family handler for `backend` with index dialect `D`.
pub fn register_for<D: SimtDialect>(registry: &mut AttributeRegistry, backend: TargetBackend) {
    let handlers: [(&'static str, NodeKind, crate::registry::GenerateFn); 10] = [
        (KERNEL_ATTR_NAME, NodeKind::Function, handle_kernel),
        (OUTER_ATTR_NAME, NodeKind::For, handle_loop::<D>),
        (INNER_ATTR_NAME, NodeKind::For, handle_loop::<D>),
        (TILE_ATTR_NAME, NodeKind::For, handle_tile::<D>),
        (SHARED_ATTR_NAME, NodeKind::Var, handle_shared),
        (EXCLUSIVE_ATTR_NAME, NodeKind::Var, handle_exclusive),
        (RESTRICT_ATTR_NAME, NodeKind::Param, handle_restrict),
        (ATOMIC_ATTR_NAME, NodeKind::Expr, handle_atomic),
        (BARRIER_ATTR_NAME, NodeKind::Null, handle_barrier::<D>),
        (NOBARRIER_ATTR_NAME, NodeKind::For, handle_nobarrier),
    ];
    for (name, kind, generate) in handlers {
        registry.register_backend(backend, name, kind, generate);
    }
    registry.register_implicit(backend, NodeKind::Var, handle_global_constant);
    registry.register_implicit(backend, NodeKind::Function, handle_global_function);
}
