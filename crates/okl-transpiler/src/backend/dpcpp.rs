//! SYCL backend. A kernel takes the queue and launch range as leading
//! arguments and wraps its body in a `parallel_for` submission; indices and
//! barriers go through the `nd_item` handle.

use super::atomic::{atomic_update, AtomicUpdate};
use super::common::{
    array_type, as_function, as_var, handle_nobarrier, is_plain_global_function, qualify_decl,
    remove_attr, restrict_param, EXTERN_C,
};
use super::cuda_subset::{kernel_name, RESTRICT_MODIFIER};
use super::simt::{handle_barrier, handle_loop, handle_tile, SimtDialect};
use crate::frontend::{
    ATOMIC_ATTR_NAME, BARRIER_ATTR_NAME, EXCLUSIVE_ATTR_NAME, INNER_ATTR_NAME, KERNEL_ATTR_NAME,
    NOBARRIER_ATTR_NAME, OUTER_ATTR_NAME, RESTRICT_ATTR_NAME, SHARED_ATTR_NAME, TILE_ATTR_NAME,
};
use crate::params::{BarrierScope, ParsedParams};
use crate::registry::AttributeRegistry;
use crate::session::SessionStage;
use okl_core::syntax::{AttrNode, NodeKind, NodeRef, StmtKind};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder};
use okl_core::{Error, ErrorCode, Result, TargetBackend};
use tracing::debug;

pub const SYCL_INCLUDE: &str = "<sycl/sycl.hpp>";
pub const SYCL_EXTERNAL: &str = "SYCL_EXTERNAL";
pub const KERNEL_ARGS: &str = "sycl::queue * queue_, sycl::nd_range<3> * range_";
pub const KERNEL_PROLOGUE: &str = "queue_->submit([&](sycl::handler & handler_) {\
handler_.parallel_for(*range_, [=](sycl::nd_item<3> item_) {";
pub const KERNEL_EPILOGUE: &str = "});});";

pub struct Dpcpp;

impl SimtDialect for Dpcpp {
    // SYCL numbers dimensions slowest-first.
    fn group_index(axis: usize) -> String {
        format!("item_.get_group({})", 2 - axis)
    }

    fn local_index(axis: usize) -> String {
        format!("item_.get_local_id({})", 2 - axis)
    }

    fn barrier(scope: BarrierScope) -> String {
        let space = match scope {
            BarrierScope::Local => "local_space",
            BarrierScope::Global => "global_space",
        };
        format!("item_.barrier(sycl::access::fence_space::{space});")
    }
}

pub fn handle_kernel(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let (_, func) = as_function(node, KERNEL_ATTR_NAME)?;
    debug!(kernel = %func.name, "handle [@kernel] attribute");
    let block = match func.body.as_deref().map(|body| &body.kind) {
        Some(StmtKind::Compound(block)) => block,
        _ => {
            return Err(Error::new(
                ErrorCode::AttributeNotApplicable,
                "[@kernel] requires a function definition",
            )
            .with_span(node.span()))
        }
    };
    let args = if func.params.is_empty() {
        KERNEL_ARGS.to_string()
    } else {
        format!("{KERNEL_ARGS}, ")
    };
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, attr.removal_span, EXTERN_C)
        .add_replacement(SlotName::Name, func.name_span, kernel_name(&func.name))
        .add_insertion(SlotName::Arg, func.lparen.hi, args)
        .add_insertion(SlotName::Prologue, block.lbrace.hi, KERNEL_PROLOGUE)
        .add_insertion(SlotName::Epilogue, block.rbrace.lo, KERNEL_EPILOGUE)
        .build())
}

/// Shared arrays become work-group local memory bound by reference.
pub fn handle_shared(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let (decl, var) = as_var(node, SHARED_ATTR_NAME)?;
    let (name, ty) = array_type(var)
        .filter(|_| var.declarators.len() == 1)
        .ok_or_else(|| {
            Error::new(
                ErrorCode::AttributeNotApplicable,
                "[@shared] expects a single variable declaration",
            )
            .with_span(decl.span)
        })?;
    let text = format!(
        "auto & {name} = *(sycl::ext::oneapi::group_local_memory_for_overwrite<{ty}>(item_.get_group()));"
    );
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, decl.full_span, text)
        .build())
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

pub fn handle_atomic(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let AtomicUpdate { target, op, value } = atomic_update(stage.source(), node)?;
    let op = match op.as_str() {
        "++" => "+=",
        "--" => "-=",
        other => other,
    };
    let text = format!(
        "sycl::atomic_ref<std::remove_reference_t<decltype({target})>, \
sycl::memory_order::relaxed, sycl::memory_scope::device, \
sycl::access::address_space::global_space>({target}) {op} {value};"
    );
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, node.full_span(), text)
        .build())
}

fn handle_global_function(node: NodeRef<'_>, _stage: &mut SessionStage<'_>) -> Result<Transpilation> {
    match node.as_decl() {
        Some(decl) if is_plain_global_function(node) => Ok(qualify_decl(node, decl, SYCL_EXTERNAL)),
        _ => Ok(TranspilationBuilder::new(node).build()),
    }
}

fn handle_translation_unit(node: NodeRef<'_>, _stage: &mut SessionStage<'_>) -> Result<Transpilation> {
    Ok(TranspilationBuilder::new(node).add_include(SYCL_INCLUDE).build())
}

pub fn register(registry: &mut AttributeRegistry) {
    let backend = TargetBackend::Dpcpp;
    registry.register_backend(backend, KERNEL_ATTR_NAME, NodeKind::Function, handle_kernel);
    registry.register_backend(backend, OUTER_ATTR_NAME, NodeKind::For, handle_loop::<Dpcpp>);
    registry.register_backend(backend, INNER_ATTR_NAME, NodeKind::For, handle_loop::<Dpcpp>);
    registry.register_backend(backend, TILE_ATTR_NAME, NodeKind::For, handle_tile::<Dpcpp>);
    registry.register_backend(backend, SHARED_ATTR_NAME, NodeKind::Var, handle_shared);
    registry.register_backend(backend, EXCLUSIVE_ATTR_NAME, NodeKind::Var, handle_exclusive);
    registry.register_backend(backend, RESTRICT_ATTR_NAME, NodeKind::Param, handle_restrict);
    registry.register_backend(backend, ATOMIC_ATTR_NAME, NodeKind::Expr, handle_atomic);
    registry.register_backend(backend, BARRIER_ATTR_NAME, NodeKind::Null, handle_barrier::<Dpcpp>);
    registry.register_backend(backend, NOBARRIER_ATTR_NAME, NodeKind::For, handle_nobarrier);
    registry.register_implicit(backend, NodeKind::Function, handle_global_function);
    registry.register_implicit(backend, NodeKind::TranslationUnit, handle_translation_unit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn axes_are_reversed() {
        assert_eq!(Dpcpp::group_index(0), "item_.get_group(2)");
        assert_eq!(Dpcpp::local_index(2), "item_.get_local_id(0)");
    }

    #[test]
    fn barrier_scopes() {
        assert_eq!(
            Dpcpp::barrier(BarrierScope::Global),
            "item_.barrier(sycl::access::fence_space::global_space);"
        );
        assert!(Dpcpp::barrier(BarrierScope::Local).contains("local_space"));
    }
}
