//! Handlers for the CPU backends. Parallel loops turn back into ordinary
//! `for` loops and the work is shared out by an optional pragma.

use super::common::{
    as_function, as_loop, close_scopes, loop_info, remove_attr, replace_attr,
    replace_attributed_loop, restrict_param, tile_params, EXTERN_C,
};
use super::cuda_subset::RESTRICT_MODIFIER;
use super::tile::{build_tile_prefix, sequential_params};
use crate::frontend::KERNEL_ATTR_NAME;
use crate::params::{LoopType, ParsedParams};
use crate::session::SessionStage;
use okl_core::syntax::{AttrNode, NodeId, NodeKind, NodeRef};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder};
use okl_core::{Error, ErrorCode, Result, Span};
use tracing::debug;

/// What a host backend emits in front of parallel regions.
pub trait HostDialect {
    /// Directive placed in front of the outermost `@outer` loop.
    const PARALLEL_FOR: Option<&'static str>;
    /// Directive guarding an `@atomic` expression statement.
    const ATOMIC: Option<&'static str>;
    /// Directive guarding an `@atomic` block.
    const CRITICAL: Option<&'static str>;
}

pub fn handle_kernel(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let (_, func) = as_function(node, KERNEL_ATTR_NAME)?;
    debug!(kernel = %func.name, "handle [@kernel] attribute");
    Ok(replace_attr(attr, node, EXTERN_C))
}

/// Directive for a loop whose first sub-loop is `@outer` and which has no
/// `@outer` loop around it.
fn parallel_prefix<D: HostDialect>(stage: &SessionStage<'_>, id: NodeId, role: LoopType) -> &'static str {
    let outermost = stage
        .sema()
        .is_some_and(|sema| sema.is_outermost(id, LoopType::Outer));
    match D::PARALLEL_FOR {
        Some(pragma) if role == LoopType::Outer && outermost => pragma,
        _ => "",
    }
}

/// `@outer` and `@inner`: the loop header stays, the attributes go.
pub fn handle_loop<D: HostDialect>(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let name = attr.okl_payload().map(|p| p.name).unwrap_or_default();
    let (stmt, _) = as_loop(node, &name)?;
    let info = loop_info(stage, stmt, &name)?;
    let prefix = parallel_prefix::<D>(stage, stmt.id, info.role);
    let mut builder = TranspilationBuilder::new(node).add_replacement(
        SlotName::Attr,
        Span::new(stmt.full_span.lo, stmt.span.lo),
        prefix,
    );
    // GNU attributes between the header and the body
    for trailing in node.attrs().iter().filter(|a| a.removal_span.lo >= stmt.span.lo) {
        builder = builder.add_replacement(SlotName::Attr, trailing.removal_span, "");
    }
    Ok(builder.build())
}

/// `@tile` always strip-mines into two sequential loops.
pub fn handle_tile<D: HostDialect>(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let (stmt, for_stmt) = as_loop(node, "tile")?;
    let params = sequential_params(tile_params(params)?);
    let info = loop_info(stage, stmt, "tile")?;

    let mut opened = 0;
    let body = build_tile_prefix(
        info,
        &params,
        |_| Err(Error::internal("sequential tile has no parallel index")),
        &mut opened,
    )?;
    let prefix = format!("{}{body}", parallel_prefix::<D>(stage, stmt.id, info.role));
    Ok(replace_attributed_loop(
        node,
        stmt,
        for_stmt,
        prefix,
        close_scopes(opened),
    ))
}

pub fn handle_atomic<D: HostDialect>(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let directive = match node.kind() {
        NodeKind::Expr => D::ATOMIC,
        NodeKind::Compound => D::CRITICAL,
        other => {
            return Err(Error::new(
                ErrorCode::AttributeNotApplicable,
                format!("[@atomic] cannot be applied to {other}"),
            )
            .with_span(node.span()))
        }
    };
    Ok(replace_attr(attr, node, directive.unwrap_or_default()))
}

pub fn handle_shared(
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

/// Loop iterations run in order on the host, so the barrier statement goes.
pub fn handle_barrier(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, node.full_span(), "")
        .build())
}
