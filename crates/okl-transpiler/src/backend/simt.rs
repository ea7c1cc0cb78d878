//! Loop handlers shared by the block/thread style backends. A loop bound
//! to an axis loses its `for` header and becomes a scope declaring the loop
//! variable from the backend's group or local index.

use super::common::{as_loop, close_scopes, loop_info, replace_attributed_loop, tile_params};
use super::tile::{build_tile_prefix, resolved_params};
use crate::params::{AttributedLoop, BarrierScope, LoopType, ParsedParams};
use crate::sema::LoopInfo;
use crate::session::SessionStage;
use okl_core::syntax::{AttrNode, NodeRef};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder};
use okl_core::{Error, ErrorCode, Result};
use tracing::debug;

/// Backend spelling of indices and barriers.
pub trait SimtDialect {
    /// Index of the work-group along `axis` (0 = x).
    fn group_index(axis: usize) -> String;
    /// Index of the work-item inside its group along `axis`.
    fn local_index(axis: usize) -> String;
    /// Statement synchronizing the work-items of one group.
    fn barrier(scope: BarrierScope) -> String;
}

pub fn index_of<D: SimtDialect>(attributed: &AttributedLoop) -> Result<String> {
    let axis = attributed.axis.index().ok_or_else(|| {
        Error::new(
            ErrorCode::UnresolvedAxis,
            format!("[@{}] loop axis was not resolved", attributed.loop_type),
        )
    })?;
    match attributed.loop_type {
        LoopType::Outer => Ok(D::group_index(axis)),
        LoopType::Inner => Ok(D::local_index(axis)),
        LoopType::Regular => Err(Error::internal("regular loop has no parallel index")),
    }
}

/// `{T i = (start) + idx;` or, for compound increments,
/// `{T i = (start) + ((inc) * idx);`
pub fn build_axis_line(info: &LoopInfo, idx: &str, opened: &mut usize) -> String {
    let sign = if info.is_inc() { "+" } else { "-" };
    let line = if info.is_unary() {
        format!(
            "{} {} = ({}) {} {};",
            info.var.type_text, info.var.name, info.range.start, sign, idx
        )
    } else {
        format!(
            "{} {} = ({}) {} (({}) * {});",
            info.var.type_text, info.var.name, info.range.start, sign, info.inc.value, idx
        )
    };
    *opened += 1;
    format!("{{{line}")
}

fn loop_suffix<D: SimtDialect>(info: &LoopInfo, opened: usize) -> String {
    let mut suffix = close_scopes(opened);
    if info.should_sync() {
        suffix += &D::barrier(BarrierScope::Local);
        suffix.push('\n');
    }
    suffix
}

/// `@outer` and `@inner`.
pub fn handle_loop<D: SimtDialect>(
    attr: &AttrNode,
    node: NodeRef<'_>,
    params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let name = attr.okl_payload().map(|p| p.name).unwrap_or_default();
    debug!("handle [@{name}] attribute");
    let (stmt, for_stmt) = as_loop(node, &name)?;
    params
        .as_loop()
        .ok_or_else(|| Error::new(ErrorCode::NullParams, format!("[@{name}] params missing")))?;
    let info = loop_info(stage, stmt, &name)?;
    let attributed = info
        .loops
        .first()
        .ok_or_else(|| Error::internal(format!("[@{name}] loop has no binding")))?;

    let mut opened = 0;
    let prefix = build_axis_line(info, &index_of::<D>(attributed)?, &mut opened);
    let suffix = loop_suffix::<D>(info, opened);
    Ok(replace_attributed_loop(node, stmt, for_stmt, prefix, suffix))
}

pub fn handle_tile<D: SimtDialect>(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    params: &ParsedParams,
    stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    debug!("handle [@tile] attribute");
    let (stmt, for_stmt) = as_loop(node, "tile")?;
    let params = tile_params(params)?;
    let info = loop_info(stage, stmt, "tile")?;
    let params = resolved_params(info, params);

    let mut opened = 0;
    let prefix = build_tile_prefix(info, &params, index_of::<D>, &mut opened)?;
    let suffix = loop_suffix::<D>(info, opened);
    Ok(replace_attributed_loop(node, stmt, for_stmt, prefix, suffix))
}

/// `@barrier` on an empty statement.
pub fn handle_barrier<D: SimtDialect>(
    _attr: &AttrNode,
    node: NodeRef<'_>,
    params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let scope = match params {
        ParsedParams::Barrier(scope) => *scope,
        _ => return Err(Error::new(ErrorCode::NullParams, "[@barrier] params missing")),
    };
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, node.full_span(), D::barrier(scope))
        .build())
}
