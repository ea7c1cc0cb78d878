//! Strip-mining of a `@tile` loop into a stride loop and a per-tile loop.
//!
//! Each synthesized header opens exactly one scope and bumps the
//! `opened` counter passed through every builder; the caller closes
//! that many scopes after the original body.

use crate::params::{AttributedLoop, LoopOrder, LoopType, TileParams};
use crate::sema::LoopInfo;
use okl_core::Result;

pub fn tiled_var_name(info: &LoopInfo) -> String {
    format!("_occa_tiled_{}", info.var.name)
}

fn sign(info: &LoopInfo) -> &'static str {
    if info.is_inc() {
        "+"
    } else {
        "-"
    }
}

fn assign_update(info: &LoopInfo) -> &'static str {
    if info.is_inc() {
        "+="
    } else {
        "-="
    }
}

/// `{T _occa_tiled_i = (start) + ((tile) * idx);`
fn axis_first(info: &LoopInfo, params: &TileParams, idx: &str, opened: &mut usize) -> String {
    let tiled = tiled_var_name(info);
    let line = if info.is_unary() {
        format!(
            "{} {} = ({}) {} (({}) * {});",
            info.var.type_text,
            tiled,
            info.range.start,
            sign(info),
            params.tile_size,
            idx
        )
    } else {
        format!(
            "{} {} = ({}) {} ((({}) * {}) * {});",
            info.var.type_text,
            tiled,
            info.range.start,
            sign(info),
            params.tile_size,
            info.inc.value,
            idx
        )
    };
    *opened += 1;
    format!("{{{line}")
}

/// `{T i = _occa_tiled_i + idx;`
fn axis_second(info: &LoopInfo, idx: &str, opened: &mut usize) -> String {
    let tiled = tiled_var_name(info);
    let line = if info.is_unary() {
        format!(
            "{} {} = {} {} {};",
            info.var.type_text,
            info.var.name,
            tiled,
            sign(info),
            idx
        )
    } else {
        format!(
            "{} {} = {} {} (({}) * {});",
            info.var.type_text,
            info.var.name,
            tiled,
            sign(info),
            info.inc.value,
            idx
        )
    };
    *opened += 1;
    format!("{{{line}")
}

/// `for(T _occa_tiled_i = start; _occa_tiled_i < end; _occa_tiled_i += (tile)) {`
fn regular_first(info: &LoopInfo, params: &TileParams, opened: &mut usize) -> String {
    let tiled = tiled_var_name(info);
    let header = format!(
        "for({} {} = {}; {} {} {}; {} {} ({}))",
        info.var.type_text,
        tiled,
        info.range.start,
        tiled,
        info.range.cmp.as_str(),
        info.range.end,
        tiled,
        assign_update(info),
        params.tile_size
    );
    *opened += 1;
    format!("{header} {{")
}

/// `for(T i = _occa_tiled_i; i < (_occa_tiled_i + (tile)); ++i) {`
fn regular_second(info: &LoopInfo, params: &TileParams, opened: &mut usize) -> String {
    let tiled = tiled_var_name(info);
    let cmp = if info.is_inc() { "<" } else { ">" };
    let header = format!(
        "for({} {} = {}; {} {} ({} {} ({})); {})",
        info.var.type_text,
        info.var.name,
        tiled,
        info.var.name,
        cmp,
        tiled,
        sign(info),
        params.tile_size,
        info.inc.render(&info.var.name)
    );
    *opened += 1;
    format!("{header} {{")
}

fn loop_line(
    info: &LoopInfo,
    params: &TileParams,
    order: LoopOrder,
    index_of: &impl Fn(&AttributedLoop) -> Result<String>,
    opened: &mut usize,
) -> Result<String> {
    let attributed = params.loop_for(order);
    let line = match (attributed.loop_type, order) {
        (LoopType::Inner | LoopType::Outer, LoopOrder::First) => {
            axis_first(info, params, &index_of(attributed)?, opened)
        }
        (LoopType::Inner | LoopType::Outer, LoopOrder::Second) => {
            axis_second(info, &index_of(attributed)?, opened)
        }
        (LoopType::Regular, LoopOrder::First) => regular_first(info, params, opened),
        (LoopType::Regular, LoopOrder::Second) => regular_second(info, params, opened),
    };
    Ok(line)
}

/// `if (i < end)` when bounds checking is on.
fn check_line(info: &LoopInfo, params: &TileParams) -> String {
    if !params.check {
        return String::new();
    }
    format!(
        "if ({} {} {})",
        info.var.name,
        info.range.cmp.as_str(),
        info.range.end
    )
}

/// Both synthesized headers plus the optional guard. `index_of` spells the
/// index variable of an axis-bound sub-loop for the target backend.
pub fn build_tile_prefix(
    info: &LoopInfo,
    params: &TileParams,
    index_of: impl Fn(&AttributedLoop) -> Result<String>,
    opened: &mut usize,
) -> Result<String> {
    let mut prefix = loop_line(info, params, LoopOrder::First, &index_of, opened)?;
    prefix += &loop_line(info, params, LoopOrder::Second, &index_of, opened)?;
    prefix += &check_line(info, params);
    Ok(prefix)
}

/// Tile parameters with the axes resolved on loop entry.
pub fn resolved_params(info: &LoopInfo, params: &TileParams) -> TileParams {
    let mut resolved = params.clone();
    if let [first, second] = info.loops.as_slice() {
        resolved.first_loop = *first;
        resolved.second_loop = *second;
    }
    resolved
}

/// Same parameters with both sub-loops demoted to sequential loops.
pub fn sequential_params(params: &TileParams) -> TileParams {
    TileParams {
        first_loop: AttributedLoop::regular(),
        second_loop: AttributedLoop::regular(),
        ..params.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Axis;
    use crate::sema::{parse_loop_header, CmpOp};
    use okl_core::syntax::{parse, StmtKind};
    use okl_core::Error;
    use pretty_assertions::assert_eq;

    fn info(header: &str) -> LoopInfo {
        let source = format!("void f() {{ for ({header}) {{}} }}");
        let tu = parse(&source).expect("parse");
        let func = tu.decls[0].as_function().expect("function");
        let StmtKind::Compound(block) = &func.body.as_ref().expect("body").kind else {
            panic!("compound");
        };
        let h = parse_loop_header(&source, block.stmts[0].as_for().expect("for")).expect("header");
        LoopInfo {
            node_id: 0,
            parent: None,
            var: h.var,
            range: h.range,
            inc: h.inc,
            loops: Vec::new(),
            role: LoopType::Regular,
            sync_required: false,
        }
    }

    fn index(attributed: &AttributedLoop) -> Result<String> {
        let axis = attributed
            .axis
            .index()
            .ok_or_else(|| Error::internal("auto axis"))?;
        Ok(match attributed.loop_type {
            LoopType::Outer => format!("blockIdx.{}", ["x", "y", "z"][axis]),
            _ => format!("threadIdx.{}", ["x", "y", "z"][axis]),
        })
    }

    fn prefix(header: &str, params: &TileParams) -> (String, usize) {
        let mut opened = 0;
        let text = build_tile_prefix(&info(header), params, index, &mut opened).expect("prefix");
        (text, opened)
    }

    #[test]
    fn sequential_compound_tile() {
        let mut params = TileParams::new("16");
        params.check = false;
        let (text, opened) = prefix("int i = 0; i < N; i += 2", &params);
        assert_eq!(
            text,
            "for(int _occa_tiled_i = 0; _occa_tiled_i < N; _occa_tiled_i += (16)) {\
             for(int i = _occa_tiled_i; i < (_occa_tiled_i + (16)); i += 2) {"
        );
        assert_eq!(opened, 2);
    }

    #[test]
    fn axis_bound_unary_tile_with_check() {
        let mut params = TileParams::new("BS");
        params.first_loop = AttributedLoop::outer(Axis::X);
        params.second_loop = AttributedLoop::inner(Axis::X);
        let (text, opened) = prefix("int i = a; i <= b; ++i", &params);
        assert_eq!(
            text,
            "{int _occa_tiled_i = (a) + ((BS) * blockIdx.x);\
             {int i = _occa_tiled_i + threadIdx.x;\
             if (i <= b)"
        );
        assert_eq!(opened, 2);
    }

    #[test]
    fn decrementing_compound_axis_tile() {
        let mut params = TileParams::new("8");
        params.first_loop = AttributedLoop::outer(Axis::Y);
        params.second_loop = AttributedLoop::inner(Axis::Z);
        params.check = false;
        let (text, _) = prefix("int i = n; i > 0; i -= s", &params);
        assert_eq!(
            text,
            "{int _occa_tiled_i = (n) - (((8) * s) * blockIdx.y);\
             {int i = _occa_tiled_i - ((s) * threadIdx.z);"
        );
    }

    #[test]
    fn braces_balance_for_every_combination() {
        let roles = [
            AttributedLoop::regular(),
            AttributedLoop::inner(Axis::X),
            AttributedLoop::outer(Axis::Y),
        ];
        let headers = ["int i = 0; i < N; i++", "int i = 0; i < N; i += 4"];
        for header in headers {
            for first in roles {
                for second in roles {
                    for check in [true, false] {
                        let params = TileParams {
                            tile_size: "16".into(),
                            first_loop: first,
                            second_loop: second,
                            check,
                        };
                        let (text, opened) = prefix(header, &params);
                        let body = "{ body(i); }";
                        let full = format!("{text}{body}{}", super::super::common::close_scopes(opened));
                        let opens = full.matches('{').count();
                        let closes = full.matches('}').count();
                        assert_eq!(opens, closes, "{full}");
                        assert_eq!(opened, 2);
                    }
                }
            }
        }
    }

    #[test]
    fn comparison_operator_is_preserved() {
        for (cond, op) in [
            ("i < N", CmpOp::Lt),
            ("i <= N", CmpOp::Le),
            ("i > N", CmpOp::Gt),
            ("i >= N", CmpOp::Ge),
        ] {
            let inc = if matches!(op, CmpOp::Lt | CmpOp::Le) { "++i" } else { "--i" };
            let header = format!("int i = 0; {cond}; {inc}");
            let (text, _) = prefix(&header, &TileParams::new("4"));
            let stride = format!("_occa_tiled_i {} N;", op.as_str());
            let guard = format!("if (i {} N)", op.as_str());
            assert!(text.contains(&stride), "{text}");
            assert!(text.ends_with(&guard), "{text}");
        }
    }
}
