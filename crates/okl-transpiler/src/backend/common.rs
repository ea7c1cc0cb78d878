//! Replacement helpers shared by every backend.

use crate::frontend::LOOP_ATTR_NAMES;
use crate::params::{ParsedParams, TileParams};
use crate::sema::LoopInfo;
use crate::session::SessionStage;
use okl_core::syntax::{AttrNode, Decl, ForStmt, FunctionDecl, NodeRef, Param, Stmt, VarDecl};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder};
use okl_core::{Error, ErrorCode, Result, Span};

pub const EXTERN_C: &str = "extern \"C\"";

pub fn remove_attr(attr: &AttrNode, node: NodeRef<'_>) -> Transpilation {
    replace_attr(attr, node, "")
}

/// An attribute inherited from a type alias has an empty span at the start
/// of the declaration; its replacement then needs its own separator.
pub fn replace_attr(attr: &AttrNode, node: NodeRef<'_>, text: impl Into<String>) -> Transpilation {
    let mut text = text.into();
    if attr.removal_span.is_empty() && !text.is_empty() {
        text.push(' ');
    }
    TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, attr.removal_span, text)
        .build()
}

/// Replace everything from the loop's first attribute up to its body with
/// `prefix`, and close the opened scopes right after the body.
pub fn replace_attributed_loop(
    node: NodeRef<'_>,
    stmt: &Stmt,
    for_stmt: &ForStmt,
    prefix: String,
    suffix: String,
) -> Transpilation {
    let body = &for_stmt.body;
    TranspilationBuilder::new(node)
        .add_replacement(
            SlotName::Attr,
            Span::new(stmt.full_span.lo, body.full_span.lo),
            prefix,
        )
        .add_insertion(SlotName::Epilogue, body.full_span.hi, suffix)
        .build()
}

pub fn close_scopes(opened: usize) -> String {
    "}".repeat(opened)
}

pub fn as_loop<'a>(node: NodeRef<'a>, attr: &str) -> Result<(&'a Stmt, &'a ForStmt)> {
    node.as_stmt()
        .and_then(|stmt| stmt.as_for().map(|for_stmt| (stmt, for_stmt)))
        .ok_or_else(|| Error::internal(format!("[@{attr}] handler called on {}", node.kind())))
}

pub fn as_function<'a>(node: NodeRef<'a>, attr: &str) -> Result<(&'a Decl, &'a FunctionDecl)> {
    node.as_decl()
        .and_then(|decl| decl.as_function().map(|func| (decl, func)))
        .ok_or_else(|| Error::internal(format!("[@{attr}] handler called on {}", node.kind())))
}

pub fn as_var<'a>(node: NodeRef<'a>, attr: &str) -> Result<(&'a Decl, &'a VarDecl)> {
    node.as_decl()
        .and_then(|decl| decl.as_var().map(|var| (decl, var)))
        .ok_or_else(|| Error::internal(format!("[@{attr}] handler called on {}", node.kind())))
}

pub fn as_param<'a>(node: NodeRef<'a>, attr: &str) -> Result<&'a Param> {
    node.as_param()
        .ok_or_else(|| Error::internal(format!("[@{attr}] handler called on {}", node.kind())))
}

/// Loop metadata recorded on entry; its absence aborts the stage.
pub fn loop_info<'s>(stage: &'s SessionStage<'_>, stmt: &Stmt, attr: &str) -> Result<&'s LoopInfo> {
    stage
        .sema()
        .and_then(|sema| sema.loop_info(stmt.id))
        .ok_or_else(|| {
            Error::new(
                ErrorCode::MissingLoopInfo,
                format!("[@{attr}] failed to fetch loop metadata from sema"),
            )
            .with_span(stmt.span)
        })
}

pub fn tile_params<'p>(params: &'p ParsedParams) -> Result<&'p TileParams> {
    params
        .as_tile()
        .ok_or_else(|| Error::new(ErrorCode::NullParams, "[@tile] params missing"))
}

/// `__restrict__` spliced in front of the parameter name.
pub fn restrict_param(
    attr: &AttrNode,
    node: NodeRef<'_>,
    modifier: &str,
) -> Result<Transpilation> {
    let param = as_param(node, "restrict")?;
    let name_span = param.name_span.ok_or_else(|| {
        Error::new(
            ErrorCode::AttributeNotApplicable,
            "[@restrict] requires a named parameter",
        )
        .with_span(param.span)
    })?;
    Ok(TranspilationBuilder::new(node)
        .add_replacement(SlotName::Attr, attr.removal_span, "")
        .add_insertion(SlotName::Arg, name_span.lo, format!(" {modifier} "))
        .build())
}

/// `qualifier ` inserted before the declaration's first specifier.
pub fn qualify_decl(node: NodeRef<'_>, decl: &Decl, qualifier: &str) -> Transpilation {
    TranspilationBuilder::new(node)
        .add_insertion(SlotName::Attr, decl.span.lo, format!("{qualifier} "))
        .build()
}

/// Global function definitions and declarations not carrying OKL attributes.
pub fn is_plain_global_function(node: NodeRef<'_>) -> bool {
    node.as_decl()
        .is_some_and(|decl| decl.is_global && decl.as_function().is_some() && !node.has_okl_attrs())
}

/// Namespace-scope variables whose object is `const` but not `constexpr`.
pub fn is_global_constant(node: NodeRef<'_>) -> bool {
    node.as_decl().is_some_and(|decl| {
        decl.is_global
            && decl
                .as_var()
                .is_some_and(|var| var.is_top_level_const() && !var.is_constexpr)
    })
}

/// `float tile[16][4]` → `float[16][4]`
pub fn array_type(var: &VarDecl) -> Option<(String, String)> {
    let declarator = var.declarators.first()?;
    let dims: String = declarator
        .array_dims
        .iter()
        .map(|dim| format!("[{dim}]"))
        .collect();
    let stars = "*".repeat(declarator.pointer_depth);
    Some((
        declarator.name.clone(),
        format!("{}{stars}{dims}", var.type_text),
    ))
}

/// `@nobarrier` only suppresses the barrier planned after the loop; when
/// the loop carries another loop attribute its rewrite covers this one.
pub fn handle_nobarrier(
    attr: &AttrNode,
    node: NodeRef<'_>,
    _params: &ParsedParams,
    _stage: &mut SessionStage<'_>,
) -> Result<Transpilation> {
    let has_loop_attr = node.attrs().iter().any(|other| {
        other
            .okl_payload()
            .is_some_and(|p| LOOP_ATTR_NAMES.contains(&p.name.as_str()))
    });
    if has_loop_attr {
        return Ok(TranspilationBuilder::new(node).build());
    }
    Ok(replace_attr(attr, node, ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::syntax::parse;

    #[test]
    fn scope_closers() {
        assert_eq!(close_scopes(0), "");
        assert_eq!(close_scopes(3), "}}}");
    }

    #[test]
    fn array_types() {
        let tu = parse("float tile[16][N];").expect("parse");
        let var = tu.decls[0].as_var().expect("var");
        assert_eq!(
            array_type(var),
            Some(("tile".to_string(), "float[16][N]".to_string()))
        );
    }

    #[test]
    fn global_constants() {
        let tu = parse("const int a = 1; constexpr int b = 2; int c; const float *d;").expect("parse");
        let flags: Vec<bool> = tu
            .decls
            .iter()
            .map(|decl| is_global_constant(NodeRef::Decl(decl)))
            .collect();
        assert_eq!(flags, vec![true, false, false, false]);
    }
}
