//! Backend-independent attribute parsing: which node kinds each attribute
//! may decorate and how its argument list is validated.

mod args;
mod tile;

pub use args::{parse_args, ArgValue, ParsedArgs};
pub use tile::parse_tile;

use crate::params::{AttributedLoop, Axis, BarrierScope, LoopType, ParsedParams};
use crate::registry::AttributeRegistry;
use args::arg_error;
use okl_core::attr::OklPayload;
use okl_core::syntax::NodeKind;
use okl_core::Result;

pub const KERNEL_ATTR_NAME: &str = "kernel";
pub const OUTER_ATTR_NAME: &str = "outer";
pub const INNER_ATTR_NAME: &str = "inner";
pub const TILE_ATTR_NAME: &str = "tile";
pub const SHARED_ATTR_NAME: &str = "shared";
pub const EXCLUSIVE_ATTR_NAME: &str = "exclusive";
pub const RESTRICT_ATTR_NAME: &str = "restrict";
pub const ATOMIC_ATTR_NAME: &str = "atomic";
pub const BARRIER_ATTR_NAME: &str = "barrier";
pub const NOBARRIER_ATTR_NAME: &str = "nobarrier";

/// Attributes that turn a `for` statement into a parallel or tiled loop.
pub const LOOP_ATTR_NAMES: [&str; 3] = [OUTER_ATTR_NAME, INNER_ATTR_NAME, TILE_ATTR_NAME];

pub fn register(registry: &mut AttributeRegistry) {
    registry.register_frontend(KERNEL_ATTR_NAME, &[NodeKind::Function], parse_no_args);
    registry.register_frontend(OUTER_ATTR_NAME, &[NodeKind::For], parse_outer);
    registry.register_frontend(INNER_ATTR_NAME, &[NodeKind::For], parse_inner);
    registry.register_frontend(TILE_ATTR_NAME, &[NodeKind::For], parse_tile);
    registry.register_frontend(SHARED_ATTR_NAME, &[NodeKind::Var], parse_no_args);
    registry.register_frontend(EXCLUSIVE_ATTR_NAME, &[NodeKind::Var], parse_no_args);
    registry.register_frontend(RESTRICT_ATTR_NAME, &[NodeKind::Param], parse_no_args);
    registry.register_frontend(
        ATOMIC_ATTR_NAME,
        &[NodeKind::Expr, NodeKind::Compound],
        parse_no_args,
    );
    registry.register_frontend(BARRIER_ATTR_NAME, &[NodeKind::Null], parse_barrier);
    registry.register_frontend(NOBARRIER_ATTR_NAME, &[NodeKind::For], parse_no_args);
}

fn parse_no_args(payload: &OklPayload) -> Result<ParsedParams> {
    let args = parse_args(&payload.name, &payload.raw_params)?;
    if !args.is_empty() {
        return Err(arg_error(&payload.name, "does not take arguments"));
    }
    Ok(ParsedParams::Empty)
}

fn parse_outer(payload: &OklPayload) -> Result<ParsedParams> {
    parse_loop(payload, LoopType::Outer).map(ParsedParams::Loop)
}

fn parse_inner(payload: &OklPayload) -> Result<ParsedParams> {
    parse_loop(payload, LoopType::Inner).map(ParsedParams::Loop)
}

/// `@outer`, `@inner`, `@outer(1)`: an optional axis index in `0..=2`.
pub fn parse_loop(payload: &OklPayload, loop_type: LoopType) -> Result<AttributedLoop> {
    let name = payload.name.as_str();
    let args = parse_args(name, &payload.raw_params)?;
    if !args.kwargs.is_empty() {
        return Err(arg_error(name, "does not take kwargs"));
    }
    let axis = match args.positional.as_slice() {
        [] => Axis::Auto,
        [ArgValue::Int(index)] => Axis::from_index(*index)
            .ok_or_else(|| arg_error(name, format!("axis index must be 0, 1 or 2, got {index}")))?,
        [_] => return Err(arg_error(name, "axis must be an integer literal")),
        _ => return Err(arg_error(name, "takes at most one argument")),
    };
    Ok(AttributedLoop { loop_type, axis })
}

fn parse_barrier(payload: &OklPayload) -> Result<ParsedParams> {
    let name = payload.name.as_str();
    let args = parse_args(name, &payload.raw_params)?;
    if !args.kwargs.is_empty() {
        return Err(arg_error(name, "does not take kwargs"));
    }
    let scope = match args.positional.as_slice() {
        [] => BarrierScope::Local,
        [ArgValue::Str(scope)] if scope == "local" => BarrierScope::Local,
        [ArgValue::Str(scope)] if scope == "global" => BarrierScope::Global,
        [_] => return Err(arg_error(name, "argument must be \"local\" or \"global\"")),
        _ => return Err(arg_error(name, "takes at most one argument")),
    };
    Ok(ParsedParams::Barrier(scope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::ErrorCode;
    use pretty_assertions::assert_eq;

    fn payload(name: &str, raw: &str) -> OklPayload {
        OklPayload {
            name: name.into(),
            raw_params: raw.into(),
        }
    }

    #[test]
    fn loop_axes() {
        assert_eq!(
            parse_outer(&payload("outer", "")).expect("auto"),
            ParsedParams::Loop(AttributedLoop::outer(Axis::Auto))
        );
        assert_eq!(
            parse_inner(&payload("inner", "(2)")).expect("z"),
            ParsedParams::Loop(AttributedLoop::inner(Axis::Z))
        );
        for raw in ["(3)", "(-1)", "(n)", "(0, 1)", "(axis=0)"] {
            let err = parse_outer(&payload("outer", raw)).expect_err(raw);
            assert_eq!(err.code, ErrorCode::AttributeArguments, "{raw}");
            assert!(err.message.starts_with("[@outer]"), "{}", err.message);
        }
    }

    #[test]
    fn barrier_scopes() {
        assert_eq!(
            parse_barrier(&payload("barrier", "")).expect("default"),
            ParsedParams::Barrier(BarrierScope::Local)
        );
        assert_eq!(
            parse_barrier(&payload("barrier", "(\"global\")")).expect("global"),
            ParsedParams::Barrier(BarrierScope::Global)
        );
        assert!(parse_barrier(&payload("barrier", "(\"shared\")")).is_err());
    }

    #[test]
    fn argument_free_attributes_reject_arguments() {
        assert_eq!(
            parse_no_args(&payload("kernel", "()")).expect("empty parens"),
            ParsedParams::Empty
        );
        let err = parse_no_args(&payload("shared", "(1)")).expect_err("args");
        assert_eq!(err.message, "[@shared] does not take arguments");
    }

    #[test]
    fn registers_every_attribute() {
        let mut registry = AttributeRegistry::new();
        register(&mut registry);
        assert_eq!(registry.attribute_names().len(), 10);
        let tile = registry.frontend(TILE_ATTR_NAME).expect("tile");
        assert!(tile.applies_to(NodeKind::For));
        assert!(!tile.applies_to(NodeKind::Var));
    }
}
