use super::args::{arg_error, parse_args, ArgValue};
use super::{parse_loop, INNER_ATTR_NAME, OUTER_ATTR_NAME, TILE_ATTR_NAME};
use crate::params::{AttributedLoop, LoopType, ParsedParams, TileParams};
use okl_core::attr::OklPayload;
use okl_core::Result;

/// `@tile(size, [@outer|@inner], [@outer|@inner], check=true|false)`
pub fn parse_tile(payload: &OklPayload) -> Result<ParsedParams> {
    let args = parse_args(TILE_ATTR_NAME, &payload.raw_params)?;
    let err = |message: &str| arg_error(TILE_ATTR_NAME, message);

    let (size, loops) = match args.positional.split_first() {
        None => return Err(err("expects at least one argument")),
        Some(_) if args.positional.len() > 3 => return Err(err("takes 1-3 arguments")),
        Some(split) => split,
    };
    let tile_size = size
        .as_expr_text()
        .filter(|text| !text.is_empty())
        .ok_or_else(|| err("expects a non-empty first argument"))?;

    let mut params = TileParams::new(tile_size);
    let mut bindings = loops.iter().map(sub_loop);
    if let Some(first) = bindings.next() {
        params.first_loop = first?;
    }
    if let Some(second) = bindings.next() {
        params.second_loop = second?;
    }

    for (key, value) in &args.kwargs {
        if key != "check" {
            return Err(err("does not take this kwarg"));
        }
        match value {
            ArgValue::Bool(check) => params.check = *check,
            _ => return Err(err("'check' argument must be true or false")),
        }
    }
    Ok(ParsedParams::Tile(params))
}

fn sub_loop(value: &ArgValue) -> Result<AttributedLoop> {
    let ArgValue::Attr { name, raw_params } = value else {
        return Err(arg_error(
            TILE_ATTR_NAME,
            "can only take attributes for the 2nd and 3rd arguments",
        ));
    };
    let loop_type = match name.as_str() {
        OUTER_ATTR_NAME => LoopType::Outer,
        INNER_ATTR_NAME => LoopType::Inner,
        _ => {
            return Err(arg_error(
                TILE_ATTR_NAME,
                "can only take attributes for the 2nd and 3rd arguments",
            ))
        }
    };
    let nested = OklPayload {
        name: name.clone(),
        raw_params: raw_params.clone(),
    };
    parse_loop(&nested, loop_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Axis;
    use okl_core::ErrorCode;
    use pretty_assertions::assert_eq;

    fn tile(raw: &str) -> Result<TileParams> {
        let payload = OklPayload {
            name: TILE_ATTR_NAME.into(),
            raw_params: raw.into(),
        };
        parse_tile(&payload).map(|params| match params {
            ParsedParams::Tile(tile) => tile,
            other => panic!("unexpected params {other:?}"),
        })
    }

    #[test]
    fn size_only_defaults_to_regular_loops_with_check() {
        let params = tile("(16)").expect("tile");
        assert_eq!(params.tile_size, "16");
        assert_eq!(params.first_loop, AttributedLoop::regular());
        assert_eq!(params.second_loop, AttributedLoop::regular());
        assert!(params.check);
    }

    #[test]
    fn sub_loop_attributes_and_check() {
        let params = tile("(BS * 2, @outer(1), @inner, check=false)").expect("tile");
        assert_eq!(params.tile_size, "BS * 2");
        assert_eq!(params.first_loop, AttributedLoop::outer(Axis::Y));
        assert_eq!(params.second_loop, AttributedLoop::inner(Axis::Auto));
        assert!(!params.check);
    }

    #[test]
    fn error_messages() {
        let cases = [
            ("", "[@tile] expects at least one argument"),
            ("(16, @outer, @inner, @inner)", "[@tile] takes 1-3 arguments"),
            ("(\"16\")", "[@tile] expects a non-empty first argument"),
            ("(16, 4)", "[@tile] can only take attributes for the 2nd and 3rd arguments"),
            ("(16, @shared)", "[@tile] can only take attributes for the 2nd and 3rd arguments"),
            ("(16, safe=true)", "[@tile] does not take this kwarg"),
            ("(16, check=1)", "[@tile] 'check' argument must be true or false"),
            ("(16, @outer(5))", "[@outer] axis index must be 0, 1 or 2, got 5"),
        ];
        for (raw, message) in cases {
            let err = tile(raw).expect_err(raw);
            assert_eq!(err.code, ErrorCode::AttributeArguments);
            assert_eq!(err.message, message, "{raw}");
        }
    }
}
