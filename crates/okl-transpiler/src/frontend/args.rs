//! Argument lists of OKL markers: `(16, @outer(1), check=false)`.

use okl_core::attr::unquote;
use okl_core::lexer::{lex, Token, TokenKind};
use okl_core::{Error, ErrorCode, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Nested marker, e.g. `@outer(1)`; `raw_params` keeps the parentheses.
    Attr { name: String, raw_params: String },
    Bool(bool),
    Int(i64),
    Str(String),
    /// Anything else, kept as written.
    Expr(String),
}

impl ArgValue {
    /// Source form of the value, used where an expression is expected.
    pub fn as_expr_text(&self) -> Option<String> {
        match self {
            ArgValue::Int(value) => Some(value.to_string()),
            ArgValue::Expr(text) => Some(text.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub positional: Vec<ArgValue>,
    pub kwargs: Vec<(String, ArgValue)>,
}

impl ParsedArgs {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.kwargs.is_empty()
    }

    pub fn kwarg(&self, name: &str) -> Option<&ArgValue> {
        self.kwargs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

pub(crate) fn arg_error(attr: &str, message: impl AsRef<str>) -> Error {
    Error::new(
        ErrorCode::AttributeArguments,
        format!("[@{attr}] {}", message.as_ref()),
    )
}

/// Parse the parameter text of marker `attr`. Empty text and `()` both
/// yield no arguments.
pub fn parse_args(attr: &str, raw_params: &str) -> Result<ParsedArgs> {
    let trimmed = raw_params.trim();
    if trimmed.is_empty() {
        return Ok(ParsedArgs::default());
    }
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| arg_error(attr, format!("malformed argument list `{trimmed}`")))?;
    let tokens = lex(inner).map_err(|err| arg_error(attr, err.to_string()))?;
    if tokens.is_empty() {
        return Ok(ParsedArgs::default());
    }

    let mut args = ParsedArgs::default();
    for piece in split_top_level(attr, &tokens)? {
        if piece.is_empty() {
            return Err(arg_error(attr, "empty argument"));
        }
        let lo = piece[0].span.lo;
        let hi = piece[piece.len() - 1].span.hi;

        let is_kwarg = piece.len() >= 2 && piece[0].kind == TokenKind::Ident && piece[1].is_punct("=");
        if is_kwarg {
            if piece.len() == 2 {
                return Err(arg_error(attr, format!("kwarg `{}` has no value", piece[0].lexeme)));
            }
            let value_lo = piece[2].span.lo;
            let value = parse_value(attr, &piece[2..], &inner[value_lo..hi])?;
            if args.kwarg(&piece[0].lexeme).is_some() {
                return Err(arg_error(attr, format!("duplicate kwarg `{}`", piece[0].lexeme)));
            }
            args.kwargs.push((piece[0].lexeme.clone(), value));
            continue;
        }
        if !args.kwargs.is_empty() {
            return Err(arg_error(attr, "positional argument follows a kwarg"));
        }
        args.positional.push(parse_value(attr, piece, &inner[lo..hi])?);
    }
    Ok(args)
}

fn split_top_level<'t>(attr: &str, tokens: &'t [Token]) -> Result<Vec<&'t [Token]>> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.lexeme.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| arg_error(attr, "unbalanced brackets"))?;
            }
            "," if depth == 0 => {
                pieces.push(&tokens[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(arg_error(attr, "unbalanced brackets"));
    }
    pieces.push(&tokens[start..]);
    Ok(pieces)
}

fn parse_value(attr: &str, tokens: &[Token], text: &str) -> Result<ArgValue> {
    let first = &tokens[0];
    if first.kind == TokenKind::At {
        let name = tokens
            .get(1)
            .filter(|tok| tok.kind == TokenKind::Ident)
            .ok_or_else(|| arg_error(attr, "expected an attribute name after `@`"))?;
        let rest = text[name.span.hi - first.span.lo..].trim();
        if !rest.is_empty() && !(rest.starts_with('(') && rest.ends_with(')')) {
            return Err(arg_error(attr, format!("malformed nested attribute `{text}`")));
        }
        return Ok(ArgValue::Attr {
            name: name.lexeme.clone(),
            raw_params: rest.to_string(),
        });
    }
    if tokens.len() == 1 {
        match first.kind {
            TokenKind::Ident if first.lexeme == "true" => return Ok(ArgValue::Bool(true)),
            TokenKind::Ident if first.lexeme == "false" => return Ok(ArgValue::Bool(false)),
            TokenKind::Number => {
                if let Ok(value) = first.lexeme.parse::<i64>() {
                    return Ok(ArgValue::Int(value));
                }
            }
            TokenKind::StringLiteral => {
                if let Some(value) = unquote(&first.lexeme) {
                    return Ok(ArgValue::Str(value));
                }
            }
            _ => {}
        }
    }
    Ok(ArgValue::Expr(text.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_lists() {
        assert!(parse_args("kernel", "").expect("empty").is_empty());
        assert!(parse_args("kernel", "()").expect("parens").is_empty());
    }

    #[test]
    fn mixed_positional_and_kwargs() {
        let args = parse_args("tile", "(BLOCK * 2, @outer(1), @inner, check=false)").expect("args");
        assert_eq!(
            args.positional,
            vec![
                ArgValue::Expr("BLOCK * 2".into()),
                ArgValue::Attr {
                    name: "outer".into(),
                    raw_params: "(1)".into()
                },
                ArgValue::Attr {
                    name: "inner".into(),
                    raw_params: String::new()
                },
            ]
        );
        assert_eq!(args.kwarg("check"), Some(&ArgValue::Bool(false)));
    }

    #[test]
    fn literals() {
        let args = parse_args("barrier", "(\"global\", 3, f(a, b))").expect("args");
        assert_eq!(
            args.positional,
            vec![
                ArgValue::Str("global".into()),
                ArgValue::Int(3),
                ArgValue::Expr("f(a, b)".into()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_lists() {
        for raw in ["(1,,2)", "(a=1, 2)", "((1)", "16", "(check=)"] {
            let err = parse_args("tile", raw).expect_err(raw);
            assert_eq!(err.code, ErrorCode::AttributeArguments, "{raw}");
        }
    }
}
