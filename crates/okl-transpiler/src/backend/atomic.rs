use okl_core::lexer::{lex, TokenKind};
use okl_core::syntax::{NodeKind, NodeRef};
use okl_core::{Error, ErrorCode, Result};

const UPDATE_OPS: [&str; 7] = ["+=", "-=", "*=", "/=", "&=", "|=", "^="];

/// `target op value` read from an `@atomic` expression statement;
/// `x++` reads as `x ++ 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicUpdate {
    pub target: String,
    pub op: String,
    pub value: String,
}

fn not_an_update(node: NodeRef<'_>) -> Error {
    Error::new(
        ErrorCode::AttributeNotApplicable,
        "[@atomic] expects an update such as `x += v;` or `++x;`",
    )
    .with_span(node.span())
}

pub fn atomic_update(source: &str, node: NodeRef<'_>) -> Result<AtomicUpdate> {
    if node.kind() != NodeKind::Expr {
        return Err(not_an_update(node));
    }
    let text = node.span().text(source).trim();
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();
    let tokens = lex(text).map_err(|_| not_an_update(node))?;

    let step = |op: &str, target: &str| AtomicUpdate {
        target: target.trim().to_string(),
        op: op.to_string(),
        value: "1".to_string(),
    };
    if let (Some(first), Some(last)) = (tokens.first(), tokens.last()) {
        for op in ["++", "--"] {
            if first.is_punct(op) && tokens.len() > 1 {
                return Ok(step(op, &text[first.span.hi..]));
            }
            if last.is_punct(op) && tokens.len() > 1 {
                return Ok(step(op, &text[..last.span.lo]));
            }
        }
    }

    let mut depth = 0i32;
    for tok in &tokens {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.lexeme.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            op if depth == 0 && UPDATE_OPS.contains(&op) => {
                let target = text[..tok.span.lo].trim();
                let value = text[tok.span.hi..].trim();
                if target.is_empty() || value.is_empty() {
                    return Err(not_an_update(node));
                }
                return Ok(AtomicUpdate {
                    target: target.to_string(),
                    op: op.to_string(),
                    value: value.to_string(),
                });
            }
            _ => {}
        }
    }
    Err(not_an_update(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::syntax::{parse, StmtKind};
    use pretty_assertions::assert_eq;

    fn update(stmt: &str) -> Result<AtomicUpdate> {
        let source = format!("void f() {{ {stmt} }}");
        let tu = parse(&source).expect("parse");
        let func = tu.decls[0].as_function().expect("function");
        let StmtKind::Compound(block) = &func.body.as_ref().expect("body").kind else {
            panic!("compound");
        };
        atomic_update(&source, NodeRef::Stmt(&block.stmts[0]))
    }

    #[test]
    fn compound_assignments() {
        assert_eq!(
            update("sum[i % 4] += a[i] * (b + 1);").expect("update"),
            AtomicUpdate {
                target: "sum[i % 4]".into(),
                op: "+=".into(),
                value: "a[i] * (b + 1)".into(),
            }
        );
        assert_eq!(update("mask |= bit;").expect("or").op, "|=");
    }

    #[test]
    fn increments() {
        let pre = update("++count;").expect("pre");
        assert_eq!((pre.target.as_str(), pre.op.as_str(), pre.value.as_str()), ("count", "++", "1"));
        let post = update("hist[b]--;").expect("post");
        assert_eq!((post.target.as_str(), post.op.as_str()), ("hist[b]", "--"));
    }

    #[test]
    fn rejects_other_statements() {
        for stmt in ["x = y;", "f(x);", "{ x += 1; }"] {
            let err = update(stmt).expect_err(stmt);
            assert_eq!(err.code, ErrorCode::AttributeNotApplicable);
        }
    }
}
