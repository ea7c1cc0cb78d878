use crate::params::{AttributedLoop, Axis, LoopType};
use okl_core::lexer::{lex, Token, TokenKind};
use okl_core::syntax::{join_tokens, ForStmt, NodeId};
use okl_core::{Error, ErrorCode, Result, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopVar {
    pub name: String,
    pub type_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_punct(punct: &str) -> Option<CmpOp> {
        match punct {
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// The operator that keeps the comparison true with operands swapped.
    pub fn flipped(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopRange {
    pub start: String,
    pub end: String,
    pub cmp: CmpOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncOp {
    PreInc,
    PostInc,
    PreDec,
    PostDec,
    AddAssign,
    SubAssign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopIncrement {
    pub op: IncOp,
    /// Right-hand side of a compound assignment; empty for `++`/`--`.
    pub value: String,
}

impl LoopIncrement {
    pub fn is_unary(&self) -> bool {
        !matches!(self.op, IncOp::AddAssign | IncOp::SubAssign)
    }

    pub fn is_inc(&self) -> bool {
        matches!(self.op, IncOp::PreInc | IncOp::PostInc | IncOp::AddAssign)
    }

    /// The increment re-spelled for variable `var`.
    pub fn render(&self, var: &str) -> String {
        match self.op {
            IncOp::PreInc => format!("++{var}"),
            IncOp::PostInc => format!("{var}++"),
            IncOp::PreDec => format!("--{var}"),
            IncOp::PostDec => format!("{var}--"),
            IncOp::AddAssign => format!("{var} += {}", self.value),
            IncOp::SubAssign => format!("{var} -= {}", self.value),
        }
    }
}

/// What the three clauses of a `for` header say about its variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader {
    pub var: LoopVar,
    pub range: LoopRange,
    pub inc: LoopIncrement,
}

/// Metadata of one attributed loop, fixed once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    pub node_id: NodeId,
    /// Nearest enclosing attributed loop.
    pub parent: Option<NodeId>,
    pub var: LoopVar,
    pub range: LoopRange,
    pub inc: LoopIncrement,
    /// Sub-loop bindings with every axis resolved: one entry for
    /// `@outer`/`@inner`, two for `@tile`.
    pub loops: Vec<AttributedLoop>,
    pub role: LoopType,
    pub sync_required: bool,
}

impl LoopInfo {
    pub fn is_unary(&self) -> bool {
        self.inc.is_unary()
    }

    pub fn is_inc(&self) -> bool {
        self.inc.is_inc()
    }

    pub fn should_sync(&self) -> bool {
        self.sync_required
    }

    pub fn axes(&self) -> Vec<Axis> {
        self.loops.iter().map(|l| l.axis).collect()
    }

    pub fn has_type(&self, loop_type: LoopType) -> bool {
        self.loops.iter().any(|l| l.loop_type == loop_type)
    }
}

/// Outer if any sub-loop is outer, else inner if any is inner.
pub fn role_of(loops: &[AttributedLoop]) -> LoopType {
    if loops.iter().any(|l| l.loop_type == LoopType::Outer) {
        LoopType::Outer
    } else if loops.iter().any(|l| l.loop_type == LoopType::Inner) {
        LoopType::Inner
    } else {
        LoopType::Regular
    }
}

fn invalid(span: Span, message: impl Into<String>) -> Error {
    Error::new(ErrorCode::InvalidLoop, message).with_span(span)
}

fn clause_tokens(source: &str, span: Span) -> Result<Vec<Token>> {
    let tokens = lex(span.text(source)).map_err(|err| invalid(span, err.to_string()))?;
    Ok(tokens
        .into_iter()
        .map(|tok| Token {
            span: Span::new(tok.span.lo + span.lo, tok.span.hi + span.lo),
            ..tok
        })
        .collect())
}

/// Index of the first token at bracket depth zero satisfying `pred`.
fn find_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, tok) in tokens.iter().enumerate() {
        if tok.kind == TokenKind::Punct {
            match tok.lexeme.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                _ => {}
            }
        }
        if depth == 0 && pred(tok) {
            return Some(idx);
        }
    }
    None
}

fn text_between(source: &str, lo: usize, hi: usize) -> String {
    source.get(lo..hi).unwrap_or_default().trim().to_string()
}

pub fn parse_loop_header(source: &str, for_stmt: &ForStmt) -> Result<LoopHeader> {
    let var_span = for_stmt.init;
    let init = clause_tokens(source, for_stmt.init)?;
    let eq = find_top_level(&init, |tok| tok.is_punct("="))
        .ok_or_else(|| invalid(var_span, "loop init must declare and initialize the loop variable"))?;
    if eq < 2 || init[eq - 1].kind != TokenKind::Ident {
        return Err(invalid(
            var_span,
            "loop init must have the form `type name = start`",
        ));
    }
    let var = LoopVar {
        name: init[eq - 1].lexeme.clone(),
        type_text: join_tokens(init[..eq - 1].iter()),
    };
    let start = text_between(source, init[eq].span.hi, for_stmt.init.hi);
    if start.is_empty() {
        return Err(invalid(var_span, "loop variable has no start value"));
    }

    let cond_span = for_stmt.cond;
    let cond = clause_tokens(source, cond_span)?;
    let op_idx = find_top_level(&cond, |tok| {
        tok.kind == TokenKind::Punct && CmpOp::from_punct(&tok.lexeme).is_some()
    })
    .ok_or_else(|| {
        invalid(
            cond_span,
            "loop condition must compare the loop variable with <, <=, > or >=",
        )
    })?;
    let op = CmpOp::from_punct(&cond[op_idx].lexeme)
        .ok_or_else(|| Error::internal("comparison operator vanished"))?;
    let lhs = text_between(source, cond_span.lo, cond[op_idx].span.lo);
    let rhs = text_between(source, cond[op_idx].span.hi, cond_span.hi);
    let range = if lhs == var.name {
        LoopRange {
            start,
            end: rhs,
            cmp: op,
        }
    } else if rhs == var.name {
        LoopRange {
            start,
            end: lhs,
            cmp: op.flipped(),
        }
    } else {
        return Err(invalid(
            cond_span,
            format!("loop condition does not compare `{}`", var.name),
        ));
    };

    let inc_span = for_stmt.inc;
    let inc_tokens = clause_tokens(source, inc_span)?;
    let inc = parse_increment(source, inc_span, &inc_tokens, &var.name)?;

    Ok(LoopHeader { var, range, inc })
}

fn parse_increment(source: &str, span: Span, tokens: &[Token], var: &str) -> Result<LoopIncrement> {
    let unary = |op| LoopIncrement {
        op,
        value: String::new(),
    };
    match tokens {
        [op, name] if name.is_ident(var) && op.is_punct("++") => Ok(unary(IncOp::PreInc)),
        [op, name] if name.is_ident(var) && op.is_punct("--") => Ok(unary(IncOp::PreDec)),
        [name, op] if name.is_ident(var) && op.is_punct("++") => Ok(unary(IncOp::PostInc)),
        [name, op] if name.is_ident(var) && op.is_punct("--") => Ok(unary(IncOp::PostDec)),
        [name, op, rest @ ..]
            if name.is_ident(var)
                && !rest.is_empty()
                && (op.is_punct("+=") || op.is_punct("-=")) =>
        {
            let op_kind = if op.is_punct("+=") {
                IncOp::AddAssign
            } else {
                IncOp::SubAssign
            };
            Ok(LoopIncrement {
                op: op_kind,
                value: text_between(source, op.span.hi, span.hi),
            })
        }
        _ => Err(invalid(
            span,
            format!("unsupported increment of `{var}`: expected ++, --, += or -="),
        )),
    }
}
