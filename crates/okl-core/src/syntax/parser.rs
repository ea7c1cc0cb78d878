use super::{
    AttrNode, AttrSyntax, CompoundStmt, Decl, DeclKind, Declarator, ForStmt, FunctionDecl,
    NodeId, Param, Stmt, StmtKind, TranslationUnit, TypedefDecl, VarDecl,
};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::{lex, Token, TokenKind};
use crate::span::Span;
use tracing::trace;

/// Words that can start a declaration inside a function body.
const DECL_START_KEYWORDS: &[&str] = &[
    "auto",
    "bool",
    "char",
    "class",
    "const",
    "constexpr",
    "double",
    "enum",
    "extern",
    "float",
    "inline",
    "int",
    "long",
    "register",
    "short",
    "signed",
    "static",
    "struct",
    "thread_local",
    "typename",
    "union",
    "unsigned",
    "void",
    "volatile",
];

/// Words that never name a declared entity.
const NON_NAME_KEYWORDS: &[&str] = &[
    "auto",
    "bool",
    "char",
    "const",
    "constexpr",
    "double",
    "extern",
    "float",
    "inline",
    "int",
    "long",
    "mutable",
    "register",
    "restrict",
    "short",
    "signed",
    "static",
    "thread_local",
    "typename",
    "unsigned",
    "void",
    "volatile",
    "__restrict",
    "__restrict__",
];

const STMT_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "continue", "default", "delete", "do", "else", "false", "for",
    "goto", "if", "new", "nullptr", "return", "sizeof", "switch", "this", "throw", "true", "try",
    "while",
];

const RECORD_KEYWORDS: &[&str] = &["struct", "class", "union", "enum"];

/// Parse C++ source into the syntax subset.
pub fn parse(source: &str) -> Result<TranslationUnit> {
    let tokens = lex(source).map_err(|err| {
        Error::new(ErrorCode::LexerFailure, err.to_string()).with_span(Span::empty_at(err.offset()))
    })?;
    let mut parser = Parser::new(source, tokens)?;
    let tu = parser.translation_unit()?;
    trace!(decls = tu.decls.len(), "parsed translation unit");
    Ok(tu)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    /// Index of the matching bracket for every bracket token.
    pairs: Vec<Option<usize>>,
    pos: usize,
    next_id: NodeId,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Result<Self> {
        let mut pairs = vec![None; tokens.len()];
        let mut stack: Vec<usize> = Vec::new();
        for (idx, tok) in tokens.iter().enumerate() {
            if tok.kind != TokenKind::Punct {
                continue;
            }
            match tok.lexeme.as_str() {
                "(" | "[" | "{" => stack.push(idx),
                close @ (")" | "]" | "}") => {
                    let open = stack.pop().ok_or_else(|| {
                        Error::new(ErrorCode::ParseFailure, format!("unmatched `{close}`"))
                            .with_span(tok.span)
                    })?;
                    let expected = closer_of(&tokens[open].lexeme);
                    if expected != close {
                        return Err(Error::new(
                            ErrorCode::ParseFailure,
                            format!("expected `{expected}`, found `{close}`"),
                        )
                        .with_span(tok.span));
                    }
                    pairs[open] = Some(idx);
                    pairs[idx] = Some(open);
                }
                _ => {}
            }
        }
        if let Some(open) = stack.pop() {
            return Err(Error::new(
                ErrorCode::ParseFailure,
                format!("unclosed `{}`", tokens[open].lexeme),
            )
            .with_span(tokens[open].span));
        }
        Ok(Self {
            source,
            tokens,
            pairs,
            pos: 0,
            next_id: 0,
        })
    }

    // ----- cursor helpers -----

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(punct))
    }

    fn at_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(name))
    }

    fn cur_lo(&self) -> usize {
        self.peek().map_or(self.source.len(), |t| t.span.lo)
    }

    fn prev_hi(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map_or(0, |t| t.span.hi)
    }

    fn bump(&mut self) -> Span {
        let span = self
            .peek()
            .map_or(Span::empty_at(self.source.len()), |t| t.span);
        self.pos += 1;
        span
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let span = self
            .peek()
            .map_or(Span::empty_at(self.source.len()), |t| t.span);
        Error::new(ErrorCode::ParseFailure, message).with_span(span)
    }

    fn expect_punct(&mut self, punct: &str) -> Result<Span> {
        if self.at_punct(punct) {
            Ok(self.bump())
        } else {
            let found = self.peek().map_or("end of input", |t| t.lexeme.as_str());
            Err(self.error(format!("expected `{punct}`, found `{found}`")))
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn matching(&self, idx: usize) -> Result<usize> {
        self.pairs
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| self.error("expected a bracket"))
    }

    /// Step over the bracketed group at the cursor, returning the span of
    /// its closing token.
    fn skip_balanced(&mut self) -> Result<Span> {
        let close = self.matching(self.pos)?;
        self.pos = close + 1;
        Ok(self.tokens[close].span)
    }

    /// Advance to the next depth-0 terminator (not consumed), a closing
    /// bracket of the enclosing group, or the end of input.
    fn skip_to(&mut self, terminators: &[&str]) -> Result<()> {
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Punct {
                let lexeme = tok.lexeme.as_str();
                if terminators.contains(&lexeme) {
                    return Ok(());
                }
                match lexeme {
                    "(" | "[" | "{" => {
                        self.skip_balanced()?;
                        continue;
                    }
                    ")" | "]" | "}" => return Ok(()),
                    _ => {}
                }
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Step over `<...>` template arguments starting at the cursor.
    fn skip_angle(&mut self) -> Result<()> {
        let mut depth = 0i32;
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Punct {
                match tok.lexeme.as_str() {
                    "<" => depth += 1,
                    ">" => depth -= 1,
                    ">>" => depth -= 2,
                    "(" | "[" | "{" => {
                        self.skip_balanced()?;
                        continue;
                    }
                    ";" | ")" | "]" | "}" => {
                        return Err(self.error("unterminated template argument list"))
                    }
                    _ => {}
                }
            }
            self.pos += 1;
            if depth <= 0 {
                return Ok(());
            }
        }
        Err(self.error("unterminated template argument list"))
    }

    fn text(&self, lo: usize, hi: usize) -> String {
        self.source.get(lo..hi).unwrap_or("").to_string()
    }

    // ----- attributes -----

    fn at_cxx_attr(&self) -> bool {
        self.at_punct("[") && self.peek_at(1).is_some_and(|t| t.is_punct("["))
    }

    fn at_gnu_attr(&self) -> bool {
        self.peek()
            .is_some_and(|t| t.is_ident("__attribute__") || t.is_ident("__attribute"))
    }

    fn attr_groups(&mut self, out: &mut Vec<AttrNode>) -> Result<()> {
        loop {
            if self.at_cxx_attr() {
                self.cxx_attr_group(out)?;
            } else if self.at_gnu_attr() {
                self.gnu_attr_group(out)?;
            } else {
                return Ok(());
            }
        }
    }

    fn cxx_attr_group(&mut self, out: &mut Vec<AttrNode>) -> Result<()> {
        let open = self.pos;
        let outer_close = self.matching(open)?;
        let inner_close = self.matching(open + 1)?;
        if inner_close + 1 != outer_close {
            return Err(self.error("malformed `[[...]]` attribute"));
        }
        let group = Span::new(self.tokens[open].span.lo, self.tokens[outer_close].span.hi);
        let mut first = open + 2;
        // [[using ns: a, b]]
        if self.tokens.get(first).is_some_and(|t| t.is_ident("using")) {
            while first < inner_close && !self.tokens[first].is_punct(":") {
                first += 1;
            }
            first += 1;
        }
        self.attr_items(first, inner_close, AttrSyntax::Cxx11, group, out)?;
        self.pos = outer_close + 1;
        Ok(())
    }

    fn gnu_attr_group(&mut self, out: &mut Vec<AttrNode>) -> Result<()> {
        let kw = self.pos;
        let well_formed = self.tokens.get(kw + 1).is_some_and(|t| t.is_punct("("))
            && self.tokens.get(kw + 2).is_some_and(|t| t.is_punct("("));
        if !well_formed {
            return Err(self.error("expected `((` after `__attribute__`"));
        }
        let outer_close = self.matching(kw + 1)?;
        let inner_close = self.matching(kw + 2)?;
        if inner_close + 1 != outer_close {
            return Err(self.error("malformed `__attribute__((...))`"));
        }
        let group = Span::new(self.tokens[kw].span.lo, self.tokens[outer_close].span.hi);
        self.attr_items(kw + 3, inner_close, AttrSyntax::Gnu, group, out)?;
        self.pos = outer_close + 1;
        Ok(())
    }

    fn attr_items(
        &self,
        lo: usize,
        hi: usize,
        syntax: AttrSyntax,
        group: Span,
        out: &mut Vec<AttrNode>,
    ) -> Result<()> {
        let mut items: Vec<(usize, usize)> = Vec::new();
        let mut start = lo;
        let mut idx = lo;
        while idx < hi {
            let tok = &self.tokens[idx];
            if tok.is_punct(",") {
                if start < idx {
                    items.push((start, idx));
                }
                start = idx + 1;
            } else if let Some(close) = self.pairs[idx].filter(|close| *close > idx) {
                idx = close;
            }
            idx += 1;
        }
        if start < hi {
            items.push((start, hi));
        }

        let single = items.len() == 1;
        for (item_idx, (a, b)) in items.iter().copied().enumerate() {
            let mut name = String::new();
            let mut cursor = a;
            while cursor < b {
                let tok = &self.tokens[cursor];
                if tok.kind == TokenKind::Ident || tok.is_punct("::") {
                    name.push_str(&tok.lexeme);
                    cursor += 1;
                } else {
                    break;
                }
            }
            if name.is_empty() {
                return Err(Error::new(ErrorCode::ParseFailure, "expected attribute name")
                    .with_span(self.tokens[a].span));
            }
            let args = if cursor < b && self.tokens[cursor].is_punct("(") {
                let close = self.pairs[cursor].unwrap_or(cursor);
                let text = self.text(self.tokens[cursor].span.hi, self.tokens[close].span.lo);
                Some(text)
            } else {
                None
            };
            let span = Span::new(self.tokens[a].span.lo, self.tokens[b - 1].span.hi);
            let removal_span = if single {
                group
            } else if item_idx + 1 < items.len() {
                Span::new(span.lo, self.tokens[items[item_idx + 1].0].span.lo)
            } else {
                let prev_end = self.tokens[items[item_idx - 1].1 - 1].span.hi;
                Span::new(prev_end, span.hi)
            };
            out.push(AttrNode {
                name,
                args,
                syntax,
                span,
                removal_span,
            });
        }
        Ok(())
    }

    // ----- declarations -----

    fn translation_unit(&mut self) -> Result<TranslationUnit> {
        let decls = self.decl_seq(false)?;
        Ok(TranslationUnit {
            decls,
            span: Span::new(0, self.source.len()),
        })
    }

    fn decl_seq(&mut self, in_block: bool) -> Result<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            match self.peek() {
                None if in_block => return Err(self.error("unterminated declaration block")),
                None => return Ok(decls),
                Some(tok) if tok.is_punct("}") => {
                    if in_block {
                        return Ok(decls);
                    }
                    return Err(self.error("unexpected `}`"));
                }
                Some(_) => decls.push(self.external_decl()?),
            }
        }
    }

    fn external_decl(&mut self) -> Result<Decl> {
        let full_lo = self.cur_lo();
        let mut attrs = Vec::new();
        self.attr_groups(&mut attrs)?;
        let lo = self.cur_lo();
        let tok = self
            .peek()
            .ok_or_else(|| self.error("expected a declaration"))?;

        let kind = if tok.kind == TokenKind::Directive {
            self.bump();
            DeclKind::Directive
        } else if tok.is_punct(";") {
            self.bump();
            DeclKind::Other
        } else if tok.is_ident("namespace")
            || (tok.is_ident("inline") && self.peek_at(1).is_some_and(|t| t.is_ident("namespace")))
        {
            self.namespace()?
        } else if tok.is_ident("extern")
            && self
                .peek_at(1)
                .is_some_and(|t| t.kind == TokenKind::StringLiteral)
            && self.peek_at(2).is_some_and(|t| t.is_punct("{"))
        {
            self.pos += 3;
            let decls = self.decl_seq(true)?;
            self.expect_punct("}")?;
            DeclKind::Linkage(decls)
        } else if tok.is_ident("template") {
            self.bump();
            if self.at_punct("<") {
                self.skip_angle()?;
            }
            let mut inner = self.external_decl()?;
            attrs.append(&mut inner.attrs);
            inner.attrs = attrs;
            inner.span = Span::new(lo, inner.span.hi);
            inner.full_span = Span::new(full_lo, inner.full_span.hi);
            return Ok(inner);
        } else if tok.is_ident("typedef") {
            return self.typedef_decl(attrs, full_lo, lo, true);
        } else if ["using", "static_assert", "friend"]
            .iter()
            .any(|kw| tok.is_ident(kw))
            || self.at_record_definition()
        {
            self.skip_to(&[";"])?;
            self.expect_punct(";")?;
            DeclKind::Other
        } else {
            return self.simple_decl(attrs, full_lo, lo, true);
        };

        Ok(Decl {
            id: self.fresh_id(),
            attrs,
            kind,
            span: Span::new(lo, self.prev_hi()),
            full_span: Span::new(full_lo, self.prev_hi()),
            is_global: true,
        })
    }

    /// `typedef <type> <name>;` with attributes allowed anywhere before
    /// the `;`. The name is the last identifier outside brackets.
    fn typedef_decl(
        &mut self,
        mut attrs: Vec<AttrNode>,
        full_lo: usize,
        lo: usize,
        is_global: bool,
    ) -> Result<Decl> {
        self.bump();
        let mut core: Vec<usize> = Vec::new();
        let mut name_idx = None;
        loop {
            if self.at_cxx_attr() || self.at_gnu_attr() {
                self.attr_groups(&mut attrs)?;
                continue;
            }
            let Some(tok) = self.peek() else {
                return Err(self.error("unterminated typedef"));
            };
            if tok.is_punct(";") {
                break;
            }
            if tok.is_punct("(") || tok.is_punct("[") || tok.is_punct("{") {
                let start = self.pos;
                self.skip_balanced()?;
                core.extend(start..self.pos);
                continue;
            }
            if tok.kind == TokenKind::Ident && !NON_NAME_KEYWORDS.contains(&tok.lexeme.as_str()) {
                name_idx = Some(self.pos);
            }
            core.push(self.pos);
            self.bump();
        }
        self.expect_punct(";")?;
        let name_idx = name_idx.ok_or_else(|| self.error("typedef without a name"))?;
        let type_text = join_tokens(
            core.iter()
                .filter(|idx| **idx != name_idx)
                .map(|idx| &self.tokens[*idx]),
        );
        let typedef = TypedefDecl {
            name: self.tokens[name_idx].lexeme.clone(),
            name_span: self.tokens[name_idx].span,
            type_text,
        };
        trace!(name = %typedef.name, ty = %typedef.type_text, "typedef");
        Ok(Decl {
            id: self.fresh_id(),
            attrs,
            kind: DeclKind::Typedef(typedef),
            span: Span::new(lo, self.prev_hi()),
            full_span: Span::new(full_lo, self.prev_hi()),
            is_global,
        })
    }

    fn namespace(&mut self) -> Result<DeclKind> {
        if self.at_ident("inline") {
            self.bump();
        }
        self.bump();
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Ident || t.is_punct("::"))
        {
            self.bump();
        }
        if self.at_punct("{") {
            self.bump();
            let decls = self.decl_seq(true)?;
            self.expect_punct("}")?;
            Ok(DeclKind::Namespace(decls))
        } else {
            self.skip_to(&[";"])?;
            self.expect_punct(";")?;
            Ok(DeclKind::Other)
        }
    }

    /// `struct S {...};`, `enum class E : int {...};`, `class C;`
    fn at_record_definition(&self) -> bool {
        let Some(tok) = self.peek() else {
            return false;
        };
        if !RECORD_KEYWORDS.iter().any(|kw| tok.is_ident(kw)) {
            return false;
        }
        let mut idx = self.pos + 1;
        while let Some(tok) = self.tokens.get(idx) {
            if tok.kind == TokenKind::Ident || tok.is_punct("::") {
                idx += 1;
                continue;
            }
            return tok.is_punct("{") || tok.is_punct(":") || tok.is_punct(";");
        }
        false
    }

    fn simple_decl(
        &mut self,
        mut attrs: Vec<AttrNode>,
        full_lo: usize,
        lo: usize,
        is_global: bool,
    ) -> Result<Decl> {
        let id = self.fresh_id();
        let mut specifiers: Vec<usize> = Vec::new();
        loop {
            if self.at_cxx_attr() || self.at_gnu_attr() {
                self.attr_groups(&mut attrs)?;
                continue;
            }
            let Some(tok) = self.peek() else {
                return Err(self.error("unexpected end of input in declaration"));
            };
            match tok.kind {
                TokenKind::Ident => {
                    let grouped = ["alignas", "__declspec", "decltype", "__align__"]
                        .iter()
                        .any(|kw| tok.is_ident(kw));
                    if grouped && self.peek_at(1).is_some_and(|t| t.is_punct("(")) {
                        let start = self.pos;
                        self.pos += 1;
                        self.skip_balanced()?;
                        specifiers.extend(start..self.pos);
                        continue;
                    }
                    if tok.is_ident("operator") {
                        return self.opaque_decl(id, attrs, full_lo, lo, is_global);
                    }
                    specifiers.push(self.pos);
                    self.bump();
                    let last = &self.tokens[self.pos - 1].lexeme;
                    if self.at_punct("<") && !NON_NAME_KEYWORDS.contains(&last.as_str()) {
                        let start = self.pos;
                        self.skip_angle()?;
                        specifiers.extend(start..self.pos);
                    }
                }
                TokenKind::Punct if tok.is_punct("::") => {
                    specifiers.push(self.pos);
                    self.bump();
                }
                TokenKind::StringLiteral
                    if specifiers
                        .last()
                        .is_some_and(|idx| self.tokens[*idx].is_ident("extern")) =>
                {
                    specifiers.push(self.pos);
                    self.bump();
                }
                _ => break,
            }
        }

        let mut declarators = Vec::new();
        loop {
            let d_lo = self.cur_lo();
            let mut pointer_depth = 0;
            let mut const_pointer = false;
            loop {
                if self.at_cxx_attr() || self.at_gnu_attr() {
                    self.attr_groups(&mut attrs)?;
                } else if self.at_punct("*") {
                    pointer_depth += 1;
                    const_pointer = false;
                    self.bump();
                } else if self.at_punct("&") || self.at_punct("&&") {
                    self.bump();
                } else if self.at_ident("const") && pointer_depth > 0 {
                    const_pointer = true;
                    self.bump();
                } else if self.at_ident("const") && declarators.is_empty() {
                    specifiers.push(self.pos);
                    self.bump();
                } else if ["volatile", "__restrict__", "__restrict", "restrict"]
                    .iter()
                    .any(|kw| self.at_ident(kw))
                {
                    self.bump();
                } else {
                    break;
                }
            }

            let name_idx = if declarators.is_empty() && pointer_depth == 0 {
                match specifiers.last() {
                    Some(idx)
                        if specifiers.len() >= 2
                            && self.tokens[*idx].kind == TokenKind::Ident
                            && !NON_NAME_KEYWORDS.contains(&self.tokens[*idx].lexeme.as_str()) =>
                    {
                        specifiers.pop()
                    }
                    _ => None,
                }
            } else if self
                .peek()
                .is_some_and(|t| t.kind == TokenKind::Ident)
            {
                let idx = self.pos;
                self.bump();
                Some(idx)
            } else {
                None
            };
            let Some(name_idx) = name_idx else {
                return self.opaque_decl(id, attrs, full_lo, lo, is_global);
            };
            let name = self.tokens[name_idx].lexeme.clone();
            let name_span = self.tokens[name_idx].span;
            self.attr_groups(&mut attrs)?;

            if self.at_punct("(") && is_global && declarators.is_empty() {
                let function = self.function_rest(
                    name,
                    name_span,
                    &specifiers,
                    pointer_depth,
                    &mut attrs,
                )?;
                return Ok(Decl {
                    id,
                    attrs,
                    kind: DeclKind::Function(function),
                    span: Span::new(lo, self.prev_hi()),
                    full_span: Span::new(full_lo, self.prev_hi()),
                    is_global,
                });
            }

            let mut init = None;
            if self.at_punct("(") {
                let open = self.cur_lo();
                let close = self.skip_balanced()?;
                init = Some(Span::new(open, close.hi));
            }
            let mut array_dims = Vec::new();
            while self.at_punct("[") {
                let open = self.bump();
                self.pos -= 1;
                let close = self.skip_balanced()?;
                array_dims.push(self.text(open.hi, close.lo).trim().to_string());
            }
            self.attr_groups(&mut attrs)?;
            if self.at_punct("=") || self.at_punct(":") {
                self.bump();
                let init_lo = self.cur_lo();
                self.skip_to(&[",", ";"])?;
                init = Some(Span::new(init_lo, self.prev_hi().max(init_lo)));
            } else if self.at_punct("{") {
                let open = self.cur_lo();
                let close = self.skip_balanced()?;
                init = Some(Span::new(open, close.hi));
            }
            self.attr_groups(&mut attrs)?;
            declarators.push(Declarator {
                name,
                name_span,
                pointer_depth,
                const_pointer,
                array_dims,
                init,
                span: Span::new(d_lo.min(name_span.lo), self.prev_hi()),
            });

            if self.at_punct(",") {
                self.bump();
                continue;
            }
            self.expect_punct(";")?;
            break;
        }

        let type_text = join_tokens(specifiers.iter().map(|idx| &self.tokens[*idx]));
        let has = |kw: &str| specifiers.iter().any(|idx| self.tokens[*idx].is_ident(kw));
        let var = VarDecl {
            is_constexpr: has("constexpr"),
            specifier_const: has("const") || has("constexpr"),
            type_text,
            declarators,
        };
        Ok(Decl {
            id,
            attrs,
            kind: DeclKind::Var(var),
            span: Span::new(lo, self.prev_hi()),
            full_span: Span::new(full_lo, self.prev_hi()),
            is_global,
        })
    }

    /// Declarations the subset does not model (operators, function
    /// pointers): skipped whole.
    fn opaque_decl(
        &mut self,
        id: NodeId,
        attrs: Vec<AttrNode>,
        full_lo: usize,
        lo: usize,
        is_global: bool,
    ) -> Result<Decl> {
        loop {
            self.skip_to(&[";", "{"])?;
            if self.at_punct("{") {
                self.skip_balanced()?;
                if self.at_punct(";") {
                    self.bump();
                }
                break;
            }
            if self.at_punct(";") {
                self.bump();
                break;
            }
            if self.peek().is_none() {
                break;
            }
            return Err(self.error("unexpected token in declaration"));
        }
        Ok(Decl {
            id,
            attrs,
            kind: DeclKind::Other,
            span: Span::new(lo, self.prev_hi()),
            full_span: Span::new(full_lo, self.prev_hi()),
            is_global,
        })
    }

    fn function_rest(
        &mut self,
        name: String,
        name_span: Span,
        specifiers: &[usize],
        pointer_depth: usize,
        attrs: &mut Vec<AttrNode>,
    ) -> Result<FunctionDecl> {
        let lparen_idx = self.pos;
        let rparen_idx = self.matching(lparen_idx)?;
        let params = self.params(lparen_idx, rparen_idx)?;
        let lparen = self.tokens[lparen_idx].span;
        let rparen = self.tokens[rparen_idx].span;
        self.pos = rparen_idx + 1;

        let mut body = None;
        loop {
            if self.at_cxx_attr() || self.at_gnu_attr() {
                self.attr_groups(attrs)?;
                continue;
            }
            match self.peek() {
                None => return Err(self.error("unexpected end of input after function declarator")),
                Some(tok) if tok.is_punct("{") => {
                    body = Some(Box::new(self.stmt()?));
                    break;
                }
                Some(tok) if tok.is_punct(";") => {
                    self.bump();
                    break;
                }
                Some(tok) if tok.is_punct("=") => {
                    self.skip_to(&[";"])?;
                    self.expect_punct(";")?;
                    break;
                }
                Some(tok) if tok.is_punct("(") => {
                    self.skip_balanced()?;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }

        let mut return_type = join_tokens(specifiers.iter().map(|idx| &self.tokens[*idx]));
        return_type.push_str(&"*".repeat(pointer_depth));
        Ok(FunctionDecl {
            name,
            name_span,
            return_type,
            params,
            lparen,
            rparen,
            body,
        })
    }

    fn params(&mut self, lparen: usize, rparen: usize) -> Result<Vec<Param>> {
        if rparen == lparen + 1 {
            return Ok(Vec::new());
        }
        if rparen == lparen + 2 && self.tokens[lparen + 1].is_ident("void") {
            return Ok(Vec::new());
        }
        let mut ranges = Vec::new();
        let mut start = lparen + 1;
        let mut angle = 0i32;
        let mut idx = lparen + 1;
        while idx < rparen {
            let tok = &self.tokens[idx];
            if let Some(close) = self.pairs[idx].filter(|close| *close > idx) {
                idx = close + 1;
                continue;
            }
            if tok.kind == TokenKind::Punct {
                match tok.lexeme.as_str() {
                    "<" if idx > 0 && self.tokens[idx - 1].kind == TokenKind::Ident => angle += 1,
                    ">" if angle > 0 => angle -= 1,
                    ">>" if angle > 0 => angle = (angle - 2).max(0),
                    "," if angle == 0 => {
                        ranges.push((start, idx));
                        start = idx + 1;
                    }
                    _ => {}
                }
            }
            idx += 1;
        }
        ranges.push((start, rparen));

        let mut params = Vec::with_capacity(ranges.len());
        for (a, b) in ranges {
            if a < b {
                params.push(self.param(a, b)?);
            }
        }
        Ok(params)
    }

    fn param(&mut self, a: usize, b: usize) -> Result<Param> {
        let id = self.fresh_id();
        let full_lo = self.tokens[a].span.lo;
        let mut attrs = Vec::new();
        let mut core: Vec<usize> = Vec::new();
        self.pos = a;
        while self.pos < b {
            if self.at_cxx_attr() || self.at_gnu_attr() {
                self.attr_groups(&mut attrs)?;
                continue;
            }
            core.push(self.pos);
            self.pos += 1;
        }
        let lo = core.first().map_or(full_lo, |idx| self.tokens[*idx].span.lo);
        let hi = self.tokens[b - 1].span.hi;

        let declarator_end = core
            .iter()
            .position(|idx| self.tokens[*idx].is_punct("=") || self.tokens[*idx].is_punct("["))
            .unwrap_or(core.len());
        let name_pos = (1..declarator_end).rev().find(|pos| {
            let tok = &self.tokens[core[*pos]];
            tok.kind == TokenKind::Ident
                && !NON_NAME_KEYWORDS.contains(&tok.lexeme.as_str())
                && !self.tokens[core[pos - 1]].is_punct("::")
        });
        let type_end = name_pos.unwrap_or(declarator_end);
        let type_tokens = &core[..type_end];
        let type_text = join_tokens(type_tokens.iter().map(|idx| &self.tokens[*idx]));
        let is_const = type_tokens.iter().any(|idx| self.tokens[*idx].is_ident("const"));
        let is_pointer = type_tokens.iter().any(|idx| self.tokens[*idx].is_punct("*"))
            || core[declarator_end..]
                .first()
                .is_some_and(|idx| self.tokens[*idx].is_punct("["));

        Ok(Param {
            id,
            attrs,
            type_text,
            name: name_pos.map(|pos| self.tokens[core[pos]].lexeme.clone()),
            name_span: name_pos.map(|pos| self.tokens[core[pos]].span),
            is_const,
            is_pointer,
            span: Span::new(lo, hi),
            full_span: Span::new(full_lo, hi),
        })
    }

    // ----- statements -----

    fn stmt(&mut self) -> Result<Stmt> {
        let full_lo = self.cur_lo();
        let mut attrs = Vec::new();
        self.attr_groups(&mut attrs)?;
        let lo = self.cur_lo();
        let tok = self
            .peek()
            .ok_or_else(|| self.error("expected a statement"))?;

        let kind = if tok.kind == TokenKind::Directive {
            self.bump();
            StmtKind::Directive
        } else if tok.is_punct("{") {
            StmtKind::Compound(self.compound()?)
        } else if tok.is_punct(";") {
            self.bump();
            StmtKind::Null
        } else if tok.is_punct("}") {
            return Err(self.error("unexpected `}`"));
        } else if tok.is_ident("for") {
            self.for_stmt(&mut attrs)?
        } else if tok.is_ident("while") {
            self.bump();
            let cond = self.paren_span()?;
            let body = Box::new(self.stmt()?);
            StmtKind::While { cond, body }
        } else if tok.is_ident("do") {
            self.bump();
            let body = Box::new(self.stmt()?);
            if !self.at_ident("while") {
                return Err(self.error("expected `while` after `do` body"));
            }
            self.bump();
            let cond = self.paren_span()?;
            self.expect_punct(";")?;
            StmtKind::Do { body, cond }
        } else if tok.is_ident("if") {
            self.bump();
            if self.at_ident("constexpr") {
                self.bump();
            }
            let cond = self.paren_span()?;
            let then = Box::new(self.stmt()?);
            let otherwise = if self.at_ident("else") {
                self.bump();
                Some(Box::new(self.stmt()?))
            } else {
                None
            };
            StmtKind::If {
                cond,
                then,
                otherwise,
            }
        } else if tok.is_ident("switch") {
            self.bump();
            let cond = self.paren_span()?;
            let body = Box::new(self.stmt()?);
            StmtKind::Switch { cond, body }
        } else if tok.is_ident("case") || tok.is_ident("default") {
            self.bump();
            self.skip_to(&[":"])?;
            self.expect_punct(":")?;
            let body = Box::new(self.stmt()?);
            StmtKind::Labeled { body }
        } else if ["return", "break", "continue", "goto", "throw"]
            .iter()
            .any(|kw| tok.is_ident(kw))
        {
            self.skip_to(&[";"])?;
            self.expect_punct(";")?;
            StmtKind::Jump
        } else if tok.is_ident("try") {
            self.bump();
            self.compound()?;
            while self.at_ident("catch") {
                self.bump();
                self.paren_span()?;
                self.compound()?;
            }
            StmtKind::Other
        } else if tok.kind == TokenKind::Ident
            && !STMT_KEYWORDS.contains(&tok.lexeme.as_str())
            && self.peek_at(1).is_some_and(|t| t.is_punct(":"))
        {
            self.pos += 2;
            let body = Box::new(self.stmt()?);
            StmtKind::Labeled { body }
        } else if tok.is_ident("typedef") || self.looks_like_decl() {
            let decl = if self.at_ident("typedef") {
                self.typedef_decl(attrs, full_lo, lo, false)?
            } else {
                self.simple_decl(attrs, full_lo, lo, false)?
            };
            return Ok(Stmt {
                id: self.fresh_id(),
                attrs: Vec::new(),
                span: decl.full_span,
                full_span: decl.full_span,
                kind: StmtKind::Decl(decl),
            });
        } else {
            self.skip_to(&[";"])?;
            self.expect_punct(";")?;
            StmtKind::Expr
        };

        Ok(Stmt {
            id: self.fresh_id(),
            attrs,
            kind,
            span: Span::new(lo, self.prev_hi()),
            full_span: Span::new(full_lo, self.prev_hi()),
        })
    }

    fn compound(&mut self) -> Result<CompoundStmt> {
        let lbrace = self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.at_punct("}") {
            if self.peek().is_none() {
                return Err(self.error("unterminated block"));
            }
            stmts.push(self.stmt()?);
        }
        let rbrace = self.bump();
        Ok(CompoundStmt {
            lbrace,
            rbrace,
            stmts,
        })
    }

    /// `( ... )` at the cursor; returns the span of the inner text.
    fn paren_span(&mut self) -> Result<Span> {
        let open = self.expect_punct("(")?;
        self.pos -= 1;
        let close = self.skip_balanced()?;
        Ok(Span::new(open.hi, close.lo))
    }

    fn for_stmt(&mut self, attrs: &mut Vec<AttrNode>) -> Result<StmtKind> {
        let for_kw = self.bump();
        if !self.at_punct("(") {
            return Err(self.error("expected `(` after `for`"));
        }
        let lparen_idx = self.pos;
        let rparen_idx = self.matching(lparen_idx)?;

        let mut separators = Vec::new();
        let mut has_colon = false;
        let mut idx = lparen_idx + 1;
        while idx < rparen_idx {
            if let Some(close) = self.pairs[idx].filter(|close| *close > idx) {
                idx = close + 1;
                continue;
            }
            let tok = &self.tokens[idx];
            if tok.is_punct(";") {
                separators.push(idx);
            } else if tok.is_punct(":") {
                has_colon = true;
            }
            idx += 1;
        }

        self.pos = rparen_idx + 1;
        if separators.is_empty() && has_colon {
            self.attr_groups(attrs)?;
            let body = Box::new(self.stmt()?);
            return Ok(StmtKind::RangeFor { body });
        }
        if separators.len() != 2 {
            return Err(Error::new(
                ErrorCode::ParseFailure,
                format!(
                    "malformed `for` header: expected 2 `;`, found {}",
                    separators.len()
                ),
            )
            .with_span(for_kw));
        }
        let init = self.segment(lparen_idx, separators[0]);
        let cond = self.segment(separators[0], separators[1]);
        let inc = self.segment(separators[1], rparen_idx);
        let lparen = self.tokens[lparen_idx].span;
        let rparen = self.tokens[rparen_idx].span;

        self.attr_groups(attrs)?;
        let body = Box::new(self.stmt()?);
        Ok(StmtKind::For(ForStmt {
            for_kw,
            lparen,
            init,
            cond,
            inc,
            rparen,
            body,
        }))
    }

    /// Tight span over the tokens strictly between two token indices.
    fn segment(&self, open: usize, close: usize) -> Span {
        if close <= open + 1 {
            return Span::empty_at(self.tokens[open].span.hi);
        }
        Span::new(self.tokens[open + 1].span.lo, self.tokens[close - 1].span.hi)
    }

    fn looks_like_decl(&self) -> bool {
        let Some(first) = self.peek() else {
            return false;
        };
        if first.kind != TokenKind::Ident {
            return false;
        }
        if DECL_START_KEYWORDS.contains(&first.lexeme.as_str()) {
            return true;
        }
        if STMT_KEYWORDS.contains(&first.lexeme.as_str()) {
            return false;
        }

        let mut idx = self.pos;
        // qualified type name
        loop {
            match self.tokens.get(idx) {
                Some(tok) if tok.kind == TokenKind::Ident => idx += 1,
                _ => return false,
            }
            if self.tokens.get(idx).is_some_and(|t| t.is_punct("::")) {
                idx += 1;
                continue;
            }
            break;
        }
        // template arguments
        if self.tokens.get(idx).is_some_and(|t| t.is_punct("<")) {
            let mut depth = 0i32;
            loop {
                let Some(tok) = self.tokens.get(idx) else {
                    return false;
                };
                if tok.kind == TokenKind::Punct {
                    match tok.lexeme.as_str() {
                        "<" => depth += 1,
                        ">" => depth -= 1,
                        ">>" => depth -= 2,
                        ";" | "{" | "}" => return false,
                        _ => {}
                    }
                }
                idx += 1;
                if depth <= 0 {
                    break;
                }
            }
        }
        // pointer operators, cv-qualifiers and attributes
        loop {
            let Some(tok) = self.tokens.get(idx) else {
                return false;
            };
            if tok.is_punct("*") || tok.is_punct("&") || tok.is_punct("&&") || tok.is_ident("const")
            {
                idx += 1;
            } else if tok.is_ident("__attribute__") {
                match self.pairs.get(idx + 1).copied().flatten() {
                    Some(close) => idx = close + 1,
                    None => return false,
                }
            } else if tok.is_punct("[") && self.tokens.get(idx + 1).is_some_and(|t| t.is_punct("[")) {
                match self.pairs[idx] {
                    Some(close) => idx = close + 1,
                    None => return false,
                }
            } else {
                break;
            }
        }
        let is_name = self
            .tokens
            .get(idx)
            .is_some_and(|t| t.kind == TokenKind::Ident && !STMT_KEYWORDS.contains(&t.lexeme.as_str()));
        if !is_name {
            return false;
        }
        self.tokens.get(idx + 1).is_some_and(|t| {
            ["=", ";", ",", "[", "(", "{", ":"]
                .iter()
                .any(|p| t.is_punct(p))
                || t.is_ident("__attribute__")
        })
    }
}

fn closer_of(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

fn is_word(tok: &Token) -> bool {
    matches!(
        tok.kind,
        TokenKind::Ident | TokenKind::Number | TokenKind::StringLiteral | TokenKind::CharLiteral
    )
}

/// Re-spell a token run compactly: `const float *` becomes `const float*`.
/// Re-spell a token run with single spaces only where C++ needs them.
pub fn join_tokens<'t>(tokens: impl Iterator<Item = &'t Token>) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for tok in tokens {
        if let Some(prev) = prev {
            let space = (is_word(prev) && is_word(tok))
                || prev.is_punct(",")
                || ((prev.is_punct("*") || prev.is_punct("&")) && tok.kind == TokenKind::Ident);
            if space {
                out.push(' ');
            }
        }
        out.push_str(&tok.lexeme);
        prev = Some(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_kernel_with_attributed_params() {
        let src = "[[okl_kernel(\"\")]] void add(const int n, const float *a __attribute__((okl_restrict(\"\"))), float *out) {\n  out[0] = a[0];\n}\n";
        let tu = parse(src).expect("parse");
        assert_eq!(tu.decls.len(), 1);
        let decl = &tu.decls[0];
        assert_eq!(decl.attrs.len(), 1);
        assert_eq!(decl.attrs[0].name, "okl_kernel");
        assert_eq!(decl.span.text(src).split('(').next(), Some("void add"));
        let func = decl.as_function().expect("function");
        assert_eq!(func.name, "add");
        assert_eq!(func.return_type, "void");
        assert_eq!(func.params.len(), 3);
        let a = &func.params[1];
        assert_eq!(a.name.as_deref(), Some("a"));
        assert_eq!(a.type_text, "const float*");
        assert!(a.is_const && a.is_pointer);
        assert_eq!(a.attrs[0].name, "okl_restrict");
        assert_eq!(a.attrs[0].syntax, AttrSyntax::Gnu);
        assert_eq!(
            a.attrs[0].removal_span.text(src),
            "__attribute__((okl_restrict(\"\")))"
        );
        assert!(func.body.is_some());
    }

    #[test]
    fn splits_for_header_and_collects_trailing_gnu_attrs() {
        let src = "void f() { for (int i = 0; i < N; i += 2) __attribute__((okl_tile(\"(16)\"))) { body(i); } }";
        let tu = parse(src).expect("parse");
        let func = tu.decls[0].as_function().expect("function");
        let body = func.body.as_ref().expect("body");
        let StmtKind::Compound(block) = &body.kind else {
            panic!("expected compound body");
        };
        let stmt = &block.stmts[0];
        let for_stmt = stmt.as_for().expect("for");
        assert_eq!(for_stmt.init.text(src), "int i = 0");
        assert_eq!(for_stmt.cond.text(src), "i < N");
        assert_eq!(for_stmt.inc.text(src), "i += 2");
        assert_eq!(stmt.attrs.len(), 1);
        assert_eq!(stmt.attrs[0].args.as_deref(), Some("\"(16)\""));
        assert_eq!(stmt.span.lo, for_stmt.for_kw.lo);
    }

    #[test]
    fn statement_declarations_carry_leading_attrs() {
        let src = "void f() { [[okl_shared(\"\")]] float s[32][N]; x = y * 2; MyType *p = nullptr, q; }";
        let tu = parse(src).expect("parse");
        let func = tu.decls[0].as_function().expect("function");
        let StmtKind::Compound(block) = &func.body.as_ref().expect("body").kind else {
            panic!("expected compound body");
        };
        let StmtKind::Decl(shared) = &block.stmts[0].kind else {
            panic!("expected declaration");
        };
        assert_eq!(shared.attrs[0].name, "okl_shared");
        let var = shared.as_var().expect("var");
        assert_eq!(var.type_text, "float");
        assert_eq!(var.declarators[0].name, "s");
        assert_eq!(var.declarators[0].array_dims, vec!["32", "N"]);
        assert_eq!(block.stmts[1].kind(), super::super::NodeKind::Expr);
        let StmtKind::Decl(ptrs) = &block.stmts[2].kind else {
            panic!("expected declaration");
        };
        let var = ptrs.as_var().expect("var");
        assert_eq!(var.type_text, "MyType");
        assert_eq!(var.declarators.len(), 2);
        assert_eq!(var.declarators[0].pointer_depth, 1);
        assert_eq!(var.declarators[1].name, "q");
    }

    #[test]
    fn global_constants_and_top_level_const() {
        let src = "const int A = 1;\nconst float *p;\nint *const q = 0;\nconstexpr int C = 2;\nconst double tbl[2] = {1, 2};";
        let tu = parse(src).expect("parse");
        let consts: Vec<bool> = tu
            .decls
            .iter()
            .map(|d| d.as_var().expect("var").is_top_level_const())
            .collect();
        assert_eq!(consts, vec![true, false, true, true, true]);
        assert!(tu.decls.iter().all(|d| d.is_global));
    }

    #[test]
    fn skips_records_templates_and_descends_namespaces() {
        let src = "#include <x.h>\nstruct S { int a; };\ntemplate <typename T> T id(T v) { return v; }\nnamespace ns { void g(); }\nextern \"C\" { int h(int); }\ntypedef float real;";
        let tu = parse(src).expect("parse");
        let kinds: Vec<_> = tu.decls.iter().map(Decl::kind).collect();
        use super::super::NodeKind::*;
        assert_eq!(kinds, vec![Directive, Other, Function, Namespace, Namespace, Typedef]);
        let DeclKind::Namespace(inner) = &tu.decls[3].kind else {
            panic!("expected namespace");
        };
        assert_eq!(inner[0].as_function().map(|f| f.name.as_str()), Some("g"));
        let typedef = tu.decls[5].as_typedef().expect("typedef");
        assert_eq!(typedef.name, "real");
        assert_eq!(typedef.type_text, "float");
    }

    #[test]
    fn typedef_collects_attributes_and_names() {
        let src = "typedef float *real_ptr __attribute__((okl_restrict(\"\")));\nvoid f() { typedef float tile_t[16]; }";
        let tu = parse(src).expect("parse");
        let typedef = tu.decls[0].as_typedef().expect("typedef");
        assert_eq!(typedef.name, "real_ptr");
        assert_eq!(typedef.type_text, "float*");
        assert_eq!(tu.decls[0].attrs.len(), 1);
        assert_eq!(tu.decls[0].attrs[0].name, "okl_restrict");

        let body = tu.decls[1].as_function().and_then(|f| f.body.as_ref()).expect("body");
        let StmtKind::Compound(block) = &body.kind else {
            panic!("expected block");
        };
        let StmtKind::Decl(local) = &block.stmts[0].kind else {
            panic!("expected declaration statement");
        };
        let local = local.as_typedef().expect("local typedef");
        assert_eq!(local.name, "tile_t");
        assert_eq!(local.type_text, "float[16]");
    }

    #[test]
    fn multi_item_attribute_groups_remove_one_item() {
        let src = "__attribute__((aligned(16), okl_shared(\"\"))) float s[4];";
        let tu = parse(src).expect("parse");
        let attrs = &tu.decls[0].attrs;
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[1].removal_span.text(src), ", okl_shared(\"\")");
        assert_eq!(attrs[0].removal_span.text(src), "aligned(16), ");
    }

    #[test]
    fn reports_unbalanced_input() {
        let err = parse("void f() { for (;;) {").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseFailure);
        let err = parse("void f() { for (int i = 0; i < n) {} }").unwrap_err();
        assert!(err.message.contains("malformed `for` header"));
    }
}
