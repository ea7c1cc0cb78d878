use super::winnow::{
    directive_line, parse_identifier, parse_number, parse_punct, parse_quoted_literal,
    parse_raw_string_literal, ws,
};
use crate::span::Span;
use thiserror::Error;
use winnow::combinator::alt;
use winnow::error::{ContextError, ErrMode};
use winnow::token::literal;
use winnow::{ModalResult, Parser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.lexeme == punct
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.lexeme == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    StringLiteral,
    CharLiteral,
    Punct,
    /// The `@` that opens an OKL marker attribute.
    At,
    /// A complete preprocessor line, kept verbatim.
    Directive,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexerError {
    #[error("lexer error at byte {offset}: {message}")]
    Message { offset: usize, message: String },
}

impl LexerError {
    fn at(offset: usize, err: ErrMode<ContextError>) -> Self {
        let message = match err {
            ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => {
                let text = ctx.to_string();
                if text.is_empty() {
                    "unrecognized input".to_string()
                } else {
                    text
                }
            }
            ErrMode::Incomplete(_) => "incomplete input".to_string(),
        };
        LexerError::Message { offset, message }
    }

    pub fn offset(&self) -> usize {
        match self {
            LexerError::Message { offset, .. } => *offset,
        }
    }
}

/// Split C++ source into tokens, dropping comments and whitespace.
pub fn lex(source: &str) -> Result<Vec<Token>, LexerError> {
    let mut input = source;
    let mut tokens = Vec::new();
    while !input.is_empty() {
        ws.parse_next(&mut input)
            .map_err(|err| LexerError::at(source.len() - input.len(), err))?;
        if input.is_empty() {
            break;
        }
        let start = source.len() - input.len();
        let result = if input.starts_with('#') && at_line_start(source, start) {
            directive_line
                .map(|_| TokenKind::Directive)
                .parse_next(&mut input)
        } else {
            token_parser().parse_next(&mut input)
        };
        let kind = result.map_err(|err| LexerError::at(start, err))?;
        let end = source.len() - input.len();
        tokens.push(Token {
            kind,
            lexeme: source[start..end].to_string(),
            span: Span::new(start, end),
        });
    }
    Ok(tokens)
}

fn at_line_start(source: &str, offset: usize) -> bool {
    source[..offset]
        .chars()
        .rev()
        .take_while(|c| *c != '\n')
        .all(|c| c == ' ' || c == '\t' || c == '\r')
}

fn token_parser<'a>() -> impl Parser<&'a str, TokenKind, ErrMode<ContextError>> {
    alt((
        raw_string_token,
        string_token,
        char_token,
        number_token,
        ident_token,
        at_token,
        punct_token,
    ))
}

fn raw_string_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_raw_string_literal(input).map(|_| TokenKind::StringLiteral)
}

fn string_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_quoted_literal(input, b'"').map(|_| TokenKind::StringLiteral)
}

fn char_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_quoted_literal(input, b'\'').map(|_| TokenKind::CharLiteral)
}

fn number_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_number(input).map(|_| TokenKind::Number)
}

fn ident_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_identifier(input).map(|_| TokenKind::Ident)
}

fn at_token(input: &mut &str) -> ModalResult<TokenKind> {
    literal("@").map(|_| TokenKind::At).parse_next(input)
}

fn punct_token(input: &mut &str) -> ModalResult<TokenKind> {
    parse_punct(input).map(|_| TokenKind::Punct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        lex(src)
            .expect("lex")
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect()
    }

    #[test]
    fn lexes_marker_attribute_and_loop_header() {
        let toks = kinds("for (int i = 0; i < N; ++i; @outer(0))");
        assert_eq!(toks[0], (TokenKind::Ident, "for".into()));
        assert!(toks.contains(&(TokenKind::Punct, "++".into())));
        assert!(toks.contains(&(TokenKind::At, "@".into())));
        assert_eq!(toks.last(), Some(&(TokenKind::Punct, ")".into())));
    }

    #[test]
    fn keeps_directives_and_literals_whole() {
        let src = "#include <a.h>\n#define X(a) \\\n  (a + 1)\nconst char* s = u8\"a\\\"b\"; char c = '\\''; auto r = R\"x(a)\"b)x\";\nfloat f = 1.5e-3f;";
        let toks = kinds(src);
        assert_eq!(toks[0], (TokenKind::Directive, "#include <a.h>".into()));
        assert_eq!(
            toks[1],
            (TokenKind::Directive, "#define X(a) \\\n  (a + 1)".into())
        );
        assert!(toks.contains(&(TokenKind::StringLiteral, "u8\"a\\\"b\"".into())));
        assert!(toks.contains(&(TokenKind::CharLiteral, "'\\''".into())));
        assert!(toks.contains(&(TokenKind::StringLiteral, "R\"x(a)\"b)x\"".into())));
        assert!(toks.contains(&(TokenKind::Number, "1.5e-3f".into())));
    }

    #[test]
    fn skips_comments_and_tracks_spans() {
        let src = "a /* x */ b // y\nc";
        let toks = lex(src).expect("lex");
        let spans: Vec<_> = toks.iter().map(|t| t.span.text(src)).collect();
        assert_eq!(spans, vec!["a", "b", "c"]);
    }

    #[test]
    fn hash_inside_a_line_is_punctuation() {
        let toks = kinds("x = a # b;");
        assert!(toks.contains(&(TokenKind::Punct, "#".into())));
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let err = lex("int x; \"abc").unwrap_err();
        assert_eq!(err.offset(), 7);
    }
}
