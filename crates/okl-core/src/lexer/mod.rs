mod tokenizer;
mod winnow;

pub use tokenizer::{lex, LexerError, Token, TokenKind};
