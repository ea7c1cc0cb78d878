use winnow::combinator::{alt, cut_err, opt, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::token::{literal, take_till, take_until, take_while};
use winnow::{ModalResult, Parser};

pub(crate) const MULTI_PUNCT: &[&str] = &[
    ">>=", "<<=", "<=>", "->*", "...", "::", "->", "++", "--", "==", "!=", "<=", ">=", "&&",
    "||", "<<", ">>", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ".*", "##",
];
pub(crate) const SINGLE_PUNCT: &str = "=+-*/%&|^!~#?:;,.()[]{}<>\\";

const STRING_PREFIXES: &[&str] = &["u8", "u", "U", "L", ""];

pub(crate) fn ws(input: &mut &str) -> ModalResult<()> {
    repeat::<_, _, (), _, _>(
        0..,
        alt((whitespace, line_continuation, line_comment, block_comment)),
    )
    .parse_next(input)?;
    Ok(())
}

pub(crate) fn whitespace(input: &mut &str) -> ModalResult<()> {
    take_while(1.., char::is_whitespace)
        .map(|_| ())
        .parse_next(input)
}

pub(crate) fn line_continuation(input: &mut &str) -> ModalResult<()> {
    alt((literal("\\\r\n"), literal("\\\n")))
        .map(|_| ())
        .parse_next(input)
}

pub(crate) fn line_comment(input: &mut &str) -> ModalResult<()> {
    literal("//").parse_next(input)?;
    take_till(0.., |c: char| c == '\n').parse_next(input)?;
    opt(literal("\n")).parse_next(input)?;
    Ok(())
}

pub(crate) fn block_comment(input: &mut &str) -> ModalResult<()> {
    literal("/*").parse_next(input)?;
    cut_err(take_until(0.., "*/")).parse_next(input)?;
    literal("*/").parse_next(input)?;
    Ok(())
}

/// A whole preprocessor line, honouring `\` continuations.
pub(crate) fn directive_line(input: &mut &str) -> ModalResult<()> {
    let slice = *input;
    if !slice.starts_with('#') {
        return Err(backtrack_err());
    }
    let bytes = slice.as_bytes();
    let mut idx = 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' if bytes.get(idx + 1) == Some(&b'\n') => idx += 2,
            b'\\' if bytes.get(idx + 1) == Some(&b'\r') && bytes.get(idx + 2) == Some(&b'\n') => {
                idx += 3
            }
            b'\n' => break,
            _ => idx += 1,
        }
    }
    let mut end = idx;
    while end > 1 && (bytes[end - 1] == b'\r' || bytes[end - 1] == b' ' || bytes[end - 1] == b'\t')
    {
        end -= 1;
    }
    *input = &slice[end..];
    Ok(())
}

/// `"..."` or `'...'` with an optional encoding prefix.
pub(crate) fn parse_quoted_literal(input: &mut &str, quote: u8) -> ModalResult<()> {
    let slice = *input;
    let prefix = STRING_PREFIXES
        .iter()
        .find(|prefix| {
            slice.starts_with(**prefix) && slice.as_bytes().get(prefix.len()) == Some(&quote)
        })
        .ok_or_else(backtrack_err)?;
    let bytes = slice.as_bytes();
    let mut idx = prefix.len() + 1;
    let mut escape = false;
    while idx < bytes.len() {
        let b = bytes[idx];
        idx += 1;
        if b == b'\n' {
            break;
        }
        if b == b'\\' && !escape {
            escape = true;
            continue;
        }
        if b == quote && !escape {
            *input = &slice[idx..];
            return Ok(());
        }
        escape = false;
    }
    Err(ErrMode::Cut(ContextError::new()))
}

/// `R"delim( ... )delim"` with an optional encoding prefix.
pub(crate) fn parse_raw_string_literal(input: &mut &str) -> ModalResult<()> {
    let slice = *input;
    let prefix = STRING_PREFIXES
        .iter()
        .find(|prefix| {
            slice.starts_with(**prefix)
                && slice
                    .get(prefix.len()..)
                    .is_some_and(|rest| rest.starts_with("R\""))
        })
        .ok_or_else(backtrack_err)?;
    let body = &slice[prefix.len() + 2..];
    let open = body.find('(').ok_or_else(|| ErrMode::Cut(ContextError::new()))?;
    let delim = &body[..open];
    if delim.len() > 16 || delim.contains(|c: char| c.is_whitespace() || c == '\\') {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    let closing = format!("){}\"", delim);
    let rest = &body[open + 1..];
    let close = rest
        .find(&closing)
        .ok_or_else(|| ErrMode::Cut(ContextError::new()))?;
    let consumed = prefix.len() + 2 + open + 1 + close + closing.len();
    *input = &slice[consumed..];
    Ok(())
}

/// Integer and floating literals including hex, exponents, digit
/// separators and suffixes.
pub(crate) fn parse_number(input: &mut &str) -> ModalResult<()> {
    let slice = *input;
    let bytes = slice.as_bytes();
    let starts = match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'.') => bytes.get(1).is_some_and(|b| b.is_ascii_digit()),
        _ => false,
    };
    if !starts {
        return Err(backtrack_err());
    }
    let hex = slice.starts_with("0x") || slice.starts_with("0X");
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        let exponent = if hex {
            matches!(b, b'p' | b'P')
        } else {
            matches!(b, b'e' | b'E')
        };
        if exponent && matches!(bytes.get(idx + 1), Some(b'+' | b'-')) {
            idx += 2;
            continue;
        }
        if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' {
            idx += 1;
            continue;
        }
        if b == b'\'' && bytes.get(idx + 1).is_some_and(|n| n.is_ascii_alphanumeric()) {
            idx += 1;
            continue;
        }
        break;
    }
    *input = &slice[idx..];
    Ok(())
}

pub(crate) fn parse_identifier(input: &mut &str) -> ModalResult<()> {
    (take_while(1, is_ident_start), take_while(0.., is_ident_continue))
        .map(|_| ())
        .parse_next(input)
}

pub(crate) fn parse_punct(input: &mut &str) -> ModalResult<()> {
    for punct in MULTI_PUNCT {
        if input.starts_with(punct) {
            *input = &input[punct.len()..];
            return Ok(());
        }
    }
    match input.chars().next() {
        Some(ch) if SINGLE_PUNCT.contains(ch) => {
            *input = &input[ch.len_utf8()..];
            Ok(())
        }
        _ => Err(backtrack_err()),
    }
}

pub(crate) fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_ascii_alphabetic()
}

pub(crate) fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_ascii_alphanumeric()
}

pub(crate) fn backtrack_err() -> ErrMode<ContextError> {
    ErrMode::Backtrack(ContextError::new())
}
