//! Line tokenizer for the reference machine's assembly.
//!
//! Built on logos. Whitespace, commas and `#` comments are skipped, so
//! `add $t0, 1, 2 # sum` and `add $t0 1 2` produce the same tokens.
//!
//! # Examples
//!
//! ```
//! # use simterm_engine::lexer::*;
//! let tokens = tokenize_line("loop: addi $t0 0x10").unwrap();
//! assert_eq!(tokens[1], Token::Colon);
//! ```

use logos::Logos;

/// Assembly token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f,]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    /// Label definition suffix `:`
    #[token(":")]
    Colon,

    /// Integer immediate, decimal or `0x` hexadecimal, optionally negative.
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"-?0[xX][0-9a-fA-F]+", parse_hex)]
    Integer(i64),

    /// Character immediate (e.g. `'a'`, `'\n'`)
    #[regex(r"'([^'\\]|\\.)'", |lex| {
        let s = lex.slice();
        let content = unescape(&s[1..s.len() - 1])?;
        let mut chars = content.chars();
        let c = chars.next()?;
        chars.next().is_none().then_some(c)
    })]
    Char(char),

    /// String immediate (e.g. `"hello\n"`)
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    String(String),

    /// Mnemonic, register or label name.
    ///
    /// The lexer does not tell registers from labels; the parser resolves a
    /// word against the register file and falls back to a label reference.
    #[regex(r"\$?[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Word(String),
}

fn parse_hex(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    let slice = lex.slice();
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    };
    let value = i64::from_str_radix(&digits[2..], 16).ok()?;
    Some(if negative { -value } else { value })
}

/// Unescape the content of a character or string immediate.
fn unescape(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Tokenize one source line.
///
/// Returns the offending slice on failure.
pub fn tokenize_line(line: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Token::lexer(line);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(lexer.slice().to_string()),
        }
    }
    Ok(tokens)
}
