//! The lexer: source text in, token stream out. Simple tokens are built
//! from nom combinators; the stateful pieces (nested comment regions and
//! quoted literals) are scanned by hand so their failures can carry the
//! right error.

use crate::{ast::Token, error::CompileError, Compiler};
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, opt},
    error::ErrorKind,
    sequence::preceded,
    IResult,
};

type LexResult<'a, T> = IResult<&'a str, T>;

fn is_digit_sep(c: char) -> bool {
    c.is_ascii_digit() || c == '_'
}

fn is_hex_sep(c: char) -> bool {
    c.is_ascii_hexdigit() || c == '_'
}

fn is_bin_sep(c: char) -> bool {
    c == '0' || c == '1' || c == '_'
}

/// Word characters are everything that cannot open another token kind.
fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '[' | ']' | '{' | '}' | '"' | '\'')
}

/// The slice of `input` consumed so far, given the remaining tail.
fn consumed<'a>(input: &'a str, rest: &str) -> &'a str {
    &input[..input.len() - rest.len()]
}

fn whitespace(input: &str) -> LexResult<'_, Token> {
    map(take_while1(|c: char| c.is_whitespace()), |_| {
        Token::Whitespace
    })(input)
}

fn bracket(input: &str) -> LexResult<'_, Token> {
    map(alt((char('['), char(']'))), Token::Bracket)(input)
}

/// Numeric literals: an optional leading `-`, digits, then one of the
/// suffix forms (`x` plus hex digits, `b` plus bits, `.` plus digits) or
/// nothing for a plain integer. Underscores may separate digits anywhere.
fn number(input: &str) -> LexResult<'_, Token> {
    let (after_sign, _) = opt(char('-'))(input)?;
    let (rest, digits) = take_while1(is_digit_sep)(after_sign)?;
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(nom::Err::Error((input, ErrorKind::Digit)));
    }

    let hex: LexResult<'_, &str> = preceded(char('x'), take_while1(is_hex_sep))(rest);
    if let Ok((rest, _)) = hex {
        return Ok((rest, Token::Hex(consumed(input, rest).to_string())));
    }
    let bin: LexResult<'_, &str> = preceded(char('b'), take_while1(is_bin_sep))(rest);
    if let Ok((rest, _)) = bin {
        return Ok((rest, Token::Bin(consumed(input, rest).to_string())));
    }
    let frac: LexResult<'_, &str> = preceded(char('.'), take_while1(is_digit_sep))(rest);
    if let Ok((rest, _)) = frac {
        return Ok((rest, Token::Float(consumed(input, rest).to_string())));
    }
    Ok((rest, Token::Int(consumed(input, rest).to_string())))
}

fn word(input: &str) -> LexResult<'_, Token> {
    map(take_while1(is_word_char), |s: &str| Token::Word(s.into()))(input)
}

fn token(input: &str) -> LexResult<'_, Token> {
    alt((whitespace, bracket, number, word))(input)
}

/// Skips a comment region starting at the opening brace. Braces nest;
/// running out of input before the region closes is an error.
fn skip_comment(input: &str) -> Result<&str, CompileError> {
    let mut depth = 0i32;
    for (i, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&input[i + 1..]);
                }
            }
            _ => {}
        }
    }
    Err(CompileError::UnclosedComment)
}

/// Scans a quoted literal. `input` starts at the opening quote; returns the
/// remaining input and the raw content between the quotes, escapes still in
/// place.
fn quoted(input: &str, quote: char) -> Result<(&str, &str), CompileError> {
    let body = &input[1..];
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&body[i + 1..], &body[..i]));
        }
    }
    Err(CompileError::UnterminatedLiteral(if quote == '"' {
        "string"
    } else {
        "character"
    }))
}

/// Resolves the escape sequences in raw quoted content: `\n \r \t \\ \' \"`
/// and `\x` followed by two hex digits.
fn unescape(raw: &str) -> Result<String, CompileError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('x') => {
                let hi = chars.next().and_then(|c| c.to_digit(16));
                let lo = chars.next().and_then(|c| c.to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push((hi * 16 + lo) as u8 as char),
                    _ => return Err(CompileError::BadEscape("x".into())),
                }
            }
            Some(other) => return Err(CompileError::BadEscape(other.to_string())),
            None => return Err(CompileError::BadEscape(String::new())),
        }
    }
    Ok(out)
}

pub(crate) fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    // Terminate virtually so the final token closes cleanly.
    let mut padded = String::with_capacity(source.len() + 1);
    padded.push_str(source);
    padded.push('\n');

    let mut tokens = Vec::new();
    let mut input = padded.as_str();
    while !input.is_empty() {
        if input.starts_with('{') {
            input = skip_comment(input)?;
        } else if input.starts_with('}') {
            return Err(CompileError::UnbalancedComment);
        } else if input.starts_with('"') {
            let (rest, raw) = quoted(input, '"')?;
            tokens.push(Token::Str(unescape(raw)?));
            input = rest;
        } else if input.starts_with('\'') {
            let (rest, raw) = quoted(input, '\'')?;
            let text = unescape(raw)?;
            let mut content = text.chars();
            match (content.next(), content.next()) {
                (Some(c), None) => tokens.push(Token::Char(c)),
                _ => return Err(CompileError::CharLiteralLength(text.chars().count())),
            }
            input = rest;
        } else {
            match token(input) {
                Ok((rest, tok)) => {
                    tokens.push(tok);
                    input = rest;
                }
                Err(_) => {
                    let c = input.chars().next().unwrap_or('\0');
                    return Err(CompileError::UnexpectedChar(c));
                }
            }
        }
    }
    Ok(tokens)
}

impl<'a> Compiler<&'a str> {
    /// Scans the source text into a token stream.
    pub(crate) fn lex(self) -> Result<Compiler<Vec<Token>>, CompileError> {
        let tokens = lex(self.0)?;
        log::debug!("lexed {} tokens", tokens.len());
        Ok(Compiler(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lexes and drops the whitespace tokens, which most assertions don't
    /// care about.
    fn lex_dense(source: &str) -> Vec<Token> {
        lex(source)
            .unwrap()
            .into_iter()
            .filter(|t| *t != Token::Whitespace)
            .collect()
    }

    #[test]
    fn test_brackets_and_words() {
        assert_eq!(
            lex_dense("[<- x 'b']"),
            vec![
                Token::Bracket('['),
                Token::Word("<-".into()),
                Token::Word("x".into()),
                Token::Char('b'),
                Token::Bracket(']'),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex_dense("1 -42 1_000 3.25 -0.5 0x1F 0b1010 2x_FF"),
            vec![
                Token::Int("1".into()),
                Token::Int("-42".into()),
                Token::Int("1_000".into()),
                Token::Float("3.25".into()),
                Token::Float("-0.5".into()),
                Token::Hex("0x1F".into()),
                Token::Bin("0b1010".into()),
                Token::Hex("2x_FF".into()),
            ]
        );
    }

    #[test]
    fn test_minus_alone_is_a_word() {
        assert_eq!(
            lex_dense("[- 5 3]"),
            vec![
                Token::Bracket('['),
                Token::Word("-".into()),
                Token::Int("5".into()),
                Token::Int("3".into()),
                Token::Bracket(']'),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex_dense(r#""a\n\t\x41\\\"""#),
            vec![Token::Str("a\n\tA\\\"".into())]
        );
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(lex_dense("'b'"), vec![Token::Char('b')]);
        assert_eq!(lex_dense(r"'\n'"), vec![Token::Char('\n')]);
        assert!(matches!(
            lex("'ab'"),
            Err(CompileError::CharLiteralLength(2))
        ));
        assert!(matches!(lex("''"), Err(CompileError::CharLiteralLength(0))));
    }

    #[test]
    fn test_bad_escape() {
        assert!(matches!(lex(r#""\q""#), Err(CompileError::BadEscape(_))));
        assert!(matches!(lex(r#""\xZ9""#), Err(CompileError::BadEscape(_))));
    }

    #[test]
    fn test_comments_nest() {
        assert_eq!(
            lex_dense("a { skip { deeper } still } b"),
            vec![Token::Word("a".into()), Token::Word("b".into())]
        );
        assert!(matches!(lex("{ open"), Err(CompileError::UnclosedComment)));
        assert!(matches!(
            lex("closed }"),
            Err(CompileError::UnbalancedComment)
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            lex("\"runs off"),
            Err(CompileError::UnterminatedLiteral("string"))
        ));
    }

    #[test]
    fn test_final_token_closes() {
        // No trailing whitespace in the input; the virtual newline closes
        // the word.
        assert_eq!(lex_dense("word"), vec![Token::Word("word".into())]);
    }
}
