//! The parser: token stream in, syntax tree out. `[` opens a nested list,
//! `]` closes the current one, every other token appends a leaf. There is
//! no bracket-balance check; a malformed tree surfaces later as a node-cast
//! failure wherever a stage indexes into it.

use crate::{
    ast::{Element, Token},
    error::CompileError,
    Compiler,
};

/// Converts a decimal literal's text, tolerating `_` separators.
fn read_int(text: &str) -> Result<i32, CompileError> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    cleaned
        .parse()
        .map_err(|_| CompileError::BadNumber(text.to_string()))
}

/// Converts a radix-suffix literal (`<digits>x<hex>` or `<digits>b<bits>`).
/// The value is the suffix read at the given radix; the digit prefix is
/// accepted and ignored. Reading through u32 lets full-width bit patterns
/// land as negative ints.
fn read_radix(text: &str, sep: char, radix: u32) -> Result<i32, CompileError> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let suffix = body
        .splitn(2, sep)
        .nth(1)
        .ok_or_else(|| CompileError::BadNumber(text.to_string()))?;
    let value = u32::from_str_radix(suffix, radix)
        .map_err(|_| CompileError::BadNumber(text.to_string()))? as i32;
    Ok(if negative { value.wrapping_neg() } else { value })
}

fn read_float(text: &str) -> Result<f32, CompileError> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    cleaned
        .parse()
        .map_err(|_| CompileError::BadNumber(text.to_string()))
}

/// Parses elements until a closing bracket or the end of the stream, and
/// wraps them in a List. The outermost call builds the program root.
fn parse_list(tokens: &[Token], pos: &mut usize) -> Result<Element, CompileError> {
    let mut items = Vec::new();
    while *pos < tokens.len() {
        let token = &tokens[*pos];
        *pos += 1;
        match token {
            Token::Whitespace => {}
            Token::Bracket('[') => items.push(parse_list(tokens, pos)?),
            Token::Bracket(_) => break,
            Token::Word(word) => items.push(Element::Word(word.clone())),
            Token::Str(text) => items.push(Element::Str(text.clone())),
            Token::Char(c) => items.push(Element::Char(*c)),
            Token::Int(text) => items.push(Element::Int(read_int(text)?)),
            Token::Float(text) => items.push(Element::Float(read_float(text)?)),
            Token::Hex(text) => items.push(Element::Int(read_radix(text, 'x', 16)?)),
            Token::Bin(text) => items.push(Element::Int(read_radix(text, 'b', 2)?)),
        }
    }
    Ok(Element::List(items))
}

fn parse(tokens: &[Token]) -> Result<Element, CompileError> {
    let mut pos = 0;
    parse_list(tokens, &mut pos)
}

impl Compiler<Vec<Token>> {
    /// Builds the program syntax tree from the token stream.
    pub(crate) fn parse(self) -> Result<Compiler<Element>, CompileError> {
        Ok(Compiler(parse(&self.0)?))
    }
}
