//! The token and syntax-tree types the front end produces. There is no
//! functionality implemented here beyond structural accessors and display;
//! just basic types.

use crate::error::CompileError;
use crate::util::escape_text;
use serde::Serialize;
use std::fmt;

/// One lexical token. Numeric variants keep the raw matched text (sign and
/// `_` separators included); the parser's numeric reader converts them.
/// String and char payloads are stored with escapes already resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Token {
    /// A run of whitespace. Only a token boundary; the parser skips it.
    Whitespace,
    /// A single `[` or `]`
    Bracket(char),
    Word(String),
    Str(String),
    Char(char),
    Int(String),
    Float(String),
    Hex(String),
    Bin(String),
}

/// One node of the program syntax tree. The top-level program is a List of
/// exactly two Lists: type declarations, then function declarations.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Element {
    List(Vec<Element>),
    Word(String),
    Str(String),
    Char(char),
    Int(i32),
    Float(f32),
}

impl Element {
    /// Casts this node to a list, or reports the shape mismatch. Malformed
    /// programs (e.g. unbalanced brackets) fail here rather than in the
    /// parser.
    pub fn as_list(&self) -> Result<&[Element], CompileError> {
        match self {
            Element::List(items) => Ok(items),
            _ => Err(self.cast_error("a list")),
        }
    }

    /// Casts this node to a word.
    pub fn as_word(&self) -> Result<&str, CompileError> {
        match self {
            Element::Word(word) => Ok(word),
            _ => Err(self.cast_error("a word")),
        }
    }

    /// Casts this node to an integer literal.
    pub fn as_int(&self) -> Result<i32, CompileError> {
        match self {
            Element::Int(value) => Ok(*value),
            _ => Err(self.cast_error("an integer")),
        }
    }

    /// Indexes into this node as a list.
    pub fn child(&self, index: usize) -> Result<&Element, CompileError> {
        self.as_list()?.get(index).ok_or_else(|| {
            self.cast_error(&format!("a list of at least {} elements", index + 1))
        })
    }

    fn cast_error(&self, expected: &str) -> CompileError {
        CompileError::NodeCast {
            expected: expected.to_string(),
            found: self.to_string(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Element::Word(word) => write!(f, "{}", word),
            Element::Str(text) => write!(f, "\"{}\"", escape_text(text)),
            Element::Char(c) => write!(f, "'{}'", escape_text(&c.to_string())),
            Element::Int(value) => write!(f, "{}", value),
            Element::Float(value) => write!(f, "{:?}", value),
        }
    }
}
