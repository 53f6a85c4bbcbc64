//! All error-related compiler types.
//!
//! Every failure is fatal and first-wins: each pipeline stage returns the
//! first [CompileError] it hits and the driver aborts. The errors indicate a
//! flaw in the program being compiled, _not_ an internal compiler error.
//! Compiler bugs will always cause a panic.

use serde::Serialize;
use thiserror::Error;

/// An error that occurs while compiling a program. Source positions are not
/// tracked, so the message alone has to describe the problem.
#[derive(Debug, Error, Serialize)]
pub enum CompileError {
    /// A character that cannot start any token
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    /// A quoted literal ran to the end of the input
    #[error("unterminated {0} literal")]
    UnterminatedLiteral(&'static str),
    /// A brace-comment region was never closed
    #[error("unclosed comment at end of input")]
    UnclosedComment,
    /// A comment close with no matching open, i.e. the nesting count went
    /// negative
    #[error("comment close without a matching open")]
    UnbalancedComment,
    /// A character literal whose content is not exactly one code point
    #[error("character literal must contain exactly one character, found {0}")]
    CharLiteralLength(usize),
    /// A backslash escape the lexer does not recognize
    #[error("malformed escape sequence `\\{0}`")]
    BadEscape(String),
    /// A numeric literal the numeric reader could not convert
    #[error("malformed numeric literal `{0}`")]
    BadNumber(String),
    /// An AST node did not have the shape a consumer demanded. Structural
    /// parse problems (e.g. unbalanced brackets) surface this way.
    #[error("expected {expected}, found `{found}`")]
    NodeCast { expected: String, found: String },
    /// A type expression referenced a name with no definition
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// Two type declarations share a name (the builtins count)
    #[error("duplicate type name `{0}`")]
    DuplicateType(String),
    /// The declaration fixpoint made no progress with work remaining
    #[error("too many type construction failures")]
    TypeConstructionStalled,
    /// Two function declarations share a name
    #[error("duplicate function name `{0}`")]
    DuplicateFunction(String),
    /// An operator or call with the wrong number of operands
    #[error("wrong number of operands for `{form}`: expected {expected}, found {found}")]
    WrongOperandCount {
        form: String,
        expected: String,
        found: usize,
    },
    /// An operand whose type does not fit where it is used
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },
    /// A list head that is neither a known form nor a declared function
    #[error("unknown operator or function `{0}`")]
    UnknownOperator(String),
    /// A variable reference with no declaration in scope
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    /// A `.name` word that names no special constant
    #[error("unknown special constant `.{0}`")]
    UnknownSpecial(String),
    /// A field selector that the struct does not define
    #[error("type `{0}` has no field `{1}`")]
    UnknownField(String, String),
    /// A `.` selector applied through a non-struct type
    #[error("field access through non-struct type `{0}`")]
    AccessNonStruct(String),
    /// A `$` applied to a value that is not a pointer
    #[error("cannot dereference non-pointer type `{0}`")]
    DerefNonPointer(String),
    /// An `@` applied to a value that is not a pointer
    #[error("cannot offset non-pointer type `{0}`")]
    OffsetNonPointer(String),
    /// An `@@` whose operand is not a pointer to an array
    #[error("`@@` requires a pointer to an array, found `{0}`")]
    OffsetNonArrayPointer(String),
    /// A `print` operand outside the printable types
    #[error("cannot print value of type `{0}`")]
    UnprintableType(String),
    /// Float types exist in the type model but have no code generation
    #[error("floating-point expressions are not supported")]
    FloatUnsupported,
    /// The program declares no `main` to branch to at startup
    #[error("no function named `main`")]
    MissingMain,
}
