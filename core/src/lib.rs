//! Whole-program compiler for a small statically typed, bracket-delimited
//! S-expression language, targeting a simplified ARM-like assembly listing.
//! The main usage of this crate is [compile]: one source file in, one
//! assembly listing out.
//!
//! ```
//! let listing = brasm::compile("[] [[[void] main [] [return]]]").unwrap();
//! assert!(listing.contains("HALT"));
//! ```
//!
//! A program is two bracketed sections, type declarations then function
//! declarations. Compilation walks a fixed pipeline: lex, parse, resolve
//! the type table (with a fixpoint so pointer targets may be declared
//! later), register the function table, generate code function by
//! function, then link and serialize.

#![deny(clippy::all, unused_must_use)]

pub mod asm;
pub mod ast;
mod consts;
mod error;
mod generate;
mod lex;
mod link;
mod parse;
mod register;
mod resolve;
mod ty;
mod util;

pub use error::CompileError;

use std::fmt::Debug;

/// Compiles a source program into its assembly listing, or reports the
/// first error hit.
pub fn compile(source: &str) -> Result<String, CompileError> {
    Ok(Compiler::new(source)
        .lex()?
        .debug()
        .parse()?
        .debug()
        .resolve_types()?
        .debug()
        .register_functions()?
        .debug()
        .generate()?
        .debug()
        .link()?
        .debug()
        .serialize())
}

/// Struct to contain all compiler pipeline steps. By having this on a
/// struct, it makes it nice and easy to call functions in order with
/// readability. Each compiler step takes a `self` param and returns a new
/// `Compiler`.
///
/// `T` is the current state of the program, which controls which pipeline
/// stages can be called next; the type system enforces the stage order.
/// The value is deliberately private so a compiler cannot be constructed
/// mid-pipeline from outside this crate.
#[derive(Debug)]
struct Compiler<T: Debug>(T);

impl<T: Debug> Compiler<T> {
    /// Traces the current state of this compiler. Takes in self and
    /// returns the same value, so it slots into the pipeline chain.
    fn debug(self) -> Self {
        log::trace!("{:?}", self.0);
        self
    }
}

impl<'a> Compiler<&'a str> {
    /// Starts a fresh compiler pipeline on the given source.
    fn new(source: &'a str) -> Self {
        Compiler(source)
    }
}
