//! Integration tests for programs that must fail to compile. Every test
//! drives the public `compile` entry point and matches on the error kind.

use brasm::{compile, CompileError};

/// Compiles the source, panicking if it unexpectedly succeeds.
fn expect_error(src: &str) -> CompileError {
    match compile(src) {
        Ok(listing) => panic!("expected a compile error, got:\n{}", listing),
        Err(err) => err,
    }
}

#[test]
fn test_missing_main() {
    assert!(matches!(expect_error("[] []"), CompileError::MissingMain));
    assert!(matches!(
        expect_error("[] [[[void] start [] [return]]]"),
        CompileError::MissingMain
    ));
}

#[test]
fn test_unknown_type() {
    assert!(matches!(
        expect_error("[] [[[Missing] main [] [return]]]"),
        CompileError::UnknownType(_)
    ));
}

#[test]
fn test_duplicate_type() {
    assert!(matches!(
        expect_error("[ [T [int]] [T [int]] ] [[[void] main [] [return]]]"),
        CompileError::DuplicateType(_)
    ));
}

#[test]
fn test_stalled_type_fixpoint() {
    assert!(matches!(
        expect_error("[ [A [B]] ] [[[void] main [] [return]]]"),
        CompileError::TypeConstructionStalled
    ));
}

#[test]
fn test_store_type_mismatch() {
    let err = expect_error(
        "[] [[[void] main [] [do [ [[int] x] ] [ [<- x 'a'] [return] ]]]]",
    );
    assert!(matches!(err, CompileError::TypeMismatch { .. }), "{}", err);
}

#[test]
fn test_store_to_non_pointer() {
    let err = expect_error("[] [[[void] main [] [do [ [<- 5 5] [return] ]]]]");
    assert!(matches!(err, CompileError::TypeMismatch { .. }), "{}", err);
}

#[test]
fn test_return_type_mismatch() {
    assert!(matches!(
        expect_error("[] [[[int] main [] [return]]]"),
        CompileError::TypeMismatch { .. }
    ));
    assert!(matches!(
        expect_error("[] [[[void] main [] [return 5]]]"),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_condition_must_be_int() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [if 'a' [return]] [return] ]]]]"),
        CompileError::TypeMismatch { .. }
    ));
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [while 'a' [return]] [return] ]]]]"),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_equality_operand_mismatch() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [== 1 'a'] [return] ]]]]"),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_unknown_function() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [nope] [return] ]]]]"),
        CompileError::UnknownOperator(_)
    ));
}

#[test]
fn test_call_arity() {
    assert!(matches!(
        expect_error(
            "[] [[[int] add2 [ [[int] a] [[int] b] ] [return [+ $a $b]]] \
                [[void] main [] [do [ [add2 1] [return] ]]]]"
        ),
        CompileError::WrongOperandCount { .. }
    ));
}

#[test]
fn test_unknown_variable() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [print $nope] [return] ]]]]"),
        CompileError::UnknownVariable(_)
    ));
}

#[test]
fn test_unknown_special_constant() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [print .Bogus] [return] ]]]]"),
        CompileError::UnknownSpecial(_)
    ));
}

#[test]
fn test_deref_non_pointer() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [$ 5] [return] ]]]]"),
        CompileError::DerefNonPointer(_)
    ));
}

#[test]
fn test_field_access_through_non_struct() {
    assert!(matches!(
        expect_error(
            "[] [[[void] main [] [do [ [[int] x] ] [ [<- [. x a] 5] [return] ]]]]"
        ),
        CompileError::AccessNonStruct(_)
    ));
}

#[test]
fn test_indexed_offset_needs_array_pointer() {
    assert!(matches!(
        expect_error(
            "[] [[[void] main [] [do [ [[int] x] ] [ [<- [@@ x 0] 5] [return] ]]]]"
        ),
        CompileError::OffsetNonArrayPointer(_)
    ));
}

#[test]
fn test_unprintable_type() {
    assert!(matches!(
        expect_error(
            "[ [P [struct [ [[int] a] ]]] ] \
             [[[void] main [] [do [ [[P] p] ] [ [print $p] [return] ]]]]"
        ),
        CompileError::UnprintableType(_)
    ));
}

#[test]
fn test_float_literals_have_no_codegen() {
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [print 1.5] [return] ]]]]"),
        CompileError::FloatUnsupported
    ));
}

#[test]
fn test_lex_errors_abort() {
    assert!(matches!(
        expect_error("{ never closed"),
        CompileError::UnclosedComment
    ));
    assert!(matches!(
        expect_error("[] [[[void] main [] [do [ [print 'ab'] [return] ]]]]"),
        CompileError::CharLiteralLength(2)
    ));
}

#[test]
fn test_error_messages_are_descriptive() {
    assert_eq!(expect_error("[] []").to_string(), "no function named `main`");
    assert_eq!(
        expect_error("[] [[[Missing] main [] [return]]]").to_string(),
        "unknown type `Missing`"
    );
}
