//! Integration tests for programs that compile successfully. Each test
//! drives the public `compile` entry point and asserts over the emitted
//! listing.

use brasm::compile;
use std::collections::HashSet;

/// Compiles the source, panicking with the error message on failure.
fn expect_asm(src: &str) -> String {
    match compile(src) {
        Ok(listing) => listing,
        Err(err) => panic!("compile failed: {}", err),
    }
}

/// Counts backward branches: plain `B` lines whose target label was
/// defined on an earlier line. The copy helper's loop contributes exactly
/// one.
fn back_edge_count(asm: &str) -> usize {
    let mut defined = HashSet::new();
    let mut count = 0;
    for line in asm.lines() {
        if let Some(label) = line.strip_suffix(':') {
            defined.insert(label.to_string());
        } else if let Some(target) = line.strip_prefix("B ") {
            if defined.contains(target) {
                count += 1;
            }
        }
    }
    count
}

/// Every branch target must be defined somewhere in the listing.
fn assert_branch_targets_defined(asm: &str) {
    let defined: HashSet<&str> = asm.lines().filter_map(|l| l.strip_suffix(':')).collect();
    for line in asm.lines() {
        for prefix in &["B ", "BL ", "BEQ ", "BNE ", "BGT ", "BLT "] {
            if let Some(target) = line.strip_prefix(prefix) {
                assert!(
                    defined.contains(target),
                    "undefined branch target in `{}`",
                    line
                );
            }
        }
    }
}

/// After coalescing, no two label lines may sit next to each other.
fn assert_no_adjacent_labels(asm: &str) {
    let lines: Vec<&str> = asm.lines().collect();
    for pair in lines.windows(2) {
        assert!(
            !(pair[0].ends_with(':') && pair[1].ends_with(':')),
            "adjacent labels: `{}` / `{}`",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_char_store_and_print() {
    let asm = expect_asm(
        "[] [[[void] main [] [do [ [[char] x] ] [ [<- x 'b'] [print $x] [return] ] ] ]]",
    );
    // The char literal lands byte-wide in the frame, then goes out through
    // the char I/O location.
    assert!(asm.contains("MOV R0,#98\nSTRB R0,[SP+8]"), "{}", asm);
    assert!(asm.contains("LDRB R0,[SP+8]\nSTRB R0,.WriteChar"), "{}", asm);
    assert!(asm.contains("HALT"));
    // The only loop in this program is the copy helper.
    assert_eq!(back_edge_count(&asm), 1);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_struct_field_stores() {
    let asm = expect_asm(
        "[ [Pair [struct [ [[int] a] [[int] b] ]]] ] \
         [[[int] main [] [do [ [[Pair] p] ] [ \
            [<- [. p a] 5] \
            [<- [. p b] 6] \
            [return [$ [. p a]]] ]]]]",
    );
    // Field selectors add the word-padded positions 0 and 4 onto the
    // struct pointer.
    assert!(asm.contains("ADD R0,R0,#0"), "{}", asm);
    assert!(asm.contains("ADD R0,R0,#4"), "{}", asm);
    // Word-sized stores go straight through the pointer.
    assert!(asm.contains("STR R0,[R1]"), "{}", asm);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_recursive_type_compiles() {
    expect_asm("[ [Node [struct [ [[int] v] [[ptr Node] n] ]]] ] [[[void] main [] [return]]]");
}

#[test]
fn test_add_chain_repeats() {
    let asm = expect_asm("[] [[[int] main [] [return [+ 1 2 3]]]]");
    let adds = asm.matches("ADD R0,R0,R1").count();
    assert_eq!(adds, 2, "{}", asm);
}

#[test]
fn test_while_has_back_edge() {
    let asm = expect_asm(
        "[] [[[void] main [] [do [ [[int] i] ] [ \
            [<- i 0] \
            [while [< $i 3] [do [[print $i] [<- i [+ $i 1]]]]] \
            [return] ]]]]",
    );
    // The copy helper's loop plus the while loop itself.
    assert_eq!(back_edge_count(&asm), 2, "{}", asm);
    assert!(asm.contains("BEQ label__"), "{}", asm);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_call_balances_sp() {
    let asm = expect_asm(
        "[] [[[int] add2 [ [[int] a] [[int] b] ] [return [+ $a $b]]] \
            [[int] main [] [return [add2 1 2]]]]",
    );
    let advances = asm.matches("ADD SP,SP,#").count();
    let retreats = asm.matches("SUB SP,SP,#").count();
    assert!(advances >= 1);
    assert_eq!(advances, retreats, "{}", asm);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_string_literal_lands_in_data() {
    let asm = expect_asm("[] [[[void] main [] [do [ [print \"hi\\n\"] [return] ]]]]");
    assert!(asm.contains(".ASCIZ \"hi\\n\""), "{}", asm);
    assert!(asm.contains("STR R0,.WriteString"), "{}", asm);
    // Data comes after all code; the stack label closes the listing.
    let asciz_at = asm.find(".ASCIZ").unwrap();
    let last_ret_at = asm.rfind("RET").unwrap();
    assert!(asciz_at > last_ret_at, "{}", asm);
    assert!(asm.lines().last().unwrap().ends_with(':'), "{}", asm);
    assert!(asm.contains(".ALIGN 4"), "{}", asm);
}

#[test]
fn test_print_variants() {
    let asm = expect_asm(
        "[] [[[void] main [] [do [ [[array [char] 4] s] ] [ \
            [print 42] \
            [print $s] \
            [return] ]]]]",
    );
    assert!(asm.contains("STR R0,.WriteSignedNum"), "{}", asm);
    assert!(asm.contains("STR R0,.WriteString"), "{}", asm);
}

#[test]
fn test_operator_smoke() {
    let asm = expect_asm(
        "[] [[[int] main [] [do [ [[int] a] [[int] b] ] [ \
            [<- a 5] \
            [<- b [? [< $a 10] 1 0]] \
            [<- b [&& $b [! [== $a 6]]]] \
            [<- [@ b 0] [+ $b [size_of [int]]]] \
            [<- a [cast [int] $a]] \
            [return $b] ]]]]",
    );
    assert_branch_targets_defined(&asm);
    assert_no_adjacent_labels(&asm);
}

#[test]
fn test_arith_and_bit_ops() {
    let asm = expect_asm(
        "[] [[[int] main [] [return [+ [* 6 7] [/ 20 6] [% 20 6] \
            [>> -8 2] [>>> 8 2] [<< 1 3] [& 6 3] [| 4 1] [^ 5 1]]]]]",
    );
    // The division loop tracks the result sign as an xor in R3.
    assert!(asm.contains("XOR R3,R3,R2"), "{}", asm);
    assert!(asm.contains("LSL R0,R0,R1"), "{}", asm);
    assert!(asm.contains("LSR R0,R0,R1"), "{}", asm);
    assert!(asm.contains("AND R0,R0,R1"), "{}", asm);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_if_skip_and_end_labels_coalesce() {
    // An else-less `if` emits its skip label directly against the end
    // label; the linker must fold them into one.
    let asm = expect_asm(
        "[] [[[void] main [] [do [ \
            [if [< 1 2] [print 1]] \
            [return] ]]]]",
    );
    assert_no_adjacent_labels(&asm);
    assert_branch_targets_defined(&asm);
}

#[test]
fn test_startup_stub_shape() {
    let asm = expect_asm("[] [[[void] main [] [return]]]");
    let lines: Vec<&str> = asm.lines().collect();
    assert!(lines[0].starts_with("MOV SP,#label__"), "{}", asm);
    assert!(lines[1].starts_with("BL label__"), "{}", asm);
    assert_eq!(lines[2], "HALT");
}
