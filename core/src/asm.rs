//! The target assembly representation. Every piece is a closed sum with a
//! `Display` impl that produces the target syntax; serializing a program is
//! just displaying its lines joined by newlines.

use crate::util::escape_text;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LABEL_ID: AtomicU64 = AtomicU64::new(0);

/// A position in the emitted code. Labels are value-identity objects: every
/// clone of a handle refers to the same id cell, which is what lets the
/// linker retarget a label during coalescing and have all references
/// follow. Ids are process-unique and monotonic.
#[derive(Clone)]
pub struct Label(Rc<Cell<u64>>);

impl Label {
    pub fn fresh() -> Label {
        Label(Rc::new(Cell::new(
            NEXT_LABEL_ID.fetch_add(1, Ordering::Relaxed),
        )))
    }

    pub fn id(&self) -> u64 {
        self.0.get()
    }

    /// Gives this label the id of another. Used by the coalescing pass so
    /// every handle pointing here starts rendering the surviving label.
    pub(crate) fn assign_id_of(&self, survivor: &Label) {
        self.0.set(survivor.id());
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Label) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label__{:032x}", self.id())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.id())
    }
}

/// A register by name.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Register {
    Pc,
    Lr,
    Sp,
    R(u8),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Pc => write!(f, "PC"),
            Register::Lr => write!(f, "LR"),
            Register::Sp => write!(f, "SP"),
            Register::R(n) => write!(f, "R{}", n),
        }
    }
}

/// A symbolic address the downstream target understands as memory-mapped
/// I/O. Usable both as a store destination and, `#`-prefixed, as an
/// immediate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SpecialConstant {
    WriteSignedNum,
    WriteChar,
    WriteString,
    PixelScreen,
}

impl SpecialConstant {
    pub fn from_name(name: &str) -> Option<SpecialConstant> {
        match name {
            "WriteSignedNum" => Some(SpecialConstant::WriteSignedNum),
            "WriteChar" => Some(SpecialConstant::WriteChar),
            "WriteString" => Some(SpecialConstant::WriteString),
            "PixelScreen" => Some(SpecialConstant::PixelScreen),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SpecialConstant::WriteSignedNum => "WriteSignedNum",
            SpecialConstant::WriteChar => "WriteChar",
            SpecialConstant::WriteString => "WriteString",
            SpecialConstant::PixelScreen => "PixelScreen",
        }
    }
}

impl fmt::Display for SpecialConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.name())
    }
}

/// A compile-time constant operand.
#[derive(Clone, Debug)]
pub enum Constant {
    Int(i32),
    Label(Label),
    Special(SpecialConstant),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Label(label) => write!(f, "{}", label),
            Constant::Special(special) => write!(f, "{}", special),
        }
    }
}

/// A register or an immediate, as the flexible operand of data
/// instructions.
#[derive(Clone, Debug)]
pub enum Value {
    Reg(Register),
    Imm(Constant),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(register) => write!(f, "{}", register),
            Value::Imm(constant) => write!(f, "#{}", constant),
        }
    }
}

/// The address operand of a load or store.
#[derive(Clone, Debug)]
pub enum MemoryLocation {
    /// `[reg]`
    Reg(Register),
    /// `[reg+n]` or `[reg-n]` by the sign of the offset
    Offset(Register, i32),
    /// A bare special symbol, e.g. `.WriteChar`
    Special(SpecialConstant),
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLocation::Reg(register) => write!(f, "[{}]", register),
            MemoryLocation::Offset(register, offset) => {
                if *offset < 0 {
                    write!(f, "[{}-{}]", register, -offset)
                } else {
                    write!(f, "[{}+{}]", register, offset)
                }
            }
            MemoryLocation::Special(special) => write!(f, "{}", special),
        }
    }
}

/// One target instruction.
#[derive(Clone, Debug)]
pub enum Instr {
    Mov(Register, Value),
    Ldr(Register, MemoryLocation),
    Ldrb(Register, MemoryLocation),
    Str(Register, MemoryLocation),
    Strb(Register, MemoryLocation),
    Add(Register, Register, Value),
    Sub(Register, Register, Value),
    Cmp(Register, Value),
    Lsl(Register, Register, Value),
    Lsr(Register, Register, Value),
    And(Register, Register, Value),
    Or(Register, Register, Value),
    Xor(Register, Register, Value),
    Beq(Label),
    Bne(Label),
    Bgt(Label),
    Blt(Label),
    B(Label),
    Bl(Label),
    Ret,
    Halt,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov(dst, value) => write!(f, "MOV {},{}", dst, value),
            Instr::Ldr(dst, loc) => write!(f, "LDR {},{}", dst, loc),
            Instr::Ldrb(dst, loc) => write!(f, "LDRB {},{}", dst, loc),
            Instr::Str(src, loc) => write!(f, "STR {},{}", src, loc),
            Instr::Strb(src, loc) => write!(f, "STRB {},{}", src, loc),
            Instr::Add(dst, lhs, rhs) => write!(f, "ADD {},{},{}", dst, lhs, rhs),
            Instr::Sub(dst, lhs, rhs) => write!(f, "SUB {},{},{}", dst, lhs, rhs),
            Instr::Cmp(lhs, rhs) => write!(f, "CMP {},{}", lhs, rhs),
            Instr::Lsl(dst, lhs, rhs) => write!(f, "LSL {},{},{}", dst, lhs, rhs),
            Instr::Lsr(dst, lhs, rhs) => write!(f, "LSR {},{},{}", dst, lhs, rhs),
            Instr::And(dst, lhs, rhs) => write!(f, "AND {},{},{}", dst, lhs, rhs),
            Instr::Or(dst, lhs, rhs) => write!(f, "OR {},{},{}", dst, lhs, rhs),
            Instr::Xor(dst, lhs, rhs) => write!(f, "XOR {},{},{}", dst, lhs, rhs),
            Instr::Beq(target) => write!(f, "BEQ {}", target),
            Instr::Bne(target) => write!(f, "BNE {}", target),
            Instr::Bgt(target) => write!(f, "BGT {}", target),
            Instr::Blt(target) => write!(f, "BLT {}", target),
            Instr::B(target) => write!(f, "B {}", target),
            Instr::Bl(target) => write!(f, "BL {}", target),
            Instr::Ret => write!(f, "RET"),
            Instr::Halt => write!(f, "HALT"),
        }
    }
}

/// One line of the output listing.
#[derive(Clone, Debug)]
pub enum Line {
    Label(Label),
    Instr(Instr),
    Align(i32),
    Asciz(String),
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Label(label) => write!(f, "{}:", label),
            Line::Instr(instr) => write!(f, "{}", instr),
            Line::Align(n) => write!(f, ".ALIGN {}", n),
            Line::Asciz(text) => write!(f, ".ASCIZ \"{}\"", escape_text(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display_is_32_hex() {
        let label = Label::fresh();
        let text = label.to_string();
        assert!(text.starts_with("label__"));
        assert_eq!(text.len(), "label__".len() + 32);
    }

    #[test]
    fn test_labels_compare_by_id() {
        let a = Label::fresh();
        let b = Label::fresh();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        b.assign_id_of(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn test_instruction_syntax() {
        assert_eq!(
            Instr::Mov(Register::R(0), Value::Imm(Constant::Int(98))).to_string(),
            "MOV R0,#98"
        );
        assert_eq!(
            Instr::Ldr(
                Register::Lr,
                MemoryLocation::Offset(Register::Sp, 4)
            )
            .to_string(),
            "LDR LR,[SP+4]"
        );
        assert_eq!(
            Instr::Strb(
                Register::R(0),
                MemoryLocation::Special(SpecialConstant::WriteChar)
            )
            .to_string(),
            "STRB R0,.WriteChar"
        );
        assert_eq!(
            Instr::Add(
                Register::Sp,
                Register::Sp,
                Value::Imm(Constant::Int(16))
            )
            .to_string(),
            "ADD SP,SP,#16"
        );
        assert_eq!(
            Instr::Cmp(Register::R(1), Value::Reg(Register::R(3))).to_string(),
            "CMP R1,R3"
        );
        assert_eq!(Instr::Halt.to_string(), "HALT");
    }

    #[test]
    fn test_special_as_immediate() {
        assert_eq!(
            Value::Imm(Constant::Special(SpecialConstant::WriteString)).to_string(),
            "#.WriteString"
        );
    }

    #[test]
    fn test_directive_lines() {
        assert_eq!(Line::Align(4).to_string(), ".ALIGN 4");
        assert_eq!(
            Line::Asciz("hi\n".to_string()).to_string(),
            ".ASCIZ \"hi\\n\""
        );
    }
}
