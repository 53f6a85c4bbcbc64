//! The code generator. Every expression is compiled against a frame offset
//! (`at` below): the emitted code must leave the expression's result as the
//! first `size` bytes at `SP + at`. Sub-expression intermediates live at
//! higher offsets and are dead once their operator has consumed them, so
//! the result may overwrite its own operands. This one convention is the
//! contract every emitter in this module obeys.
//!
//! The register discipline is fixed: R0 through R3 are scratch, SP moves
//! only around calls, and LR is saved into the frame before any nested
//! `BL` can clobber it.

use crate::{
    asm::{Constant, Instr, Label, Line, MemoryLocation, Register, SpecialConstant, Value},
    ast::Element,
    consts::WORD_SIZE,
    error::CompileError,
    register::{Function, FunctionTable, RegisteredProgram},
    resolve::TypeTable,
    ty::{word_bytes, Field, Ty, TyKind},
    Compiler,
};
use std::collections::HashMap;

const R0: Register = Register::R(0);
const R1: Register = Register::R(1);
const R2: Register = Register::R(2);
const R3: Register = Register::R(3);
const SP: Register = Register::Sp;
const LR: Register = Register::Lr;

// Line-building shorthand. The emitters below read as instruction
// sequences, so these stay terse.

fn sp(offset: i32) -> MemoryLocation {
    MemoryLocation::Offset(SP, offset)
}

fn imm(value: i32) -> Value {
    Value::Imm(Constant::Int(value))
}

fn reg(register: Register) -> Value {
    Value::Reg(register)
}

fn mov(dst: Register, value: Value) -> Line {
    Line::Instr(Instr::Mov(dst, value))
}

fn ld(dst: Register, loc: MemoryLocation) -> Line {
    Line::Instr(Instr::Ldr(dst, loc))
}

fn ldb(dst: Register, loc: MemoryLocation) -> Line {
    Line::Instr(Instr::Ldrb(dst, loc))
}

fn st(src: Register, loc: MemoryLocation) -> Line {
    Line::Instr(Instr::Str(src, loc))
}

fn stb(src: Register, loc: MemoryLocation) -> Line {
    Line::Instr(Instr::Strb(src, loc))
}

fn add(dst: Register, lhs: Register, rhs: Value) -> Line {
    Line::Instr(Instr::Add(dst, lhs, rhs))
}

fn sub(dst: Register, lhs: Register, rhs: Value) -> Line {
    Line::Instr(Instr::Sub(dst, lhs, rhs))
}

fn cmp(lhs: Register, rhs: Value) -> Line {
    Line::Instr(Instr::Cmp(lhs, rhs))
}

fn beq(target: &Label) -> Line {
    Line::Instr(Instr::Beq(target.clone()))
}

fn bne(target: &Label) -> Line {
    Line::Instr(Instr::Bne(target.clone()))
}

fn bgt(target: &Label) -> Line {
    Line::Instr(Instr::Bgt(target.clone()))
}

fn blt(target: &Label) -> Line {
    Line::Instr(Instr::Blt(target.clone()))
}

fn b(target: &Label) -> Line {
    Line::Instr(Instr::B(target.clone()))
}

fn bl(target: &Label) -> Line {
    Line::Instr(Instr::Bl(target.clone()))
}

fn lbl(label: &Label) -> Line {
    Line::Label(label.clone())
}

/// The shared byte-copy helper: R0 the source address, R1 the destination,
/// R2 the byte count, R3 scratch. The entry label doubles as the loop head.
pub(crate) fn copy_subroutine(entry: &Label) -> Vec<Line> {
    let done = Label::fresh();
    vec![
        lbl(entry),
        cmp(R2, imm(0)),
        beq(&done),
        ldb(R3, MemoryLocation::Reg(R0)),
        stb(R3, MemoryLocation::Reg(R1)),
        add(R0, R0, imm(1)),
        add(R1, R1, imm(1)),
        sub(R2, R2, imm(1)),
        b(entry),
        lbl(&done),
        Line::Instr(Instr::Ret),
    ]
}

/// What compiling one expression produced: instructions, data-stream lines
/// (string labels and their `.ASCIZ` bodies, appended after all code by the
/// linker) and the result type.
struct Emitted {
    code: Vec<Line>,
    data: Vec<Line>,
    ty: Ty,
}

impl Emitted {
    fn new(code: Vec<Line>, ty: Ty) -> Emitted {
        Emitted {
            code,
            data: Vec::new(),
            ty,
        }
    }
}

/// The lexical variable table: parameters at the root, one child scope per
/// `do` declaration block.
struct Scope<'a> {
    vars: HashMap<String, Field>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn root() -> Scope<'static> {
        Scope {
            vars: HashMap::new(),
            parent: None,
        }
    }

    fn child(&self) -> Scope<'_> {
        Scope {
            vars: HashMap::new(),
            parent: Some(self),
        }
    }

    fn insert(&mut self, field: Field) {
        self.vars.insert(field.name.clone(), field);
    }

    fn lookup(&self, name: &str) -> Option<&Field> {
        self.vars
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }
}

/// Which half of the division loop's outcome an operator wants.
#[derive(Copy, Clone)]
enum DivResult {
    Quotient,
    Remainder,
}

/// The per-function emitter. Holds the immutable tables, the shared copy
/// label and the function being compiled (whose return type `return`
/// checks against).
struct FnEmitter<'a> {
    types: &'a TypeTable,
    functions: &'a FunctionTable,
    copy: &'a Label,
    func: &'a Function,
}

impl<'a> FnEmitter<'a> {
    /// Entry label, the LR save, then the body. Locals begin past the
    /// parameter block; only a `return` form emits the epilogue, so a body
    /// without one falls through.
    fn function(&self) -> Result<Emitted, CompileError> {
        let mut scope = Scope::root();
        for param in &self.func.params {
            scope.insert(param.clone());
        }
        let at = self.func.total_parameter_size() + self.func.return_type.size() + WORD_SIZE;
        let body = self.expression(&self.func.body, &scope, at)?;

        let mut code = vec![
            lbl(&self.func.entry),
            st(LR, sp(self.func.return_type.size())),
        ];
        code.extend(body.code);
        Ok(Emitted {
            code,
            data: body.data,
            ty: body.ty,
        })
    }

    fn expression(
        &self,
        expr: &Element,
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        match expr {
            Element::Int(value) => Ok(Emitted::new(
                vec![mov(R0, imm(*value)), st(R0, sp(at))],
                Ty::int(),
            )),
            Element::Char(c) => Ok(Emitted::new(
                vec![mov(R0, imm(*c as i32)), stb(R0, sp(at))],
                Ty::of(TyKind::Char),
            )),
            Element::Str(text) => Ok(self.string_literal(text, at)),
            Element::Float(_) => Err(CompileError::FloatUnsupported),
            Element::Word(word) => self.word(word, scope, at),
            Element::List(_) => self.form(expr, scope, at),
        }
    }

    /// A fresh data label for the string body; the expression's value is
    /// the label's address.
    fn string_literal(&self, text: &str, at: i32) -> Emitted {
        let label = Label::fresh();
        Emitted {
            code: vec![
                mov(R0, Value::Imm(Constant::Label(label.clone()))),
                st(R0, sp(at)),
            ],
            data: vec![lbl(&label), Line::Asciz(text.to_string())],
            ty: Ty::ptr(Ty::of(TyKind::Char)),
        }
    }

    /// Leaf words: `.name` is a special constant, `$name` reads a
    /// variable's value, a bare name takes the variable's address.
    fn word(&self, word: &str, scope: &Scope<'_>, at: i32) -> Result<Emitted, CompileError> {
        if let Some(name) = word.strip_prefix('.') {
            let special = SpecialConstant::from_name(name)
                .ok_or_else(|| CompileError::UnknownSpecial(name.to_string()))?;
            return Ok(Emitted::new(
                vec![
                    mov(R0, Value::Imm(Constant::Special(special))),
                    st(R0, sp(at)),
                ],
                Ty::ptr(Ty::int()),
            ));
        }
        if let Some(name) = word.strip_prefix('$') {
            let var = self.variable(scope, name)?;
            return Ok(Emitted::new(
                vec![
                    add(R0, SP, imm(var.position)),
                    add(R1, SP, imm(at)),
                    mov(R2, imm(var.ty.size())),
                    bl(self.copy),
                ],
                var.ty,
            ));
        }
        let var = self.variable(scope, word)?;
        Ok(Emitted::new(
            vec![add(R0, SP, imm(var.position)), st(R0, sp(at))],
            Ty::ptr(var.ty),
        ))
    }

    fn variable(&self, scope: &Scope<'_>, name: &str) -> Result<Field, CompileError> {
        scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownVariable(name.to_string()))
    }

    /// Dispatches a list expression by its head word.
    fn form(&self, expr: &Element, scope: &Scope<'_>, at: i32) -> Result<Emitted, CompileError> {
        let items = expr.as_list()?;
        let head = match items.first() {
            Some(head) => head.as_word()?,
            None => {
                return Err(CompileError::NodeCast {
                    expected: "an operator".to_string(),
                    found: expr.to_string(),
                })
            }
        };
        match head {
            "do" => self.do_block(items, scope, at),
            "return" => self.return_form(items, scope, at),
            "<-" => self.store(items, scope, at),
            "if" => self.if_form(items, scope, at),
            "while" => self.while_form(items, scope, at),
            "print" => self.print(items, scope, at),
            "cast" => self.cast(items, scope, at),
            "$" => self.deref(items, scope, at),
            "@" => self.pointer_offset(items, scope, at, false),
            "@@" => self.pointer_offset(items, scope, at, true),
            "?" => self.ternary(items, scope, at),
            "." => self.field_access(items, scope, at),
            "+" | "-" => self.additive(items, scope, at, head == "+"),
            "*" => self.multiply(items, scope, at),
            "/" => self.divide(items, scope, at, DivResult::Quotient),
            "%" => self.divide(items, scope, at, DivResult::Remainder),
            "<" | ">" | "<=" | ">=" => self.comparison(items, scope, at, head),
            "==" | "!=" => self.equality(items, scope, at, head == "=="),
            "&&" | "||" => self.logical(items, scope, at, head == "&&"),
            "&" | "|" | "^" | "<<" | ">>>" => self.bitwise(items, scope, at, head),
            ">>" => self.arithmetic_shift(items, scope, at),
            "!" => self.not(items, scope, at),
            "size_of" => self.size_of(items, at),
            "size_of_value" => self.size_of_value(items, scope, at),
            _ => self.call(head, items, scope, at),
        }
    }

    fn expect_operands(
        &self,
        form: &str,
        items: &[Element],
        expected: usize,
    ) -> Result<(), CompileError> {
        if items.len() != expected + 1 {
            return Err(CompileError::WrongOperandCount {
                form: form.to_string(),
                expected: expected.to_string(),
                found: items.len() - 1,
            });
        }
        Ok(())
    }

    fn expect_int(&self, context: &str, ty: &Ty) -> Result<(), CompileError> {
        if ty.is_int() {
            Ok(())
        } else {
            Err(CompileError::TypeMismatch {
                context: context.to_string(),
                expected: "int".to_string(),
                found: ty.to_string(),
            })
        }
    }

    /// `[do <body>]` or `[do [<decl>...] <body>]`. Declarations claim frame
    /// space at the current offset; the body then evaluates past them.
    fn do_block(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        let (decls, body) = match items {
            [_, body] => (None, body),
            [_, decls, body] => (Some(decls), body),
            _ => {
                return Err(CompileError::WrongOperandCount {
                    form: "do".to_string(),
                    expected: "1 or 2".to_string(),
                    found: items.len() - 1,
                })
            }
        };

        let mut inner = scope.child();
        let mut at = at;
        if let Some(decls) = decls {
            for decl in decls.as_list()? {
                let ty = self.types.resolve(decl.child(0)?)?;
                let name = decl.child(1)?.as_word()?.to_string();
                let size = ty.size();
                inner.insert(Field {
                    name,
                    ty,
                    position: at,
                });
                at += word_bytes(size);
            }
        }

        let mut code = Vec::new();
        let mut data = Vec::new();
        for sub in body.as_list()? {
            let emitted = self.expression(sub, &inner, at)?;
            code.extend(emitted.code);
            data.extend(emitted.data);
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::void(),
        })
    }

    /// `[return]` or `[return <value>]`. The value is copied down to the
    /// frame's return slot at offset zero, then LR is restored from just
    /// past it.
    fn return_form(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        let ret = &self.func.return_type;
        match items {
            [_] => {
                if !ret.is_void() {
                    return Err(CompileError::TypeMismatch {
                        context: "return value".to_string(),
                        expected: ret.to_string(),
                        found: "void".to_string(),
                    });
                }
                Ok(Emitted::new(
                    vec![ld(LR, sp(ret.size())), Line::Instr(Instr::Ret)],
                    Ty::void(),
                ))
            }
            [_, value_expr] => {
                let value = self.expression(value_expr, scope, at)?;
                if value.ty != *ret {
                    return Err(CompileError::TypeMismatch {
                        context: "return value".to_string(),
                        expected: ret.to_string(),
                        found: value.ty.to_string(),
                    });
                }
                let mut code = value.code;
                code.push(add(R0, SP, imm(at)));
                code.push(add(R1, SP, imm(0)));
                code.push(mov(R2, imm(ret.size())));
                code.push(bl(self.copy));
                code.push(ld(LR, sp(ret.size())));
                code.push(Line::Instr(Instr::Ret));
                Ok(Emitted {
                    code,
                    data: value.data,
                    ty: Ty::void(),
                })
            }
            _ => Err(CompileError::WrongOperandCount {
                form: "return".to_string(),
                expected: "0 or 1".to_string(),
                found: items.len() - 1,
            }),
        }
    }

    /// `[<- <lhs> <value>]`. The destination must be a pointer to the
    /// value's type. Word-sized scalars go through a direct load and
    /// store; everything else through the copy helper.
    fn store(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("<-", items, 2)?;
        let value = self.expression(&items[2], scope, at)?;
        let size = value.ty.size();
        let lhs_at = at + word_bytes(size);
        let lhs = self.expression(&items[1], scope, lhs_at)?;

        let target = lhs.ty.ptr_target().ok_or_else(|| CompileError::TypeMismatch {
            context: "store destination".to_string(),
            expected: format!("ptr {}", value.ty),
            found: lhs.ty.to_string(),
        })?;
        if target != value.ty {
            return Err(CompileError::TypeMismatch {
                context: "store value".to_string(),
                expected: target.to_string(),
                found: value.ty.to_string(),
            });
        }

        let mut code = value.code;
        code.extend(lhs.code);
        let mut data = value.data;
        data.extend(lhs.data);
        match value.ty.kind() {
            TyKind::Int | TyKind::Ptr(_) => {
                code.push(ld(R0, sp(at)));
                code.push(ld(R1, sp(lhs_at)));
                code.push(st(R0, MemoryLocation::Reg(R1)));
            }
            _ => {
                code.push(add(R0, SP, imm(at)));
                code.push(ld(R1, sp(lhs_at)));
                code.push(mov(R2, imm(size)));
                code.push(bl(self.copy));
            }
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::void(),
        })
    }

    /// `[if <c1> <e1> <c2> <e2> ... [<else>]]`. Condition and body pairs,
    /// with an optional trailing lone else expression.
    fn if_form(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        let rest = &items[1..];
        if rest.is_empty() {
            return Err(CompileError::WrongOperandCount {
                form: "if".to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            });
        }
        let end = Label::fresh();
        let mut code = Vec::new();
        let mut data = Vec::new();
        let mut index = 0;
        while index + 1 < rest.len() {
            let cond = self.expression(&rest[index], scope, at)?;
            self.expect_int("if condition", &cond.ty)?;
            let body = self.expression(&rest[index + 1], scope, at)?;
            let skip = Label::fresh();
            code.extend(cond.code);
            data.extend(cond.data);
            code.push(ld(R0, sp(at)));
            code.push(cmp(R0, imm(0)));
            code.push(beq(&skip));
            code.extend(body.code);
            data.extend(body.data);
            code.push(b(&end));
            code.push(lbl(&skip));
            index += 2;
        }
        if index < rest.len() {
            let alt = self.expression(&rest[index], scope, at)?;
            code.extend(alt.code);
            data.extend(alt.data);
        }
        code.push(lbl(&end));
        Ok(Emitted {
            code,
            data,
            ty: Ty::void(),
        })
    }

    /// `[while <cond> <body>]`.
    fn while_form(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("while", items, 2)?;
        let cond = self.expression(&items[1], scope, at)?;
        self.expect_int("while condition", &cond.ty)?;
        let body = self.expression(&items[2], scope, at)?;

        let repeat = Label::fresh();
        let skip = Label::fresh();
        let mut code = vec![lbl(&repeat)];
        code.extend(cond.code);
        code.push(ld(R0, sp(at)));
        code.push(cmp(R0, imm(0)));
        code.push(beq(&skip));
        code.extend(body.code);
        code.push(b(&repeat));
        code.push(lbl(&skip));
        let mut data = cond.data;
        data.extend(body.data);
        Ok(Emitted {
            code,
            data,
            ty: Ty::void(),
        })
    }

    /// `[print <value>]`, dispatched by the operand's type onto the
    /// write-only I/O locations.
    fn print(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("print", items, 1)?;
        let value = self.expression(&items[1], scope, at)?;
        let mut code = value.code;
        match value.ty.kind() {
            TyKind::Int => {
                code.push(ld(R0, sp(at)));
                code.push(st(R0, MemoryLocation::Special(SpecialConstant::WriteSignedNum)));
            }
            TyKind::Char => {
                code.push(ldb(R0, sp(at)));
                code.push(stb(R0, MemoryLocation::Special(SpecialConstant::WriteChar)));
            }
            TyKind::Array { item, .. } if item.is_char() => {
                code.push(add(R0, SP, imm(at)));
                code.push(st(R0, MemoryLocation::Special(SpecialConstant::WriteString)));
            }
            TyKind::Ptr(target) if target.is_char() => {
                code.push(ld(R0, sp(at)));
                code.push(st(R0, MemoryLocation::Special(SpecialConstant::WriteString)));
            }
            _ => return Err(CompileError::UnprintableType(value.ty.to_string())),
        }
        Ok(Emitted {
            code,
            data: value.data,
            ty: Ty::void(),
        })
    }

    /// `[cast <type> <value>]`: same bits, new type.
    fn cast(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("cast", items, 2)?;
        let ty = self.types.resolve(&items[1])?;
        let value = self.expression(&items[2], scope, at)?;
        Ok(Emitted {
            code: value.code,
            data: value.data,
            ty,
        })
    }

    /// `[$ <pointer>]`: replace the pointer in the result slot with the
    /// value it points at.
    fn deref(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("$", items, 1)?;
        let pointer = self.expression(&items[1], scope, at)?;
        let target = pointer
            .ty
            .ptr_target()
            .ok_or_else(|| CompileError::DerefNonPointer(pointer.ty.to_string()))?;
        let mut code = pointer.code;
        code.push(ld(R0, sp(at)));
        code.push(add(R1, SP, imm(at)));
        code.push(mov(R2, imm(target.size())));
        code.push(bl(self.copy));
        Ok(Emitted {
            code,
            data: pointer.data,
            ty: target,
        })
    }

    /// `[@ <ptr> <n>]` and `[@@ <array-ptr> <n>]`: advance a pointer by n
    /// elements. The scale by the element size is materialized as that
    /// many repeated adds of the index.
    fn pointer_offset(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        indexed: bool,
    ) -> Result<Emitted, CompileError> {
        let form = if indexed { "@@" } else { "@" };
        self.expect_operands(form, items, 2)?;
        let pointer = self.expression(&items[1], scope, at)?;
        let index = self.expression(&items[2], scope, at + WORD_SIZE)?;
        self.expect_int("pointer offset index", &index.ty)?;

        let target = pointer.ty.ptr_target().ok_or_else(|| {
            if indexed {
                CompileError::OffsetNonArrayPointer(pointer.ty.to_string())
            } else {
                CompileError::OffsetNonPointer(pointer.ty.to_string())
            }
        })?;
        let element = if indexed {
            match target.kind() {
                TyKind::Array { item, .. } => item,
                _ => return Err(CompileError::OffsetNonArrayPointer(pointer.ty.to_string())),
            }
        } else {
            target
        };

        let mut code = pointer.code;
        code.extend(index.code);
        let mut data = pointer.data;
        data.extend(index.data);
        code.push(ld(R0, sp(at)));
        code.push(ld(R1, sp(at + WORD_SIZE)));
        for _ in 0..element.size() {
            code.push(add(R0, R0, reg(R1)));
        }
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data,
            ty: Ty::ptr(element),
        })
    }

    /// `[? <cond> <then> <else>]`. Both arms target the same slot and must
    /// agree on type.
    fn ternary(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("?", items, 3)?;
        let cond = self.expression(&items[1], scope, at)?;
        self.expect_int("ternary condition", &cond.ty)?;
        let then = self.expression(&items[2], scope, at)?;
        let alt = self.expression(&items[3], scope, at)?;
        if then.ty != alt.ty {
            return Err(CompileError::TypeMismatch {
                context: "ternary arms".to_string(),
                expected: then.ty.to_string(),
                found: alt.ty.to_string(),
            });
        }

        let otherwise = Label::fresh();
        let end = Label::fresh();
        let mut code = cond.code;
        code.push(ld(R0, sp(at)));
        code.push(cmp(R0, imm(0)));
        code.push(beq(&otherwise));
        code.extend(then.code);
        code.push(b(&end));
        code.push(lbl(&otherwise));
        code.extend(alt.code);
        code.push(lbl(&end));
        let mut data = cond.data;
        data.extend(then.data);
        data.extend(alt.data);
        Ok(Emitted {
            code,
            data,
            ty: then.ty,
        })
    }

    /// `[. <struct-ptr> <name>...]`: accumulate field offsets onto the
    /// loaded pointer. The result is a pointer to the selected field.
    fn field_access(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        if items.len() < 3 {
            return Err(CompileError::WrongOperandCount {
                form: ".".to_string(),
                expected: "at least 2".to_string(),
                found: items.len() - 1,
            });
        }
        let base = self.expression(&items[1], scope, at)?;
        let mut current = base
            .ty
            .ptr_target()
            .ok_or_else(|| CompileError::AccessNonStruct(base.ty.to_string()))?;

        let steps = items.len() - 2;
        let mut offset = 0;
        let mut selected = None;
        for step in 0..steps {
            // TODO: advance the selector index here; every step currently
            // re-reads the first name, so chained access is broken.
            let name = items[2].as_word()?;
            let field = match current.kind() {
                TyKind::Struct { fields } => fields
                    .iter()
                    .find(|f| f.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        CompileError::UnknownField(current.to_string(), name.to_string())
                    })?,
                _ => return Err(CompileError::AccessNonStruct(current.to_string())),
            };
            offset += field.position;
            if step + 1 < steps {
                current = field.ty.clone();
            }
            selected = Some(field.ty);
        }
        let field_ty = match selected {
            Some(ty) => ty,
            None => return Err(CompileError::AccessNonStruct(base.ty.to_string())),
        };

        let mut code = base.code;
        code.push(ld(R0, sp(at)));
        code.push(add(R0, R0, imm(offset)));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data: base.data,
            ty: Ty::ptr(field_ty),
        })
    }

    /// Variadic `+` and `-`, folded left to right through the slot pair at
    /// `at` and `at + 4`.
    fn additive(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        plus: bool,
    ) -> Result<Emitted, CompileError> {
        let form = if plus { "+" } else { "-" };
        if items.len() < 3 {
            return Err(CompileError::WrongOperandCount {
                form: form.to_string(),
                expected: "at least 2".to_string(),
                found: items.len() - 1,
            });
        }
        let first = self.expression(&items[1], scope, at)?;
        self.expect_int("arithmetic operand", &first.ty)?;
        let mut code = first.code;
        let mut data = first.data;
        for operand in &items[2..] {
            let rhs = self.expression(operand, scope, at + WORD_SIZE)?;
            self.expect_int("arithmetic operand", &rhs.ty)?;
            code.extend(rhs.code);
            data.extend(rhs.data);
            code.push(ld(R0, sp(at)));
            code.push(ld(R1, sp(at + WORD_SIZE)));
            code.push(if plus {
                add(R0, R0, reg(R1))
            } else {
                sub(R0, R0, reg(R1))
            });
            code.push(st(R0, sp(at)));
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// Chained `*`. Each step is a repeated-addition loop; when the second
    /// operand is non-positive, both operands are first subtracted from
    /// zero.
    fn multiply(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        if items.len() < 3 {
            return Err(CompileError::WrongOperandCount {
                form: "*".to_string(),
                expected: "at least 2".to_string(),
                found: items.len() - 1,
            });
        }
        let first = self.expression(&items[1], scope, at)?;
        self.expect_int("arithmetic operand", &first.ty)?;
        let mut code = first.code;
        let mut data = first.data;
        for operand in &items[2..] {
            let rhs = self.expression(operand, scope, at + WORD_SIZE)?;
            self.expect_int("arithmetic operand", &rhs.ty)?;
            code.extend(rhs.code);
            data.extend(rhs.data);

            let keep = Label::fresh();
            let step = Label::fresh();
            let done = Label::fresh();
            code.push(ld(R0, sp(at)));
            code.push(ld(R1, sp(at + WORD_SIZE)));
            code.push(cmp(R1, imm(0)));
            code.push(bgt(&keep));
            code.push(mov(R2, imm(0)));
            code.push(sub(R0, R2, reg(R0)));
            code.push(sub(R1, R2, reg(R1)));
            code.push(lbl(&keep));
            code.push(mov(R2, imm(0)));
            code.push(lbl(&step));
            code.push(cmp(R1, imm(0)));
            code.push(beq(&done));
            code.push(add(R2, R2, reg(R0)));
            code.push(sub(R1, R1, imm(1)));
            code.push(b(&step));
            code.push(lbl(&done));
            code.push(st(R2, sp(at)));
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// Chained `/` and `%` through one repeated-subtraction loop. Operand
    /// signs are normalized up front, with the result's sign tracked as an
    /// xor in R3. Division by zero never leaves the loop.
    fn divide(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        which: DivResult,
    ) -> Result<Emitted, CompileError> {
        let form = match which {
            DivResult::Quotient => "/",
            DivResult::Remainder => "%",
        };
        if items.len() < 3 {
            return Err(CompileError::WrongOperandCount {
                form: form.to_string(),
                expected: "at least 2".to_string(),
                found: items.len() - 1,
            });
        }
        let first = self.expression(&items[1], scope, at)?;
        self.expect_int("arithmetic operand", &first.ty)?;
        let mut code = first.code;
        let mut data = first.data;
        for operand in &items[2..] {
            let rhs = self.expression(operand, scope, at + WORD_SIZE)?;
            self.expect_int("arithmetic operand", &rhs.ty)?;
            code.extend(rhs.code);
            data.extend(rhs.data);

            let dividend_done = Label::fresh();
            let divisor_done = Label::fresh();
            let head = Label::fresh();
            let tail = Label::fresh();
            let positive = Label::fresh();
            code.push(ld(R0, sp(at)));
            code.push(ld(R1, sp(at + WORD_SIZE)));
            code.push(mov(R3, imm(0)));
            code.push(cmp(R0, imm(0)));
            code.push(bgt(&dividend_done));
            code.push(mov(R2, imm(0)));
            code.push(sub(R0, R2, reg(R0)));
            code.push(mov(R2, imm(1)));
            code.push(Line::Instr(Instr::Xor(R3, R3, reg(R2))));
            code.push(lbl(&dividend_done));
            code.push(cmp(R1, imm(0)));
            code.push(bgt(&divisor_done));
            code.push(mov(R2, imm(0)));
            code.push(sub(R1, R2, reg(R1)));
            code.push(mov(R2, imm(1)));
            code.push(Line::Instr(Instr::Xor(R3, R3, reg(R2))));
            code.push(lbl(&divisor_done));
            code.push(mov(R2, imm(0)));
            code.push(lbl(&head));
            code.push(cmp(R0, reg(R1)));
            code.push(blt(&tail));
            code.push(sub(R0, R0, reg(R1)));
            code.push(add(R2, R2, imm(1)));
            code.push(b(&head));
            code.push(lbl(&tail));
            let result = match which {
                DivResult::Quotient => R2,
                DivResult::Remainder => R0,
            };
            code.push(cmp(R3, imm(0)));
            code.push(beq(&positive));
            code.push(mov(R1, imm(0)));
            code.push(sub(result, R1, reg(result)));
            code.push(lbl(&positive));
            code.push(st(result, sp(at)));
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// Binary `<`, `>`, `<=`, `>=` onto 0/1.
    fn comparison(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        op: &str,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands(op, items, 2)?;
        let lhs = self.expression(&items[1], scope, at)?;
        self.expect_int("comparison operand", &lhs.ty)?;
        let rhs = self.expression(&items[2], scope, at + WORD_SIZE)?;
        self.expect_int("comparison operand", &rhs.ty)?;

        // The strict forms materialize 1 on the taken branch; the inclusive
        // forms invert the opposite strict branch.
        let (jump, on_jump): (fn(&Label) -> Line, i32) = match op {
            "<" => (blt, 1),
            ">" => (bgt, 1),
            "<=" => (bgt, 0),
            _ => (blt, 0),
        };

        let taken = Label::fresh();
        let end = Label::fresh();
        let mut code = lhs.code;
        code.extend(rhs.code);
        let mut data = lhs.data;
        data.extend(rhs.data);
        code.push(ld(R0, sp(at)));
        code.push(ld(R1, sp(at + WORD_SIZE)));
        code.push(cmp(R0, reg(R1)));
        code.push(jump(&taken));
        code.push(mov(R0, imm(1 - on_jump)));
        code.push(b(&end));
        code.push(lbl(&taken));
        code.push(mov(R0, imm(on_jump)));
        code.push(lbl(&end));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// `==` and `!=` over any non-void type. Word-sized values compare in
    /// one CMP; everything else byte by byte with an early exit. The
    /// second operand sits one word-padded operand width above the first,
    /// and the loop addresses it at that fixed stride from the moving
    /// cursor.
    fn equality(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        eq: bool,
    ) -> Result<Emitted, CompileError> {
        let form = if eq { "==" } else { "!=" };
        self.expect_operands(form, items, 2)?;
        let lhs = self.expression(&items[1], scope, at)?;
        if lhs.ty.is_void() {
            return Err(CompileError::TypeMismatch {
                context: "equality operand".to_string(),
                expected: "a non-void value".to_string(),
                found: lhs.ty.to_string(),
            });
        }
        let size = lhs.ty.size();
        let rhs = self.expression(&items[2], scope, at + word_bytes(size))?;
        if lhs.ty != rhs.ty {
            return Err(CompileError::TypeMismatch {
                context: "equality operands".to_string(),
                expected: lhs.ty.to_string(),
                found: rhs.ty.to_string(),
            });
        }

        let mut code = lhs.code;
        code.extend(rhs.code);
        let mut data = lhs.data;
        data.extend(rhs.data);
        let equal_value = imm(if eq { 1 } else { 0 });
        let unequal_value = imm(if eq { 0 } else { 1 });
        if size == 0 {
            code.push(mov(R0, equal_value));
            code.push(st(R0, sp(at)));
        } else if size == WORD_SIZE {
            let same = Label::fresh();
            let end = Label::fresh();
            code.push(ld(R0, sp(at)));
            code.push(ld(R1, sp(at + WORD_SIZE)));
            code.push(cmp(R0, reg(R1)));
            code.push(beq(&same));
            code.push(mov(R0, unequal_value));
            code.push(b(&end));
            code.push(lbl(&same));
            code.push(mov(R0, equal_value));
            code.push(lbl(&end));
            code.push(st(R0, sp(at)));
        } else {
            let head = Label::fresh();
            let same = Label::fresh();
            let differ = Label::fresh();
            let end = Label::fresh();
            code.push(add(R2, SP, imm(at)));
            code.push(mov(R0, imm(size)));
            code.push(lbl(&head));
            code.push(cmp(R0, imm(0)));
            code.push(beq(&same));
            code.push(ldb(R1, MemoryLocation::Reg(R2)));
            code.push(ldb(R3, MemoryLocation::Offset(R2, word_bytes(size))));
            code.push(cmp(R1, reg(R3)));
            code.push(bne(&differ));
            code.push(add(R2, R2, imm(1)));
            code.push(sub(R0, R0, imm(1)));
            code.push(b(&head));
            code.push(lbl(&same));
            code.push(mov(R0, equal_value));
            code.push(b(&end));
            code.push(lbl(&differ));
            code.push(mov(R0, unequal_value));
            code.push(lbl(&end));
            code.push(st(R0, sp(at)));
        }
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// Short-circuit `&&` and `||`: the right side only runs when the left
    /// hasn't already decided, and the result is whatever the slot last
    /// held.
    fn logical(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        and: bool,
    ) -> Result<Emitted, CompileError> {
        let form = if and { "&&" } else { "||" };
        self.expect_operands(form, items, 2)?;
        let lhs = self.expression(&items[1], scope, at)?;
        self.expect_int("logical operand", &lhs.ty)?;
        let rhs = self.expression(&items[2], scope, at)?;
        self.expect_int("logical operand", &rhs.ty)?;

        let skip = Label::fresh();
        let mut code = lhs.code;
        code.push(ld(R0, sp(at)));
        code.push(cmp(R0, imm(0)));
        code.push(if and { beq(&skip) } else { bne(&skip) });
        code.extend(rhs.code);
        code.push(lbl(&skip));
        let mut data = lhs.data;
        data.extend(rhs.data);
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// Binary `&`, `|`, `^`, `<<` and `>>>`, each one instruction over the
    /// slot pair.
    fn bitwise(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
        op: &str,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands(op, items, 2)?;
        let lhs = self.expression(&items[1], scope, at)?;
        self.expect_int("bitwise operand", &lhs.ty)?;
        let rhs = self.expression(&items[2], scope, at + WORD_SIZE)?;
        self.expect_int("bitwise operand", &rhs.ty)?;

        let mut code = lhs.code;
        code.extend(rhs.code);
        let mut data = lhs.data;
        data.extend(rhs.data);
        code.push(ld(R0, sp(at)));
        code.push(ld(R1, sp(at + WORD_SIZE)));
        code.push(Line::Instr(match op {
            "&" => Instr::And(R0, R0, reg(R1)),
            "|" => Instr::Or(R0, R0, reg(R1)),
            "^" => Instr::Xor(R0, R0, reg(R1)),
            "<<" => Instr::Lsl(R0, R0, reg(R1)),
            _ => Instr::Lsr(R0, R0, reg(R1)),
        }));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// `>>`: arithmetic shift built from the logical one. Negative values
    /// are complemented, shifted and complemented back, which re-extends
    /// the sign.
    fn arithmetic_shift(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands(">>", items, 2)?;
        let lhs = self.expression(&items[1], scope, at)?;
        self.expect_int("bitwise operand", &lhs.ty)?;
        let rhs = self.expression(&items[2], scope, at + WORD_SIZE)?;
        self.expect_int("bitwise operand", &rhs.ty)?;

        let negative = Label::fresh();
        let end = Label::fresh();
        let mut code = lhs.code;
        code.extend(rhs.code);
        let mut data = lhs.data;
        data.extend(rhs.data);
        code.push(ld(R0, sp(at)));
        code.push(ld(R1, sp(at + WORD_SIZE)));
        code.push(cmp(R0, imm(0)));
        code.push(blt(&negative));
        code.push(Line::Instr(Instr::Lsr(R0, R0, reg(R1))));
        code.push(b(&end));
        code.push(lbl(&negative));
        code.push(mov(R2, imm(-1)));
        code.push(Line::Instr(Instr::Xor(R0, R0, reg(R2))));
        code.push(Line::Instr(Instr::Lsr(R0, R0, reg(R1))));
        code.push(Line::Instr(Instr::Xor(R0, R0, reg(R2))));
        code.push(lbl(&end));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data,
            ty: Ty::int(),
        })
    }

    /// `[! <value>]`: 1 when zero, 0 otherwise.
    fn not(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("!", items, 1)?;
        let value = self.expression(&items[1], scope, at)?;
        self.expect_int("logical operand", &value.ty)?;

        let zero = Label::fresh();
        let end = Label::fresh();
        let mut code = value.code;
        code.push(ld(R0, sp(at)));
        code.push(cmp(R0, imm(0)));
        code.push(beq(&zero));
        code.push(mov(R0, imm(0)));
        code.push(b(&end));
        code.push(lbl(&zero));
        code.push(mov(R0, imm(1)));
        code.push(lbl(&end));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data: value.data,
            ty: Ty::int(),
        })
    }

    /// `[size_of <type>]`: the type's size as an int constant.
    fn size_of(&self, items: &[Element], at: i32) -> Result<Emitted, CompileError> {
        self.expect_operands("size_of", items, 1)?;
        let ty = self.types.resolve(&items[1])?;
        Ok(Emitted::new(
            vec![mov(R0, imm(ty.size())), st(R0, sp(at))],
            Ty::int(),
        ))
    }

    /// `[size_of_value <value>]`: evaluate for the side effects, then
    /// overwrite the slot with the value's size.
    fn size_of_value(
        &self,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        self.expect_operands("size_of_value", items, 1)?;
        let value = self.expression(&items[1], scope, at)?;
        let mut code = value.code;
        code.push(mov(R0, imm(value.ty.size())));
        code.push(st(R0, sp(at)));
        Ok(Emitted {
            code,
            data: value.data,
            ty: Ty::int(),
        })
    }

    /// A call to a declared function. Arguments land where the callee's
    /// frame expects them, SP advances over this frame's live region for
    /// the duration of the call, and the callee's return slot becomes the
    /// result slot here.
    fn call(
        &self,
        name: &str,
        items: &[Element],
        scope: &Scope<'_>,
        at: i32,
    ) -> Result<Emitted, CompileError> {
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| CompileError::UnknownOperator(name.to_string()))?;
        let args = &items[1..];
        if args.len() != func.params.len() {
            return Err(CompileError::WrongOperandCount {
                form: name.to_string(),
                expected: func.params.len().to_string(),
                found: args.len(),
            });
        }

        let mut code = Vec::new();
        let mut data = Vec::new();
        for (arg, param) in args.iter().zip(&func.params) {
            let value = self.expression(arg, scope, at + param.position)?;
            if value.ty != param.ty {
                return Err(CompileError::TypeMismatch {
                    context: format!("argument `{}` of `{}`", param.name, func.name),
                    expected: param.ty.to_string(),
                    found: value.ty.to_string(),
                });
            }
            code.extend(value.code);
            data.extend(value.data);
        }
        code.push(add(SP, SP, imm(at)));
        code.push(bl(&func.entry));
        code.push(sub(SP, SP, imm(at)));
        Ok(Emitted {
            code,
            data,
            ty: func.return_type.clone(),
        })
    }
}

/// Everything the linker needs: code, the deferred data stream, the copy
/// helper's label and the entry label of `main` when one was declared.
#[derive(Debug)]
pub(crate) struct GeneratedProgram {
    pub(crate) code: Vec<Line>,
    pub(crate) data: Vec<Line>,
    pub(crate) copy: Label,
    pub(crate) main: Option<Label>,
}

impl Compiler<RegisteredProgram> {
    /// Compiles every function body.
    pub(crate) fn generate(self) -> Result<Compiler<GeneratedProgram>, CompileError> {
        let RegisteredProgram { types, functions } = self.0;
        let copy = Label::fresh();
        let mut code = Vec::new();
        let mut data = Vec::new();
        for func in functions.iter() {
            let emitter = FnEmitter {
                types: &types,
                functions: &functions,
                copy: &copy,
                func,
            };
            let emitted = emitter.function()?;
            log::debug!("compiled `{}`: {} lines", func.name, emitted.code.len());
            code.extend(emitted.code);
            data.extend(emitted.data);
        }
        let main = functions.get("main").map(|f| f.entry.clone());
        Ok(Compiler(GeneratedProgram {
            code,
            data,
            copy,
            main,
        }))
    }
}
