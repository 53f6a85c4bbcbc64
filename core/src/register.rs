//! The function registrar. Walks the program's second section and builds
//! the name-to-function table: resolved signature, parameter frame layout,
//! the raw body tree and a fresh entry label. Bodies are not typechecked
//! here; that happens as each body is compiled.

use crate::{
    asm::Label,
    ast::Element,
    consts::WORD_SIZE,
    error::CompileError,
    resolve::{ResolvedProgram, TypeTable},
    ty::{word_bytes, Field, Ty},
    Compiler,
};

/// One declared function.
#[derive(Debug)]
pub(crate) struct Function {
    pub(crate) name: String,
    pub(crate) return_type: Ty,
    pub(crate) params: Vec<Field>,
    pub(crate) body: Element,
    pub(crate) entry: Label,
}

impl Function {
    /// The raw sum of the parameter sizes, with no word padding. Locals
    /// start past this in the frame.
    pub(crate) fn total_parameter_size(&self) -> i32 {
        self.params.iter().map(|p| p.ty.size()).sum()
    }
}

/// The name-to-function table, in declaration order.
#[derive(Debug)]
pub(crate) struct FunctionTable {
    funcs: Vec<Function>,
}

impl FunctionTable {
    pub(crate) fn get(&self, name: &str) -> Option<&Function> {
        self.funcs.iter().find(|f| f.name == name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Function> {
        self.funcs.iter()
    }
}

/// The program with both tables built; everything code generation needs.
#[derive(Debug)]
pub(crate) struct RegisteredProgram {
    pub(crate) types: TypeTable,
    pub(crate) functions: FunctionTable,
}

impl Compiler<ResolvedProgram> {
    /// Builds the function table from the program's second section.
    pub(crate) fn register_functions(
        self,
    ) -> Result<Compiler<RegisteredProgram>, CompileError> {
        let ResolvedProgram { root, types } = self.0;
        let mut funcs: Vec<Function> = Vec::new();
        for decl in root.child(1)?.as_list()? {
            let return_type = types.resolve(decl.child(0)?)?;
            let name = decl.child(1)?.as_word()?.to_string();

            // Parameters sit past the return slot and the saved return
            // address, each padded out to a word boundary.
            let mut params = Vec::new();
            let mut position = return_type.size() + WORD_SIZE;
            for param in decl.child(2)?.as_list()? {
                let ty = types.resolve(param.child(0)?)?;
                let param_name = param.child(1)?.as_word()?.to_string();
                let size = ty.size();
                params.push(Field {
                    name: param_name,
                    ty,
                    position,
                });
                position += word_bytes(size);
            }

            if funcs.iter().any(|f| f.name == name) {
                return Err(CompileError::DuplicateFunction(name));
            }
            funcs.push(Function {
                name,
                return_type,
                params,
                body: decl.child(3)?.clone(),
                entry: Label::fresh(),
            });
        }

        log::debug!("registered {} functions", funcs.len());
        Ok(Compiler(RegisteredProgram {
            types,
            functions: FunctionTable { funcs },
        }))
    }
}
