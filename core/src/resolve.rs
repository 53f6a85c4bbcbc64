//! The type resolver. Builds the name-to-type table from the first section
//! of the program in two phases: a fixpoint over the declaration list in
//! which pointer targets are allowed to dangle as placeholders, then a walk
//! that constructs the real target for every placeholder. Two phases are
//! what let a struct mention `ptr Tree` before `Tree` is declared without
//! the construction itself becoming cyclic.

use crate::{
    ast::Element,
    error::CompileError,
    ty::{word_bytes, Field, Ty, TyKind},
    Compiler,
};

/// The name-to-type table, in declaration order. Seeded with the builtins,
/// extended once per successful declaration, immutable from code generation
/// onward.
#[derive(Debug)]
pub(crate) struct TypeTable {
    types: Vec<(String, Ty)>,
}

/// The head word of a type expression. A bare word is its own head, so
/// `Node` and `[Node]` name the same type.
fn type_head(expr: &Element) -> Result<&str, CompileError> {
    match expr {
        Element::Word(word) => Ok(word),
        Element::List(items) => match items.first() {
            Some(head) => head.as_word(),
            None => Err(CompileError::NodeCast {
                expected: "a type expression".to_string(),
                found: expr.to_string(),
            }),
        },
        _ => Err(CompileError::NodeCast {
            expected: "a type expression".to_string(),
            found: expr.to_string(),
        }),
    }
}

impl TypeTable {
    fn seeded() -> TypeTable {
        TypeTable {
            types: vec![
                ("void".to_string(), Ty::named("void", TyKind::Void)),
                ("int".to_string(), Ty::named("int", TyKind::Int)),
                ("float".to_string(), Ty::named("float", TyKind::Float)),
                ("char".to_string(), Ty::named("char", TyKind::Char)),
            ],
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Ty> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    fn install(&mut self, name: &str, ty: Ty) -> Result<(), CompileError> {
        if self.get(name).is_some() {
            return Err(CompileError::DuplicateType(name.to_string()));
        }
        ty.set_name(name);
        self.types.push((name.to_string(), ty));
        Ok(())
    }

    /// Constructs a type from a type expression. `Ok(None)` means the head
    /// names a type that is not in the table yet; the fixpoint retries
    /// those. With `resolve_now` a missing name is a hard error instead,
    /// and pointer targets are constructed on the spot rather than left as
    /// placeholders. With `no_clones` a table hit returns the stored handle
    /// itself; otherwise it returns an independent copy, so two identically
    /// written declarations never alias.
    pub(crate) fn construct(
        &self,
        expr: &Element,
        resolve_now: bool,
        no_clones: bool,
    ) -> Result<Option<Ty>, CompileError> {
        let head = type_head(expr)?;
        if let Some(ty) = self.get(head) {
            return Ok(Some(if no_clones { ty.clone() } else { ty.deep_clone() }));
        }
        match head {
            "ptr" => {
                let target_expr = expr.child(1)?;
                if resolve_now {
                    match self.construct(target_expr, resolve_now, no_clones)? {
                        Some(target) => Ok(Some(Ty::ptr(target))),
                        None => Err(CompileError::UnknownType(target_expr.to_string())),
                    }
                } else {
                    Ok(Some(Ty::ptr(Ty::of(TyKind::Unresolved(
                        target_expr.clone(),
                    )))))
                }
            }
            "array" => {
                let item = match self.construct(expr.child(1)?, resolve_now, no_clones)? {
                    Some(item) => item,
                    None => return Ok(None),
                };
                let count = expr.child(2)?.as_int()?;
                Ok(Some(Ty::of(TyKind::Array { item, count })))
            }
            "struct" => {
                let mut fields = Vec::new();
                let mut position = 0;
                for field in expr.child(1)?.as_list()? {
                    let ty = match self.construct(field.child(0)?, resolve_now, no_clones)? {
                        Some(ty) => ty,
                        None => return Ok(None),
                    };
                    let name = field.child(1)?.as_word()?.to_string();
                    let size = ty.size();
                    fields.push(Field { name, ty, position });
                    position += word_bytes(size);
                }
                Ok(Some(Ty::of(TyKind::Struct { fields })))
            }
            _ => {
                if resolve_now {
                    Err(CompileError::UnknownType(head.to_string()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Constructs a type that must fully resolve right now, returning the
    /// stored handle on a table hit. This is how every consumer past the
    /// fixpoint reads the table.
    pub(crate) fn resolve(&self, expr: &Element) -> Result<Ty, CompileError> {
        match self.construct(expr, true, true)? {
            Some(ty) => Ok(ty),
            None => Err(CompileError::UnknownType(expr.to_string())),
        }
    }

    /// Replaces every placeholder pointer target reachable from a named
    /// type. Array items and struct fields are walked; pointers act as
    /// leaves, so the walk terminates even once the graph is cyclic.
    fn resolve_ptr_targets(&self) -> Result<(), CompileError> {
        for (_, ty) in &self.types {
            self.patch(ty)?;
        }
        Ok(())
    }

    fn patch(&self, ty: &Ty) -> Result<(), CompileError> {
        match ty.kind() {
            TyKind::Ptr(target) => {
                if let Some(expr) = target.unresolved_expr() {
                    ty.set_ptr_target(self.resolve(&expr)?);
                }
            }
            TyKind::Array { item, .. } => self.patch(&item)?,
            TyKind::Struct { fields } => {
                for field in &fields {
                    self.patch(&field.ty)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The program with its type table attached.
#[derive(Debug)]
pub(crate) struct ResolvedProgram {
    pub(crate) root: Element,
    pub(crate) types: TypeTable,
}

impl Compiler<Element> {
    /// Builds the type table from the program's first section.
    pub(crate) fn resolve_types(self) -> Result<Compiler<ResolvedProgram>, CompileError> {
        let root = self.0;
        let mut pending = Vec::new();
        for decl in root.child(0)?.as_list()? {
            let name = decl.child(0)?.as_word()?.to_string();
            let expr = decl.child(1)?.clone();
            pending.push((name, expr));
        }

        let mut types = TypeTable::seeded();
        let mut passes = 0;
        while !pending.is_empty() {
            passes += 1;
            let mut unresolved = Vec::new();
            let mut progressed = false;
            for (name, expr) in pending {
                match types.construct(&expr, false, false)? {
                    Some(ty) => {
                        types.install(&name, ty)?;
                        progressed = true;
                    }
                    None => unresolved.push((name, expr)),
                }
            }
            if !progressed && !unresolved.is_empty() {
                return Err(CompileError::TypeConstructionStalled);
            }
            pending = unresolved;
        }
        types.resolve_ptr_targets()?;

        log::debug!("resolved {} types in {} passes", types.len(), passes);
        Ok(Compiler(ResolvedProgram { root, types }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs the front half of the pipeline on a type-declaration section
    /// (function section left empty).
    fn resolve(decls: &str) -> Result<TypeTable, CompileError> {
        let source = format!("{} []", decls);
        let tokens = crate::lex::lex(&source)?;
        let root = Compiler(tokens).parse()?;
        Ok(root.resolve_types()?.0.types)
    }

    #[test]
    fn test_seeds() {
        let types = resolve("[]").unwrap();
        for name in &["void", "int", "float", "char"] {
            assert!(types.get(name).is_some(), "missing builtin {}", name);
        }
        assert_eq!(types.len(), 4);
    }

    #[test]
    fn test_alias_is_a_copy() {
        let types = resolve("[ [Age [int]] ]").unwrap();
        let age = types.get("Age").unwrap();
        assert!(age.is_int());
        assert_eq!(age.name().as_deref(), Some("Age"));
        // Installing the alias must not have renamed the builtin.
        assert_eq!(types.get("int").unwrap().name().as_deref(), Some("int"));
    }

    #[test]
    fn test_forward_reference_needs_two_passes() {
        let types = resolve("[ [Wrapper [struct [ [[Inner] i] ]]] [Inner [int]] ]").unwrap();
        let wrapper = types.get("Wrapper").unwrap();
        match wrapper.kind() {
            TyKind::Struct { fields } => assert!(fields[0].ty.is_int()),
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_recursive_pointer_resolves() {
        let types =
            resolve("[ [Node [struct [ [[int] v] [[ptr Node] n] ]]] ]").unwrap();
        let node = types.get("Node").unwrap();
        let fields = match node.kind() {
            TyKind::Struct { fields } => fields,
            other => panic!("expected struct, got {:?}", other),
        };
        let target = fields[1].ty.ptr_target().unwrap();
        assert_eq!(target.name().as_deref(), Some("Node"));
        assert_eq!(&target, node);
        // The tied knot: the target's own pointer field exists and is no
        // longer a placeholder.
        match target.kind() {
            TyKind::Struct { fields } => {
                assert!(fields[1].ty.ptr_target().unwrap().unresolved_expr().is_none())
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_field_positions_pad_to_words() {
        let types = resolve("[ [Mixed [struct [ [[char] c] [[int] n] ]]] ]").unwrap();
        let fields = match types.get("Mixed").unwrap().kind() {
            TyKind::Struct { fields } => fields,
            other => panic!("expected struct, got {:?}", other),
        };
        assert_eq!(fields[0].position, 0);
        assert_eq!(fields[1].position, 4);
        assert_eq!(types.get("Mixed").unwrap().size(), 5);
    }

    #[test]
    fn test_duplicate_name_fatal() {
        assert!(matches!(
            resolve("[ [T [int]] [T [char]] ]"),
            Err(CompileError::DuplicateType(_))
        ));
        assert!(matches!(
            resolve("[ [int [char]] ]"),
            Err(CompileError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_stalled_fixpoint() {
        assert!(matches!(
            resolve("[ [A [B]] ]"),
            Err(CompileError::TypeConstructionStalled)
        ));
        // Mutual recursion through anything but a pointer can never land.
        assert!(matches!(
            resolve("[ [A [struct [ [[B] b] ]]] [B [struct [ [[A] a] ]]] ]"),
            Err(CompileError::TypeConstructionStalled)
        ));
    }

    #[test]
    fn test_array_of_forward_type() {
        let types = resolve("[ [Row [array [Cell] 3]] [Cell [int]] ]").unwrap();
        match types.get("Row").unwrap().kind() {
            TyKind::Array { item, count } => {
                assert!(item.is_int());
                assert_eq!(count, 3);
            }
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(types.get("Row").unwrap().size(), 12);
    }
}
