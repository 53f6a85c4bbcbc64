//! The type model. A [Ty] is a cheap cloneable handle onto shared type
//! data, which is what lets a struct field point back at its own enclosing
//! type once the resolver has tied the knot, and what lets the resolver
//! patch a pointer target in place. That patch is the only mutation a type
//! sees after construction.

use crate::ast::Element;
use crate::consts::WORD_SIZE;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Rounds a byte size up to the next word boundary. Inter-variable padding
/// within frames and struct-embedded field positions both use this.
pub(crate) fn word_bytes(size: i32) -> i32 {
    (size + WORD_SIZE - 1) / WORD_SIZE * WORD_SIZE
}

/// A named slot with a type and a byte position. Serves struct fields,
/// function parameters and frame variables alike; the position is relative
/// to the struct base or the frame base depending on where the field lives.
#[derive(Clone, Debug)]
pub(crate) struct Field {
    pub(crate) name: String,
    pub(crate) ty: Ty,
    pub(crate) position: i32,
}

/// The closed sum of type shapes.
#[derive(Clone, Debug)]
pub(crate) enum TyKind {
    Void,
    Int,
    Float,
    Char,
    Ptr(Ty),
    Array { item: Ty, count: i32 },
    Struct { fields: Vec<Field> },
    /// Placeholder for a pointer target that could not be constructed yet.
    /// Holds the raw type expression so the resolver can finish the job.
    Unresolved(Element),
}

struct TyData {
    name: Option<String>,
    kind: TyKind,
}

/// A shared handle to one type.
#[derive(Clone)]
pub(crate) struct Ty(Rc<RefCell<TyData>>);

impl Ty {
    /// An unnamed type of the given shape.
    pub(crate) fn of(kind: TyKind) -> Ty {
        Ty(Rc::new(RefCell::new(TyData { name: None, kind })))
    }

    /// A named type, as seeded into the type table.
    pub(crate) fn named(name: &str, kind: TyKind) -> Ty {
        Ty(Rc::new(RefCell::new(TyData {
            name: Some(name.to_string()),
            kind,
        })))
    }

    pub(crate) fn void() -> Ty {
        Ty::of(TyKind::Void)
    }

    pub(crate) fn int() -> Ty {
        Ty::of(TyKind::Int)
    }

    pub(crate) fn ptr(target: Ty) -> Ty {
        Ty::of(TyKind::Ptr(target))
    }

    pub(crate) fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.0.borrow_mut().name = Some(name.to_string());
    }

    /// A shallow copy of the shape. Child handles are shared, so this is
    /// cheap; it exists so callers can match without holding the borrow.
    pub(crate) fn kind(&self) -> TyKind {
        self.0.borrow().kind.clone()
    }

    /// The value's size in bytes. Struct sizes sum the raw field sizes even
    /// though embedded field positions are word-padded.
    pub(crate) fn size(&self) -> i32 {
        match &self.0.borrow().kind {
            TyKind::Void => 0,
            TyKind::Int | TyKind::Float => WORD_SIZE,
            TyKind::Char => 1,
            TyKind::Ptr(_) => WORD_SIZE,
            TyKind::Array { item, count } => item.size() * count,
            TyKind::Struct { fields } => fields.iter().map(|f| f.ty.size()).sum(),
            TyKind::Unresolved(_) => 0,
        }
    }

    pub(crate) fn is_void(&self) -> bool {
        matches!(&self.0.borrow().kind, TyKind::Void)
    }

    pub(crate) fn is_int(&self) -> bool {
        matches!(&self.0.borrow().kind, TyKind::Int)
    }

    pub(crate) fn is_char(&self) -> bool {
        matches!(&self.0.borrow().kind, TyKind::Char)
    }

    /// For a pointer, the target type.
    pub(crate) fn ptr_target(&self) -> Option<Ty> {
        match &self.0.borrow().kind {
            TyKind::Ptr(target) => Some(target.clone()),
            _ => None,
        }
    }

    /// For an unresolved placeholder, the saved type expression.
    pub(crate) fn unresolved_expr(&self) -> Option<Element> {
        match &self.0.borrow().kind {
            TyKind::Unresolved(expr) => Some(expr.clone()),
            _ => None,
        }
    }

    /// Swaps this pointer's target for a freshly constructed one. The one
    /// post-construction mutation in the type model.
    pub(crate) fn set_ptr_target(&self, target: Ty) {
        let mut data = self.0.borrow_mut();
        if let TyKind::Ptr(old) = &mut data.kind {
            *old = target;
        }
    }

    /// A structurally independent copy. Only valid before pointer targets
    /// are tied, while placeholders still break every would-be cycle.
    pub(crate) fn deep_clone(&self) -> Ty {
        let data = self.0.borrow();
        let kind = match &data.kind {
            TyKind::Void => TyKind::Void,
            TyKind::Int => TyKind::Int,
            TyKind::Float => TyKind::Float,
            TyKind::Char => TyKind::Char,
            TyKind::Ptr(target) => TyKind::Ptr(target.deep_clone()),
            TyKind::Array { item, count } => TyKind::Array {
                item: item.deep_clone(),
                count: *count,
            },
            TyKind::Struct { fields } => TyKind::Struct {
                fields: fields
                    .iter()
                    .map(|f| Field {
                        name: f.name.clone(),
                        ty: f.ty.deep_clone(),
                        position: f.position,
                    })
                    .collect(),
            },
            TyKind::Unresolved(expr) => TyKind::Unresolved(expr.clone()),
        };
        Ty(Rc::new(RefCell::new(TyData {
            name: data.name.clone(),
            kind,
        })))
    }
}

/// Type equivalence: equal when both sides carry the same non-empty name,
/// or when they are the same shape with pairwise-equal contents. Struct
/// field names and positions do not participate. An unresolved placeholder
/// never compares equal, not even to itself.
impl PartialEq for Ty {
    fn eq(&self, other: &Ty) -> bool {
        {
            let a = self.0.borrow();
            let b = other.0.borrow();
            if let (Some(n1), Some(n2)) = (&a.name, &b.name) {
                if !n1.is_empty() && n1 == n2 {
                    return true;
                }
            }
        }
        let a = self.0.borrow();
        let b = other.0.borrow();
        match (&a.kind, &b.kind) {
            (TyKind::Void, TyKind::Void)
            | (TyKind::Int, TyKind::Int)
            | (TyKind::Float, TyKind::Float)
            | (TyKind::Char, TyKind::Char) => true,
            (TyKind::Ptr(x), TyKind::Ptr(y)) => x == y,
            (
                TyKind::Array {
                    item: item_a,
                    count: count_a,
                },
                TyKind::Array {
                    item: item_b,
                    count: count_b,
                },
            ) => count_a == count_b && item_a == item_b,
            (TyKind::Struct { fields: fields_a }, TyKind::Struct { fields: fields_b }) => {
                fields_a.len() == fields_b.len()
                    && fields_a
                        .iter()
                        .zip(fields_b.iter())
                        .all(|(fa, fb)| fa.ty == fb.ty)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        if let Some(name) = &data.name {
            if !name.is_empty() {
                return write!(f, "{}", name);
            }
        }
        match &data.kind {
            TyKind::Void => write!(f, "void"),
            TyKind::Int => write!(f, "int"),
            TyKind::Float => write!(f, "float"),
            TyKind::Char => write!(f, "char"),
            TyKind::Ptr(target) => write!(f, "ptr {}", target),
            TyKind::Array { item, count } => write!(f, "array {} {}", item, count),
            TyKind::Struct { .. } => write!(f, "struct"),
            TyKind::Unresolved(_) => write!(f, "<unresolved>"),
        }
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ty({})", self)
    }
}
