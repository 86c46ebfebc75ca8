use std::rc::Rc;

use cranelift::prelude::types;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    error::{CompileError, CompileResult},
    parser::types::{Primitive, Type},
    scope::{ScopeId, ScopeTree},
    tokens::Span,
};

use super::ptr_width;

/// Nesting deeper than this while materialising a type means the type
/// contains itself by value.
const MAX_TYPE_DEPTH: usize = 64;

/// A materialised struct layout.
#[derive(Debug, PartialEq)]
pub struct Aggregate {
    pub name: String,
    pub fields: Vec<(SymbolUsize, BackendType)>,
    pub offsets: Vec<u32>,
    pub size: u32,
    pub align: u32,
}

impl Aggregate {
    /// Lays out `fields` in order with natural padding. `None` when the
    /// size does not fit in `u32`.
    fn layout(name: String, fields: Vec<(SymbolUsize, BackendType)>) -> Option<Self> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut size = 0u32;
        let mut align = 1u32;
        for (_, ty) in &fields {
            let field_align = ty.align();
            size = size.checked_next_multiple_of(field_align)?;
            offsets.push(size);
            size = size.checked_add(ty.size())?;
            align = align.max(field_align);
        }
        Some(Self {
            name,
            fields,
            offsets,
            size: size.checked_next_multiple_of(align)?,
            align,
        })
    }
}

/// Arrays and structs are only built through `ScopeTree::backend_type`,
/// which rejects any whose size overflows `u32`.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    Bool,
    Void,
    Pointer,
    FnPointer,
    Array { elem: Box<BackendType>, len: u32 },
    Struct(Rc<Aggregate>),
}

impl BackendType {
    pub fn size(&self) -> u32 {
        match self {
            BackendType::Int { bits, .. } | BackendType::Float { bits } => u32::from(*bits) / 8,
            BackendType::Bool => 1,
            BackendType::Void => 0,
            BackendType::Pointer | BackendType::FnPointer => ptr_width().bytes(),
            BackendType::Array { elem, len } => elem.size() * len,
            BackendType::Struct(agg) => agg.size,
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            BackendType::Array { elem, .. } => elem.align(),
            BackendType::Struct(agg) => agg.align,
            other => other.size().max(1),
        }
    }

    /// The Cranelift value type, or `None` for aggregates and `void`.
    pub fn clif(&self) -> Option<types::Type> {
        Some(match self {
            BackendType::Int { bits: 8, .. } | BackendType::Bool => types::I8,
            BackendType::Int { bits: 16, .. } => types::I16,
            BackendType::Int { bits: 32, .. } => types::I32,
            BackendType::Int { .. } => types::I64,
            BackendType::Float { bits: 32 } => types::F32,
            BackendType::Float { .. } => types::F64,
            BackendType::Pointer | BackendType::FnPointer => ptr_width().to_clif(),
            BackendType::Void | BackendType::Array { .. } | BackendType::Struct(_) => return None,
        })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, BackendType::Array { .. } | BackendType::Struct(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, BackendType::Void)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, BackendType::Float { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, BackendType::Int { signed: true, .. })
    }

    /// Names used to build monomorphised variant keys.
    pub fn key(&self) -> String {
        match self {
            BackendType::Int { bits, signed } => format!("{}{bits}", if *signed { "i" } else { "u" }),
            BackendType::Float { bits } => format!("f{bits}"),
            BackendType::Bool => "bool".into(),
            BackendType::Void => "void".into(),
            BackendType::Pointer => "ptr".into(),
            BackendType::FnPointer => "fnptr".into(),
            BackendType::Array { elem, len } => format!("arr{len}{}", elem.key()),
            BackendType::Struct(agg) => agg.name.clone(),
        }
    }
}

fn primitive(p: Primitive) -> BackendType {
    match p {
        Primitive::I8 => BackendType::Int { bits: 8, signed: true },
        Primitive::I16 => BackendType::Int { bits: 16, signed: true },
        Primitive::I32 => BackendType::Int { bits: 32, signed: true },
        Primitive::I64 => BackendType::Int { bits: 64, signed: true },
        Primitive::U8 => BackendType::Int { bits: 8, signed: false },
        Primitive::U16 => BackendType::Int { bits: 16, signed: false },
        Primitive::U32 => BackendType::Int { bits: 32, signed: false },
        Primitive::U64 => BackendType::Int { bits: 64, signed: false },
        Primitive::F32 => BackendType::Float { bits: 32 },
        Primitive::F64 => BackendType::Float { bits: 64 },
        Primitive::Bool => BackendType::Bool,
        Primitive::Void => BackendType::Void,
    }
}

fn too_large(span: Span, interner: &Interner) -> CompileError {
    CompileError::Malformed {
        what: "type is too large".into(),
        span: Some(span.to_display(interner)),
    }
}

impl ScopeTree {
    /// Materialises `ty` as seen from `scope`. Struct layouts are cached per
    /// instantiation in the struct's variant cache.
    pub fn backend_type(&self, scope: ScopeId, ty: &Type, interner: &Interner, span: Span) -> CompileResult<BackendType> {
        self.backend_type_at(scope, ty, interner, span, 0)
    }

    fn backend_type_at(
        &self,
        scope: ScopeId,
        ty: &Type,
        interner: &Interner,
        span: Span,
        depth: usize,
    ) -> CompileResult<BackendType> {
        if depth > MAX_TYPE_DEPTH {
            return Err(CompileError::Malformed {
                what: format!("type `{}` contains itself", ty.display(interner)),
                span: Some(span.to_display(interner)),
            });
        }

        match ty {
            Type::Pointer { .. } => Ok(BackendType::Pointer),
            Type::FunctionPointer { .. } => Ok(BackendType::FnPointer),
            Type::Array { inner, len } => {
                let elem = self.backend_type_at(scope, inner, interner, span, depth + 1)?;
                let len = u32::try_from(*len).map_err(|_| CompileError::Malformed {
                    what: format!("array length {len} is too large"),
                    span: Some(span.to_display(interner)),
                })?;
                if elem.size().checked_mul(len).is_none() {
                    return Err(too_large(span, interner));
                }
                Ok(BackendType::Array {
                    elem: Box::new(elem),
                    len,
                })
            }
            Type::Trait(name) => Err(CompileError::UnknownType {
                name: format!("trait `{}` used as a value type", interner.resolve(*name).unwrap_or("<?>")),
                span: Some(span.to_display(interner)),
            }),
            Type::Path { name, args } => {
                if args.is_empty() {
                    if let Some(p) = ty.as_primitive(interner) {
                        return Ok(primitive(p));
                    }
                    if let Some(enum_) = self.lookup_enum(scope, *name) {
                        return self.backend_type_at(scope, &enum_.backing, interner, span, depth + 1);
                    }
                    if let Some(aliased) = self.lookup_alias(scope, *name) {
                        return self.backend_type_at(scope, aliased, interner, span, depth + 1);
                    }
                }
                self.struct_variant(scope, *name, args, interner, span, depth)
                    .map(BackendType::Struct)
            }
        }
    }

    /// Returns the cached layout for `name<args>`, materialising it on first use.
    fn struct_variant(
        &self,
        scope: ScopeId,
        name: SymbolUsize,
        args: &[Type],
        interner: &Interner,
        span: Span,
        depth: usize,
    ) -> CompileResult<Rc<Aggregate>> {
        let base = interner.resolve(name).unwrap_or("<?>");
        let Some(strukt) = self.lookup_struct(scope, name) else {
            return Err(CompileError::UnknownType {
                name: Type::Path {
                    name,
                    args: args.to_vec(),
                }
                .display(interner),
                span: Some(span.to_display(interner)),
            });
        };
        if strukt.generics.len() != args.len() {
            return Err(CompileError::ArityMismatch {
                what: format!("struct `{base}`"),
                expected: strukt.generics.len(),
                found: args.len(),
                span: Some(span.to_display(interner)),
            });
        }

        let arg_types = args
            .iter()
            .map(|a| self.backend_type_at(scope, a, interner, span, depth + 1))
            .collect::<CompileResult<Vec<_>>>()?;
        let key = std::iter::once(base.to_string())
            .chain(arg_types.iter().map(BackendType::key))
            .collect::<Vec<_>>()
            .join("_");

        if let Some(cached) = strukt.variants.borrow().get(&key) {
            return Ok(Rc::clone(cached));
        }

        let fields = strukt
            .fields
            .iter()
            .map(|f| {
                let field_ty = f.ty.substitute(&strukt.generics, args);
                Ok((f.name, self.backend_type_at(scope, &field_ty, interner, span, depth + 1)?))
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let aggregate = Rc::new(Aggregate::layout(key.clone(), fields).ok_or_else(|| too_large(span, interner))?);
        tracing::debug!(variant = %key, size = aggregate.size, "materialised struct layout");

        strukt
            .variants
            .borrow_mut()
            .insert(key, Rc::clone(&aggregate));
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{parser::node::Field, scope::StructType};

    fn setup() -> (ScopeTree, Interner, ScopeId, Span) {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("t.ly");
        let mut tree = ScopeTree::new();
        let scope = tree.new_scope(None);
        (tree, interner, scope, Span::new(file, 1, 1, 1, 1))
    }

    fn add_struct(tree: &mut ScopeTree, interner: &mut Interner, scope: ScopeId, src: (&str, &[&str], &[(&str, Type)])) {
        let (name, generics, fields) = src;
        let name = interner.get_or_intern(name);
        let generics = generics.iter().map(|g| interner.get_or_intern(g)).collect();
        let fields = fields
            .iter()
            .map(|(n, ty)| Field {
                name: interner.get_or_intern(n),
                ty: ty.clone(),
            })
            .collect();
        let file = interner.get_or_intern("t.ly");
        tree.add_struct_type(scope, name, StructType::new(name, fields, generics), Span::new(file, 1, 1, 1, 1), interner)
            .unwrap();
    }

    #[test]
    fn test_struct_layout_pads_fields() {
        let (mut tree, mut interner, scope, span) = setup();
        let u8_ = Type::primitive(&mut interner, "u8");
        let i64_ = Type::primitive(&mut interner, "i64");
        add_struct(&mut tree, &mut interner, scope, ("S", &[], &[("a", u8_), ("b", i64_)]));
        let s = Type::primitive(&mut interner, "S");

        let BackendType::Struct(agg) = tree.backend_type(scope, &s, &interner, span).unwrap() else {
            panic!("expected a struct");
        };
        assert_eq!(agg.offsets, vec![0, 8]);
        assert_eq!(agg.size, 16);
        assert_eq!(agg.align, 8);
    }

    #[test]
    fn test_non_generic_struct_is_cached_by_identity() {
        let (mut tree, mut interner, scope, span) = setup();
        let i32_ = Type::primitive(&mut interner, "i32");
        add_struct(&mut tree, &mut interner, scope, ("Point", &[], &[("x", i32_.clone()), ("y", i32_)]));
        let point = Type::primitive(&mut interner, "Point");

        let first = tree.backend_type(scope, &point, &interner, span).unwrap();
        let second = tree.backend_type(scope, &point, &interner, span).unwrap();
        match (first, second) {
            (BackendType::Struct(a), BackendType::Struct(b)) => assert!(Rc::ptr_eq(&a, &b)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_generic_instantiations_get_their_own_variant() {
        let (mut tree, mut interner, scope, span) = setup();
        let t = Type::primitive(&mut interner, "T");
        add_struct(&mut tree, &mut interner, scope, ("Box", &["T"], &[("v", t)]));
        let box_sym = interner.get_or_intern("Box");
        let of = |interner: &mut Interner, arg: &str| Type::Path {
            name: box_sym,
            args: vec![Type::primitive(interner, arg)],
        };
        let box_i32 = of(&mut interner, "i32");
        let box_f64 = of(&mut interner, "f64");

        let a = tree.backend_type(scope, &box_i32, &interner, span).unwrap();
        let b = tree.backend_type(scope, &box_i32, &interner, span).unwrap();
        let c = tree.backend_type(scope, &box_f64, &interner, span).unwrap();
        let (BackendType::Struct(a), BackendType::Struct(b), BackendType::Struct(c)) = (a, b, c) else {
            panic!("expected structs");
        };
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(a.name, "Box_i32");
        assert_eq!(c.name, "Box_f64");
        assert_eq!((a.size, c.size), (4, 8));

        let strukt = tree.lookup_struct(scope, box_sym).unwrap();
        assert_eq!(strukt.variants.borrow().len(), 2);
    }

    #[test]
    fn test_generic_arity_mismatch() {
        let (mut tree, mut interner, scope, span) = setup();
        let t = Type::primitive(&mut interner, "T");
        add_struct(&mut tree, &mut interner, scope, ("Box", &["T"], &[("v", t)]));
        let bare = Type::primitive(&mut interner, "Box");
        let err = tree.backend_type(scope, &bare, &interner, span).unwrap_err();
        assert!(matches!(err, CompileError::ArityMismatch { expected: 1, found: 0, .. }));
    }

    #[test]
    fn test_unknown_and_recursive_types() {
        let (mut tree, mut interner, scope, span) = setup();
        let nope = Type::primitive(&mut interner, "Nope");
        assert!(matches!(
            tree.backend_type(scope, &nope, &interner, span).unwrap_err(),
            CompileError::UnknownType { .. }
        ));

        let node = Type::primitive(&mut interner, "Node");
        add_struct(&mut tree, &mut interner, scope, ("Node", &[], &[("next", node.clone())]));
        assert!(matches!(
            tree.backend_type(scope, &node, &interner, span).unwrap_err(),
            CompileError::Malformed { .. }
        ));
    }

    #[test]
    fn test_enum_and_alias_resolve_to_backing() {
        let (mut tree, mut interner, scope, span) = setup();
        let u8_ = Type::primitive(&mut interner, "u8");
        let color = interner.get_or_intern("Color");
        let red = interner.get_or_intern("Red");
        tree.add_enum_type(
            scope,
            color,
            crate::compiler::scope::EnumType {
                name: color,
                variants: vec![red],
                backing: u8_,
            },
            span,
            &interner,
        )
        .unwrap();
        let alias = interner.get_or_intern("Shade");
        tree.add_type_alias(scope, alias, Type::path(color), span, &interner).unwrap();

        let ty = tree.backend_type(scope, &Type::path(alias), &interner, span).unwrap();
        assert_eq!(ty, BackendType::Int { bits: 8, signed: false });
    }

    #[test]
    fn test_oversized_types_are_rejected() {
        let (mut tree, mut interner, scope, span) = setup();
        let i64_ = Type::primitive(&mut interner, "i64");
        let huge = Type::Array {
            inner: Box::new(i64_),
            len: 1_000_000_000,
        };
        let err = tree.backend_type(scope, &huge, &interner, span).unwrap_err();
        assert!(matches!(&err, CompileError::Malformed { what, .. } if what == "type is too large"));

        let u8_ = Type::primitive(&mut interner, "u8");
        let half = Type::Array {
            inner: Box::new(u8_),
            len: 3_000_000_000,
        };
        add_struct(&mut tree, &mut interner, scope, ("Big", &[], &[("a", half.clone()), ("b", half)]));
        let big = Type::primitive(&mut interner, "Big");
        let err = tree.backend_type(scope, &big, &interner, span).unwrap_err();
        assert!(matches!(&err, CompileError::Malformed { what, .. } if what == "type is too large"));
    }
}
