use generational_arena::{Arena, Index};
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{Dispatch, Node, NodeKind, UnaryOpKind},
        types::Type,
    },
    scope::{FunctionSig, ScopeId, ScopeTree},
};

/// Pre-interned names of the types literals and operators produce.
#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    pub i32: SymbolUsize,
    pub i64: SymbolUsize,
    pub u8: SymbolUsize,
    pub u64: SymbolUsize,
    pub f64: SymbolUsize,
    pub bool: SymbolUsize,
    pub void: SymbolUsize,
}

impl Primitives {
    pub fn intern(interner: &mut Interner) -> Self {
        Self {
            i32: interner.get_or_intern("i32"),
            i64: interner.get_or_intern("i64"),
            u8: interner.get_or_intern("u8"),
            u64: interner.get_or_intern("u64"),
            f64: interner.get_or_intern("f64"),
            bool: interner.get_or_intern("bool"),
            void: interner.get_or_intern("void"),
        }
    }
}

/// Identifiers, member and index accesses and dereferences denote storage;
/// code generation computes their address and loads only when a value is
/// needed. Everything else already is a value.
pub fn should_load(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Identifier(_)
            | NodeKind::Member { .. }
            | NodeKind::Index { .. }
            | NodeKind::Unary {
                op: UnaryOpKind::Deref,
                ..
            }
    )
}

/// What a call expression invokes.
#[derive(Debug, Clone)]
pub enum Callee {
    Direct { name: SymbolUsize, sig: FunctionSig },
    /// Through a function pointer held in a variable or computed by an expression.
    Indirect { params: Vec<Type>, ret: Type },
}

impl Callee {
    pub fn params(&self) -> &[Type] {
        match self {
            Callee::Direct { sig, .. } => &sig.params,
            Callee::Indirect { params, .. } => params,
        }
    }

    pub fn ret(&self) -> &Type {
        match self {
            Callee::Direct { sig, .. } => &sig.ret,
            Callee::Indirect { ret, .. } => ret,
        }
    }
}

/// Side-effect free type queries over the lowered tree.
pub struct TypeQuery<'a> {
    pub nodes: &'a Arena<Node>,
    pub scopes: &'a ScopeTree,
    pub interner: &'a Interner,
    pub prims: Primitives,
}

impl<'a> TypeQuery<'a> {
    fn node(&self, idx: Index) -> CompileResult<&'a Node> {
        self.nodes
            .get(idx)
            .ok_or_else(|| CompileError::internal("dangling node index in type query", None))
    }

    fn name(&self, sym: SymbolUsize) -> String {
        self.interner.resolve(sym).unwrap_or("<?>").to_string()
    }

    fn malformed(&self, what: impl Into<String>, idx: Index) -> CompileError {
        CompileError::Malformed {
            what: what.into(),
            span: self.nodes.get(idx).map(|n| n.span.to_display(self.interner)),
        }
    }

    pub fn prim(&self, sym: SymbolUsize) -> Type {
        Type::path(sym)
    }

    /// The pointee of a pointer type, looking through aliases.
    pub fn pointee(&self, scope: ScopeId, ty: &Type) -> Option<Type> {
        match self.scopes.unalias(scope, ty) {
            Type::Pointer { inner, .. } => Some(self.scopes.unalias(scope, &inner)),
            _ => None,
        }
    }

    /// The static type of the expression `idx`. Statements have no type.
    pub fn result_type(&self, scope: ScopeId, idx: Index) -> CompileResult<Type> {
        let node = self.node(idx)?;
        let ty = match &node.kind {
            NodeKind::Int(_) => self.prim(self.prims.i32),
            NodeKind::Float(_) => self.prim(self.prims.f64),
            NodeKind::Bool(_) => self.prim(self.prims.bool),
            NodeKind::Char(_) => self.prim(self.prims.u8),
            NodeKind::Str(_) => Type::Pointer {
                inner: Box::new(self.prim(self.prims.u8)),
                mutable: false,
                is_ref: false,
            },
            NodeKind::SizeOf { .. } => self.prim(self.prims.u64),
            NodeKind::Identifier(name) => {
                if let Some(var) = self.scopes.lookup_var(scope, *name) {
                    var.ty.clone()
                } else if let Some(sig) = self.scopes.lookup_function(scope, *name) {
                    Type::FunctionPointer {
                        params: sig.params.clone(),
                        ret: Box::new(sig.ret.clone()),
                    }
                } else {
                    return Err(CompileError::UnresolvedSymbol {
                        class: SymbolClass::Variable,
                        name: self.name(*name),
                        span: Some(node.span.to_display(self.interner)),
                    });
                }
            }
            NodeKind::Cast { ty, .. } => ty.clone(),
            NodeKind::Assign { target, .. } => self.result_type(scope, *target)?,
            NodeKind::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    self.prim(self.prims.bool)
                } else {
                    self.operand_type(scope, *lhs, *rhs)?
                }
            }
            NodeKind::Unary { op, operand } => {
                let inner = self.result_type(scope, *operand)?;
                match op {
                    UnaryOpKind::AddressOf => match inner {
                        Type::FunctionPointer { .. } if self.names_function(scope, *operand) => inner,
                        inner => Type::Pointer {
                            inner: Box::new(inner),
                            mutable: true,
                            is_ref: false,
                        },
                    },
                    UnaryOpKind::Deref => self.pointee(scope, &inner).ok_or_else(|| {
                        self.malformed(format!("cannot dereference `{}`", inner.display(self.interner)), idx)
                    })?,
                    UnaryOpKind::Not => self.prim(self.prims.bool),
                    UnaryOpKind::Neg => inner,
                }
            }
            NodeKind::Call { callee, args, dispatch } => self.callee(scope, *callee, args, *dispatch)?.ret().clone(),
            NodeKind::Member { object, member, .. } => {
                let object_ty = self.result_type(scope, *object)?;
                self.field(scope, &object_ty, *member)?.1
            }
            NodeKind::Index { object, .. } => {
                let object_ty = self.result_type(scope, *object)?;
                match self.scopes.unalias(scope, &object_ty) {
                    Type::Array { inner, .. } | Type::Pointer { inner, .. } => *inner,
                    other => {
                        return Err(self.malformed(format!("cannot index into `{}`", other.display(self.interner)), idx));
                    }
                }
            }
            NodeKind::Resolution { base, .. } => {
                if self.scopes.lookup_enum(scope, *base).is_none() {
                    return Err(CompileError::UnresolvedSymbol {
                        class: SymbolClass::Enum,
                        name: self.name(*base),
                        span: Some(node.span.to_display(self.interner)),
                    });
                }
                Type::path(*base)
            }
            NodeKind::MacroCall { .. } | NodeKind::MacroInclude { .. } | NodeKind::InitList { .. } => {
                return Err(CompileError::internal(
                    "macro or initializer node survived lowering",
                    Some(node.span.to_display(self.interner)),
                ));
            }
            _ => {
                return Err(CompileError::internal(
                    "statement has no result type",
                    Some(node.span.to_display(self.interner)),
                ));
            }
        };
        Ok(ty)
    }

    /// Operands of arithmetic are brought to the type of the left side,
    /// unless the left side is a bare literal.
    pub fn operand_type(&self, scope: ScopeId, lhs: Index, rhs: Index) -> CompileResult<Type> {
        let literal = matches!(
            self.node(lhs)?.kind,
            NodeKind::Int(_) | NodeKind::Float(_) | NodeKind::Char(_)
        );
        if literal {
            let rhs_ty = self.result_type(scope, rhs)?;
            // an integer literal on the left of a pointer stays an integer
            if !matches!(self.scopes.unalias(scope, &rhs_ty), Type::Pointer { .. }) {
                return Ok(rhs_ty);
            }
        }
        self.result_type(scope, lhs)
    }

    fn names_function(&self, scope: ScopeId, idx: Index) -> bool {
        match self.nodes.get(idx).map(|n| &n.kind) {
            Some(NodeKind::Identifier(name)) => {
                self.scopes.lookup_var(scope, *name).is_none() && self.scopes.lookup_function(scope, *name).is_some()
            }
            _ => false,
        }
    }

    /// Position and type of `member` within `object_ty`, looking through one
    /// level of pointer.
    pub fn field(&self, scope: ScopeId, object_ty: &Type, member: Index) -> CompileResult<(usize, Type)> {
        let mut ty = self.scopes.unalias(scope, object_ty);
        if let Some(pointee) = self.pointee(scope, &ty) {
            ty = pointee;
        }
        let member_node = self.node(member)?;

        match (&ty, &member_node.kind) {
            (Type::Array { inner, len }, NodeKind::Int(i)) => {
                if *i < 0 || *i as u64 >= *len {
                    return Err(self.malformed(format!("index {i} is out of bounds for an array of {len}"), member));
                }
                Ok((*i as usize, (**inner).clone()))
            }
            (Type::Path { name, args }, _) => {
                let strukt = self
                    .scopes
                    .resolve_struct(scope, *name, member_node.span, self.interner)?;
                let (index, label) = match &member_node.kind {
                    NodeKind::Identifier(field) => (strukt.field_index(*field), self.name(*field)),
                    NodeKind::Int(i) => (
                        usize::try_from(*i).ok().filter(|i| *i < strukt.fields.len()),
                        i.to_string(),
                    ),
                    _ => (None, "?".to_string()),
                };
                let Some(index) = index else {
                    return Err(CompileError::UnresolvedSymbol {
                        class: SymbolClass::Field,
                        name: format!("{}.{}", self.name(*name), label),
                        span: Some(member_node.span.to_display(self.interner)),
                    });
                };
                Ok((index, strukt.fields[index].ty.substitute(&strukt.generics, args)))
            }
            _ => Err(self.malformed(format!("type `{}` has no fields", ty.display(self.interner)), member)),
        }
    }

    /// Resolves what a call invokes. Method calls look the mangled name up in
    /// the receiver's struct.
    pub fn callee(&self, scope: ScopeId, callee: Index, args: &[Index], dispatch: Dispatch) -> CompileResult<Callee> {
        let node = self.node(callee)?;
        let span = Some(node.span.to_display(self.interner));

        if dispatch == Dispatch::Method {
            let NodeKind::Identifier(method) = node.kind else {
                return Err(CompileError::internal("method callee is not a name", span));
            };
            let receiver = args
                .first()
                .ok_or_else(|| CompileError::internal("method call without receiver", span.clone()))?;
            let receiver_ty = self.result_type(scope, *receiver)?;
            let receiver_ty = self.pointee(scope, &receiver_ty).unwrap_or(receiver_ty);
            let Type::Path { name: type_name, .. } = self.scopes.unalias(scope, &receiver_ty) else {
                return Err(self.malformed(
                    format!("type `{}` has no methods", receiver_ty.display(self.interner)),
                    callee,
                ));
            };
            let strukt = self.scopes.resolve_struct(scope, type_name, node.span, self.interner)?;
            let Some(mangled) = strukt.methods.get(&method).copied() else {
                return Err(CompileError::UnresolvedSymbol {
                    class: SymbolClass::Method,
                    name: format!("{}::{}", self.name(type_name), self.name(method)),
                    span,
                });
            };
            let sig = self.scopes.resolve_function(scope, mangled, node.span, self.interner)?.clone();
            return Ok(Callee::Direct { name: mangled, sig });
        }

        match &node.kind {
            NodeKind::Identifier(name) if self.scopes.lookup_var(scope, *name).is_none() => {
                let sig = self.scopes.resolve_function(scope, *name, node.span, self.interner)?.clone();
                Ok(Callee::Direct { name: *name, sig })
            }
            NodeKind::Resolution { base, .. } => Err(self.malformed(
                format!("enum variant of `{}` is not callable", self.name(*base)),
                callee,
            )),
            _ => match self.scopes.unalias(scope, &self.result_type(scope, callee)?) {
                Type::FunctionPointer { params, ret } => Ok(Callee::Indirect { params, ret: *ret }),
                other => Err(self.malformed(
                    format!("`{}` is not callable", other.display(self.interner)),
                    callee,
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{
        parser::node::Field,
        scope::{Storage, StructType, Variable},
        tokens::Span,
    };
    use cranelift::codegen::ir::StackSlot;

    struct Fixture {
        nodes: Arena<Node>,
        scopes: ScopeTree,
        interner: Interner,
        prims: Primitives,
        scope: ScopeId,
        span: Span,
    }

    impl Fixture {
        fn new() -> Self {
            let mut interner = Interner::new();
            let prims = Primitives::intern(&mut interner);
            let file = interner.get_or_intern("t.ly");
            let mut scopes = ScopeTree::new();
            let scope = scopes.new_scope(None);
            Self {
                nodes: Arena::new(),
                scopes,
                interner,
                prims,
                scope,
                span: Span::new(file, 1, 1, 1, 1),
            }
        }

        fn push(&mut self, kind: NodeKind) -> Index {
            self.nodes.insert(Node { kind, span: self.span })
        }

        fn var(&mut self, name: &str, ty: Type) -> SymbolUsize {
            let sym = self.interner.get_or_intern(name);
            let var = Variable {
                ty,
                storage: Storage::Stack(StackSlot::from_u32(0)),
            };
            self.scopes.declare_var(self.scope, sym, var, self.span, &self.interner).unwrap();
            sym
        }

        fn query(&self) -> TypeQuery<'_> {
            TypeQuery {
                nodes: &self.nodes,
                scopes: &self.scopes,
                interner: &self.interner,
                prims: self.prims,
            }
        }
    }

    #[test]
    fn test_literal_left_operand_takes_other_side() {
        let mut f = Fixture::new();
        let x = f.var("x", Type::path(f.prims.f64));
        let one = f.push(NodeKind::Int(1));
        let xi = f.push(NodeKind::Identifier(x));
        let sum = f.push(NodeKind::Binary {
            op: crate::compiler::parser::node::BinOpKind::Add,
            lhs: one,
            rhs: xi,
        });
        let ty = f.query().result_type(f.scope, sum).unwrap();
        assert_eq!(ty.display(&f.interner), "f64");
    }

    #[test]
    fn test_generic_field_type_is_substituted() {
        let mut f = Fixture::new();
        let pair = f.interner.get_or_intern("Pair");
        let t = f.interner.get_or_intern("T");
        let a = f.interner.get_or_intern("a");
        let strukt = StructType::new(pair, vec![Field { name: a, ty: Type::path(t) }], vec![t]);
        f.scopes.add_struct_type(f.scope, pair, strukt, f.span, &f.interner).unwrap();
        let p = f.var(
            "p",
            Type::Pointer {
                inner: Box::new(Type::Path {
                    name: pair,
                    args: vec![Type::path(f.prims.i64)],
                }),
                mutable: true,
                is_ref: true,
            },
        );
        let object = f.push(NodeKind::Identifier(p));
        let member = f.push(NodeKind::Identifier(a));
        let access = f.push(NodeKind::Member {
            object,
            member,
            deref: true,
        });
        let ty = f.query().result_type(f.scope, access).unwrap();
        assert_eq!(ty.display(&f.interner), "i64");
    }

    #[test]
    fn test_unknown_field_is_unresolved() {
        let mut f = Fixture::new();
        let point = f.interner.get_or_intern("Point");
        let x = f.interner.get_or_intern("x");
        let z = f.interner.get_or_intern("z");
        let i32_ = Type::path(f.prims.i32);
        let strukt = StructType::new(point, vec![Field { name: x, ty: i32_ }], vec![]);
        f.scopes.add_struct_type(f.scope, point, strukt, f.span, &f.interner).unwrap();
        let p = f.var("p", Type::path(point));
        let object = f.push(NodeKind::Identifier(p));
        let member = f.push(NodeKind::Identifier(z));
        let access = f.push(NodeKind::Member {
            object,
            member,
            deref: false,
        });
        let err = f.query().result_type(f.scope, access).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnresolvedSymbol {
                class: SymbolClass::Field,
                ..
            }
        ));
    }

    #[test]
    fn test_should_load_shapes() {
        let mut f = Fixture::new();
        let x = f.interner.get_or_intern("x");
        let operand = f.push(NodeKind::Identifier(x));
        assert!(should_load(&NodeKind::Identifier(x)));
        assert!(should_load(&NodeKind::Unary {
            op: UnaryOpKind::Deref,
            operand
        }));
        assert!(!should_load(&NodeKind::Unary {
            op: UnaryOpKind::AddressOf,
            operand
        }));
        assert!(!should_load(&NodeKind::Int(3)));
    }
}
