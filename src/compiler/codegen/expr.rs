use cranelift::{
    module::Module,
    prelude::{InstBuilder, Value, types},
};
use generational_arena::Index;
use tracing::trace;

use crate::compiler::{
    analysis::should_load,
    error::{CompileError, CompileResult},
    parser::{
        node::{NodeKind, UnaryOpKind},
        types::Type,
    },
    tokens::Span,
};

use super::{
    cast::{CastKind, cast_kind, emit_cast},
    function::FnGen,
    types::BackendType,
};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// Generates an expression. Scalars yield their value, aggregates the
    /// address of their storage and `void` expressions nothing.
    pub fn gen_expr(&mut self, idx: Index) -> CompileResult<Option<Value>> {
        let node = self.node(idx)?;
        let span = node.span;

        if should_load(&node.kind) && !self.names_function(idx) {
            let ty = self.ty_of(idx)?;
            let bt = self.backend(&ty, span)?;
            let addr = self.gen_address(idx)?;
            return match bt.clif() {
                Some(clif) => Ok(Some(self.load(clif, addr))),
                None if bt.is_aggregate() => Ok(Some(addr)),
                None => Err(self.malformed("cannot read a value of type `void`", span)),
            };
        }

        let value = match &node.kind {
            NodeKind::Int(n) => self.b.ins().iconst(types::I32, *n),
            NodeKind::Float(f) => self.b.ins().f64const(*f),
            NodeKind::Bool(b) => self.b.ins().iconst(types::I8, i64::from(*b)),
            NodeKind::Char(c) => self.b.ins().iconst(types::I8, i64::from(*c)),
            NodeKind::Str(s) => self.string_address(*s, span)?,
            NodeKind::SizeOf { ty } => {
                let bt = self.backend(ty, span)?;
                self.b.ins().iconst(types::I64, i64::from(bt.size()))
            }
            NodeKind::Resolution { base, member } => self.enum_constant(*base, *member, span)?,
            NodeKind::Identifier(name) => self.function_address(*name, span)?,
            NodeKind::Cast { ty, value } => self.gen_cast(ty, *value, span)?,
            NodeKind::Assign { target, value } => return self.gen_assign(*target, *value, span),
            NodeKind::Binary { op, lhs, rhs } => self.gen_binary(idx, *op, *lhs, *rhs, span)?,
            NodeKind::Unary { op, operand } => self.gen_unary(*op, *operand, span)?,
            NodeKind::Call { callee, args, dispatch } => return self.gen_call(*callee, args, *dispatch, span),
            kind if kind.is_pre_lowering_only() => {
                return Err(CompileError::internal(
                    "macro or initializer reached code generation",
                    self.display(span),
                ));
            }
            _ => return Err(CompileError::internal("statement used as an expression", self.display(span))),
        };
        Ok(Some(value))
    }

    /// Like [`Self::gen_expr`], for contexts that need a value.
    pub fn gen_value(&mut self, idx: Index) -> CompileResult<Value> {
        match self.gen_expr(idx)? {
            Some(value) => Ok(value),
            None => Err(self.malformed("expression has no value", self.span(idx)?)),
        }
    }

    /// A bare identifier that names a function rather than a variable.
    pub fn names_function(&self, idx: Index) -> bool {
        match self.node(idx).map(|n| &n.kind) {
            Ok(NodeKind::Identifier(name)) => {
                self.info.scopes.lookup_var(self.scope, *name).is_none()
                    && self.info.scopes.lookup_function(self.scope, *name).is_some()
            }
            _ => false,
        }
    }

    fn gen_assign(&mut self, target: Index, value: Index, span: Span) -> CompileResult<Option<Value>> {
        if !matches!(
            self.node(target)?.kind,
            NodeKind::Identifier(_)
                | NodeKind::Member { .. }
                | NodeKind::Index { .. }
                | NodeKind::Unary {
                    op: UnaryOpKind::Deref,
                    ..
                }
        ) {
            return Err(self.malformed("left side of `=` is not assignable", span));
        }
        let ty = self.ty_of(target)?;
        let bt = self.backend(&ty, span)?;
        let addr = self.gen_address(target)?;
        let stored = self.store_into(addr, &ty, &bt, value)?;
        Ok(Some(stored.unwrap_or(addr)))
    }

    /// Evaluates `value` and stores it at `addr` as a `dst_ty`. Scalars are
    /// coerced; aggregates must match exactly and are copied.
    pub fn store_into(&mut self, addr: Value, dst_ty: &Type, dst_bt: &BackendType, value: Index) -> CompileResult<Option<Value>> {
        let span = self.span(value)?;
        let src_ty = self.ty_of(value)?;

        if dst_bt.is_aggregate() {
            let src_bt = self.backend(&src_ty, span)?;
            if &src_bt != dst_bt {
                return Err(CompileError::InvalidCast {
                    from: self.type_name(&src_ty),
                    to: self.type_name(dst_ty),
                    span: self.display(span),
                });
            }
            let src = self.gen_value(value)?;
            self.copy(addr, src, dst_bt);
            return Ok(None);
        }

        let v = self.gen_value(value)?;
        let v = self.coerce(v, &src_ty, dst_ty, span)?;
        self.store(v, addr);
        Ok(Some(v))
    }

    /// Implicit conversion of a scalar between compatible types.
    pub fn coerce(&mut self, v: Value, from: &Type, to: &Type, span: Span) -> CompileResult<Value> {
        let from_bt = self.backend(from, span)?;
        let to_bt = self.backend(to, span)?;
        self.convert(v, (from, &from_bt), (to, &to_bt), span)
    }

    pub fn convert(
        &mut self,
        v: Value,
        (from, from_bt): (&Type, &BackendType),
        (to, to_bt): (&Type, &BackendType),
        span: Span,
    ) -> CompileResult<Value> {
        let kind = match cast_kind(from_bt, to_bt) {
            Some(CastKind::Decay) | None => {
                return Err(CompileError::InvalidCast {
                    from: self.type_name(from),
                    to: self.type_name(to),
                    span: self.display(span),
                });
            }
            Some(kind) => kind,
        };
        Ok(emit_cast(&mut self.b, kind, v, from_bt, to_bt))
    }

    fn gen_cast(&mut self, to: &Type, value: Index, span: Span) -> CompileResult<Value> {
        let from = self.ty_of(value)?;
        let from_bt = self.backend(&from, span)?;
        let to_bt = self.backend(to, span)?;
        let Some(kind) = cast_kind(&from_bt, &to_bt) else {
            return Err(CompileError::InvalidCast {
                from: self.type_name(&from),
                to: self.type_name(to),
                span: self.display(span),
            });
        };
        trace!(?kind, "cast");
        let v = self.gen_value(value)?;
        Ok(emit_cast(&mut self.b, kind, v, &from_bt, &to_bt))
    }
}
