use cranelift::{
    module::Module,
    prelude::{InstBuilder, Value},
};
use generational_arena::Index;

use crate::compiler::{
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{NodeKind, UnaryOpKind},
        types::Type,
    },
};

use super::{function::FnGen, types::BackendType};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// The address an lvalue denotes. Aggregate-valued expressions of any
    /// other shape yield the address of their temporary.
    pub fn gen_address(&mut self, idx: Index) -> CompileResult<Value> {
        let node = self.node(idx)?;
        let span = node.span;
        match &node.kind {
            NodeKind::Identifier(name) => {
                let storage = match self.info.scopes.lookup_var(self.scope, *name) {
                    Some(var) => var.storage,
                    None => {
                        return Err(CompileError::UnresolvedSymbol {
                            class: SymbolClass::Variable,
                            name: self.info.name(*name),
                            span: self.display(span),
                        });
                    }
                };
                Ok(self.storage_address(storage))
            }
            NodeKind::Member { object, member, .. } => {
                let object_ty = self.ty_of(*object)?;
                let (index, _) = self.query().field(self.scope, &object_ty, *member)?;

                let (base, aggregate_ty) = match self.query().pointee(self.scope, &object_ty) {
                    Some(pointee) => (self.gen_value(*object)?, pointee),
                    None => (self.gen_value(*object)?, object_ty),
                };
                let offset = match self.backend(&aggregate_ty, span)? {
                    BackendType::Struct(agg) => agg.offsets.get(index).copied().ok_or_else(|| {
                        CompileError::internal("field index outside of the struct layout", self.display(span))
                    })?,
                    BackendType::Array { elem, .. } => elem.size() * index as u32,
                    _ => return Err(self.malformed("member access on a value without fields", span)),
                };
                Ok(self.offset(base, i64::from(offset)))
            }
            NodeKind::Index { object, index } => {
                let object_ty = self.ty_of(*object)?;
                let elem_ty = match self.info.scopes.unalias(self.scope, &object_ty) {
                    Type::Array { inner, .. } | Type::Pointer { inner, .. } => *inner,
                    other => {
                        return Err(self.malformed(format!("cannot index into `{}`", self.type_name(&other)), span));
                    }
                };
                // arrays evaluate to their address, pointers to the pointee's
                let base = self.gen_value(*object)?;

                let elem = self.backend(&elem_ty, span)?;
                let index_ty = self.ty_of(*index)?;
                let i = self.gen_value(*index)?;
                let i64_ty = Type::path(self.info.prims.i64);
                let i = self.coerce(i, &index_ty, &i64_ty, span)?;
                let scaled = self.b.ins().imul_imm(i, i64::from(elem.size()));
                let scaled = self.pointer_sized(scaled);
                Ok(self.b.ins().iadd(base, scaled))
            }
            NodeKind::Unary {
                op: UnaryOpKind::Deref,
                operand,
            } => self.gen_value(*operand),
            _ => {
                let ty = self.ty_of(idx)?;
                if self.backend(&ty, span)?.is_aggregate() {
                    self.gen_value(idx)
                } else {
                    Err(self.malformed("expression is not addressable", span))
                }
            }
        }
    }

    pub fn offset(&mut self, base: Value, offset: i64) -> Value {
        if offset == 0 {
            base
        } else {
            self.b.ins().iadd_imm(base, offset)
        }
    }

    /// Narrows a 64-bit integer to the target's pointer width.
    pub fn pointer_sized(&mut self, v: Value) -> Value {
        let ptr = super::ptr_width().to_clif();
        if self.b.func.dfg.value_type(v) == ptr {
            v
        } else {
            self.b.ins().ireduce(ptr, v)
        }
    }
}
