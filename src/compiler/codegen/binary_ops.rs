use cranelift::{
    module::Module,
    prelude::{InstBuilder, Value},
};
use generational_arena::Index;

use crate::compiler::{
    error::CompileResult,
    parser::{node::BinOpKind, types::Type},
    tokens::Span,
};

use super::{function::FnGen, types::BackendType};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// Arithmetic and comparisons. Both operands are brought to the operand
    /// type before the operation; `&&` and `||` short-circuit.
    pub fn gen_binary(&mut self, idx: Index, op: BinOpKind, lhs: Index, rhs: Index, span: Span) -> CompileResult<Value> {
        if op.is_logical() {
            return self.gen_logical_value(idx);
        }

        let operand_ty = self.query().operand_type(self.scope, lhs, rhs)?;
        let bt = self.backend(&operand_ty, span)?;
        if matches!(bt, BackendType::Pointer) {
            return self.gen_pointer_arithmetic(op, lhs, rhs, &operand_ty, span);
        }

        let lhs_ty = self.ty_of(lhs)?;
        let rhs_ty = self.ty_of(rhs)?;
        let a = self.gen_value(lhs)?;
        let a = self.coerce(a, &lhs_ty, &operand_ty, span)?;
        let b = self.gen_value(rhs)?;
        let b = self.coerce(b, &rhs_ty, &operand_ty, span)?;

        if op.is_comparison() {
            return match bt {
                BackendType::Int { .. } | BackendType::Bool | BackendType::Float { .. } | BackendType::FnPointer => {
                    Ok(self.compare(op, a, b, &bt))
                }
                _ => Err(self.malformed(
                    format!("cannot compare values of type `{}`", self.type_name(&operand_ty)),
                    span,
                )),
            };
        }

        let value = match (&bt, op) {
            (BackendType::Float { .. }, BinOpKind::Add) => self.b.ins().fadd(a, b),
            (BackendType::Float { .. }, BinOpKind::Sub) => self.b.ins().fsub(a, b),
            (BackendType::Float { .. }, BinOpKind::Mul) => self.b.ins().fmul(a, b),
            (BackendType::Float { .. }, BinOpKind::Div) => self.b.ins().fdiv(a, b),
            (BackendType::Int { .. }, BinOpKind::Add) => self.b.ins().iadd(a, b),
            (BackendType::Int { .. }, BinOpKind::Sub) => self.b.ins().isub(a, b),
            (BackendType::Int { .. }, BinOpKind::Mul) => self.b.ins().imul(a, b),
            (BackendType::Int { signed: true, .. }, BinOpKind::Div) => self.b.ins().sdiv(a, b),
            (BackendType::Int { signed: false, .. }, BinOpKind::Div) => self.b.ins().udiv(a, b),
            (BackendType::Int { signed: true, .. }, BinOpKind::Mod) => self.b.ins().srem(a, b),
            (BackendType::Int { signed: false, .. }, BinOpKind::Mod) => self.b.ins().urem(a, b),
            _ => {
                return Err(self.malformed(
                    format!(
                        "operator `{}` is not defined for `{}`",
                        op.as_str(),
                        self.type_name(&operand_ty)
                    ),
                    span,
                ));
            }
        };
        Ok(value)
    }

    /// `ptr + n` and `ptr - n` step by whole elements; pointers compare as
    /// addresses.
    fn gen_pointer_arithmetic(&mut self, op: BinOpKind, lhs: Index, rhs: Index, ptr_ty: &Type, span: Span) -> CompileResult<Value> {
        let rhs_ty = self.ty_of(rhs)?;
        let rhs_bt = self.backend(&rhs_ty, span)?;

        if op.is_comparison() {
            let lhs_ty = self.ty_of(lhs)?;
            let a = self.gen_value(lhs)?;
            let a = self.coerce(a, &lhs_ty, ptr_ty, span)?;
            let b = self.gen_value(rhs)?;
            let b = self.coerce(b, &rhs_ty, ptr_ty, span)?;
            return Ok(self.compare(op, a, b, &BackendType::Pointer));
        }

        let stride = match self.query().pointee(self.scope, ptr_ty) {
            Some(pointee) => self.backend(&pointee, span)?.size().max(1),
            None => 1,
        };
        if !matches!(op, BinOpKind::Add | BinOpKind::Sub) || !matches!(rhs_bt, BackendType::Int { .. }) {
            return Err(self.malformed(
                format!(
                    "operator `{}` is not defined for `{}` and `{}`",
                    op.as_str(),
                    self.type_name(ptr_ty),
                    self.type_name(&rhs_ty)
                ),
                span,
            ));
        }

        let base = self.gen_value(lhs)?;
        let n = self.gen_value(rhs)?;
        let i64_ty = Type::path(self.info.prims.i64);
        let n = self.coerce(n, &rhs_ty, &i64_ty, span)?;
        let n = self.b.ins().imul_imm(n, i64::from(stride));
        let n = self.pointer_sized(n);
        Ok(match op {
            BinOpKind::Add => self.b.ins().iadd(base, n),
            _ => self.b.ins().isub(base, n),
        })
    }
}
