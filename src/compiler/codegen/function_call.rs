use cranelift::{
    module::Module,
    prelude::{InstBuilder, Value},
};
use generational_arena::Index;
use tracing::trace;

use crate::compiler::{
    analysis::Callee,
    error::{CompileError, CompileResult},
    parser::node::{Dispatch, NodeKind},
    tokens::Span,
};

use super::{function::FnGen, ptr_width, types::BackendType};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// Direct calls, method calls and calls through function pointers.
    /// Aggregate arguments are passed by address and an aggregate result
    /// is written to a caller-owned temporary.
    pub fn gen_call(&mut self, callee: Index, args: &[Index], dispatch: Dispatch, span: Span) -> CompileResult<Option<Value>> {
        let target = self.query().callee(self.scope, callee, args, dispatch)?;
        let params = target.params().to_vec();
        let ret = target.ret().clone();

        let (what, callee_scope) = match &target {
            Callee::Direct { name, sig } => {
                let scope = match &self.node(sig.node)?.kind {
                    NodeKind::Function(func) => func.scope,
                    _ => self.scope,
                };
                (format!("function `{}`", self.info.name(*name)), scope)
            }
            Callee::Indirect { .. } => ("function pointer".to_string(), self.scope),
        };
        if args.len() != params.len() {
            return Err(CompileError::ArityMismatch {
                what,
                expected: params.len(),
                found: args.len(),
                span: self.display(span),
            });
        }

        let ret_bt = self.info.backend_type(callee_scope, &ret, span)?;
        let mut values = Vec::with_capacity(args.len() + 1);
        let sret = if ret_bt.is_aggregate() {
            let slot = self.stack_slot(&ret_bt);
            let addr = self.b.ins().stack_addr(ptr_width().to_clif(), slot, 0);
            values.push(addr);
            Some(addr)
        } else {
            None
        };

        for (i, (&arg, param)) in args.iter().zip(&params).enumerate() {
            let arg_span = self.span(arg)?;
            let param_bt = self.info.backend_type(callee_scope, param, arg_span)?;
            let arg_ty = self.ty_of(arg)?;
            let arg_bt = self.backend(&arg_ty, arg_span)?;

            if dispatch == Dispatch::Method && i == 0 {
                let receiver_is_ptr = matches!(arg_bt, BackendType::Pointer);
                if matches!(param_bt, BackendType::Pointer) && !receiver_is_ptr {
                    // `&self` on a receiver held by value
                    values.push(self.gen_address(arg)?);
                    continue;
                }
                if param_bt.is_aggregate() && receiver_is_ptr {
                    values.push(self.gen_value(arg)?);
                    continue;
                }
            }

            if param_bt.is_aggregate() {
                if arg_bt != param_bt {
                    return Err(CompileError::InvalidCast {
                        from: self.type_name(&arg_ty),
                        to: self.type_name(param),
                        span: self.display(arg_span),
                    });
                }
                values.push(self.gen_value(arg)?);
                continue;
            }

            let v = self.gen_value(arg)?;
            let v = self.convert(v, (&arg_ty, &arg_bt), (param, &param_bt), arg_span)?;
            values.push(v);
        }

        let inst = match &target {
            Callee::Direct { sig, .. } => {
                let id = *self
                    .info
                    .func_ids
                    .get(&sig.node)
                    .ok_or_else(|| CompileError::internal("call to an undeclared function", self.display(span)))?;
                let func_ref = self.info.module.declare_func_in_func(id, self.b.func);
                self.b.ins().call(func_ref, &values)
            }
            Callee::Indirect { .. } => {
                let pointer = self.gen_value(callee)?;
                let (sig, _) = self.info.signature(self.scope, &params, &ret, span)?;
                let sig_ref = self.b.import_signature(sig);
                self.b.ins().call_indirect(sig_ref, pointer, &values)
            }
        };
        trace!(%what, args = values.len(), "call");

        if sret.is_some() {
            return Ok(sret);
        }
        Ok(self.b.inst_results(inst).first().copied())
    }
}
