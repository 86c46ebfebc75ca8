use cranelift::{
    module::Module,
    prelude::{FloatCC, InstBuilder, IntCC, Value},
};
use generational_arena::Index;

use crate::compiler::{
    error::CompileResult,
    parser::node::{NodeKind, UnaryOpKind},
    tokens::Span,
};

use super::{function::FnGen, types::BackendType};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    pub fn gen_unary(&mut self, op: UnaryOpKind, operand: Index, span: Span) -> CompileResult<Value> {
        match op {
            UnaryOpKind::AddressOf => {
                if let NodeKind::Identifier(name) = self.node(operand)?.kind {
                    if self.names_function(operand) {
                        return self.function_address(name, span);
                    }
                }
                self.gen_address(operand)
            }
            // the address `*p` denotes; gen_expr loads through it
            UnaryOpKind::Deref => self.gen_value(operand),
            UnaryOpKind::Neg => {
                let ty = self.ty_of(operand)?;
                let bt = self.backend(&ty, span)?;
                let v = self.gen_value(operand)?;
                match bt {
                    BackendType::Float { .. } => Ok(self.b.ins().fneg(v)),
                    BackendType::Int { .. } => Ok(self.b.ins().ineg(v)),
                    _ => Err(self.malformed(format!("cannot negate a value of type `{}`", self.type_name(&ty)), span)),
                }
            }
            UnaryOpKind::Not => {
                let ty = self.ty_of(operand)?;
                let bt = self.backend(&ty, span)?;
                let v = self.gen_value(operand)?;
                match bt {
                    BackendType::Float { .. } => {
                        let zero = self.zero(self.b.func.dfg.value_type(v));
                        Ok(self.b.ins().fcmp(FloatCC::Equal, v, zero))
                    }
                    BackendType::Int { .. } | BackendType::Bool | BackendType::Pointer => {
                        Ok(self.b.ins().icmp_imm(IntCC::Equal, v, 0))
                    }
                    _ => Err(self.malformed(format!("cannot apply `!` to `{}`", self.type_name(&ty)), span)),
                }
            }
        }
    }
}
