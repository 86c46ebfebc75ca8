use cranelift::{module::Module, prelude::InstBuilder};
use generational_arena::Index;
use string_interner::symbol::SymbolUsize;
use tracing::trace;

use crate::compiler::{
    error::CompileResult,
    parser::types::Type,
    scope::{Storage, Variable},
    tokens::Span,
};

use super::{function::FnGen, ptr_width};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// Every local lives in its own stack slot. The name is declared after
    /// the initializer runs, so `let x = x + 1;` reads the outer `x`.
    pub fn gen_var_decl(&mut self, name: SymbolUsize, ty: Option<&Type>, value: Option<Index>, span: Span) -> CompileResult<()> {
        let ty = match (ty, value) {
            (Some(ty), _) => ty.clone(),
            (None, Some(value)) => self.ty_of(value)?,
            (None, None) => {
                return Err(self.malformed(
                    format!("`{}` needs a type or an initial value", self.info.name(name)),
                    span,
                ));
            }
        };
        let bt = self.backend(&ty, span)?;
        if bt.is_void() {
            return Err(self.malformed(format!("variable `{}` cannot have type `void`", self.info.name(name)), span));
        }

        let slot = self.stack_slot(&bt);
        if let Some(value) = value {
            let addr = self.b.ins().stack_addr(ptr_width().to_clif(), slot, 0);
            self.store_into(addr, &ty, &bt, value)?;
        }
        trace!(name = %self.info.name(name), size = bt.size(), "local");

        let var = Variable {
            ty,
            storage: Storage::Stack(slot),
        };
        self.declare(name, var, span)
    }
}
