use cranelift::{
    module::{DataDescription, Module},
    prelude::{InstBuilder, Value},
};
use generational_arena::Index;
use string_interner::symbol::SymbolUsize;
use tracing::trace;

use crate::compiler::{
    error::{CompileError, CompileResult, SymbolClass},
    tokens::Span,
};

use super::{function::FnGen, ptr_width};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    /// String literals live in read-only, NUL-terminated data objects, one
    /// per distinct literal.
    pub fn string_address(&mut self, sym: SymbolUsize, span: Span) -> CompileResult<Value> {
        let id = match self.info.strings.get(&sym) {
            Some(id) => *id,
            None => {
                let interner = self.info.interner;
                let text = interner.resolve(sym).unwrap_or_default();
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);

                let id = self
                    .info
                    .module
                    .declare_anonymous_data(false, false)
                    .map_err(CompileError::backend)?;
                let mut desc = DataDescription::new();
                desc.define(bytes.into_boxed_slice());
                self.info.module.define_data(id, &desc).map_err(|e| CompileError::Backend {
                    message: format!("string literal at {}: {e}", span.to_display(interner)),
                })?;
                trace!(len = text.len(), "interned string literal");
                self.info.strings.insert(sym, id);
                id
            }
        };
        let gv = self.info.module.declare_data_in_func(id, self.b.func);
        Ok(self.b.ins().global_value(ptr_width().to_clif(), gv))
    }

    /// `Enum::Variant` as a constant of the enum's backing type.
    pub fn enum_constant(&mut self, base: SymbolUsize, member: Index, span: Span) -> CompileResult<Value> {
        let ordinal = self.variant_ordinal(base, member, span)?;
        let interner = self.info.interner;
        let backing = self
            .info
            .scopes
            .resolve_enum(self.scope, base, span, interner)?
            .backing
            .clone();
        let bt = self.backend(&backing, span)?;
        let clif = bt
            .clif()
            .ok_or_else(|| self.malformed("enum backing type is not a scalar", span))?;
        Ok(self.b.ins().iconst(clif, ordinal))
    }

    /// The address of a function named without calling it.
    pub fn function_address(&mut self, name: SymbolUsize, span: Span) -> CompileResult<Value> {
        let node = match self.info.scopes.lookup_function(self.scope, name) {
            Some(sig) => sig.node,
            None => {
                return Err(CompileError::UnresolvedSymbol {
                    class: SymbolClass::Variable,
                    name: self.info.name(name),
                    span: self.display(span),
                });
            }
        };
        let id = *self
            .info
            .func_ids
            .get(&node)
            .ok_or_else(|| CompileError::internal("function referenced before it was declared", self.display(span)))?;
        let func_ref = self.info.module.declare_func_in_func(id, self.b.func);
        Ok(self.b.ins().func_addr(ptr_width().to_clif(), func_ref))
    }
}
