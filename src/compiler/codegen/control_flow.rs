use std::collections::HashSet;

use cranelift::{
    frontend::Switch,
    module::Module,
    prelude::{Block, FloatCC, InstBuilder, IntCC, Value, types},
};
use generational_arena::Index;
use string_interner::symbol::SymbolUsize;
use tracing::warn;

use crate::compiler::{
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{BinOpKind, BlockId, MatchCase, NodeKind, UnaryOpKind},
        types::Type,
    },
    scope::ScopeId,
    tokens::Span,
};

use super::{function::FnGen, types::BackendType};

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    pub fn gen_if(&mut self, cond: Index, then: BlockId, else_: Option<BlockId>) -> CompileResult<()> {
        let then_block = self.b.create_block();
        let merge = self.b.create_block();
        let else_block = else_.map(|_| self.b.create_block());

        self.gen_condition(cond, then_block, else_block.unwrap_or(merge))?;

        if self.enter(then_block) {
            self.gen_block(then)?;
            if !self.dead {
                self.jump(merge);
            }
        }
        if let (Some(block), Some(body)) = (else_block, else_) {
            if self.enter(block) {
                self.gen_block(body)?;
                if !self.dead {
                    self.jump(merge);
                }
            }
        }
        if !self.enter(merge) {
            self.dead = true;
        }
        Ok(())
    }

    /// `for (var; cond) { body }`: the variable lives in the loop's own scope.
    pub fn gen_for(&mut self, var: Index, cond: Index, body: BlockId, scope: ScopeId) -> CompileResult<()> {
        let saved = self.scope;
        self.scope = scope;

        let var_node = self.node(var)?;
        match &var_node.kind {
            NodeKind::VarDecl { name, ty, value, .. } => self.gen_var_decl(*name, ty.as_ref(), *value, var_node.span)?,
            _ => {
                self.gen_expr(var)?;
            }
        }

        let header = self.b.create_block();
        let body_block = self.b.create_block();
        let exit = self.b.create_block();

        self.jump(header);
        self.enter(header);
        self.gen_condition(cond, body_block, exit)?;

        self.breaks.push(exit);
        if self.enter(body_block) {
            self.gen_block(body)?;
            if !self.dead {
                self.jump(header);
            }
        }
        self.breaks.pop();

        self.scope = saved;
        if !self.enter(exit) {
            self.dead = true;
        }
        Ok(())
    }

    pub fn gen_break(&mut self, span: Span) -> CompileResult<()> {
        let Some(&exit) = self.breaks.last() else {
            return Err(self.malformed("`break` outside of a loop", span));
        };
        self.jump(exit);
        Ok(())
    }

    pub fn gen_return(&mut self, value: Option<Index>, span: Span) -> CompileResult<()> {
        match value {
            None if !self.ret_bt.is_void() => {
                return Err(self.malformed(
                    format!("this function must return a value of type `{}`", self.type_name(&self.ret_ty)),
                    span,
                ));
            }
            None => {}
            Some(value) if self.ret_bt.is_void() => {
                self.gen_expr(value)?;
            }
            Some(value) if self.ret_bt.is_aggregate() => {
                let addr = self.return_address(Some(span))?;
                let (ty, bt) = (self.ret_ty.clone(), self.ret_bt.clone());
                self.store_into(addr, &ty, &bt, value)?;
            }
            Some(value) => {
                let from = self.ty_of(value)?;
                let v = self.gen_value(value)?;
                let ty = self.ret_ty.clone();
                let v = self.coerce(v, &from, &ty, span)?;
                if self.ret_block.is_none() {
                    self.b.ins().return_(&[v]);
                    self.dead = true;
                    return Ok(());
                }
                let addr = self.return_address(Some(span))?;
                self.store(v, addr);
            }
        }

        match self.ret_block {
            Some(block) => self.jump(block),
            None => {
                self.b.ins().return_(&[]);
                self.dead = true;
            }
        }
        Ok(())
    }

    /// Branches to `then` or `else_` on `cond`. `&&`, `||` and `!` short-circuit
    /// by threading the targets instead of materialising booleans.
    pub fn gen_condition(&mut self, cond: Index, then: Block, else_: Block) -> CompileResult<()> {
        let node = self.node(cond)?;
        match &node.kind {
            NodeKind::Binary {
                op: BinOpKind::And,
                lhs,
                rhs,
            } => {
                let rhs_block = self.b.create_block();
                self.gen_condition(*lhs, rhs_block, else_)?;
                if self.enter(rhs_block) {
                    self.gen_condition(*rhs, then, else_)?;
                }
            }
            NodeKind::Binary {
                op: BinOpKind::Or,
                lhs,
                rhs,
            } => {
                let rhs_block = self.b.create_block();
                self.gen_condition(*lhs, then, rhs_block)?;
                if self.enter(rhs_block) {
                    self.gen_condition(*rhs, then, else_)?;
                }
            }
            NodeKind::Unary {
                op: UnaryOpKind::Not,
                operand,
            } => self.gen_condition(*operand, else_, then)?,
            NodeKind::Bool(true) => self.jump(then),
            NodeKind::Bool(false) => self.jump(else_),
            _ => {
                let ty = self.ty_of(cond)?;
                let bt = self.backend(&ty, node.span)?;
                let v = self.gen_value(cond)?;
                let test = self.truthy(v, &bt, node.span)?;
                self.brif(test, then, else_);
            }
        }
        Ok(())
    }

    /// A value `brif` can test: integers and pointers as they are, floats
    /// compared against zero.
    pub fn truthy(&mut self, v: Value, bt: &BackendType, span: Span) -> CompileResult<Value> {
        match bt {
            BackendType::Float { .. } => {
                let zero = self.zero(self.b.func.dfg.value_type(v));
                Ok(self.b.ins().fcmp(FloatCC::NotEqual, v, zero))
            }
            BackendType::Int { .. } | BackendType::Bool | BackendType::Pointer | BackendType::FnPointer => Ok(v),
            _ => Err(self.malformed("condition must be a scalar value", span)),
        }
    }

    /// The value of a short-circuiting `&&`/`||` used outside a condition.
    pub fn gen_logical_value(&mut self, idx: Index) -> CompileResult<Value> {
        let yes = self.b.create_block();
        let no = self.b.create_block();
        let merge = self.b.create_block();
        let slot = self.stack_slot(&BackendType::Bool);

        self.gen_condition(idx, yes, no)?;
        for (block, value) in [(yes, 1), (no, 0)] {
            if self.enter(block) {
                let v = self.b.ins().iconst(types::I8, value);
                self.b.ins().stack_store(v, slot, 0);
                self.jump(merge);
            }
        }
        self.enter(merge);
        Ok(self.b.ins().stack_load(types::I8, slot, 0))
    }

    /// Integer, character, boolean and enum scrutinees dispatch through a
    /// jump table; a value no case names falls through past the match.
    pub fn gen_match(&mut self, scrutinee: Index, cases: &[MatchCase], span: Span) -> CompileResult<()> {
        let ty = self.ty_of(scrutinee)?;
        let bt = self.backend(&ty, span)?;
        let clif = match bt {
            BackendType::Int { .. } | BackendType::Bool => bt.clif(),
            _ => None,
        }
        .ok_or_else(|| self.malformed(format!("cannot match on a value of type `{}`", self.type_name(&ty)), span))?;
        let mask = match clif.bits() {
            bits if bits >= 128 => u128::MAX,
            bits => (1u128 << bits) - 1,
        };

        let value = self.gen_value(scrutinee)?;
        let merge = self.b.create_block();
        let mut switch = Switch::new();
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(cases.len());

        for case in cases {
            let constant = self.case_value(case.value)?;
            let key = (constant as u128) & mask;
            if !seen.insert(key) {
                return Err(self.malformed(format!("duplicate match case `{constant}`"), self.span(case.value)?));
            }
            let block = self.b.create_block();
            switch.set_entry(key, block);
            self.pred(block);
            targets.push((block, case.body));
        }
        self.pred(merge);
        switch.emit(&mut self.b, value, merge);
        self.dead = true;

        self.warn_missing_variants(&ty, seen.len(), span);

        for (block, body) in targets {
            if self.enter(block) {
                self.gen_block(body)?;
                if !self.dead {
                    self.jump(merge);
                }
            }
        }
        if !self.enter(merge) {
            self.dead = true;
        }
        Ok(())
    }

    fn warn_missing_variants(&self, ty: &Type, covered: usize, span: Span) {
        let Type::Path { name, .. } = self.info.scopes.unalias(self.scope, ty) else {
            return;
        };
        if let Some(enum_) = self.info.scopes.lookup_enum(self.scope, name) {
            if covered < enum_.variants.len() {
                warn!(
                    enum_ = %self.info.name(name),
                    covered,
                    total = enum_.variants.len(),
                    at = %span.to_display(self.info.interner),
                    "match does not cover every variant"
                );
            }
        }
    }

    /// The constant a match case compares against.
    fn case_value(&self, idx: Index) -> CompileResult<i64> {
        let node = self.node(idx)?;
        match &node.kind {
            NodeKind::Int(n) => Ok(*n),
            NodeKind::Char(c) => Ok(i64::from(*c)),
            NodeKind::Bool(b) => Ok(i64::from(*b)),
            NodeKind::Unary {
                op: UnaryOpKind::Neg,
                operand,
            } => match self.node(*operand)?.kind {
                NodeKind::Int(n) => Ok(n.wrapping_neg()),
                _ => Err(self.malformed("match cases must be constants", node.span)),
            },
            NodeKind::Resolution { base, member } => self.variant_ordinal(*base, *member, node.span),
            _ => Err(self.malformed("match cases must be constants", node.span)),
        }
    }

    /// The value of `Enum::Variant`.
    pub fn variant_ordinal(&self, base: SymbolUsize, member: Index, span: Span) -> CompileResult<i64> {
        let interner = self.info.interner;
        let enum_ = self.info.scopes.resolve_enum(self.scope, base, span, interner)?;
        let variant = match self.node(member)?.kind {
            NodeKind::Identifier(variant) => variant,
            _ => return Err(self.malformed("expected a variant name after `::`", span)),
        };
        enum_
            .ordinal(variant)
            .map(|i| i as i64)
            .ok_or_else(|| CompileError::UnresolvedSymbol {
                class: SymbolClass::Variant,
                name: format!("{}::{}", self.info.name(base), self.info.name(variant)),
                span: self.display(span),
            })
    }

    /// Compares two already-coerced operands.
    pub fn compare(&mut self, op: BinOpKind, a: Value, b: Value, bt: &BackendType) -> Value {
        if bt.is_float() {
            let cc = match op {
                BinOpKind::Eq => FloatCC::Equal,
                BinOpKind::NotEq => FloatCC::NotEqual,
                BinOpKind::LessThan => FloatCC::LessThan,
                BinOpKind::LessThanOrEq => FloatCC::LessThanOrEqual,
                BinOpKind::GreaterThan => FloatCC::GreaterThan,
                _ => FloatCC::GreaterThanOrEqual,
            };
            return self.b.ins().fcmp(cc, a, b);
        }
        let signed = bt.is_signed();
        let cc = match (op, signed) {
            (BinOpKind::Eq, _) => IntCC::Equal,
            (BinOpKind::NotEq, _) => IntCC::NotEqual,
            (BinOpKind::LessThan, true) => IntCC::SignedLessThan,
            (BinOpKind::LessThan, false) => IntCC::UnsignedLessThan,
            (BinOpKind::LessThanOrEq, true) => IntCC::SignedLessThanOrEqual,
            (BinOpKind::LessThanOrEq, false) => IntCC::UnsignedLessThanOrEqual,
            (BinOpKind::GreaterThan, true) => IntCC::SignedGreaterThan,
            (BinOpKind::GreaterThan, false) => IntCC::UnsignedGreaterThan,
            (_, true) => IntCC::SignedGreaterThanOrEqual,
            (_, false) => IntCC::UnsignedGreaterThanOrEqual,
        };
        self.b.ins().icmp(cc, a, b)
    }
}
