use std::collections::HashMap;

use cranelift::{
    codegen::ir::{Function, StackSlot, UserFuncName},
    module::Module,
    prelude::{
        Block, FunctionBuilder, FunctionBuilderContext, InstBuilder, MemFlags, StackSlotData, StackSlotKind, Value,
        types,
    },
};
use generational_arena::Index;
use string_interner::symbol::SymbolUsize;
use tracing::{debug, trace, warn};

use crate::compiler::{
    analysis::TypeQuery,
    error::{CompileError, CompileResult},
    parser::{
        node::{self, BlockId, Node, NodeKind},
        types::Type,
    },
    scope::{ReturnSlot, ScopeId, Storage, Variable},
    tokens::{DisplaySpan, Span},
};

use super::{Info, ptr_width, types::BackendType};

/// Builds the body of one function. Blocks are only switched to once
/// something branches to them; statements after a terminator are skipped.
pub(super) struct FnGen<'g, 'a, M: Module> {
    pub info: &'g mut Info<'a, M>,
    pub b: FunctionBuilder<'g>,
    pub scope: ScopeId,
    pub ret_ty: Type,
    pub ret_bt: BackendType,
    /// Shared epilogue, present when a `return` sits below the top level of the body.
    pub ret_block: Option<Block>,
    /// Exit blocks of the enclosing loops, innermost last.
    pub breaks: Vec<Block>,
    /// Set once the current block is terminated.
    pub dead: bool,
    preds: HashMap<Block, usize>,
}

impl<'a, M: Module> Info<'a, M> {
    pub(super) fn define_function(&mut self, idx: Index) -> CompileResult<()> {
        let node = self.node(idx)?;
        let NodeKind::Function(func) = &node.kind else {
            return Err(CompileError::internal("expected a function", Some(node.span.to_display(self.interner))));
        };
        let Some(body) = func.body else {
            return Ok(());
        };
        let id = *self
            .func_ids
            .get(&idx)
            .ok_or_else(|| CompileError::internal("function defined before it was declared", None))?;
        let name = self.name(func.name);

        let params: Vec<Type> = func.params.iter().map(|p| p.ty.clone()).collect();
        let (sig, sret) = self.signature(func.scope, &params, &func.ret, node.span)?;
        let ret_bt = self.backend_type(func.scope, &func.ret, node.span)?;

        let mut function = Function::with_name_signature(UserFuncName::user(0, id.as_u32()), sig);
        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let b = FunctionBuilder::new(&mut function, &mut builder_ctx);
            let mut g = FnGen {
                info: &mut *self,
                b,
                scope: func.scope,
                ret_ty: func.ret.clone(),
                ret_bt,
                ret_block: None,
                breaks: Vec::new(),
                dead: false,
                preds: HashMap::new(),
            };
            g.emit_function(&name, func, body, sret)?;
            g.b.seal_all_blocks();
            g.b.finalize();
        }

        if self.options.emit_ir {
            self.ir.push(format!("; {name}\n{}", function.display()));
        }
        self.ctx.func = function;
        self.module
            .define_function(id, &mut self.ctx)
            .map_err(|e| CompileError::Backend {
                message: format!("defining `{name}`: {e:?}"),
            })?;
        self.module.clear_context(&mut self.ctx);
        debug!(%name, "defined function");
        Ok(())
    }
}

impl<'g, 'a, M: Module> FnGen<'g, 'a, M> {
    fn emit_function(&mut self, name: &str, func: &node::Function, body: BlockId, sret: bool) -> CompileResult<()> {
        let entry = self.b.create_block();
        self.b.append_block_params_for_function_params(entry);
        self.b.switch_to_block(entry);
        let mut incoming = self.b.block_params(entry).to_vec().into_iter();

        if sret {
            let addr = incoming
                .next()
                .ok_or_else(|| CompileError::internal("missing struct-return parameter", None))?;
            let slot = ReturnSlot {
                ty: func.ret.clone(),
                storage: Storage::Address(addr),
            };
            self.info.scopes.set_return_slot(func.scope, slot);
        }

        for param in &func.params {
            let value = incoming
                .next()
                .ok_or_else(|| CompileError::internal("signature has fewer parameters than the function", None))?;
            let bt = self.backend(&param.ty, param.span)?;
            let slot = self.stack_slot(&bt);
            if bt.is_aggregate() {
                let addr = self.b.ins().stack_addr(ptr_width().to_clif(), slot, 0);
                self.copy(addr, value, &bt);
            } else {
                self.b.ins().stack_store(value, slot, 0);
            }
            let var = Variable {
                ty: param.ty.clone(),
                storage: Storage::Stack(slot),
            };
            self.declare(param.name, var, param.span)?;
        }

        if func.needs_ret_block {
            self.ret_block = Some(self.b.create_block());
            if self.ret_bt.clif().is_some() {
                let bt = self.ret_bt.clone();
                let slot = self.stack_slot(&bt);
                let ret = ReturnSlot {
                    ty: func.ret.clone(),
                    storage: Storage::Stack(slot),
                };
                self.info.scopes.set_return_slot(func.scope, ret);
            }
        }

        self.gen_block(body)?;

        if !self.dead {
            if !self.ret_bt.is_void() {
                warn!(function = name, "control can reach the end of a function that returns a value");
            }
            self.fall_off_end();
        }

        if let Some(ret_block) = self.ret_block {
            if self.enter(ret_block) {
                let values = match self.ret_bt.clif() {
                    Some(clif) => {
                        let addr = self.return_address(None)?;
                        vec![self.load(clif, addr)]
                    }
                    None => Vec::new(),
                };
                self.b.ins().return_(&values);
            }
        }
        trace!(function = name, blocks = self.preds.len(), "function body emitted");
        Ok(())
    }

    /// Leaves the function without a `return` statement: void functions
    /// return normally, others return zero.
    fn fall_off_end(&mut self) {
        if let Some(ret_block) = self.ret_block {
            self.jump(ret_block);
            return;
        }
        match self.ret_bt.clif() {
            Some(clif) => {
                let zero = self.zero(clif);
                self.b.ins().return_(&[zero]);
            }
            None => {
                self.b.ins().return_(&[]);
            }
        }
        self.dead = true;
    }

    pub fn gen_block(&mut self, block: BlockId) -> CompileResult<()> {
        let blocks = self.info.blocks;
        let block = blocks
            .get(block)
            .ok_or_else(|| CompileError::internal("dangling block index during code generation", None))?;
        let saved = self.scope;
        self.scope = block.scope;
        for &stmt in &block.stmts {
            if self.dead {
                trace!(skipped = block.stmts.len(), "dropping statements after a terminator");
                break;
            }
            self.gen_statement(stmt)?;
        }
        self.scope = saved;
        Ok(())
    }

    fn gen_statement(&mut self, idx: Index) -> CompileResult<()> {
        let node = self.node(idx)?;
        match &node.kind {
            NodeKind::Function(_)
            | NodeKind::StructDef { .. }
            | NodeKind::EnumDef { .. }
            | NodeKind::TypeAlias { .. }
            | NodeKind::Static { .. }
            | NodeKind::Impl { .. }
            | NodeKind::Trait { .. }
            | NodeKind::MacroDef { .. } => Ok(()),
            NodeKind::VarDecl { name, ty, value, .. } => self.gen_var_decl(*name, ty.as_ref(), *value, node.span),
            NodeKind::Return { value } => self.gen_return(*value, node.span),
            NodeKind::Break => self.gen_break(node.span),
            NodeKind::If { cond, then, else_ } => self.gen_if(*cond, *then, *else_),
            NodeKind::For { var, cond, body, scope } => self.gen_for(*var, *cond, *body, *scope),
            NodeKind::Match { scrutinee, cases } => self.gen_match(*scrutinee, cases, node.span),
            NodeKind::Block(block) => self.gen_block(*block),
            NodeKind::Module { .. } => Err(CompileError::internal("nested module in a function body", self.display(node.span))),
            kind if kind.is_pre_lowering_only() => Err(CompileError::internal(
                "macro or initializer reached code generation",
                self.display(node.span),
            )),
            _ => self.gen_expr(idx).map(|_| ()),
        }
    }

    pub fn node(&self, idx: Index) -> CompileResult<&'a Node> {
        self.info.node(idx)
    }

    pub fn span(&self, idx: Index) -> CompileResult<Span> {
        Ok(self.node(idx)?.span)
    }

    pub fn display(&self, span: Span) -> Option<DisplaySpan> {
        Some(span.to_display(self.info.interner))
    }

    pub fn malformed(&self, what: impl Into<String>, span: Span) -> CompileError {
        CompileError::Malformed {
            what: what.into(),
            span: self.display(span),
        }
    }

    pub fn query(&self) -> TypeQuery<'_> {
        self.info.query()
    }

    pub fn ty_of(&self, idx: Index) -> CompileResult<Type> {
        self.query().result_type(self.scope, idx)
    }

    pub fn backend(&self, ty: &Type, span: Span) -> CompileResult<BackendType> {
        self.info.backend_type(self.scope, ty, span)
    }

    pub fn type_name(&self, ty: &Type) -> String {
        ty.display(self.info.interner)
    }

    pub fn declare(&mut self, name: SymbolUsize, var: Variable, span: Span) -> CompileResult<()> {
        let interner = self.info.interner;
        self.info.scopes.declare_var(self.scope, name, var, span, interner)
    }

    pub fn stack_slot(&mut self, bt: &BackendType) -> StackSlot {
        let align_shift = bt.align().max(1).trailing_zeros() as u8;
        let data = StackSlotData::new(StackSlotKind::ExplicitSlot, bt.size().max(1), align_shift);
        self.b.create_sized_stack_slot(data)
    }

    /// The address of a variable's storage.
    pub fn storage_address(&mut self, storage: Storage) -> Value {
        let ptr = ptr_width().to_clif();
        match storage {
            Storage::Stack(slot) => self.b.ins().stack_addr(ptr, slot, 0),
            Storage::Global(data) => {
                let gv = self.info.module.declare_data_in_func(data, self.b.func);
                self.b.ins().global_value(ptr, gv)
            }
            Storage::Address(addr) => addr,
        }
    }

    pub fn return_address(&mut self, span: Option<Span>) -> CompileResult<Value> {
        let storage = self
            .info
            .scopes
            .return_slot(self.scope)
            .map(|slot| slot.storage)
            .ok_or_else(|| CompileError::internal("function has no return slot", span.and_then(|s| self.display(s))))?;
        Ok(self.storage_address(storage))
    }

    pub fn load(&mut self, clif: types::Type, addr: Value) -> Value {
        self.b.ins().load(clif, MemFlags::new(), addr, 0)
    }

    pub fn store(&mut self, value: Value, addr: Value) {
        self.b.ins().store(MemFlags::new(), value, addr, 0);
    }

    pub fn copy(&mut self, dest: Value, src: Value, bt: &BackendType) {
        let config = self.info.module.target_config();
        let align = bt.align().clamp(1, 8) as u8;
        self.b
            .emit_small_memory_copy(config, dest, src, u64::from(bt.size()), align, align, true, MemFlags::new());
    }

    pub fn zero(&mut self, clif: types::Type) -> Value {
        match clif {
            types::F32 => self.b.ins().f32const(0.0),
            types::F64 => self.b.ins().f64const(0.0),
            int => self.b.ins().iconst(int, 0),
        }
    }

    pub fn pred(&mut self, block: Block) {
        *self.preds.entry(block).or_default() += 1;
    }

    pub fn jump(&mut self, target: Block) {
        self.pred(target);
        self.b.ins().jump(target, &[]);
        self.dead = true;
    }

    pub fn brif(&mut self, cond: Value, then: Block, else_: Block) {
        self.pred(then);
        self.pred(else_);
        self.b.ins().brif(cond, then, &[], else_, &[]);
        self.dead = true;
    }

    /// Switches to `block` if anything branches to it. A block nothing
    /// reaches is never inserted into the layout.
    pub fn enter(&mut self, block: Block) -> bool {
        if self.preds.get(&block).copied().unwrap_or(0) == 0 {
            return false;
        }
        self.b.switch_to_block(block);
        self.dead = false;
        true
    }
}
