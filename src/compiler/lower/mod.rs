use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    config::CompileOptions,
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{Ast, BinOpKind, Block, BlockId, Dispatch, Node, NodeKind},
        types::Type,
    },
    scope::{EnumType, FunctionSig, Macro, ScopeId, StructType, TraitDef},
    tokens::Span,
};

mod include;
mod initializer;
pub mod macros;
mod member;

/// The block being lowered and the function it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub block: BlockId,
    pub function: Option<Index>,
}

/// What code generation needs to know about the lowered tree.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub root: Index,
    pub root_scope: ScopeId,
    /// Every function, including impl methods and nested functions, in
    /// registration order.
    pub functions: Vec<Index>,
    pub statics: Vec<Index>,
    /// Impl blocks with the scope they were lowered in.
    pub impls: Vec<(Index, ScopeId)>,
    /// Symbol names of functions declared inside other functions, such as
    /// `outer.inner`. Module-level functions are emitted under their own name.
    pub link_names: HashMap<Index, String>,
}

/// Explicit lowering state. Macro re-entry and `#include` push a frame for the
/// temporary root and pop it once the fragment is lowered.
pub struct LowerCtx<'a> {
    pub ast: &'a mut Ast,
    pub interner: &'a mut Interner,
    pub options: &'a CompileOptions,
    frames: Vec<Frame>,
    /// Directories of the files being lowered, innermost last.
    file_dirs: Vec<PathBuf>,
    included: HashSet<PathBuf>,
    temp_counter: usize,
    macro_depth: usize,
    functions: Vec<Index>,
    statics: Vec<Index>,
    impls: Vec<(Index, ScopeId)>,
    link_names: HashMap<Index, String>,
    /// Set while lowering an expression that may run zero or many times per
    /// statement. Hoisted temporaries would run exactly once there.
    conditional: Option<&'static str>,
}

/// Lowers the module rooted at `root`. `source_dir` anchors relative includes.
#[tracing::instrument(level = "debug", skip_all)]
pub fn lower_module(
    ast: &mut Ast,
    interner: &mut Interner,
    options: &CompileOptions,
    root: Index,
    source_dir: Option<PathBuf>,
) -> CompileResult<Lowered> {
    let body = match ast.nodes.get(root).map(|n| &n.kind) {
        Some(NodeKind::Module { body }) => *body,
        _ => return Err(CompileError::internal("lowering root is not a module", None)),
    };
    let root_scope = ast.blocks.get(body).map(|b| b.scope).ok_or_else(|| CompileError::internal("module body missing", None))?;

    let mut ctx = LowerCtx {
        ast,
        interner,
        options,
        frames: Vec::new(),
        file_dirs: source_dir.into_iter().collect(),
        included: HashSet::new(),
        temp_counter: 0,
        macro_depth: 0,
        functions: Vec::new(),
        statics: Vec::new(),
        impls: Vec::new(),
        link_names: HashMap::new(),
        conditional: None,
    };
    ctx.lower_block(body, None)?;

    tracing::debug!(
        functions = ctx.functions.len(),
        statics = ctx.statics.len(),
        impls = ctx.impls.len(),
        "lowering finished"
    );
    Ok(Lowered {
        root,
        root_scope,
        functions: ctx.functions,
        statics: ctx.statics,
        impls: ctx.impls,
        link_names: ctx.link_names,
    })
}

impl<'a> LowerCtx<'a> {
    fn node(&self, idx: Index) -> CompileResult<&Node> {
        self.ast
            .nodes
            .get(idx)
            .ok_or_else(|| CompileError::internal("dangling node index during lowering", None))
    }

    fn kind(&self, idx: Index) -> CompileResult<NodeKind> {
        Ok(self.node(idx)?.kind.clone())
    }

    fn span(&self, idx: Index) -> CompileResult<Span> {
        Ok(self.node(idx)?.span)
    }

    fn set_kind(&mut self, idx: Index, kind: NodeKind) -> CompileResult<()> {
        let node = self
            .ast
            .nodes
            .get_mut(idx)
            .ok_or_else(|| CompileError::internal("dangling node index during lowering", None))?;
        node.kind = kind;
        Ok(())
    }

    fn block_mut(&mut self, id: BlockId) -> CompileResult<&mut Block> {
        self.ast
            .blocks
            .get_mut(id)
            .ok_or_else(|| CompileError::internal("dangling block index during lowering", None))
    }

    fn frame(&self) -> CompileResult<Frame> {
        self.frames
            .last()
            .copied()
            .ok_or_else(|| CompileError::internal("no active block", None))
    }

    fn current_block_mut(&mut self) -> CompileResult<&mut Block> {
        let frame = self.frame()?;
        self.block_mut(frame.block)
    }

    fn current_scope(&self) -> CompileResult<ScopeId> {
        let frame = self.frame()?;
        self.ast
            .blocks
            .get(frame.block)
            .map(|b| b.scope)
            .ok_or_else(|| CompileError::internal("dangling block index during lowering", None))
    }

    fn block_scope(&self, block: BlockId) -> CompileResult<ScopeId> {
        self.ast
            .blocks
            .get(block)
            .map(|b| b.scope)
            .ok_or_else(|| CompileError::internal("dangling block index during lowering", None))
    }

    fn name(&self, sym: SymbolUsize) -> String {
        self.interner.resolve(sym).unwrap_or("<?>").to_string()
    }

    fn fresh_temp(&mut self, prefix: &str) -> SymbolUsize {
        let name = format!("__{prefix}{}", self.temp_counter);
        self.temp_counter += 1;
        self.interner.get_or_intern(name)
    }

    /// Lowers a nested block whose scope hangs off `parent`.
    fn lower_child_block(&mut self, block: BlockId, parent: ScopeId, function: Option<Index>) -> CompileResult<()> {
        let scope = self.block_scope(block)?;
        self.ast.scopes.set_parent(scope, parent);
        self.lower_block(block, function)
    }

    /// Visits every statement of `block` in order. Statements spliced in at
    /// the cursor are not visited again.
    fn lower_block(&mut self, block: BlockId, function: Option<Index>) -> CompileResult<()> {
        self.frames.push(Frame { block, function });
        let result = self.lower_block_statements(block);
        self.frames.pop();
        result
    }

    fn lower_block_statements(&mut self, block: BlockId) -> CompileResult<()> {
        {
            let b = self.block_mut(block)?;
            b.cursor = 0;
            b.next = 0;
        }
        loop {
            let stmt = {
                let b = self.block_mut(block)?;
                if b.next >= b.stmts.len() {
                    break;
                }
                b.cursor = b.next;
                b.next = b.cursor + 1;
                b.stmts[b.cursor]
            };
            self.lower_statement(stmt)?;
        }
        Ok(())
    }

    /// Lowers a freshly parsed fragment (macro expansion or included file)
    /// under a temporary root, then merges its items into the caller's scope
    /// and splices its statements in place of the current statement.
    fn lower_fragment(&mut self, block: BlockId, span: Span) -> CompileResult<()> {
        let frame = self.frame()?;
        let caller_scope = self.current_scope()?;
        let temp_scope = self.block_scope(block)?;
        self.ast.scopes.set_parent(temp_scope, caller_scope);

        self.lower_block(block, frame.function)?;
        self.ast.scopes.merge_items(temp_scope, caller_scope, span, self.interner)?;

        let (stmts, returns) = {
            let b = self.block_mut(block)?;
            (std::mem::take(&mut b.stmts), b.returns)
        };
        let current = self.current_block_mut()?;
        current.returns |= returns;
        current.replace_current(stmts);
        Ok(())
    }

    fn lower_statement(&mut self, idx: Index) -> CompileResult<()> {
        let span = self.span(idx)?;
        let kind = self.kind(idx)?;
        tracing::trace!(node = ?kind, "lowering statement");
        match kind {
            NodeKind::Module { .. } => Err(CompileError::internal(
                "nested module",
                Some(span.to_display(self.interner)),
            )),
            NodeKind::Function(_) => self.lower_function(idx, None),
            NodeKind::StructDef { name, generics, fields } => {
                let scope = self.current_scope()?;
                self.ast.scopes.add_struct_type(
                    scope,
                    name,
                    StructType::new(name, fields, generics),
                    span,
                    self.interner,
                )?;
                tracing::debug!(name = %self.name(name), "registered struct");
                Ok(())
            }
            NodeKind::EnumDef { name, variants, backing } => {
                let scope = self.current_scope()?;
                self.ast.scopes.add_enum_type(
                    scope,
                    name,
                    EnumType {
                        name,
                        variants,
                        backing,
                    },
                    span,
                    self.interner,
                )?;
                tracing::debug!(name = %self.name(name), "registered enum");
                Ok(())
            }
            NodeKind::TypeAlias { name, ty } => {
                let scope = self.current_scope()?;
                self.ast.scopes.add_type_alias(scope, name, ty, span, self.interner)
            }
            NodeKind::Static { .. } => {
                self.statics.push(idx);
                Ok(())
            }
            NodeKind::Impl {
                target,
                trait_,
                body,
                ..
            } => self.lower_impl(idx, target, trait_, body, span),
            NodeKind::Trait { name, body } => {
                let methods = self
                    .ast
                    .blocks
                    .get(body)
                    .map(|b| b.stmts.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| match self.ast.nodes.get(m).map(|n| &n.kind) {
                        Some(NodeKind::Function(f)) => Some((f.name, f.params.len())),
                        _ => None,
                    })
                    .collect();
                let scope = self.current_scope()?;
                self.ast
                    .scopes
                    .declare_trait(scope, name, TraitDef { name, methods }, span, self.interner)?;
                tracing::debug!(name = %self.name(name), "registered trait");
                Ok(())
            }
            NodeKind::MacroDef { name, arms } => {
                let scope = self.current_scope()?;
                self.ast
                    .scopes
                    .declare_macro(scope, name, Macro { name, arms }, span, self.interner)?;
                tracing::debug!(name = %self.name(name), "registered macro");
                Ok(())
            }
            NodeKind::MacroCall { name, args } => self.expand_macro_statement(name, &args, span),
            NodeKind::MacroInclude { path } => self.include(path, span),

            NodeKind::VarDecl { value, .. } => {
                if let Some(value) = value {
                    if matches!(self.kind(value)?, NodeKind::InitList { .. }) {
                        return self.lower_init_declaration(idx);
                    }
                    self.lower_expr(value)?;
                }
                Ok(())
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    self.lower_expr(value)?;
                }
                self.mark_return()
            }
            NodeKind::Break => Ok(()),
            NodeKind::If { cond, then, else_ } => {
                self.lower_expr(cond)?;
                let frame = self.frame()?;
                let scope = self.current_scope()?;
                self.lower_child_block(then, scope, frame.function)?;
                if let Some(else_) = else_ {
                    self.lower_child_block(else_, scope, frame.function)?;
                }
                self.propagate_returns(&[Some(then), else_])
            }
            NodeKind::For {
                var,
                cond,
                body,
                scope: loop_scope,
            } => {
                let frame = self.frame()?;
                let scope = self.current_scope()?;
                self.ast.scopes.set_parent(loop_scope, scope);
                if let NodeKind::VarDecl { value: Some(value), .. } = self.kind(var)? {
                    self.lower_expr(value)?;
                }
                self.lower_conditional(cond, "in a loop condition")?;
                self.lower_child_block(body, loop_scope, frame.function)?;
                self.propagate_returns(&[Some(body)])
            }
            NodeKind::Match { scrutinee, cases } => {
                self.lower_expr(scrutinee)?;
                let frame = self.frame()?;
                let scope = self.current_scope()?;
                for case in &cases {
                    self.lower_expr(case.value)?;
                    self.lower_child_block(case.body, scope, frame.function)?;
                }
                let bodies: Vec<Option<BlockId>> = cases.iter().map(|c| Some(c.body)).collect();
                self.propagate_returns(&bodies)
            }
            NodeKind::Block(block) => {
                let frame = self.frame()?;
                let scope = self.current_scope()?;
                self.lower_child_block(block, scope, frame.function)?;
                self.propagate_returns(&[Some(block)])
            }
            NodeKind::Assign { target, value } if matches!(self.kind(value)?, NodeKind::InitList { ty: None, .. }) => {
                self.lower_expr(target)?;
                self.lower_init_assignment(idx, target, value)
            }
            _ => self.lower_expr(idx),
        }
    }

    /// A `return` not at the top level of its function body routes through
    /// the shared return block.
    fn mark_return(&mut self) -> CompileResult<()> {
        let frame = self.frame()?;
        self.current_block_mut()?.returns = true;
        let Some(function) = frame.function else {
            return Ok(());
        };
        if let Some(Node {
            kind: NodeKind::Function(f),
            ..
        }) = self.ast.nodes.get_mut(function)
        {
            if f.body != Some(frame.block) {
                f.needs_ret_block = true;
            }
        }
        Ok(())
    }

    fn propagate_returns(&mut self, blocks: &[Option<BlockId>]) -> CompileResult<()> {
        let any = blocks
            .iter()
            .flatten()
            .any(|b| self.ast.blocks.get(*b).is_some_and(|b| b.returns));
        if any {
            self.current_block_mut()?.returns = true;
        }
        Ok(())
    }

    /// Registers `idx` in the current scope (under `mangled` when given) and
    /// lowers its body.
    fn lower_function(&mut self, idx: Index, mangled: Option<SymbolUsize>) -> CompileResult<()> {
        let span = self.span(idx)?;
        let NodeKind::Function(mut func) = self.kind(idx)? else {
            return Err(CompileError::internal("expected function", Some(span.to_display(self.interner))));
        };
        if let Some(mangled) = mangled {
            func.name = mangled;
        }

        let scope = self.current_scope()?;
        self.ast.scopes.set_parent(func.scope, scope);
        self.ast.scopes.mark_function_root(func.scope);
        let sig = FunctionSig {
            node: idx,
            params: func.params.iter().map(|p| p.ty.clone()).collect(),
            ret: func.ret.clone(),
        };
        self.ast
            .scopes
            .register_function(scope, func.name, sig, span, self.interner)?;
        // prototypes name external symbols and keep them as written
        let outer = self.frame()?.function.filter(|_| func.body.is_some());
        if let Some(outer) = outer {
            let link = self.nested_link_name(outer, func.name);
            self.link_names.insert(idx, link);
        }
        let body = func.body;
        let fn_scope = func.scope;
        tracing::debug!(name = %self.name(func.name), "registered function");
        self.set_kind(idx, NodeKind::Function(func))?;
        self.functions.push(idx);

        if let Some(body) = body {
            self.lower_child_block(body, fn_scope, Some(idx))?;
        }
        Ok(())
    }

    /// `outer.name`, numbered when a sibling block of `outer` already
    /// declared a function of the same name. The dot keeps it apart from
    /// every module-level name.
    fn nested_link_name(&self, outer: Index, name: SymbolUsize) -> String {
        let outer_name = match self.link_names.get(&outer) {
            Some(link) => link.clone(),
            None => match self.ast.nodes.get(outer).map(|n| &n.kind) {
                Some(NodeKind::Function(f)) => self.name(f.name),
                _ => "<?>".to_string(),
            },
        };
        let base = format!("{outer_name}.{}", self.name(name));
        let mut link = base.clone();
        let mut n = 1;
        while self.link_names.values().any(|l| *l == link) {
            link = format!("{base}.{n}");
            n += 1;
        }
        link
    }

    /// Methods are renamed to `Type_method`, recorded in the struct's method
    /// table and registered next to the impl, not inside it.
    fn lower_impl(
        &mut self,
        idx: Index,
        target: SymbolUsize,
        trait_: Option<SymbolUsize>,
        body: BlockId,
        span: Span,
    ) -> CompileResult<()> {
        let scope = self.current_scope()?;
        let impl_scope = self.block_scope(body)?;
        self.ast.scopes.set_parent(impl_scope, scope);
        let stmts = self.ast.blocks.get(body).map(|b| b.stmts.clone()).unwrap_or_default();

        for stmt in stmts {
            let NodeKind::Function(func) = self.kind(stmt)? else {
                return Err(CompileError::Malformed {
                    what: "only functions may appear inside an impl block".into(),
                    span: Some(self.span(stmt)?.to_display(self.interner)),
                });
            };
            let mangled = format!("{}_{}", self.name(target), self.name(func.name));
            let mangled = self.interner.get_or_intern(mangled);
            {
                let interner: &Interner = self.interner;
                let Some(strukt) = self.ast.scopes.lookup_struct_mut(scope, target) else {
                    return Err(CompileError::UnresolvedSymbol {
                        class: SymbolClass::Struct,
                        name: interner.resolve(target).unwrap_or("<?>").to_string(),
                        span: Some(span.to_display(interner)),
                    });
                };
                if strukt.methods.insert(func.name, mangled).is_some() {
                    return Err(CompileError::DuplicateDeclaration {
                        class: SymbolClass::Method,
                        name: interner.resolve(func.name).unwrap_or("<?>").to_string(),
                        span: Some(span.to_display(interner)),
                    });
                }
            }
            self.lower_function(stmt, Some(mangled))?;
        }

        if let Some(trait_) = trait_ {
            tracing::debug!(target = %self.name(target), trait_ = %self.name(trait_), "lowered trait impl");
        }
        self.impls.push((idx, scope));
        Ok(())
    }

    /// Lowers an expression tree: expands macro calls, hoists initializer
    /// lists and rewrites method-call sugar.
    fn lower_expr(&mut self, idx: Index) -> CompileResult<()> {
        let span = self.span(idx)?;
        match self.kind(idx)? {
            NodeKind::MacroCall { name, args } => self.expand_macro_expr(idx, name, &args, span),
            NodeKind::InitList { .. } => self.hoist_initializer(idx, None),
            NodeKind::Assign { target, value } => {
                self.lower_expr(target)?;
                self.lower_expr(value)
            }
            NodeKind::Binary {
                op: BinOpKind::And | BinOpKind::Or,
                lhs,
                rhs,
            } => {
                self.lower_expr(lhs)?;
                self.lower_conditional(rhs, "on the right of `&&` or `||`")
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)
            }
            NodeKind::Unary { operand, .. } => self.lower_expr(operand),
            NodeKind::Cast { value, .. } => self.lower_expr(value),
            NodeKind::Index { object, index } => {
                self.lower_expr(object)?;
                self.lower_expr(index)
            }
            NodeKind::Call { callee, args, dispatch } => self.lower_call(idx, callee, args, dispatch),
            NodeKind::Member { object, member, deref } => self.lower_member(idx, object, member, deref),
            NodeKind::Resolution { .. }
            | NodeKind::SizeOf { .. }
            | NodeKind::Identifier(_)
            | NodeKind::Int(_)
            | NodeKind::Float(_)
            | NodeKind::Bool(_)
            | NodeKind::Char(_)
            | NodeKind::Str(_) => Ok(()),
            _ => Err(CompileError::Malformed {
                what: "statement used where an expression was expected".into(),
                span: Some(span.to_display(self.interner)),
            }),
        }
    }

    /// Lowers an expression that is not evaluated exactly once per statement.
    fn lower_conditional(&mut self, idx: Index, place: &'static str) -> CompileResult<()> {
        let saved = self.conditional.replace(place);
        let lowered = self.lower_expr(idx);
        self.conditional = saved;
        lowered
    }

    fn lower_call(&mut self, idx: Index, callee: Index, args: Vec<Index>, dispatch: Dispatch) -> CompileResult<()> {
        let callee = self.lower_callee(callee)?;

        // the declared parameter types give untyped initializers their type
        let param_types: Vec<Type> = match (dispatch, self.kind(callee)?) {
            (Dispatch::Direct, NodeKind::Identifier(name)) => {
                let scope = self.current_scope()?;
                self.ast
                    .scopes
                    .lookup_function(scope, name)
                    .map(|sig| sig.params.clone())
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        };

        for (i, arg) in args.iter().enumerate() {
            if matches!(self.kind(*arg)?, NodeKind::InitList { .. }) {
                self.hoist_initializer(*arg, param_types.get(i).cloned())?;
            } else {
                self.lower_expr(*arg)?;
            }
        }
        self.set_kind(idx, NodeKind::Call { callee, args, dispatch })
    }
}
