use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use cranelift::{
    codegen::Context,
    module::{DataDescription, DataId, FuncId, Linkage, Module},
    prelude::{
        AbiParam, Signature,
        isa::{self, TargetIsa},
        settings::{self, Configurable, Flags},
        types::{I32, I64},
    },
};
use generational_arena::{Arena, Index};
use string_interner::symbol::SymbolUsize;
use target_lexicon::{PointerWidth as TargetPointerWidth, Triple};
use tracing::{debug, instrument};

use crate::compiler::{
    Interner,
    analysis::{Primitives, TypeQuery},
    config::CompileOptions,
    error::{CompileError, CompileResult, SymbolClass},
    lower::Lowered,
    parser::{
        node::{Ast, Block, Node, NodeKind, UnaryOpKind},
        types::Type,
    },
    scope::{ScopeId, ScopeTree, Storage, Variable},
    tokens::Span,
};

mod access;
mod binary_ops;
mod cast;
mod control_flow;
mod expr;
mod function;
mod function_call;
mod literal;
pub mod types;
mod unary_ops;
mod variable;

use types::BackendType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtrWidth {
    X32,
    X64,
}

impl PtrWidth {
    pub fn to_clif(self) -> cranelift::prelude::Type {
        match self {
            PtrWidth::X32 => I32,
            PtrWidth::X64 => I64,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            PtrWidth::X32 => 4,
            PtrWidth::X64 => 8,
        }
    }
}

static PTR_WIDTH: OnceLock<PtrWidth> = OnceLock::new();

pub fn ptr_width() -> PtrWidth {
    *PTR_WIDTH.get_or_init(|| {
        let triple = Triple::host();
        match triple.pointer_width() {
            Ok(TargetPointerWidth::U16) => PtrWidth::X32,
            Ok(TargetPointerWidth::U32) => PtrWidth::X32,
            Ok(TargetPointerWidth::U64) => PtrWidth::X64,
            Err(_) => PtrWidth::X64,
        }
    })
}

/// The host ISA configured from `options`. Object files are position
/// independent; JIT code is not.
pub fn isa(options: &CompileOptions, pic: bool) -> CompileResult<Arc<dyn TargetIsa>> {
    let triple = Triple::host();

    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", options.opt_level.as_setting())
        .map_err(CompileError::backend)?;
    flag_builder
        .set("enable_verifier", if options.verify { "true" } else { "false" })
        .map_err(CompileError::backend)?;
    flag_builder
        .set("is_pic", if pic { "true" } else { "false" })
        .map_err(CompileError::backend)?;
    let flags = Flags::new(flag_builder);

    let isa_builder = isa::lookup(triple.clone()).map_err(|e| CompileError::Backend {
        message: format!("target {triple} is not supported: {e}"),
    })?;
    isa_builder.finish(flags).map_err(|e| CompileError::Backend {
        message: format!("failed to create ISA for {triple}: {e}"),
    })
}

/// Everything function generation shares across one module.
pub struct Info<'a, M: Module> {
    pub module: M,
    pub ctx: Context,
    pub nodes: &'a Arena<Node>,
    pub blocks: &'a Arena<Block>,
    pub scopes: &'a mut ScopeTree,
    pub interner: &'a Interner,
    pub options: &'a CompileOptions,
    pub prims: Primitives,
    pub func_ids: HashMap<Index, FuncId>,
    pub link_names: &'a HashMap<Index, String>,
    /// One read-only data object per distinct string literal.
    pub strings: HashMap<SymbolUsize, DataId>,
    pub ir: Vec<String>,
}

/// The finished module and what was recorded while building it.
pub struct Generated<M> {
    pub module: M,
    /// Cranelift IR of each defined function, when requested.
    pub ir: Vec<String>,
    /// `main` if the module defines one.
    pub entry: Option<(FuncId, Type)>,
}

/// Declares and defines every lowered function and static of `ast` in `module`.
#[instrument(level = "debug", skip_all)]
pub fn generate<M: Module>(
    module: M,
    ast: &mut Ast,
    interner: &mut Interner,
    options: &CompileOptions,
    lowered: &Lowered,
) -> CompileResult<Generated<M>> {
    let prims = Primitives::intern(interner);
    let main = interner.get_or_intern("main");
    let interner: &Interner = interner;
    let Ast { nodes, blocks, scopes } = ast;

    let mut info = Info {
        module,
        ctx: Context::new(),
        nodes,
        blocks,
        scopes,
        interner,
        options,
        prims,
        func_ids: HashMap::new(),
        link_names: &lowered.link_names,
        strings: HashMap::new(),
        ir: Vec::new(),
    };

    for &(idx, scope) in &lowered.impls {
        info.check_trait_impl(idx, scope)?;
    }
    for &idx in &lowered.statics {
        info.define_static(lowered.root_scope, idx)?;
    }
    for &idx in &lowered.functions {
        info.declare_function(idx)?;
    }
    for &idx in &lowered.functions {
        info.define_function(idx)?;
    }

    let entry = match info.scopes.lookup_function(lowered.root_scope, main) {
        Some(sig) => info.func_ids.get(&sig.node).map(|id| (*id, sig.ret.clone())),
        None => None,
    };
    debug!(functions = info.func_ids.len(), strings = info.strings.len(), "module generated");

    let Info { module, ir, .. } = info;
    Ok(Generated { module, ir, entry })
}

impl<'a, M: Module> Info<'a, M> {
    pub fn name(&self, sym: SymbolUsize) -> String {
        self.interner.resolve(sym).unwrap_or("<?>").to_string()
    }

    pub fn node(&self, idx: Index) -> CompileResult<&'a Node> {
        let nodes: &'a Arena<Node> = self.nodes;
        nodes
            .get(idx)
            .ok_or_else(|| CompileError::internal("dangling node index during code generation", None))
    }

    pub fn query(&self) -> TypeQuery<'_> {
        TypeQuery {
            nodes: self.nodes,
            scopes: &*self.scopes,
            interner: self.interner,
            prims: self.prims,
        }
    }

    pub fn backend_type(&self, scope: ScopeId, ty: &Type, span: Span) -> CompileResult<BackendType> {
        self.scopes.backend_type(scope, ty, self.interner, span)
    }

    /// The machine signature of a function. Aggregate parameters travel by
    /// address; an aggregate result is written through a hidden first
    /// parameter, reported by the returned flag.
    pub fn signature(&self, scope: ScopeId, params: &[Type], ret: &Type, span: Span) -> CompileResult<(Signature, bool)> {
        let mut sig = self.module.make_signature();
        let ptr = ptr_width().to_clif();

        let ret_bt = self.backend_type(scope, ret, span)?;
        let sret = ret_bt.is_aggregate();
        if sret {
            sig.params.push(AbiParam::new(ptr));
        }

        for param in params {
            let bt = self.backend_type(scope, param, span)?;
            let clif = match bt.clif() {
                Some(clif) => clif,
                None if bt.is_aggregate() => ptr,
                None => {
                    return Err(CompileError::Malformed {
                        what: "a parameter cannot have type `void`".into(),
                        span: Some(span.to_display(self.interner)),
                    });
                }
            };
            sig.params.push(AbiParam::new(clif));
        }

        if let Some(clif) = ret_bt.clif() {
            sig.returns.push(AbiParam::new(clif));
        }
        Ok((sig, sret))
    }

    fn declare_function(&mut self, idx: Index) -> CompileResult<()> {
        let node = self.node(idx)?;
        let NodeKind::Function(func) = &node.kind else {
            return Err(CompileError::internal("expected a function", Some(node.span.to_display(self.interner))));
        };
        let params: Vec<Type> = func.params.iter().map(|p| p.ty.clone()).collect();
        let (sig, _) = self.signature(func.scope, &params, &func.ret, node.span)?;
        let linkage = if func.body.is_some() { Linkage::Export } else { Linkage::Import };

        let name = match self.link_names.get(&idx) {
            Some(link) => link.clone(),
            None => self.name(func.name),
        };
        let id = self
            .module
            .declare_function(&name, linkage, &sig)
            .map_err(|e| CompileError::Backend {
                message: format!("declaring `{name}`: {e}"),
            })?;
        debug!(%name, ?linkage, "declared function");
        self.func_ids.insert(idx, id);
        Ok(())
    }

    /// Statics become writable data objects initialised from a literal, or
    /// zero when no initializer is given.
    fn define_static(&mut self, root_scope: ScopeId, idx: Index) -> CompileResult<()> {
        let node = self.node(idx)?;
        let NodeKind::Static { name, ty, init } = &node.kind else {
            return Err(CompileError::internal("expected a static", Some(node.span.to_display(self.interner))));
        };
        let bt = self.backend_type(root_scope, ty, node.span)?;
        if bt.is_void() {
            return Err(CompileError::Malformed {
                what: format!("static `{}` cannot have type `void`", self.name(*name)),
                span: Some(node.span.to_display(self.interner)),
            });
        }

        let mut desc = DataDescription::new();
        match init {
            None => desc.define_zeroinit(bt.size() as usize),
            Some(init) => {
                let bytes = self.static_bytes(*init, &bt)?;
                desc.define(bytes.into_boxed_slice());
            }
        }

        let symbol = self.name(*name);
        let id = self
            .module
            .declare_data(&symbol, Linkage::Export, true, false)
            .map_err(|e| CompileError::Backend {
                message: format!("declaring static `{symbol}`: {e}"),
            })?;
        self.module.define_data(id, &desc).map_err(|e| CompileError::Backend {
            message: format!("defining static `{symbol}`: {e}"),
        })?;

        let var = Variable {
            ty: ty.clone(),
            storage: Storage::Global(id),
        };
        self.scopes
            .declare_var(root_scope, *name, var, node.span, self.interner)
    }

    fn static_bytes(&self, init: Index, bt: &BackendType) -> CompileResult<Vec<u8>> {
        let node = self.node(init)?;
        let size = bt.size() as usize;
        let (value, negate) = match &node.kind {
            NodeKind::Unary {
                op: UnaryOpKind::Neg,
                operand,
            } => (&self.node(*operand)?.kind, true),
            kind => (kind, false),
        };

        let bytes = match (value, bt) {
            (NodeKind::Int(n), BackendType::Int { .. } | BackendType::Pointer) => {
                let n = if negate { n.wrapping_neg() } else { *n };
                n.to_le_bytes()[..size].to_vec()
            }
            (NodeKind::Int(n), BackendType::Float { bits }) => float_bytes(if negate { -(*n as f64) } else { *n as f64 }, *bits),
            (NodeKind::Float(f), BackendType::Float { bits }) => float_bytes(if negate { -f } else { *f }, *bits),
            (NodeKind::Bool(b), BackendType::Bool) if !negate => vec![u8::from(*b)],
            (NodeKind::Char(c), BackendType::Int { bits: 8, .. }) if !negate => vec![*c],
            _ => {
                return Err(CompileError::Malformed {
                    what: "a static initializer must be a literal of the static's type".into(),
                    span: Some(node.span.to_display(self.interner)),
                });
            }
        };
        Ok(bytes)
    }

    /// `impl Trait for T` must supply every method the trait names, with the
    /// same number of parameters, and only once per type.
    fn check_trait_impl(&mut self, idx: Index, scope: ScopeId) -> CompileResult<()> {
        let node = self.node(idx)?;
        let NodeKind::Impl {
            target,
            trait_: Some(trait_),
            ..
        } = &node.kind
        else {
            return Ok(());
        };
        let span = Some(node.span.to_display(self.interner));

        let required = self
            .scopes
            .resolve_trait(scope, *trait_, node.span, self.interner)?
            .methods
            .clone();
        let strukt = self.scopes.resolve_struct(scope, *target, node.span, self.interner)?;
        if strukt.traits.contains(trait_) {
            return Err(CompileError::DuplicateDeclaration {
                class: SymbolClass::Trait,
                name: format!("{} for {}", self.name(*trait_), self.name(*target)),
                span,
            });
        }

        for (method, arity) in &required {
            let Some(mangled) = strukt.methods.get(method) else {
                return Err(CompileError::UnresolvedSymbol {
                    class: SymbolClass::Method,
                    name: format!("{}::{}", self.name(*target), self.name(*method)),
                    span,
                });
            };
            let found = self
                .scopes
                .lookup_function(scope, *mangled)
                .map(|sig| sig.params.len())
                .unwrap_or(0);
            if found != *arity {
                return Err(CompileError::ArityMismatch {
                    what: format!("trait method `{}::{}`", self.name(*trait_), self.name(*method)),
                    expected: *arity,
                    found,
                    span,
                });
            }
        }

        if let Some(strukt) = self.scopes.lookup_struct_mut(scope, *target) {
            strukt.traits.insert(*trait_);
        }
        debug!(target = %self.name(*target), trait_ = %self.name(*trait_), "trait implementation checked");
        Ok(())
    }
}

fn float_bytes(value: f64, bits: u8) -> Vec<u8> {
    if bits == 32 {
        (value as f32).to_le_bytes().to_vec()
    } else {
        value.to_le_bytes().to_vec()
    }
}
