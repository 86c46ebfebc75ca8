use std::path::{Path, PathBuf};

use cranelift::{
    module::default_libcall_names,
    object::{ObjectBuilder, ObjectModule},
};
use cranelift_jit::{JITBuilder, JITModule};
use generational_arena::Index;
use string_interner::{StringInterner, backend::BucketBackend, symbol::SymbolUsize};
use tracing::{debug, instrument};

pub mod analysis;
pub mod codegen;
pub mod config;
mod diagnostic_macros;
pub mod error;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod scope;
pub mod tokens;

use config::CompileOptions;
use error::{CompileError, CompileResult};
use lower::Lowered;
use parser::{
    Parser,
    display::render_node,
    node::Ast,
    types::{Primitive, Type},
};

pub type Interner = StringInterner<BucketBackend<SymbolUsize>>;

/// A parsed, sanitized and lowered compilation unit.
pub struct Frontend {
    pub ast: Ast,
    pub interner: Interner,
    pub root: Index,
    pub lowered: Lowered,
}

impl Frontend {
    /// The lowered tree printed back as source.
    pub fn render(&self) -> String {
        render_node(&self.ast, &self.interner, self.root)
    }
}

/// Lexes, parses, sanitizes and lowers `source`. `path` names the file in
/// diagnostics and anchors relative includes.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn front_end(source: &str, path: &Path, options: &CompileOptions) -> CompileResult<Frontend> {
    let mut interner = Interner::new();
    let file = interner.get_or_intern(path.to_string_lossy());

    let tokens = lexer::tokenize(source, &mut interner, file)?;
    debug!(tokens = tokens.len(), "lexed");

    let mut ast = Ast::new();
    let root = Parser::new(tokens, &mut ast, &mut interner).parse_module()?;
    analysis::sanitize(&ast, &interner, root)?;

    let source_dir = path.parent().map(Path::to_path_buf);
    let lowered = lower::lower_module(&mut ast, &mut interner, options, root, source_dir)?;
    Ok(Frontend {
        ast,
        interner,
        root,
        lowered,
    })
}

/// A relocatable object file and, when requested, the IR it was built from.
pub struct ObjectOutput {
    pub bytes: Vec<u8>,
    pub ir: Option<String>,
}

#[instrument(level = "debug", skip_all)]
pub fn compile_to_object(source: &str, path: &Path, options: &CompileOptions) -> CompileResult<ObjectOutput> {
    let mut frontend = front_end(source, path, options)?;

    let isa = codegen::isa(options, true)?;
    let builder = ObjectBuilder::new(isa, "lygos", default_libcall_names()).map_err(CompileError::backend)?;
    let generated = codegen::generate(
        ObjectModule::new(builder),
        &mut frontend.ast,
        &mut frontend.interner,
        options,
        &frontend.lowered,
    )?;

    let ir = options.emit_ir.then(|| {
        let tree: String = frontend.render().lines().map(|l| format!("; {l}\n")).collect();
        format!("{tree}\n{}", generated.ir.join("\n"))
    });
    let bytes = generated.module.finish().emit().map_err(CompileError::backend)?;
    debug!(bytes = bytes.len(), "object emitted");
    Ok(ObjectOutput { bytes, ir })
}

/// Compiles `source` in memory and calls its `main`, returning what it returned.
#[instrument(level = "debug", skip_all)]
pub fn run_jit(source: &str, path: &Path, options: &CompileOptions) -> CompileResult<i64> {
    let mut frontend = front_end(source, path, options)?;

    let isa = codegen::isa(options, false)?;
    let module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));
    let generated = codegen::generate(
        module,
        &mut frontend.ast,
        &mut frontend.interner,
        options,
        &frontend.lowered,
    )?;

    let Some((entry, ret)) = generated.entry else {
        return Err(CompileError::Malformed {
            what: "program has no `main` function".into(),
            span: None,
        });
    };
    let main_params = frontend
        .interner
        .get("main")
        .and_then(|main| frontend.ast.scopes.lookup_function(frontend.lowered.root_scope, main))
        .map(|sig| sig.params.len())
        .unwrap_or(0);
    if main_params != 0 {
        return Err(CompileError::Malformed {
            what: "`main` must not take parameters".into(),
            span: None,
        });
    }
    let ret = frontend.ast.scopes.unalias(frontend.lowered.root_scope, &ret);
    let kind = entry_kind(&ret, &frontend.interner)?;

    let mut module = generated.module;
    module.finalize_definitions().map_err(CompileError::backend)?;
    let code = module.get_finalized_function(entry);

    // SAFETY: `code` was compiled from a `main` taking no arguments and
    // returning `kind`, with the host's default calling convention.
    let result = unsafe {
        match kind {
            EntryKind::I64 => std::mem::transmute::<*const u8, extern "C" fn() -> i64>(code)(),
            EntryKind::I32 => i64::from(std::mem::transmute::<*const u8, extern "C" fn() -> i32>(code)()),
            EntryKind::Void => {
                std::mem::transmute::<*const u8, extern "C" fn()>(code)();
                0
            }
        }
    };
    debug!(result, "main returned");

    // SAFETY: no pointer into the JIT memory outlives this call.
    unsafe { module.free_memory() };
    Ok(result)
}

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    I32,
    I64,
    Void,
}

fn entry_kind(ret: &Type, interner: &Interner) -> CompileResult<EntryKind> {
    match ret.as_primitive(interner) {
        Some(Primitive::I32) => Ok(EntryKind::I32),
        Some(Primitive::I64) => Ok(EntryKind::I64),
        Some(Primitive::Void) => Ok(EntryKind::Void),
        _ => Err(CompileError::Malformed {
            what: format!("`main` must return i32, i64 or void, not `{}`", ret.display(interner)),
            span: None,
        }),
    }
}

/// Reads `file` and writes `<stem>.o` (or `output`), plus `<stem>.clif` when
/// IR output is enabled. Returns the object path.
pub fn build(file: &Path, output: Option<PathBuf>, options: &CompileOptions) -> CompileResult<PathBuf> {
    let source = read_source(file)?;
    let object = compile_to_object(&source, file, options)?;

    let output = output.unwrap_or_else(|| file.with_extension("o"));
    std::fs::write(&output, &object.bytes).map_err(|source| CompileError::Io {
        path: output.clone(),
        source,
    })?;
    if let Some(ir) = object.ir {
        let ir_path = output.with_extension("clif");
        std::fs::write(&ir_path, ir).map_err(|source| CompileError::Io { path: ir_path, source })?;
    }
    Ok(output)
}

pub fn run(file: &Path, options: &CompileOptions) -> CompileResult<i64> {
    let source = read_source(file)?;
    run_jit(&source, file, options)
}

fn read_source(file: &Path) -> CompileResult<String> {
    std::fs::read_to_string(file).map_err(|source| CompileError::Io {
        path: file.to_path_buf(),
        source,
    })
}
