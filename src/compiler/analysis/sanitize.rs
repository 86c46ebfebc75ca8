use std::collections::HashSet;

use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{Ast, BlockId, Function, MacroParamKind, NodeKind, Param},
        types::{Primitive, Type},
    },
    tokens::Span,
};

/// Structural checks run once on the parsed tree, before lowering.
#[tracing::instrument(level = "debug", skip_all)]
pub fn sanitize(ast: &Ast, interner: &Interner, root: Index) -> CompileResult<()> {
    let validator = AstValidator { ast, interner };
    match ast.nodes.get(root).map(|n| &n.kind) {
        Some(NodeKind::Module { body }) => validator.validate_module(*body),
        _ => Err(CompileError::internal("sanitize expects a module root", None)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Module,
    Function,
    Impl,
    Trait,
}

struct AstValidator<'a> {
    ast: &'a Ast,
    interner: &'a Interner,
}

impl<'a> AstValidator<'a> {
    fn name(&self, sym: SymbolUsize) -> String {
        self.interner.resolve(sym).unwrap_or("<?>").to_string()
    }

    fn malformed(&self, what: impl Into<String>, span: Span) -> CompileError {
        CompileError::Malformed {
            what: what.into(),
            span: Some(span.to_display(self.interner)),
        }
    }

    /// Fails on the first name that appears twice.
    fn unique(&self, names: impl IntoIterator<Item = SymbolUsize>, class: SymbolClass, span: Span) -> CompileResult<()> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(CompileError::DuplicateDeclaration {
                    class,
                    name: self.name(name),
                    span: Some(span.to_display(self.interner)),
                });
            }
        }
        Ok(())
    }

    fn stmts(&self, block: BlockId) -> CompileResult<&[Index]> {
        self.ast
            .blocks
            .get(block)
            .map(|b| b.stmts.as_slice())
            .ok_or_else(|| CompileError::internal("dangling block index", None))
    }

    fn validate_module(&self, body: BlockId) -> CompileResult<()> {
        for &stmt in self.stmts(body)? {
            let node = &self.ast.nodes[stmt];
            if !node.kind.is_item() && !matches!(node.kind, NodeKind::MacroCall { .. }) {
                return Err(self.malformed("only items and macro calls may appear at module level", node.span));
            }
            self.validate_item(stmt, Context::Module)?;
        }
        Ok(())
    }

    fn validate_item(&self, idx: Index, context: Context) -> CompileResult<()> {
        let node = &self.ast.nodes[idx];
        let span = node.span;
        match &node.kind {
            NodeKind::Function(func) => self.validate_function(func, context, span),
            NodeKind::StructDef { generics, fields, .. } => {
                self.unique(generics.iter().copied(), SymbolClass::Generic, span)?;
                self.unique(fields.iter().map(|f| f.name), SymbolClass::Field, span)
            }
            NodeKind::EnumDef { name, variants, backing } => {
                if variants.is_empty() {
                    return Err(self.malformed(format!("enum `{}` declares no variants", self.name(*name)), span));
                }
                if !backing.as_primitive(self.interner).is_some_and(Primitive::is_integer) {
                    return Err(self.malformed(
                        format!(
                            "enum `{}` must be backed by an integer type, not `{}`",
                            self.name(*name),
                            backing.display(self.interner)
                        ),
                        span,
                    ));
                }
                self.unique(variants.iter().copied(), SymbolClass::Variant, span)
            }
            NodeKind::MacroDef { arms, .. } => {
                for arm in arms {
                    self.unique(arm.params.iter().map(|p| p.name), SymbolClass::Parameter, span)?;
                    let variadic = arm.params.iter().filter(|p| p.kind == MacroParamKind::Variadic).count();
                    let last_is_variadic = arm.params.last().is_some_and(|p| p.kind == MacroParamKind::Variadic);
                    if variadic > 1 || (variadic == 1 && !last_is_variadic) {
                        return Err(self.malformed("a macro arm takes at most one variadic parameter, in last position", span));
                    }
                }
                Ok(())
            }
            NodeKind::Impl { generics, body, .. } => {
                self.unique(generics.iter().copied(), SymbolClass::Generic, span)?;
                for &stmt in self.stmts(*body)? {
                    if !matches!(self.ast.nodes[stmt].kind, NodeKind::Function(_)) {
                        return Err(self.malformed("only functions may appear inside an impl block", self.ast.nodes[stmt].span));
                    }
                    self.validate_item(stmt, Context::Impl)?;
                    if let NodeKind::Function(func) = &self.ast.nodes[stmt].kind {
                        self.non_generic_signature(func, generics, self.ast.nodes[stmt].span)?;
                    }
                }
                Ok(())
            }
            NodeKind::Trait { body, .. } => {
                for &stmt in self.stmts(*body)? {
                    match &self.ast.nodes[stmt].kind {
                        NodeKind::Function(Function { body: None, .. }) => self.validate_item(stmt, Context::Trait)?,
                        _ => {
                            return Err(self.malformed(
                                "traits may only contain method prototypes",
                                self.ast.nodes[stmt].span,
                            ));
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_function(&self, func: &Function, context: Context, span: Span) -> CompileResult<()> {
        self.unique(func.params.iter().map(|p| p.name), SymbolClass::Parameter, span)?;

        let self_sym = self.interner.get("self");
        for (i, param) in func.params.iter().enumerate() {
            if Some(param.name) != self_sym {
                continue;
            }
            let in_method = matches!(context, Context::Impl | Context::Trait);
            if i != 0 || !in_method {
                return Err(self.malformed(
                    "`self` is only allowed as the first parameter of a method",
                    param.span,
                ));
            }
        }

        match func.body {
            Some(body) => self.validate_body(body),
            None => Ok(()),
        }
    }

    /// Methods are emitted once per impl, not per instantiation, so their
    /// signatures cannot depend on the impl's type parameters. A `self`
    /// taken by pointer is fine.
    fn non_generic_signature(&self, func: &Function, generics: &[SymbolUsize], span: Span) -> CompileResult<()> {
        let self_sym = self.interner.get("self");
        let by_pointer_self = |p: &Param| Some(p.name) == self_sym && matches!(p.ty, Type::Pointer { .. });
        let params = func.params.iter().filter(|p| !by_pointer_self(*p));
        for (ty, span) in params.map(|p| (&p.ty, p.span)).chain(std::iter::once((&func.ret, span))) {
            if let Some(g) = generics.iter().find(|g| ty.mentions(**g)) {
                return Err(self.malformed(
                    format!(
                        "method `{}` of a generic impl cannot use its type parameter `{}` in its signature",
                        self.name(func.name),
                        self.name(*g)
                    ),
                    span,
                ));
            }
        }
        Ok(())
    }

    fn validate_body(&self, block: BlockId) -> CompileResult<()> {
        for &stmt in self.stmts(block)? {
            let node = &self.ast.nodes[stmt];
            match &node.kind {
                NodeKind::Function(_)
                | NodeKind::StructDef { .. }
                | NodeKind::EnumDef { .. }
                | NodeKind::TypeAlias { .. }
                | NodeKind::MacroDef { .. } => self.validate_item(stmt, Context::Function)?,
                NodeKind::Impl { .. } | NodeKind::Trait { .. } | NodeKind::Static { .. } => {
                    return Err(self.malformed("this item is only allowed at module level", node.span));
                }
                NodeKind::If { then, else_, .. } => {
                    self.validate_body(*then)?;
                    if let Some(else_) = else_ {
                        self.validate_body(*else_)?;
                    }
                }
                NodeKind::For { body, .. } => self.validate_body(*body)?,
                NodeKind::Match { cases, .. } => {
                    for case in cases {
                        self.validate_body(case.body)?;
                    }
                }
                NodeKind::Block(inner) => self.validate_body(*inner)?,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lexer, parser::Parser};

    fn check(src: &str) -> CompileResult<()> {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("t.ly");
        let tokens = lexer::tokenize(src, &mut interner, file)?;
        let mut ast = Ast::new();
        let root = Parser::new(tokens, &mut ast, &mut interner).parse_module()?;
        sanitize(&ast, &interner, root)
    }

    #[test]
    fn test_well_formed_program_passes() {
        check(
            "struct P { x: i32; y: i32; }; enum E : u8 { A, B }
             impl P { fn get(&self) -> i32 { return self.x; } }
             fn main() -> i32 { fn inner() -> i32 { return 1; } return inner(); }",
        )
        .unwrap();
    }

    #[test]
    fn test_duplicate_parameter() {
        let err = check("fn f(a: i32, a: i32) {}").unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration {
                class: SymbolClass::Parameter,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_field() {
        let err = check("struct P { x: i32; x: i32; };").unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration {
                class: SymbolClass::Field,
                ..
            }
        ));
    }

    #[test]
    fn test_enum_rules() {
        assert!(matches!(check("enum E { }").unwrap_err(), CompileError::Malformed { .. }));
        assert!(matches!(check("enum E : f64 { A }").unwrap_err(), CompileError::Malformed { .. }));
    }

    #[test]
    fn test_variadic_must_be_last() {
        let err = check("macro m { (xs: [], y: $) -> { $y } }").unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_self_outside_impl() {
        let err = check("fn f(self) {}").unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_statement_at_module_level() {
        let err = check("let x = 1;").unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_impl_inside_function() {
        let err = check("struct P { x: i32; }; fn f() { impl P { fn g() {} } }").unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_generic_impl_signature_cannot_name_its_parameter() {
        let err = check("struct Box<T> { v: T; }; impl Box<T> { fn get(&self) -> T { return self.v; } }").unwrap_err();
        assert!(matches!(&err, CompileError::Malformed { what, .. } if what.contains("type parameter `T`")));

        let err = check("struct Box<T> { v: T; }; impl Box<T> { fn set(&mut self, v: T) { self.v = v; } }").unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));

        check("struct Box<T> { v: T; }; impl Box<T> { fn tag(&self) -> i32 { return 1; } }").unwrap();
    }
}
