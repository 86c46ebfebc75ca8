use core::fmt;
use std::fmt::{Display, Formatter};

use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    tokens::{Punctuation, Token, TokenKind},
};

use super::node::{Ast, BinOpKind, BlockId, Dispatch, MacroParamKind, NodeKind, UnaryOpKind};

impl Display for BinOpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for UnaryOpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const INDENT: &str = "    ";

fn format_symbol(sym: SymbolUsize, interner: &Interner) -> String {
    interner.resolve(sym).unwrap_or("<unknown>").to_string()
}

/// Joins tokens back into source-like text, without spaces around brackets,
/// commas and member dots.
pub fn render_tokens(tokens: &[Token], interner: &Interner) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        if token.kind == TokenKind::Eof {
            continue;
        }
        if let Some(prev) = prev {
            let tight_after = matches!(
                prev.kind,
                TokenKind::Punctuation(
                    Punctuation::OpenParen | Punctuation::OpenBracket | Punctuation::Dot | Punctuation::Dollar
                )
            );
            let tight_before = matches!(
                token.kind,
                TokenKind::Punctuation(
                    Punctuation::CloseParen
                        | Punctuation::CloseBracket
                        | Punctuation::OpenParen
                        | Punctuation::OpenBracket
                        | Punctuation::Comma
                        | Punctuation::Semicolon
                        | Punctuation::Dot
                )
            ) || (token.is_punct(Punctuation::Dollar) && matches!(prev.kind, TokenKind::Identifier(_)));
            if !tight_after && !tight_before {
                out.push(' ');
            }
        }
        out.push_str(&token.text(interner));
        prev = Some(token);
    }
    out
}

/// Renders a node as source-like text. Statements end in `;`, nested blocks
/// are indented by four spaces.
pub fn render_node(ast: &Ast, interner: &Interner, idx: Index) -> String {
    let mut out = String::new();
    write_node(ast, interner, idx, 0, &mut out);
    out
}

/// Renders the statements of a block, one per line.
pub fn render_block(ast: &Ast, interner: &Interner, block: BlockId) -> String {
    let mut out = String::new();
    write_block_body(ast, interner, block, 0, &mut out);
    out
}

fn write_block_body(ast: &Ast, interner: &Interner, block: BlockId, depth: usize, out: &mut String) {
    let Some(block) = ast.blocks.get(block) else {
        return;
    };
    for (i, stmt) in block.stmts.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&INDENT.repeat(depth));
        write_node(ast, interner, *stmt, depth, out);
        if is_expression(ast, *stmt) {
            out.push(';');
        }
    }
}

fn write_braced(ast: &Ast, interner: &Interner, block: BlockId, depth: usize, out: &mut String) {
    let empty = ast.blocks.get(block).is_none_or(|b| b.stmts.is_empty());
    if empty {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    write_block_body(ast, interner, block, depth + 1, out);
    out.push('\n');
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn is_expression(ast: &Ast, idx: Index) -> bool {
    ast.nodes.get(idx).is_some_and(|n| {
        matches!(
            n.kind,
            NodeKind::Assign { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Cast { .. }
                | NodeKind::Call { .. }
                | NodeKind::Member { .. }
                | NodeKind::Index { .. }
                | NodeKind::Resolution { .. }
                | NodeKind::InitList { .. }
                | NodeKind::Identifier(_)
                | NodeKind::Int(_)
                | NodeKind::Float(_)
                | NodeKind::Bool(_)
                | NodeKind::Char(_)
                | NodeKind::Str(_)
                | NodeKind::SizeOf { .. }
                | NodeKind::MacroCall { .. }
        )
    })
}

fn write_list(ast: &Ast, interner: &Interner, items: &[Index], depth: usize, out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_node(ast, interner, *item, depth, out);
    }
}

fn write_node(ast: &Ast, interner: &Interner, idx: Index, depth: usize, out: &mut String) {
    let Some(node) = ast.nodes.get(idx) else {
        out.push_str("<missing>");
        return;
    };
    let sym = |s: SymbolUsize| format_symbol(s, interner);

    match &node.kind {
        NodeKind::Module { body } => write_block_body(ast, interner, *body, depth, out),
        NodeKind::Function(func) => {
            out.push_str(&format!("fn {}(", sym(func.name)));
            let params = func
                .params
                .iter()
                .map(|p| format!("{}: {}", sym(p.name), p.ty.display(interner)))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&params);
            out.push_str(&format!(") -> {}", func.ret.display(interner)));
            match func.body {
                Some(body) => {
                    out.push(' ');
                    write_braced(ast, interner, body, depth, out);
                }
                None => out.push(';'),
            }
        }
        NodeKind::StructDef { name, generics, fields } => {
            out.push_str(&format!("struct {}{} {{", sym(*name), generic_list(generics, interner)));
            for field in fields {
                out.push('\n');
                out.push_str(&INDENT.repeat(depth + 1));
                out.push_str(&format!("{}: {};", sym(field.name), field.ty.display(interner)));
            }
            if !fields.is_empty() {
                out.push('\n');
                out.push_str(&INDENT.repeat(depth));
            }
            out.push_str("};");
        }
        NodeKind::EnumDef { name, variants, backing } => {
            let variants = variants.iter().map(|v| sym(*v)).collect::<Vec<_>>().join(", ");
            out.push_str(&format!(
                "enum {} : {} {{ {} }};",
                sym(*name),
                backing.display(interner),
                variants
            ));
        }
        NodeKind::TypeAlias { name, ty } => {
            out.push_str(&format!("type {} = {};", sym(*name), ty.display(interner)));
        }
        NodeKind::Static { name, ty, init } => {
            out.push_str(&format!("static {}: {}", sym(*name), ty.display(interner)));
            if let Some(init) = init {
                out.push_str(" = ");
                write_node(ast, interner, *init, depth, out);
            }
            out.push(';');
        }
        NodeKind::Impl {
            target,
            generics,
            trait_,
            body,
        } => {
            out.push_str("impl ");
            if let Some(trait_) = trait_ {
                out.push_str(&format!("{} for ", sym(*trait_)));
            }
            out.push_str(&format!("{}{} ", sym(*target), generic_list(generics, interner)));
            write_braced(ast, interner, *body, depth, out);
        }
        NodeKind::Trait { name, body } => {
            out.push_str(&format!("trait {} ", sym(*name)));
            write_braced(ast, interner, *body, depth, out);
        }
        NodeKind::MacroDef { name, arms } => {
            out.push_str(&format!("macro {} {{", sym(*name)));
            for arm in arms {
                let params = arm
                    .params
                    .iter()
                    .map(|p| match p.kind {
                        MacroParamKind::Single => format!("{}: $", sym(p.name)),
                        MacroParamKind::Variadic => format!("{}: []", sym(p.name)),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push('\n');
                out.push_str(&INDENT.repeat(depth + 1));
                out.push_str(&format!("({}) -> {{ {} }}", params, render_tokens(&arm.body, interner)));
            }
            out.push('\n');
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
        NodeKind::MacroCall { name, args } => {
            let args = args
                .iter()
                .map(|a| render_tokens(a, interner))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{}$({})", sym(*name), args));
        }
        NodeKind::MacroInclude { path } => {
            out.push_str(&format!("#include \"{}\"", sym(*path)));
        }
        NodeKind::SizeOf { ty } => out.push_str(&format!("sizeof({})", ty.display(interner))),
        NodeKind::VarDecl {
            name,
            mutable,
            ty,
            value,
        } => {
            out.push_str("let ");
            if *mutable {
                out.push_str("mut ");
            }
            out.push_str(&sym(*name));
            if let Some(ty) = ty {
                out.push_str(&format!(": {}", ty.display(interner)));
            }
            if let Some(value) = value {
                out.push_str(" = ");
                write_node(ast, interner, *value, depth, out);
            }
            out.push(';');
        }
        NodeKind::Return { value } => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                write_node(ast, interner, *value, depth, out);
            }
            out.push(';');
        }
        NodeKind::Break => out.push_str("break;"),
        NodeKind::If { cond, then, else_ } => {
            out.push_str("if ");
            write_node(ast, interner, *cond, depth, out);
            out.push(' ');
            write_braced(ast, interner, *then, depth, out);
            if let Some(else_) = else_ {
                out.push_str(" else ");
                write_braced(ast, interner, *else_, depth, out);
            }
        }
        NodeKind::For { var, cond, body, .. } => {
            out.push_str("for ");
            let mut decl = String::new();
            write_node(ast, interner, *var, depth, &mut decl);
            out.push_str(decl.trim_end_matches(';'));
            out.push_str(" in ");
            write_node(ast, interner, *cond, depth, out);
            out.push(' ');
            write_braced(ast, interner, *body, depth, out);
        }
        NodeKind::Match { scrutinee, cases } => {
            out.push_str("match ");
            write_node(ast, interner, *scrutinee, depth, out);
            out.push_str(" {");
            for case in cases {
                out.push('\n');
                out.push_str(&INDENT.repeat(depth + 1));
                write_node(ast, interner, case.value, depth + 1, out);
                out.push_str(" -> ");
                write_braced(ast, interner, case.body, depth + 1, out);
            }
            out.push('\n');
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
        NodeKind::Block(block) => write_braced(ast, interner, *block, depth, out),
        NodeKind::Assign { target, value } => {
            write_node(ast, interner, *target, depth, out);
            out.push_str(" = ");
            write_node(ast, interner, *value, depth, out);
        }
        NodeKind::Binary { op, lhs, rhs } => {
            out.push('(');
            write_node(ast, interner, *lhs, depth, out);
            out.push_str(&format!(" {op} "));
            write_node(ast, interner, *rhs, depth, out);
            out.push(')');
        }
        NodeKind::Unary { op, operand } => {
            out.push_str(op.as_str());
            write_node(ast, interner, *operand, depth, out);
        }
        NodeKind::Cast { ty, value } => {
            out.push_str(&format!("(:{}) ", ty.display(interner)));
            write_node(ast, interner, *value, depth, out);
        }
        NodeKind::Call { callee, args, dispatch } => match (dispatch, args.split_first()) {
            (Dispatch::Method, Some((receiver, rest))) => {
                write_node(ast, interner, *receiver, depth, out);
                out.push('.');
                write_node(ast, interner, *callee, depth, out);
                out.push('(');
                write_list(ast, interner, rest, depth, out);
                out.push(')');
            }
            _ => {
                write_node(ast, interner, *callee, depth, out);
                out.push('(');
                write_list(ast, interner, args, depth, out);
                out.push(')');
            }
        },
        NodeKind::Member { object, member, deref } => {
            write_node(ast, interner, *object, depth, out);
            out.push_str(if *deref { "->" } else { "." });
            write_node(ast, interner, *member, depth, out);
        }
        NodeKind::Index { object, index } => {
            write_node(ast, interner, *object, depth, out);
            out.push('[');
            write_node(ast, interner, *index, depth, out);
            out.push(']');
        }
        NodeKind::Resolution { base, member } => {
            out.push_str(&format!("{}::", sym(*base)));
            write_node(ast, interner, *member, depth, out);
        }
        NodeKind::InitList { ty, entries } => {
            if let Some(ty) = ty {
                out.push_str(&ty.display(interner));
                out.push(' ');
            }
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(field) = entry.field {
                    out.push_str(&format!(".{} = ", sym(field)));
                }
                write_node(ast, interner, entry.value, depth, out);
            }
            out.push_str(" }");
        }
        NodeKind::Identifier(name) => out.push_str(&sym(*name)),
        NodeKind::Int(n) => out.push_str(&n.to_string()),
        NodeKind::Float(f) => out.push_str(&format!("{f:?}")),
        NodeKind::Bool(b) => out.push_str(&b.to_string()),
        NodeKind::Char(c) => out.push_str(&format!("'{}'", (*c as char).escape_default())),
        NodeKind::Str(s) => out.push_str(&format!("\"{}\"", sym(*s).escape_default())),
    }
}

fn generic_list(generics: &[SymbolUsize], interner: &Interner) -> String {
    if generics.is_empty() {
        return String::new();
    }
    let names = generics
        .iter()
        .map(|g| format_symbol(*g, interner))
        .collect::<Vec<_>>()
        .join(", ");
    format!("<{names}>")
}
