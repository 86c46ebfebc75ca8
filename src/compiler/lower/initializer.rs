use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    error::{CompileError, CompileResult},
    parser::{
        node::{InitEntry, NodeKind, UnaryOpKind},
        types::Type,
    },
    tokens::Span,
};

use super::LowerCtx;

impl<'a> LowerCtx<'a> {
    /// `let p: P = { .x = 1, .y = 2 };` becomes a declaration without a value
    /// followed by one field assignment per entry.
    pub(super) fn lower_init_declaration(&mut self, decl: Index) -> CompileResult<()> {
        let NodeKind::VarDecl {
            name,
            mutable,
            ty,
            value: Some(init),
        } = self.kind(decl)?
        else {
            return Err(CompileError::internal("expected an initialised declaration", None));
        };
        let NodeKind::InitList { ty: literal_ty, entries } = self.kind(init)? else {
            return Err(CompileError::internal("expected an initializer list", None));
        };
        let span = self.span(init)?;
        let ty = self.initializer_type(literal_ty.or(ty), span)?;

        self.lower_entries(&ty, &entries)?;
        self.set_kind(
            decl,
            NodeKind::VarDecl {
                name,
                mutable,
                ty: Some(ty.clone()),
                value: None,
            },
        )?;
        self.ast.nodes.remove(init);

        let mut stmts = vec![decl];
        stmts.extend(self.field_assignments(name, &ty, &entries, span));
        self.current_block_mut()?.replace_current(stmts);
        Ok(())
    }

    /// `target = { a, b };` assigns each entry to the matching field of the
    /// existing target. Anything but a plain variable is evaluated once into
    /// a pointer temporary and every entry is written through it.
    pub(super) fn lower_init_assignment(&mut self, assign: Index, target: Index, init: Index) -> CompileResult<()> {
        let NodeKind::InitList { entries, .. } = self.kind(init)? else {
            return Err(CompileError::internal("expected an initializer list", None));
        };
        let span = self.span(assign)?;

        let (base, deref) = match self.kind(target)? {
            NodeKind::Identifier(name) => {
                self.ast.nodes.remove(target);
                (name, false)
            }
            _ => {
                let tmp = self.fresh_temp("target");
                let addr = self.ast.push(
                    NodeKind::Unary {
                        op: UnaryOpKind::AddressOf,
                        operand: target,
                    },
                    span,
                );
                let decl = self.ast.push(
                    NodeKind::VarDecl {
                        name: tmp,
                        mutable: false,
                        ty: None,
                        value: Some(addr),
                    },
                    span,
                );
                self.current_block_mut()?.insert_before_current(vec![decl]);
                (tmp, true)
            }
        };

        for entry in &entries {
            if matches!(self.kind(entry.value)?, NodeKind::InitList { .. }) {
                self.hoist_initializer(entry.value, None)?;
            } else {
                self.lower_expr(entry.value)?;
            }
        }

        // the target type is unknown here, so positional entries stay `.N`
        let stmts = entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| {
                let object = self.ast.push(NodeKind::Identifier(base), span);
                let member = self.member_node(entry.field, pos, span);
                let field = self.ast.push(NodeKind::Member { object, member, deref }, span);
                self.ast.push(
                    NodeKind::Assign {
                        target: field,
                        value: entry.value,
                    },
                    span,
                )
            })
            .collect();
        self.ast.nodes.remove(init);
        self.ast.nodes.remove(assign);
        self.current_block_mut()?.replace_current(stmts);
        Ok(())
    }

    /// Moves an initializer list that is not a statement of its own into a
    /// temporary declared just before the current statement.
    pub(super) fn hoist_initializer(&mut self, idx: Index, hint: Option<Type>) -> CompileResult<()> {
        let NodeKind::InitList { ty, entries } = self.kind(idx)? else {
            return Err(CompileError::internal("expected an initializer list", None));
        };
        let span = self.span(idx)?;
        if let Some(place) = self.conditional {
            return Err(CompileError::Malformed {
                what: format!("an initializer list cannot appear {place}; bind it to a variable first"),
                span: Some(span.to_display(self.interner)),
            });
        }
        let ty = self.initializer_type(ty.or(hint), span)?;
        self.lower_entries(&ty, &entries)?;

        let tmp = self.fresh_temp("init");
        let decl = self.ast.push(
            NodeKind::VarDecl {
                name: tmp,
                mutable: true,
                ty: Some(ty.clone()),
                value: None,
            },
            span,
        );
        let mut stmts = vec![decl];
        stmts.extend(self.field_assignments(tmp, &ty, &entries, span));
        tracing::trace!(temp = %self.name(tmp), "hoisted initializer");

        self.current_block_mut()?.insert_before_current(stmts);
        self.set_kind(idx, NodeKind::Identifier(tmp))
    }

    fn initializer_type(&self, ty: Option<Type>, span: Span) -> CompileResult<Type> {
        ty.ok_or_else(|| CompileError::Malformed {
            what: "cannot infer the type of this initializer list; add a type".into(),
            span: Some(span.to_display(self.interner)),
        })
    }

    /// Lowers entry values, giving nested untyped lists the field's type.
    fn lower_entries(&mut self, ty: &Type, entries: &[InitEntry]) -> CompileResult<()> {
        for (pos, entry) in entries.iter().enumerate() {
            if matches!(self.kind(entry.value)?, NodeKind::InitList { .. }) {
                let hint = self.entry_type(ty, entry.field, pos)?;
                self.hoist_initializer(entry.value, hint)?;
            } else {
                self.lower_expr(entry.value)?;
            }
        }
        Ok(())
    }

    /// The declared type of one entry of an initializer for `ty`.
    fn entry_type(&self, ty: &Type, field: Option<SymbolUsize>, pos: usize) -> CompileResult<Option<Type>> {
        let scope = self.current_scope()?;
        Ok(match self.ast.scopes.unalias(scope, ty) {
            Type::Array { inner, .. } => Some(*inner),
            Type::Path { name, args } => self.ast.scopes.lookup_struct(scope, name).and_then(|s| {
                let index = match field {
                    Some(field) => s.field_index(field)?,
                    None => pos,
                };
                s.fields.get(index).map(|f| f.ty.substitute(&s.generics, &args))
            }),
            _ => None,
        })
    }

    fn member_node(&mut self, field: Option<SymbolUsize>, pos: usize, span: Span) -> Index {
        match field {
            Some(field) => self.ast.push(NodeKind::Identifier(field), span),
            None => self.ast.push(NodeKind::Int(pos as i64), span),
        }
    }

    /// One assignment per entry. Array elements are indexed, struct fields
    /// are accessed by name or position.
    fn field_assignments(&mut self, target: SymbolUsize, ty: &Type, entries: &[InitEntry], span: Span) -> Vec<Index> {
        let is_array = self
            .current_scope()
            .map(|scope| matches!(self.ast.scopes.unalias(scope, ty), Type::Array { .. }))
            .unwrap_or(false);

        entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| {
                let object = self.ast.push(NodeKind::Identifier(target), span);
                let lhs = if is_array && entry.field.is_none() {
                    let index = self.ast.push(NodeKind::Int(pos as i64), span);
                    self.ast.push(NodeKind::Index { object, index }, span)
                } else {
                    let member = self.member_node(entry.field, pos, span);
                    self.ast.push(
                        NodeKind::Member {
                            object,
                            member,
                            deref: false,
                        },
                        span,
                    )
                };
                self.ast.push(
                    NodeKind::Assign {
                        target: lhs,
                        value: entry.value,
                    },
                    span,
                )
            })
            .collect()
    }
}
