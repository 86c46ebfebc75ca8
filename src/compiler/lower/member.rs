use generational_arena::Index;

use crate::compiler::{
    error::{CompileError, CompileResult},
    parser::node::{Dispatch, NodeKind, UnaryOpKind},
};

use super::LowerCtx;

impl<'a> LowerCtx<'a> {
    /// `Type::f` names the mangled function `Type_f`. Enum variants are left
    /// alone; they are constants, not callees.
    pub(super) fn lower_callee(&mut self, callee: Index) -> CompileResult<Index> {
        match self.kind(callee)? {
            NodeKind::Resolution { base, member } => {
                let scope = self.current_scope()?;
                if self.ast.scopes.lookup_enum(scope, base).is_some() {
                    return Ok(callee);
                }
                let NodeKind::Identifier(name) = self.kind(member)? else {
                    return Err(CompileError::Malformed {
                        what: "expected a function name after `::`".into(),
                        span: Some(self.span(member)?.to_display(self.interner)),
                    });
                };
                let mangled = format!("{}_{}", self.name(base), self.name(name));
                let mangled = self.interner.get_or_intern(mangled);
                self.set_kind(callee, NodeKind::Identifier(mangled))?;
                Ok(callee)
            }
            _ => {
                self.lower_expr(callee)?;
                Ok(callee)
            }
        }
    }

    /// `recv.f(args)` becomes a method call with the receiver as its first
    /// argument; `ptr->f(args)` passes `*ptr`. Field accesses stay as they are.
    pub(super) fn lower_member(&mut self, idx: Index, object: Index, member: Index, deref: bool) -> CompileResult<()> {
        self.lower_expr(object)?;

        let NodeKind::Call { callee, args, .. } = self.kind(member)? else {
            return match self.kind(member)? {
                NodeKind::Identifier(_) | NodeKind::Int(_) => Ok(()),
                _ => Err(CompileError::Malformed {
                    what: "expected a field name".into(),
                    span: Some(self.span(member)?.to_display(self.interner)),
                }),
            };
        };
        if !matches!(self.kind(callee)?, NodeKind::Identifier(_)) {
            return Err(CompileError::Malformed {
                what: "expected a method name".into(),
                span: Some(self.span(callee)?.to_display(self.interner)),
            });
        }

        let receiver = if deref {
            let span = self.span(object)?;
            self.ast.push(
                NodeKind::Unary {
                    op: UnaryOpKind::Deref,
                    operand: object,
                },
                span,
            )
        } else {
            object
        };

        for arg in &args {
            if matches!(self.kind(*arg)?, NodeKind::InitList { .. }) {
                self.hoist_initializer(*arg, None)?;
            } else {
                self.lower_expr(*arg)?;
            }
        }

        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(receiver);
        call_args.extend(args);
        self.ast.nodes.remove(member);
        self.set_kind(
            idx,
            NodeKind::Call {
                callee,
                args: call_args,
                dispatch: Dispatch::Method,
            },
        )
    }
}
