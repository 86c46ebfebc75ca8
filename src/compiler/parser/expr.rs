use generational_arena::Index;

use super::{
    ParseError, Parser,
    node::{Dispatch, InitEntry, NodeKind, UnaryOpKind},
    precedence::{BindingPower, binary_op, infix_binding_power},
};
use crate::compiler::tokens::{Keyword, Punctuation, Token, TokenKind};

impl<'a> Parser<'a> {
    pub fn parse_expr(&mut self) -> Result<Index, ParseError> {
        self.pratt_parse_expression(BindingPower::None)
    }

    /// the core pratt parsing loop.
    /// parses an expression whose operators bind at least as tightly as `min_bp`.
    fn pratt_parse_expression(&mut self, min_bp: BindingPower) -> Result<Index, ParseError> {
        let token = *self.current();
        let mut left = self.parse_nud(token)?;

        loop {
            let next = *self.current();
            let (left_bp, right_assoc) = infix_binding_power(next.kind);
            if left_bp == BindingPower::None || left_bp < min_bp {
                break;
            }
            // `->` only continues an expression when a member name follows;
            // otherwise it belongs to an enclosing match case.
            if next.is_punct(Punctuation::Arrow)
                && !matches!(
                    self.peek_offset(1).kind,
                    TokenKind::Identifier(_) | TokenKind::IntLiteral(_)
                )
            {
                break;
            }

            self.advance();
            left = match next.kind {
                TokenKind::Punctuation(Punctuation::Eq) => {
                    let value = self.pratt_parse_expression(left_bp.right(right_assoc))?;
                    let span = self.span_of(left).connect_new(&self.span_of(value));
                    self.push(NodeKind::Assign { target: left, value }, span)
                }
                TokenKind::Punctuation(Punctuation::OpenParen) => self.parse_call_led(left)?,
                TokenKind::Punctuation(Punctuation::OpenBracket) => self.parse_index_led(left)?,
                TokenKind::Punctuation(Punctuation::Dot) => self.parse_member_led(left, false)?,
                TokenKind::Punctuation(Punctuation::Arrow) => self.parse_member_led(left, true)?,
                TokenKind::Punctuation(p) => {
                    let Some(op) = binary_op(p) else {
                        return Err(self.unexpected(&format!("operator `{}`", p.as_str())));
                    };
                    let rhs = self.pratt_parse_expression(left_bp.right(right_assoc))?;
                    let span = self.span_of(left).connect_new(&self.span_of(rhs));
                    self.push(NodeKind::Binary { op, lhs: left, rhs }, span)
                }
                _ => return Err(self.unexpected("token in expression")),
            };
        }
        Ok(left)
    }

    fn parse_nud(&mut self, token: Token) -> Result<Index, ParseError> {
        match token.kind {
            TokenKind::IntLiteral(n) => {
                self.advance();
                Ok(self.push(NodeKind::Int(n), token.span))
            }
            TokenKind::FloatLiteral(f) => {
                self.advance();
                Ok(self.push(NodeKind::Float(f), token.span))
            }
            TokenKind::BoolLiteral(b) => {
                self.advance();
                Ok(self.push(NodeKind::Bool(b), token.span))
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                Ok(self.push(NodeKind::Char(c), token.span))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(self.push(NodeKind::Str(s), token.span))
            }
            TokenKind::Identifier(_) | TokenKind::Keyword(Keyword::SelfValue) | TokenKind::Keyword(Keyword::SelfType) => {
                self.parse_identifier_nud(token)
            }
            TokenKind::Keyword(Keyword::SizeOf) => {
                self.advance();
                self.expect_punct(Punctuation::OpenParen)?;
                let ty = self.parse_type()?;
                let close = self.expect_punct(Punctuation::CloseParen)?;
                Ok(self.push(NodeKind::SizeOf { ty }, token.span.connect_new(&close.span)))
            }
            TokenKind::Punctuation(Punctuation::OpenParen) => {
                self.advance();
                if self.eat_punct(Punctuation::Colon) {
                    // cast: (:T) value
                    let ty = self.parse_type()?;
                    self.expect_punct(Punctuation::CloseParen)?;
                    let value = self.pratt_parse_expression(BindingPower::Unary)?;
                    let span = token.span.connect_new(&self.span_of(value));
                    return Ok(self.push(NodeKind::Cast { ty, value }, span));
                }
                let inner = self.with_struct_literals(|p| p.parse_expr())?;
                self.expect_punct(Punctuation::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Punctuation(Punctuation::OpenBrace) if !self.no_struct_literal => {
                self.parse_initializer(None, token)
            }
            TokenKind::Punctuation(p @ (Punctuation::Amp | Punctuation::Star | Punctuation::Bang | Punctuation::Minus)) => {
                self.advance();
                let op = match p {
                    Punctuation::Amp => UnaryOpKind::AddressOf,
                    Punctuation::Star => UnaryOpKind::Deref,
                    Punctuation::Bang => UnaryOpKind::Not,
                    _ => UnaryOpKind::Neg,
                };
                let operand = self.pratt_parse_expression(BindingPower::Unary)?;
                let span = token.span.connect_new(&self.span_of(operand));
                Ok(self.push(NodeKind::Unary { op, operand }, span))
            }
            TokenKind::Punctuation(Punctuation::AmpAmp) => {
                // `&&x` lexes as one token
                self.advance();
                let operand = self.pratt_parse_expression(BindingPower::Unary)?;
                let span = token.span.connect_new(&self.span_of(operand));
                let inner = self.push(
                    NodeKind::Unary {
                        op: UnaryOpKind::AddressOf,
                        operand,
                    },
                    span,
                );
                Ok(self.push(
                    NodeKind::Unary {
                        op: UnaryOpKind::AddressOf,
                        operand: inner,
                    },
                    span,
                ))
            }
            _ => Err(self.expected("expression")),
        }
    }

    fn parse_identifier_nud(&mut self, token: Token) -> Result<Index, ParseError> {
        let name = match token.kind {
            TokenKind::Identifier(name) => name,
            TokenKind::Keyword(kw) => self.interner.get_or_intern(kw.as_str()),
            _ => return Err(self.expected("identifier")),
        };
        self.advance();

        if self.current().is_punct(Punctuation::Dollar) && self.peek_offset(1).is_punct(Punctuation::OpenParen) {
            self.advance();
            let (args, close) = self.parse_macro_args()?;
            return Ok(self.push(NodeKind::MacroCall { name, args }, token.span.connect_new(&close.span)));
        }

        if self.eat_punct(Punctuation::ColonColon) {
            let base = match (token.kind, &self.self_type) {
                (TokenKind::Keyword(Keyword::SelfType), Some(super::types::Type::Path { name, .. })) => *name,
                _ => name,
            };
            let (member, member_span) = self.expect_ident("name after `::`")?;
            let member = self.push(NodeKind::Identifier(member), member_span);
            return Ok(self.push(
                NodeKind::Resolution { base, member },
                token.span.connect_new(&member_span),
            ));
        }

        if self.current().is_punct(Punctuation::OpenBrace) && !self.no_struct_literal {
            let ty = match (token.kind, &self.self_type) {
                (TokenKind::Keyword(Keyword::SelfType), Some(self_ty)) => self_ty.clone(),
                _ => super::types::Type::path(name),
            };
            let open = *self.current();
            return self.parse_initializer(Some(ty), open).map(|idx| {
                if let Some(node) = self.ast.nodes.get_mut(idx) {
                    node.span = token.span.connect_new(&node.span);
                }
                idx
            });
        }

        Ok(self.push(NodeKind::Identifier(name), token.span))
    }

    /// `{ .a = 1, .b = 2 }` or `{ 1, 2 }`, with the opening brace current.
    fn parse_initializer(&mut self, ty: Option<super::types::Type>, open: Token) -> Result<Index, ParseError> {
        self.expect_punct(Punctuation::OpenBrace)?;
        let mut entries = Vec::new();
        while !self.current().is_punct(Punctuation::CloseBrace) {
            let field = if self.eat_punct(Punctuation::Dot) {
                let (field, _) = self.expect_ident("field name")?;
                self.expect_punct(Punctuation::Eq)?;
                Some(field)
            } else {
                None
            };
            let value = self.with_struct_literals(|p| p.parse_expr())?;
            entries.push(InitEntry { field, value });
            if !self.eat_punct(Punctuation::Comma) {
                break;
            }
        }
        let close = self.expect_punct(Punctuation::CloseBrace)?;
        Ok(self.push(NodeKind::InitList { ty, entries }, open.span.connect_new(&close.span)))
    }

    fn parse_call_led(&mut self, callee: Index) -> Result<Index, ParseError> {
        let (args, close) = self.parse_call_args()?;
        let span = self.span_of(callee).connect_new(&close.span);
        Ok(self.push(
            NodeKind::Call {
                callee,
                args,
                dispatch: Dispatch::Direct,
            },
            span,
        ))
    }

    /// Argument list after the opening parenthesis has been consumed.
    fn parse_call_args(&mut self) -> Result<(Vec<Index>, Token), ParseError> {
        let mut args = Vec::new();
        self.with_struct_literals(|p| {
            while !p.current().is_punct(Punctuation::CloseParen) {
                args.push(p.parse_expr()?);
                if !p.eat_punct(Punctuation::Comma) {
                    break;
                }
            }
            Ok(())
        })?;
        let close = self.expect_punct(Punctuation::CloseParen)?;
        Ok((args, close))
    }

    fn parse_index_led(&mut self, object: Index) -> Result<Index, ParseError> {
        let index = self.with_struct_literals(|p| p.parse_expr())?;
        let close = self.expect_punct(Punctuation::CloseBracket)?;
        let span = self.span_of(object).connect_new(&close.span);
        Ok(self.push(NodeKind::Index { object, index }, span))
    }

    /// `.name`, `.name(args)` or `.0`; `->` variants when `deref` is set.
    fn parse_member_led(&mut self, object: Index, deref: bool) -> Result<Index, ParseError> {
        let token = self.advance();
        let member = match token.kind {
            TokenKind::Identifier(name) => {
                let ident = self.push(NodeKind::Identifier(name), token.span);
                if self.eat_punct(Punctuation::OpenParen) {
                    let (args, close) = self.parse_call_args()?;
                    self.push(
                        NodeKind::Call {
                            callee: ident,
                            args,
                            dispatch: Dispatch::Direct,
                        },
                        token.span.connect_new(&close.span),
                    )
                } else {
                    ident
                }
            }
            TokenKind::IntLiteral(n) if n >= 0 => self.push(NodeKind::Int(n), token.span),
            _ => {
                return Err(ParseError::Expected {
                    what: "field or method name".into(),
                    got: format!("`{}`", token.text(self.interner)),
                    span: token.span.to_display(self.interner),
                });
            }
        };
        let span = self.span_of(object).connect_new(&self.span_of(member));
        Ok(self.push(NodeKind::Member { object, member, deref }, span))
    }
}
