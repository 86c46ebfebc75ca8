use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use super::{
    ParseError, Parser,
    node::{Field, Function, NodeKind, Param},
    types::Type,
};
use crate::compiler::tokens::{Keyword, Punctuation, TokenKind};

impl<'a> Parser<'a> {
    /// Parses a type annotation and advances past it.
    pub fn parse_type(&mut self) -> Result<Type, ParseError> {
        let token = *self.current();
        match token.kind {
            TokenKind::Punctuation(Punctuation::Star | Punctuation::Amp) => {
                self.advance();
                let mutable = if self.current().is_keyword(Keyword::Mut) {
                    self.advance();
                    true
                } else {
                    false
                };
                let inner = self.parse_type()?;
                Ok(Type::Pointer {
                    inner: Box::new(inner),
                    mutable,
                    is_ref: token.is_punct(Punctuation::Amp),
                })
            }
            TokenKind::Punctuation(Punctuation::OpenBracket) => {
                self.advance();
                let inner = self.parse_type()?;
                self.expect_punct(Punctuation::Semicolon)?;
                let len = match self.current().kind {
                    TokenKind::IntLiteral(n) if n >= 0 => n as u64,
                    _ => return Err(self.expected("array length")),
                };
                self.advance();
                self.expect_punct(Punctuation::CloseBracket)?;
                Ok(Type::Array {
                    inner: Box::new(inner),
                    len,
                })
            }
            TokenKind::Keyword(Keyword::Fn) => {
                self.advance();
                self.expect_punct(Punctuation::OpenParen)?;
                let mut params = Vec::new();
                while !self.current().is_punct(Punctuation::CloseParen) {
                    params.push(self.parse_type()?);
                    if !self.eat_punct(Punctuation::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punctuation::CloseParen)?;
                let ret = self.parse_return_type()?;
                Ok(Type::FunctionPointer {
                    params,
                    ret: Box::new(ret),
                })
            }
            TokenKind::Keyword(Keyword::SelfType) => {
                self.advance();
                Ok(match &self.self_type {
                    Some(ty) => ty.clone(),
                    None => Type::path(self.interner.get_or_intern("Self")),
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                let mut args = Vec::new();
                if self.eat_punct(Punctuation::LessThan) {
                    while !self.current().is_punct(Punctuation::GreaterThan) {
                        args.push(self.parse_type()?);
                        if !self.eat_punct(Punctuation::Comma) {
                            break;
                        }
                    }
                    self.expect_punct(Punctuation::GreaterThan)?;
                }
                Ok(Type::Path { name, args })
            }
            _ => Err(self.expected("type")),
        }
    }

    /// `-> T`, or `void` when the arrow is absent.
    fn parse_return_type(&mut self) -> Result<Type, ParseError> {
        if self.eat_punct(Punctuation::Arrow) {
            self.parse_type()
        } else {
            Ok(Type::primitive(self.interner, "void"))
        }
    }

    /// `<T, U>` after a struct or impl name.
    fn parse_generic_params(&mut self) -> Result<Vec<SymbolUsize>, ParseError> {
        let mut generics = Vec::new();
        if self.eat_punct(Punctuation::LessThan) {
            while !self.current().is_punct(Punctuation::GreaterThan) {
                let (name, _) = self.expect_ident("generic parameter name")?;
                generics.push(name);
                if !self.eat_punct(Punctuation::Comma) {
                    break;
                }
            }
            self.expect_punct(Punctuation::GreaterThan)?;
        }
        Ok(generics)
    }

    pub(crate) fn parse_item(&mut self) -> Result<Index, ParseError> {
        match self.current().kind {
            TokenKind::Keyword(Keyword::Fn) => self.parse_fn_def(),
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_def(),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum_def(),
            TokenKind::Keyword(Keyword::Impl) => self.parse_impl(),
            TokenKind::Keyword(Keyword::Trait) => self.parse_trait(),
            TokenKind::Keyword(Keyword::Macro) => self.parse_macro_def(),
            TokenKind::Keyword(Keyword::Static) => self.parse_static(),
            TokenKind::Keyword(Keyword::Type) => self.parse_type_alias(),
            TokenKind::Punctuation(Punctuation::Hash) => self.parse_directive(),
            _ => Err(self.unexpected("token at item position")),
        }
    }

    fn parse_fn_def(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Fn)?;
        let (name, _) = self.expect_ident("function name after `fn`")?;
        self.expect_punct(Punctuation::OpenParen)?;

        let mut params = Vec::new();
        while !self.current().is_punct(Punctuation::CloseParen) {
            params.push(self.parse_param()?);
            if !self.eat_punct(Punctuation::Comma) {
                break;
            }
        }
        let close = self.expect_punct(Punctuation::CloseParen)?;
        let ret = self.parse_return_type()?;
        let span = start.span.connect_new(&close.span);

        let body = if self.eat_punct(Punctuation::Semicolon) {
            None
        } else {
            Some(self.parse_block()?)
        };

        let scope = self.ast.scopes.new_scope(None);
        Ok(self.push(
            NodeKind::Function(Function {
                name,
                params,
                ret,
                body,
                scope,
                needs_ret_block: false,
            }),
            span,
        ))
    }

    /// `name: T`, `self`, `&self` or `&mut self`.
    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let start = *self.current();

        let by_ref = start.is_punct(Punctuation::Amp);
        let mutable = by_ref && self.peek_offset(1).is_keyword(Keyword::Mut);
        let self_offset = if mutable { 2 } else { usize::from(by_ref) };
        if self.peek_offset(self_offset).is_keyword(Keyword::SelfValue) {
            for _ in 0..=self_offset {
                self.advance();
            }
            let base = match &self.self_type {
                Some(ty) => ty.clone(),
                None => Type::path(self.interner.get_or_intern("Self")),
            };
            let ty = if by_ref {
                Type::Pointer {
                    inner: Box::new(base),
                    mutable,
                    is_ref: true,
                }
            } else {
                base
            };
            let name = self.interner.get_or_intern("self");
            return Ok(Param {
                name,
                ty,
                span: start.span,
            });
        }

        let (name, span) = self.expect_ident("parameter name")?;
        self.expect_punct(Punctuation::Colon)?;
        let ty = self.parse_type()?;
        Ok(Param { name, ty, span })
    }

    fn parse_struct_def(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Struct)?;
        let (name, name_span) = self.expect_ident("struct name")?;
        let generics = self.parse_generic_params()?;
        self.expect_punct(Punctuation::OpenBrace)?;

        let mut fields = Vec::new();
        while !self.current().is_punct(Punctuation::CloseBrace) {
            let (field, _) = self.expect_ident("field name")?;
            self.expect_punct(Punctuation::Colon)?;
            let ty = self.parse_type()?;
            fields.push(Field { name: field, ty });
            if !self.eat_punct(Punctuation::Semicolon) && !self.eat_punct(Punctuation::Comma) {
                break;
            }
        }
        self.expect_punct(Punctuation::CloseBrace)?;
        self.eat_punct(Punctuation::Semicolon);

        Ok(self.push(
            NodeKind::StructDef { name, generics, fields },
            start.span.connect_new(&name_span),
        ))
    }

    fn parse_enum_def(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Enum)?;
        let (name, name_span) = self.expect_ident("enum name")?;
        let backing = if self.eat_punct(Punctuation::Colon) {
            self.parse_type()?
        } else {
            Type::primitive(self.interner, "u32")
        };
        self.expect_punct(Punctuation::OpenBrace)?;

        let mut variants = Vec::new();
        while !self.current().is_punct(Punctuation::CloseBrace) {
            let (variant, _) = self.expect_ident("enum variant")?;
            variants.push(variant);
            if !self.eat_punct(Punctuation::Comma) {
                break;
            }
        }
        self.expect_punct(Punctuation::CloseBrace)?;
        self.eat_punct(Punctuation::Semicolon);

        Ok(self.push(
            NodeKind::EnumDef {
                name,
                variants,
                backing,
            },
            start.span.connect_new(&name_span),
        ))
    }

    /// `impl [Trait for] Type<T> { fn ... }`
    fn parse_impl(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Impl)?;
        let (first, first_span) = self.expect_ident("type or trait name after `impl`")?;

        let (trait_, target, target_span) = if self.current().is_keyword(Keyword::For) {
            self.advance();
            let (target, span) = self.expect_ident("type name after `for`")?;
            (Some(first), target, span)
        } else {
            (None, first, first_span)
        };
        let generics = self.parse_generic_params()?;

        let self_type = Type::Path {
            name: target,
            args: generics.iter().map(|g| Type::path(*g)).collect(),
        };
        let saved = self.self_type.replace(self_type);
        let body = self.parse_block();
        self.self_type = saved;
        let body = body?;

        Ok(self.push(
            NodeKind::Impl {
                target,
                generics,
                trait_,
                body,
            },
            start.span.connect_new(&target_span),
        ))
    }

    fn parse_trait(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Trait)?;
        let (name, name_span) = self.expect_ident("trait name")?;

        let saved = self.self_type.replace(Type::Trait(name));
        let body = self.parse_block();
        self.self_type = saved;
        let body = body?;

        Ok(self.push(NodeKind::Trait { name, body }, start.span.connect_new(&name_span)))
    }

    fn parse_static(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Static)?;
        let (name, _) = self.expect_ident("static name")?;
        self.expect_punct(Punctuation::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.eat_punct(Punctuation::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let end = self.expect_punct(Punctuation::Semicolon)?;
        Ok(self.push(NodeKind::Static { name, ty, init }, start.span.connect_new(&end.span)))
    }

    fn parse_type_alias(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Type)?;
        let (name, _) = self.expect_ident("alias name")?;
        self.expect_punct(Punctuation::Eq)?;
        let ty = self.parse_type()?;
        let end = self.expect_punct(Punctuation::Semicolon)?;
        Ok(self.push(NodeKind::TypeAlias { name, ty }, start.span.connect_new(&end.span)))
    }

    /// `#include "path"`
    fn parse_directive(&mut self) -> Result<Index, ParseError> {
        let hash = self.expect_punct(Punctuation::Hash)?;
        let (directive, directive_span) = self.expect_ident("directive name after `#`")?;
        if self.interner.resolve(directive) != Some("include") {
            let name = self.interner.resolve(directive).unwrap_or_default().to_string();
            return Err(self.invalid("directive", &format!("`#{name}` is not supported"), directive_span));
        }
        let path_token = self.advance();
        let TokenKind::StringLiteral(path) = path_token.kind else {
            return Err(ParseError::Expected {
                what: "string path after `#include`".into(),
                got: format!("`{}`", path_token.text(self.interner)),
                span: path_token.span.to_display(self.interner),
            });
        };
        Ok(self.push(NodeKind::MacroInclude { path }, hash.span.connect_new(&path_token.span)))
    }
}
