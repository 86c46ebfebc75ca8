use generational_arena::Index;

use super::{
    ParseError, Parser,
    node::{BlockId, MatchCase, NodeKind},
};
use crate::compiler::tokens::{Keyword, Punctuation, TokenKind};

impl<'a> Parser<'a> {
    /// Parses one statement or item.
    pub fn parse_statement(&mut self) -> Result<Index, ParseError> {
        let token = *self.current();
        match token.kind {
            TokenKind::Keyword(
                Keyword::Fn
                | Keyword::Struct
                | Keyword::Enum
                | Keyword::Impl
                | Keyword::Trait
                | Keyword::Macro
                | Keyword::Static
                | Keyword::Type,
            )
            | TokenKind::Punctuation(Punctuation::Hash) => self.parse_item(),
            TokenKind::Keyword(Keyword::Let) => {
                let decl = self.parse_let()?;
                self.expect_punct(Punctuation::Semicolon)?;
                Ok(decl)
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.current().is_punct(Punctuation::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect_punct(Punctuation::Semicolon)?;
                Ok(self.push(NodeKind::Return { value }, token.span.connect_new(&end.span)))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                let end = self.expect_punct(Punctuation::Semicolon)?;
                Ok(self.push(NodeKind::Break, token.span.connect_new(&end.span)))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(),
            TokenKind::Punctuation(Punctuation::OpenBrace) => {
                let block = self.parse_block()?;
                Ok(self.push(NodeKind::Block(block), token.span))
            }
            _ => {
                let expr = self.with_struct_literals(|p| p.parse_expr())?;
                let is_macro = matches!(
                    self.ast.nodes.get(expr).map(|n| &n.kind),
                    Some(NodeKind::MacroCall { .. })
                );
                // macro bodies may end in a bare expression
                if is_macro || self.current().kind == TokenKind::Eof {
                    self.eat_punct(Punctuation::Semicolon);
                } else {
                    self.expect_punct(Punctuation::Semicolon)?;
                }
                Ok(expr)
            }
        }
    }

    /// `let [mut] name [: T] [= value]`, without the trailing semicolon.
    fn parse_let(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Let)?;
        let mutable = if self.current().is_keyword(Keyword::Mut) {
            self.advance();
            true
        } else {
            false
        };
        let (name, mut span) = self.expect_ident("variable name after `let`")?;
        span = start.span.connect_new(&span);

        let ty = if self.eat_punct(Punctuation::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.eat_punct(Punctuation::Eq) {
            let value = self.parse_expr()?;
            span.connect_mut(&self.span_of(value));
            Some(value)
        } else {
            None
        };

        Ok(self.push(
            NodeKind::VarDecl {
                name,
                mutable,
                ty,
                value,
            },
            span,
        ))
    }

    /// `{ statements }` into a fresh block with its own scope.
    pub(crate) fn parse_block(&mut self) -> Result<BlockId, ParseError> {
        self.expect_punct(Punctuation::OpenBrace)?;
        let mut stmts = Vec::new();
        self.with_struct_literals(|p| {
            while !p.current().is_punct(Punctuation::CloseBrace) {
                if p.current().kind == TokenKind::Eof {
                    return Err(p.expected("`}`"));
                }
                stmts.push(p.parse_statement()?);
            }
            Ok(())
        })?;
        self.expect_punct(Punctuation::CloseBrace)?;
        Ok(self.ast.new_block(stmts))
    }

    fn parse_if(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::If)?;
        let cond = self.without_struct_literals(|p| p.parse_expr())?;
        let then = self.parse_block()?;

        let else_ = if self.current().is_keyword(Keyword::Else) {
            self.advance();
            if self.current().is_keyword(Keyword::If) {
                // else if: an else block holding a single if
                let nested = self.parse_if()?;
                Some(self.ast.new_block(vec![nested]))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        let span = start.span.connect_new(&self.span_of(cond));
        Ok(self.push(NodeKind::If { cond, then, else_ }, span))
    }

    /// `for let i = 0 in cond { body }`
    fn parse_for(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::For)?;
        let var = self.without_struct_literals(|p| p.parse_let())?;
        self.expect_keyword(Keyword::In)?;
        let cond = self.without_struct_literals(|p| p.parse_expr())?;
        let body = self.parse_block()?;
        let scope = self.ast.scopes.new_scope(None);

        let span = start.span.connect_new(&self.span_of(cond));
        Ok(self.push(NodeKind::For { var, cond, body, scope }, span))
    }

    /// `match value { 1 -> { } E::A -> { } }`
    fn parse_match(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Match)?;
        let scrutinee = self.without_struct_literals(|p| p.parse_expr())?;
        self.expect_punct(Punctuation::OpenBrace)?;

        let mut cases = Vec::new();
        while !self.current().is_punct(Punctuation::CloseBrace) {
            let value = self.without_struct_literals(|p| p.parse_expr())?;
            self.expect_punct(Punctuation::Arrow)?;
            let body = self.parse_block()?;
            cases.push(MatchCase { value, body });
            self.eat_punct(Punctuation::Comma);
        }
        let end = self.expect_punct(Punctuation::CloseBrace)?;

        Ok(self.push(NodeKind::Match { scrutinee, cases }, start.span.connect_new(&end.span)))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{
        Interner, lexer,
        parser::{
            Parser,
            display::render_block,
            node::{Ast, NodeKind},
        },
    };

    fn parse_body(src: &str) -> String {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("t");
        let tokens = lexer::tokenize(src, &mut interner, file).unwrap();
        let mut ast = Ast::new();
        let block = Parser::new(tokens, &mut ast, &mut interner).parse_fragment().unwrap();
        render_block(&ast, &interner, block)
    }

    #[test]
    fn test_else_if_chain_nests() {
        let out = parse_body("if a { return 1; } else if b { return 2; } else { return 3; }");
        assert_eq!(
            out,
            "if a {\n    return 1;\n} else {\n    if b {\n        return 2;\n    } else {\n        return 3;\n    }\n}"
        );
    }

    #[test]
    fn test_struct_literal_not_taken_in_headers() {
        let out = parse_body("if x { y = 1; }");
        assert_eq!(out, "if x {\n    y = 1;\n}");
    }

    #[test]
    fn test_for_and_match() {
        let out = parse_body("for let mut i = 0 in i < 3 { i = i + 1; } match c { 1 -> { break; } Color::Red -> {} }");
        assert_eq!(
            out,
            "for let mut i = 0 in (i < 3) {\n    i = (i + 1);\n}\nmatch c {\n    1 -> {\n        break;\n    }\n    Color::Red -> {}\n}"
        );
    }

    #[test]
    fn test_macro_call_statement_semicolon_optional() {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("t");
        let tokens = lexer::tokenize("m$(1) m$(2);", &mut interner, file).unwrap();
        let mut ast = Ast::new();
        let block = Parser::new(tokens, &mut ast, &mut interner).parse_fragment().unwrap();
        let stmts = &ast.blocks[block].stmts;
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| matches!(ast.nodes[*s].kind, NodeKind::MacroCall { .. })));
    }
}
