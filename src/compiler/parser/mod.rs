use generational_arena::Index;
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    tokens::{Keyword, Punctuation, Span, Token, TokenKind},
};
use node::{Ast, BlockId, NodeKind};
use types::Type;

mod definitions;
pub mod display;
pub mod error;
mod expr;
mod macros;
pub mod node;
mod precedence;
mod statements;
pub mod types;

pub use error::ParseError;

/// Recursive-descent parser with a Pratt core for expressions. Every parse
/// writes into the shared [`Ast`], which is what lets macro expansion and
/// `#include` re-enter the parser halfway through lowering.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    current_idx: usize,
    ast: &'a mut Ast,
    interner: &'a mut Interner,
    /// What `Self` means at the current position.
    self_type: Option<Type>,
    /// Set while parsing `if`/`for`/`match` headers, where `Name {` opens the body.
    no_struct_literal: bool,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, ast: &'a mut Ast, interner: &'a mut Interner) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or(Span {
                file: interner.get_or_intern("<macro>"),
                start: (0, 0),
                end: (0, 0),
            });
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self {
            tokens,
            current_idx: 0,
            ast,
            interner,
            self_type: None,
            no_struct_literal: false,
        }
    }

    /// Parses a whole file into a `Module` node.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse_module(mut self) -> Result<Index, ParseError> {
        let start = self.current().span;
        let body = self.parse_statements_until_eof()?;
        let span = start.connect_new(&self.current().span);
        let block = self.ast.new_block(body);
        tracing::debug!(statements = self.ast.blocks[block].stmts.len(), "parsed module");
        Ok(self.ast.push(NodeKind::Module { body: block }, span))
    }

    /// Parses a statement list up to end of input into a fresh block. Used for
    /// macro expansions in statement position.
    pub fn parse_fragment(mut self) -> Result<BlockId, ParseError> {
        let body = self.parse_statements_until_eof()?;
        Ok(self.ast.new_block(body))
    }

    /// Parses exactly one expression spanning the whole input.
    pub fn parse_single_expr(mut self) -> Result<Index, ParseError> {
        let expr = self.parse_expr()?;
        if self.current().is_punct(Punctuation::Semicolon) {
            self.advance();
        }
        if self.current().kind != TokenKind::Eof {
            return Err(self.expected("end of macro expression"));
        }
        Ok(expr)
    }

    fn parse_statements_until_eof(&mut self) -> Result<Vec<Index>, ParseError> {
        let mut body = Vec::new();
        while self.current().kind != TokenKind::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    /// looks at current token
    pub(crate) fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.current_idx.min(last)]
    }

    pub(crate) fn peek_offset(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.current_idx + offset).min(last)]
    }

    /// Consumes the current token and returns it. Never moves past `Eof`.
    pub(crate) fn advance(&mut self) -> Token {
        let token = *self.current();
        if token.kind != TokenKind::Eof {
            self.current_idx += 1;
        }
        token
    }

    pub(crate) fn eat_punct(&mut self, punct: Punctuation) -> bool {
        if self.current().is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punct(&mut self, punct: Punctuation) -> Result<Token, ParseError> {
        if self.current().is_punct(punct) {
            Ok(self.advance())
        } else {
            Err(self.expected(&format!("`{}`", punct.as_str())))
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        if self.current().is_keyword(keyword) {
            Ok(self.advance())
        } else {
            Err(self.expected(&format!("`{}`", keyword.as_str())))
        }
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Result<(SymbolUsize, Span), ParseError> {
        match self.current().kind {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.expected(what)),
        }
    }

    pub(crate) fn expected(&self, what: &str) -> ParseError {
        let token = self.current();
        ParseError::Expected {
            what: what.to_string(),
            got: format!("`{}`", token.text(self.interner)),
            span: token.span.to_display(self.interner),
        }
    }

    pub(crate) fn unexpected(&self, what: &str) -> ParseError {
        ParseError::Unexpected {
            what: what.to_string(),
            span: self.current().span.to_display(self.interner),
        }
    }

    pub(crate) fn invalid(&self, what: &str, reason: &str, span: Span) -> ParseError {
        ParseError::Invalid {
            what: what.to_string(),
            reason: reason.to_string(),
            span: span.to_display(self.interner),
        }
    }

    pub(crate) fn push(&mut self, kind: NodeKind, span: Span) -> Index {
        self.ast.push(kind, span)
    }

    pub(crate) fn span_of(&self, idx: Index) -> Span {
        self.ast.nodes.get(idx).map(|n| n.span).unwrap_or(self.current().span)
    }

    /// Runs `f` with struct literals switched off, restoring the old setting.
    pub(crate) fn without_struct_literals<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::replace(&mut self.no_struct_literal, true);
        let result = f(self);
        self.no_struct_literal = saved;
        result
    }

    pub(crate) fn with_struct_literals<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::replace(&mut self.no_struct_literal, false);
        let result = f(self);
        self.no_struct_literal = saved;
        result
    }
}
