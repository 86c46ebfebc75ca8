use generational_arena::Index;

use super::{
    ParseError, Parser,
    node::{MacroArm, MacroParam, MacroParamKind, NodeKind},
};
use crate::compiler::tokens::{Keyword, Punctuation, Token, TokenKind};

impl<'a> Parser<'a> {
    /// `macro name { (x: $, rest: []) -> { tokens } ... }`
    ///
    /// Arm bodies stay as raw tokens until a call site picks an arm.
    pub(crate) fn parse_macro_def(&mut self) -> Result<Index, ParseError> {
        let start = self.expect_keyword(Keyword::Macro)?;
        let (name, name_span) = self.expect_ident("macro name")?;
        self.expect_punct(Punctuation::OpenBrace)?;

        let mut arms = Vec::new();
        while !self.current().is_punct(Punctuation::CloseBrace) {
            self.expect_punct(Punctuation::OpenParen)?;
            let mut params = Vec::new();
            while !self.current().is_punct(Punctuation::CloseParen) {
                let (param, _) = self.expect_ident("macro parameter name")?;
                self.expect_punct(Punctuation::Colon)?;
                let kind = if self.eat_punct(Punctuation::Dollar) {
                    MacroParamKind::Single
                } else if self.eat_punct(Punctuation::OpenBracket) {
                    self.expect_punct(Punctuation::CloseBracket)?;
                    MacroParamKind::Variadic
                } else {
                    return Err(self.expected("`$` or `[]` after macro parameter"));
                };
                params.push(MacroParam { name: param, kind });
                if !self.eat_punct(Punctuation::Comma) {
                    break;
                }
            }
            self.expect_punct(Punctuation::CloseParen)?;
            self.expect_punct(Punctuation::Arrow)?;
            self.expect_punct(Punctuation::OpenBrace)?;
            let body = self.collect_until_close(Punctuation::CloseBrace)?;
            self.expect_punct(Punctuation::CloseBrace)?;
            arms.push(MacroArm { params, body });
            self.eat_punct(Punctuation::Comma);
        }
        self.expect_punct(Punctuation::CloseBrace)?;

        Ok(self.push(NodeKind::MacroDef { name, arms }, start.span.connect_new(&name_span)))
    }

    /// Call arguments of `name$( ... )` with the `(` current. Arguments are token
    /// runs split on commas outside of any bracket pair.
    pub(crate) fn parse_macro_args(&mut self) -> Result<(Vec<Vec<Token>>, Token), ParseError> {
        self.expect_punct(Punctuation::OpenParen)?;
        let tokens = self.collect_until_close(Punctuation::CloseParen)?;
        let close = self.expect_punct(Punctuation::CloseParen)?;

        let mut args: Vec<Vec<Token>> = Vec::new();
        let mut current = Vec::new();
        let mut depth = 0usize;
        for token in tokens {
            match token.kind {
                TokenKind::Punctuation(Punctuation::OpenParen | Punctuation::OpenBracket | Punctuation::OpenBrace) => {
                    depth += 1
                }
                TokenKind::Punctuation(Punctuation::CloseParen | Punctuation::CloseBracket | Punctuation::CloseBrace) => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Punctuation(Punctuation::Comma) if depth == 0 => {
                    args.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(token);
        }
        if !current.is_empty() || !args.is_empty() {
            args.push(current);
        }
        Ok((args, close))
    }

    /// Collects raw tokens up to the bracket closing the one just consumed,
    /// leaving the closing token current.
    fn collect_until_close(&mut self, close: Punctuation) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = *self.current();
            match token.kind {
                TokenKind::Eof => return Err(self.expected(&format!("`{}`", close.as_str()))),
                TokenKind::Punctuation(Punctuation::OpenParen | Punctuation::OpenBracket | Punctuation::OpenBrace) => {
                    depth += 1
                }
                TokenKind::Punctuation(Punctuation::CloseParen | Punctuation::CloseBracket | Punctuation::CloseBrace) => {
                    if depth == 0 {
                        if token.is_punct(close) {
                            return Ok(tokens);
                        }
                        return Err(self.unexpected(&format!("`{}`", token.text(self.interner))));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            tokens.push(self.advance());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::compiler::{
        Interner, lexer,
        parser::{
            Parser,
            display::render_tokens,
            node::{Ast, MacroParamKind, NodeKind},
        },
    };

    fn first_node(src: &str) -> (Ast, Interner, NodeKind) {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("t");
        let tokens = lexer::tokenize(src, &mut interner, file).unwrap();
        let mut ast = Ast::new();
        let block = Parser::new(tokens, &mut ast, &mut interner).parse_fragment().unwrap();
        let first = ast.blocks[block].stmts[0];
        let kind = ast.nodes[first].kind.clone();
        (ast, interner, kind)
    }

    #[test]
    fn test_macro_definition_keeps_raw_body() {
        let (_, interner, kind) = first_node("macro max { (a: $, b: $) -> { if $a > $b { $a } } (xs: []) -> { f($xs) } }");
        let NodeKind::MacroDef { arms, .. } = kind else {
            panic!("expected macro def");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(render_tokens(&arms[0].body, &interner), "if $a > $b { $a }");
        assert_eq!(arms[1].params[0].kind, MacroParamKind::Variadic);
        assert_eq!(render_tokens(&arms[1].body, &interner), "f($xs)");
    }

    #[test]
    fn test_call_arguments_split_on_top_level_commas() {
        let (_, interner, kind) = first_node("m$(a, f(b, c), { 1, 2 }, [x, y]);");
        let NodeKind::MacroCall { args, .. } = kind else {
            panic!("expected macro call");
        };
        let rendered: Vec<String> = args.iter().map(|a| render_tokens(a, &interner)).collect();
        assert_eq!(rendered, vec!["a", "f(b, c)", "{ 1, 2 }", "[x, y]"]);
    }

    #[test]
    fn test_empty_call_has_no_arguments() {
        let (_, _, kind) = first_node("m$();");
        let NodeKind::MacroCall { args, .. } = kind else {
            panic!("expected macro call");
        };
        assert!(args.is_empty());
    }
}
